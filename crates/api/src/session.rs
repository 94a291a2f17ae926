//! Anonymous cart sessions.
//!
//! A caller without an identity is tracked by a [`SessionId`] kept in a
//! server-side session behind a cookie.

use common::SessionId;
use tower_sessions::cookie::SameSite;
use tower_sessions::{Expiry, Session, SessionManagerLayer, SessionStore};

use crate::error::ApiError;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "cart_session";

const CART_SESSION_KEY: &str = "cart_session_id";

/// Creates the session layer over any session store.
///
/// The session is renewed on every request and dropped after `ttl_days` of
/// inactivity.
pub fn session_layer<St>(store: St, ttl_days: i64, secure: bool) -> SessionManagerLayer<St>
where
    St: SessionStore + Clone,
{
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::days(ttl_days),
        ))
        .with_secure(secure)
        .with_same_site(SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}

/// Returns the anonymous cart session stored in `session`, if any.
pub async fn cart_session(session: &Session) -> Result<Option<SessionId>, ApiError> {
    Ok(session.get::<SessionId>(CART_SESSION_KEY).await?)
}

/// Remembers the anonymous cart session.
pub async fn remember_cart_session(session: &Session, id: SessionId) -> Result<(), ApiError> {
    session.insert(CART_SESSION_KEY, id).await?;
    Ok(())
}
