//! Caller identity asserted by the upstream authentication gateway.
//!
//! The gateway verifies the bearer token and forwards the claims as headers.
//! No `x-actor-id` header means an anonymous caller.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use common::{ShopId, UserId};
use domain::{Actor, Role};
use services::CommerceError;

use crate::error::ApiError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const SHOP_ID_HEADER: &str = "x-shop-id";
pub const ACTOR_VERIFIED_HEADER: &str = "x-actor-verified";

/// The caller, if any.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub Option<Actor>);

/// A caller that must be authenticated. Rejects with 401 otherwise.
#[derive(Debug, Clone, Copy)]
pub struct Authenticated(pub Actor);

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Identity(actor_from_headers(&parts.headers)?))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_headers(&parts.headers)?
            .map(Authenticated)
            .ok_or(ApiError::Commerce(CommerceError::AuthenticationRequired))
    }
}

/// Reads the actor claims. A malformed claim is treated as a failed
/// authentication, not as an anonymous caller.
fn actor_from_headers(headers: &HeaderMap) -> Result<Option<Actor>, ApiError> {
    let Some(subject) = header(headers, ACTOR_ID_HEADER)? else {
        return Ok(None);
    };
    let subject_id = UserId::parse(subject).map_err(|_| unauthenticated())?;

    let role = match header(headers, ACTOR_ROLE_HEADER)? {
        Some(raw) => raw.parse::<Role>().map_err(|_| unauthenticated())?,
        None => Role::User,
    };
    let shop_id = header(headers, SHOP_ID_HEADER)?
        .map(|raw| ShopId::parse(raw).map_err(|_| unauthenticated()))
        .transpose()?;
    let verified = match header(headers, ACTOR_VERIFIED_HEADER)? {
        Some(raw) => raw.parse::<bool>().map_err(|_| unauthenticated())?,
        None => false,
    };

    Ok(Some(Actor {
        subject_id,
        role,
        shop_id,
        verified,
    }))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, ApiError> {
    headers
        .get(name)
        .map(|value| value.to_str().map(str::trim).map_err(|_| unauthenticated()))
        .transpose()
}

fn unauthenticated() -> ApiError {
    ApiError::Commerce(CommerceError::AuthenticationRequired)
}
