//! API error types with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use services::CommerceError;

/// API-level error type that maps to HTTP responses.
///
/// Every error renders as `{"error": "<message>"}`.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request (body, path or header).
    BadRequest(String),
    /// Error reported by an application service.
    Commerce(CommerceError),
    /// Failure outside the services, such as the session store.
    Internal(String),
}

impl ApiError {
    /// Returns the HTTP status this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Commerce(err) => commerce_status(err),
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn commerce_status(err: &CommerceError) -> StatusCode {
    match err {
        CommerceError::NotFound { .. } => StatusCode::NOT_FOUND,
        CommerceError::Forbidden(_) => StatusCode::FORBIDDEN,
        CommerceError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
        CommerceError::InvalidInput(_)
        | CommerceError::InsufficientStock { .. }
        | CommerceError::EmptyCart
        | CommerceError::InvalidStateTransition(_) => StatusCode::BAD_REQUEST,
        CommerceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::Commerce(CommerceError::Internal(detail)) | ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "internal server error");
                "Internal server error".to_string()
            }
            ApiError::Commerce(err) => err.to_string(),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<CommerceError> for ApiError {
    fn from(err: CommerceError) -> Self {
        ApiError::Commerce(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<tower_sessions::session::Error> for ApiError {
    fn from(err: tower_sessions::session::Error) -> Self {
        ApiError::Internal(format!("session store: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_rule_errors_are_bad_requests() {
        for err in [
            CommerceError::EmptyCart,
            CommerceError::InvalidStateTransition("cannot ship".to_string()),
            CommerceError::InvalidInput("reason is required".to_string()),
        ] {
            assert_eq!(ApiError::from(err).status(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn identity_errors_map_to_auth_statuses() {
        assert_eq!(
            ApiError::from(CommerceError::AuthenticationRequired).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(CommerceError::Forbidden("no".to_string())).status(),
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn internal_details_are_not_leaked() {
        let response =
            ApiError::from(CommerceError::Internal("relation \"orders\" missing".to_string()))
                .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal server error");
    }
}
