//! HTTP route handlers.

pub mod cart;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod products;

use crate::error::ApiError;

/// Parses a UUID path segment into a typed id.
pub(crate) fn parse_id<T>(raw: &str, parse: fn(&str) -> Result<T, uuid::Error>) -> Result<T, ApiError> {
    parse(raw).map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}
