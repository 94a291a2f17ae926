//! Service error types.

use common::ProductId;
use domain::DomainError;
use store::StoreError;
use thiserror::Error;

/// Errors returned by the application services.
///
/// This is the full client-facing taxonomy. Storage failures that are not a
/// business outcome collapse into `Internal`, whose text is for logs only.
#[derive(Debug, Error)]
pub enum CommerceError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CommerceError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CommerceError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Short label used as the `reason` of failure metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            CommerceError::NotFound { .. } => "not_found",
            CommerceError::Forbidden(_) => "forbidden",
            CommerceError::AuthenticationRequired => "authentication_required",
            CommerceError::InvalidInput(_) => "invalid_input",
            CommerceError::InsufficientStock { .. } => "insufficient_stock",
            CommerceError::EmptyCart => "empty_cart",
            CommerceError::InvalidStateTransition(_) => "invalid_state_transition",
            CommerceError::Internal(_) => "internal",
        }
    }
}

impl From<DomainError> for CommerceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound { entity, id } => CommerceError::NotFound { entity, id },
            DomainError::Forbidden(msg) => CommerceError::Forbidden(msg),
            DomainError::AuthenticationRequired => CommerceError::AuthenticationRequired,
            DomainError::InvalidInput(msg) => CommerceError::InvalidInput(msg),
            DomainError::InsufficientStock {
                product_id,
                requested,
                available,
            } => CommerceError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            DomainError::EmptyCart => CommerceError::EmptyCart,
            DomainError::InvalidStateTransition { current, action } => {
                CommerceError::InvalidStateTransition(format!(
                    "cannot {action} from {current} state"
                ))
            }
        }
    }
}

impl From<StoreError> for CommerceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => CommerceError::NotFound { entity, id },
            StoreError::Rejected(domain) => domain.into(),
            StoreError::ConcurrencyConflict { .. } => CommerceError::InvalidStateTransition(
                "order was modified concurrently".to_string(),
            ),
            other => CommerceError::Internal(other.to_string()),
        }
    }
}

/// Convenience type alias for service results.
pub type Result<T> = std::result::Result<T, CommerceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderId;

    #[test]
    fn domain_transition_keeps_readable_message() {
        let err: CommerceError = DomainError::InvalidStateTransition {
            current: "SHIPPED",
            action: "cancel",
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Invalid state transition: cannot cancel from SHIPPED state"
        );
    }

    #[test]
    fn store_failures_map_to_taxonomy() {
        let conflict: CommerceError = StoreError::ConcurrencyConflict {
            order_id: OrderId::new(),
            expected: 1,
            actual: 2,
        }
        .into();
        assert!(matches!(conflict, CommerceError::InvalidStateTransition(_)));

        let rejected: CommerceError = StoreError::Rejected(DomainError::EmptyCart).into();
        assert!(matches!(rejected, CommerceError::EmptyCart));

        let internal: CommerceError = StoreError::Unavailable("disk full".to_string()).into();
        assert_eq!(internal.reason(), "internal");
    }
}
