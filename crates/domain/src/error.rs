//! Domain error types.

use common::ProductId;
use thiserror::Error;

/// Business rule violations detected by pure domain logic.
///
/// None of these are produced after a mutation has started; callers can
/// surface them directly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// The referenced entity does not exist (or is no longer purchasable).
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The actor is authenticated but may not touch this entity.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The operation needs an authenticated actor.
    #[error("Authentication required")]
    AuthenticationRequired,

    /// Malformed or out-of-range input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Requested quantity exceeds the product's stock.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// Checkout was attempted on a cart without items.
    #[error("Cart is empty")]
    EmptyCart,

    /// The order or item is not in a state that allows the action.
    #[error("Invalid state transition: cannot {action} from {current} state")]
    InvalidStateTransition {
        current: &'static str,
        action: &'static str,
    },
}

impl DomainError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
