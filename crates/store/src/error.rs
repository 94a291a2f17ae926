use common::OrderId;
use domain::DomainError;
use thiserror::Error;

/// Errors that can occur when reading or writing commerce data.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A business rule rejected the write after re-reading state inside the
    /// transaction (stock lost to a concurrent checkout, empty cart, ...).
    /// Nothing was written.
    #[error(transparent)]
    Rejected(#[from] DomainError),

    /// The order changed between load and write.
    #[error(
        "Concurrency conflict for order {order_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        order_id: OrderId,
        expected: i64,
        actual: i64,
    },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backing store refused the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
