//! Shared types for the marketplace backend.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{
    CartId, HistoryEntryId, OrderId, OrderItemId, PaymentId, ProductId, SessionId, ShopId, UserId,
};
