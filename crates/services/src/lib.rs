//! Application services for the marketplace.
//!
//! Services are generic over the storage traits from the `store` crate and
//! own the orchestration around them: cart resolution and live quotes,
//! checkout, fulfillment transitions with their notifications, catalog
//! management and the stale cart sweeper.

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod error;
pub mod notifier;
pub mod orders;
pub mod sweeper;

pub use cart::{CartService, ResolvedCart};
pub use catalog::{CatalogService, NewProduct};
pub use checkout::CheckoutService;
pub use error::{CommerceError, Result};
pub use notifier::{
    InMemoryNotifier, NotificationKind, Notifier, NotifyError, SentNotification, TracingNotifier,
};
pub use orders::OrderService;
pub use sweeper::spawn_cart_sweeper;
