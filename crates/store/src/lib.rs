//! Storage layer for the marketplace.
//!
//! Three traits split the data by concern: [`InventoryLedger`] for products
//! and stock, [`CartStore`] for pending selections, and [`OrderStore`] for
//! placed orders. Backings:
//! - [`InMemoryStore`] implements all three, for tests and local runs
//! - [`PostgresStore`] implements all three on sqlx transactions
//! - [`ExpiringCartStore`] is a cart-only backing whose entries expire after
//!   a sliding idle period

pub mod error;
pub mod expiring;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use expiring::ExpiringCartStore;
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{CartStore, CheckoutRequest, InventoryLedger, OrderStore};
