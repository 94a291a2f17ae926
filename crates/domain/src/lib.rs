//! Domain layer for the marketplace backend.
//!
//! This crate is free of I/O. It provides:
//! - Product lifecycle and stock arithmetic
//! - Cart records and live cart quotes
//! - The order aggregate with its fulfillment state machine
//! - Checkout planning (cart lines to a new order, payment and history)
//! - Actor identity and the order visibility policy

pub mod access;
pub mod cart;
pub mod error;
pub mod order;
pub mod product;

pub use access::{Actor, OrderScope, Role};
pub use cart::{Cart, CartItem, CartLine, CartOwner, CartView, ensure_cart_quantity};
pub use error::DomainError;
pub use order::{
    CheckoutLine, FulfillmentStatus, HistoryEntry, ItemStatusUpdate, NewOrder, Order, OrderAction,
    OrderChange, OrderItem, OrderStatus, Payment, PaymentMethod, PaymentStatus, ShipmentDetails,
    ShippingAddress, StockAdjustment, derive_order_status, plan_checkout,
};
pub use product::{MAX_PRICE_CENTS, Product, ProductLifecycle};
