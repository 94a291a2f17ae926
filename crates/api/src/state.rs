//! Shared application state.

use std::sync::Arc;

use services::{CartService, CatalogService, CheckoutService, Notifier, OrderService};
use store::{CartStore, InventoryLedger, OrderStore};

/// The primary store: products, stock and orders share one backing so that
/// checkout and cancellation can touch both in one transaction.
pub trait Backend: InventoryLedger + OrderStore + Clone + 'static {}

impl<T: InventoryLedger + OrderStore + Clone + 'static> Backend for T {}

/// Shared application state accessible from all handlers.
///
/// Carts may live in a different backing than orders, chosen at start-up.
pub struct AppState<S: Backend> {
    pub carts: CartService<dyn CartStore, S>,
    pub checkout: CheckoutService<S, dyn CartStore>,
    pub orders: OrderService<S>,
    pub catalog: CatalogService<S>,
}

impl<S: Backend> AppState<S> {
    /// Wires the services over the given backings.
    pub fn new(store: S, carts: Arc<dyn CartStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            carts: CartService::new(Arc::clone(&carts), store.clone()),
            checkout: CheckoutService::new(store.clone(), carts, Arc::clone(&notifier)),
            orders: OrderService::new(store.clone(), notifier),
            catalog: CatalogService::new(store),
        }
    }
}
