use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartId, OrderId, OrderItemId, ProductId, UserId};
use domain::{
    Cart, CartItem, CartOwner, HistoryEntry, NewOrder, Order, OrderChange, OrderScope, Payment,
    PaymentMethod, Product, ShippingAddress,
};

use crate::Result;

/// The authoritative per-product stock count.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Retrieves a product by id, including removed ones.
    async fn product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Retrieves the products with the given ids. Unknown ids are skipped.
    async fn products(&self, ids: &[ProductId]) -> Result<Vec<Product>>;

    /// Lists every product that has not been removed, newest first.
    async fn catalog(&self) -> Result<Vec<Product>>;

    /// Inserts or replaces a product.
    async fn save_product(&self, product: &Product) -> Result<()>;

    /// Adds `quantity` units to a product's stock and returns the product.
    async fn restock(&self, id: ProductId, quantity: u32, now: DateTime<Utc>) -> Result<Product>;

    /// Soft-deletes a product and returns it.
    async fn remove_product(&self, id: ProductId, now: DateTime<Utc>) -> Result<Product>;
}

/// Storage for carts and their items.
///
/// Items are unique per `(cart_id, product_id)`. Every item mutation also
/// refreshes the cart's `updated_at`.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Returns the cart of `owner`, creating an empty one if none exists.
    ///
    /// The boolean is true when the cart was created by this call.
    async fn resolve(&self, owner: CartOwner, now: DateTime<Utc>) -> Result<(Cart, bool)>;

    /// Retrieves a cart by id.
    async fn get_cart(&self, id: CartId) -> Result<Option<Cart>>;

    /// Lists the items of a cart in insertion order.
    async fn items(&self, cart_id: CartId) -> Result<Vec<CartItem>>;

    /// Retrieves one item of a cart.
    async fn item(&self, cart_id: CartId, product_id: ProductId) -> Result<Option<CartItem>>;

    /// Inserts the item or overwrites the quantity of an existing one.
    async fn upsert_item(&self, item: &CartItem) -> Result<()>;

    /// Deletes one item. Returns false if it was not in the cart.
    async fn remove_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Deletes every item of a cart. The cart itself remains.
    async fn clear(&self, cart_id: CartId, now: DateTime<Utc>) -> Result<()>;

    /// Deletes carts (and their items) last modified before `cutoff`.
    /// Returns the number of carts deleted.
    async fn sweep_stale(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// True when the backing drops idle carts by itself. Such backings
    /// report unknown carts as empty instead of missing.
    fn expires_idle_carts(&self) -> bool {
        false
    }
}

/// Input for [`OrderStore::place_order`].
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub user_id: UserId,
    pub cart_id: CartId,
    /// Cart lines as `(product, quantity)`, read before the transaction.
    pub lines: Vec<(ProductId, u32)>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub now: DateTime<Utc>,
}

/// Storage for orders, their payment and history, sharing a transaction
/// boundary with the inventory ledger.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Places an order in one transaction.
    ///
    /// Locks the referenced products, re-checks stock against the locked
    /// rows, and writes the order, its items, the pending payment, the first
    /// history entry and all stock decrements together. On any error nothing
    /// is written.
    async fn place_order(&self, request: CheckoutRequest) -> Result<NewOrder>;

    /// Retrieves a full order with all its items.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Retrieves the order containing the given item.
    async fn find_order_by_item(&self, item_id: OrderItemId) -> Result<Option<Order>>;

    /// Lists the orders touching `scope`, newest first.
    ///
    /// Orders are returned whole; narrowing a shop's view to its own items is
    /// up to the caller.
    async fn list_orders(&self, scope: OrderScope) -> Result<Vec<Order>>;

    /// Persists a fulfillment transition in one transaction: the order and
    /// item rows, the history entries and any restocking.
    ///
    /// Fails with `ConcurrencyConflict` if the stored version is not
    /// `change.expected_version`.
    async fn apply_change(&self, change: &OrderChange) -> Result<()>;

    /// Retrieves the payment record of an order.
    async fn payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>>;

    /// Lists the history of an order, oldest first.
    async fn history(&self, order_id: OrderId) -> Result<Vec<HistoryEntry>>;

    /// Deletes an order with its items, payment and history. Stock is not
    /// touched. Returns false if the order did not exist.
    async fn delete_order(&self, id: OrderId) -> Result<bool>;
}
