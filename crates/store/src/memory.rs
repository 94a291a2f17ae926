use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartId, OrderId, OrderItemId, ProductId};
use domain::{
    Cart, CartItem, CartOwner, CheckoutLine, HistoryEntry, NewOrder, Order, OrderChange,
    OrderScope, Payment, Product, plan_checkout,
};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    store::{CartStore, CheckoutRequest, InventoryLedger, OrderStore},
};

#[derive(Debug, Clone, Default)]
struct State {
    products: HashMap<ProductId, Product>,
    carts: HashMap<CartId, Cart>,
    cart_owners: HashMap<CartOwner, CartId>,
    cart_items: HashMap<CartId, Vec<CartItem>>,
    orders: HashMap<OrderId, Order>,
    payments: HashMap<OrderId, Payment>,
    history: HashMap<OrderId, Vec<HistoryEntry>>,
}

#[derive(Debug, Default)]
struct Faults {
    fail_on_payment_insert: bool,
    fail_on_apply_change: bool,
}

/// In-memory store implementation for testing and local runs.
///
/// Implements the same transactional contract as the PostgreSQL store:
/// multi-row writes are staged on a copy of the state and swapped in only
/// when every step succeeded.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    faults: Arc<std::sync::Mutex<Faults>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures `place_order` to fail while writing the payment record.
    pub fn set_fail_on_payment_insert(&self, fail: bool) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.fail_on_payment_insert = fail;
        }
    }

    /// Configures `apply_change` to fail after staging its writes.
    pub fn set_fail_on_apply_change(&self, fail: bool) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.fail_on_apply_change = fail;
        }
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns the number of stored payment records.
    pub async fn payment_count(&self) -> usize {
        self.state.read().await.payments.len()
    }

    /// Returns the number of stored carts.
    pub async fn cart_count(&self) -> usize {
        self.state.read().await.carts.len()
    }

    /// Clears all data.
    pub async fn clear_all(&self) {
        *self.state.write().await = State::default();
    }

    fn fault(&self, pick: impl Fn(&Faults) -> bool) -> bool {
        self.faults.lock().map(|faults| pick(&*faults)).unwrap_or(false)
    }
}

fn touch_cart(state: &mut State, cart_id: CartId, now: DateTime<Utc>) {
    if let Some(cart) = state.carts.get_mut(&cart_id) {
        cart.updated_at = now;
    }
}

#[async_trait]
impl InventoryLedger for InMemoryStore {
    async fn product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn products(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).cloned())
            .collect())
    }

    async fn catalog(&self) -> Result<Vec<Product>> {
        let state = self.state.read().await;
        let mut products: Vec<_> = state
            .products
            .values()
            .filter(|product| product.is_listed())
            .cloned()
            .collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(products)
    }

    async fn save_product(&self, product: &Product) -> Result<()> {
        self.state
            .write()
            .await
            .products
            .insert(product.id, product.clone());
        Ok(())
    }

    async fn restock(&self, id: ProductId, quantity: u32, now: DateTime<Utc>) -> Result<Product> {
        let mut state = self.state.write().await;
        let product = state
            .products
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Product", id))?;
        product.restock(quantity, now);
        Ok(product.clone())
    }

    async fn remove_product(&self, id: ProductId, now: DateTime<Utc>) -> Result<Product> {
        let mut state = self.state.write().await;
        let product = state
            .products
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Product", id))?;
        product.remove(now);
        Ok(product.clone())
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn resolve(&self, owner: CartOwner, now: DateTime<Utc>) -> Result<(Cart, bool)> {
        let mut state = self.state.write().await;
        if let Some(cart) = state
            .cart_owners
            .get(&owner)
            .and_then(|id| state.carts.get(id))
        {
            return Ok((cart.clone(), false));
        }

        let cart = Cart::new(owner, now);
        state.cart_owners.insert(owner, cart.id);
        state.carts.insert(cart.id, cart.clone());
        Ok((cart, true))
    }

    async fn get_cart(&self, id: CartId) -> Result<Option<Cart>> {
        Ok(self.state.read().await.carts.get(&id).cloned())
    }

    async fn items(&self, cart_id: CartId) -> Result<Vec<CartItem>> {
        Ok(self
            .state
            .read()
            .await
            .cart_items
            .get(&cart_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn item(&self, cart_id: CartId, product_id: ProductId) -> Result<Option<CartItem>> {
        let state = self.state.read().await;
        Ok(state
            .cart_items
            .get(&cart_id)
            .and_then(|items| items.iter().find(|item| item.product_id == product_id))
            .cloned())
    }

    async fn upsert_item(&self, item: &CartItem) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.carts.contains_key(&item.cart_id) {
            return Err(StoreError::not_found("Cart", item.cart_id));
        }

        let items = state.cart_items.entry(item.cart_id).or_default();
        match items.iter_mut().find(|i| i.product_id == item.product_id) {
            Some(existing) => *existing = item.clone(),
            None => items.push(item.clone()),
        }
        touch_cart(&mut state, item.cart_id, item.updated_at);
        Ok(())
    }

    async fn remove_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(items) = state.cart_items.get_mut(&cart_id) else {
            return Ok(false);
        };
        let before = items.len();
        items.retain(|item| item.product_id != product_id);
        let removed = items.len() != before;
        if removed {
            touch_cart(&mut state, cart_id, now);
        }
        Ok(removed)
    }

    async fn clear(&self, cart_id: CartId, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().await;
        state.cart_items.remove(&cart_id);
        touch_cart(&mut state, cart_id, now);
        Ok(())
    }

    async fn sweep_stale(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.write().await;
        let stale: Vec<Cart> = state
            .carts
            .values()
            .filter(|cart| cart.updated_at < cutoff)
            .cloned()
            .collect();
        for cart in &stale {
            state.carts.remove(&cart.id);
            state.cart_owners.remove(&cart.owner);
            state.cart_items.remove(&cart.id);
        }
        Ok(stale.len() as u64)
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn place_order(&self, request: CheckoutRequest) -> Result<NewOrder> {
        let mut state = self.state.write().await;
        let mut staged = state.clone();

        let mut lines = Vec::with_capacity(request.lines.len());
        for (product_id, quantity) in &request.lines {
            let product = staged
                .products
                .get(product_id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("Product", product_id))?;
            lines.push(CheckoutLine {
                product,
                quantity: *quantity,
            });
        }

        let placed = plan_checkout(
            request.user_id,
            request.cart_id,
            lines,
            request.shipping_address,
            request.payment_method,
            request.now,
        )?;

        for withdrawal in placed.stock_withdrawals() {
            if let Some(product) = staged.products.get_mut(&withdrawal.product_id) {
                product.withdraw(withdrawal.quantity, request.now)?;
            }
        }
        let order_id = placed.order.id;
        staged.orders.insert(order_id, placed.order.clone());

        if self.fault(|f| f.fail_on_payment_insert) {
            return Err(StoreError::Unavailable(
                "payment insert failed".to_string(),
            ));
        }
        staged.payments.insert(order_id, placed.payment.clone());
        staged
            .history
            .entry(order_id)
            .or_default()
            .push(placed.history.clone());

        *state = staged;
        Ok(placed)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn find_order_by_item(&self, item_id: OrderItemId) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .find(|order| order.item(item_id).is_some())
            .cloned())
    }

    async fn list_orders(&self, scope: OrderScope) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|order| match scope {
                OrderScope::All => true,
                OrderScope::Shop(shop_id) => order.involves_shop(shop_id),
                OrderScope::Purchaser(user_id) => order.user_id == user_id,
            })
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn apply_change(&self, change: &OrderChange) -> Result<()> {
        let mut state = self.state.write().await;
        let order_id = change.order.id;
        let actual = state
            .orders
            .get(&order_id)
            .map(|order| order.version)
            .ok_or_else(|| StoreError::not_found("Order", order_id))?;
        if actual != change.expected_version {
            return Err(StoreError::ConcurrencyConflict {
                order_id,
                expected: change.expected_version,
                actual,
            });
        }

        let mut staged = state.clone();
        staged.orders.insert(order_id, change.order.clone());
        staged
            .history
            .entry(order_id)
            .or_default()
            .extend(change.history.iter().cloned());
        for adjustment in &change.restock {
            if let Some(product) = staged.products.get_mut(&adjustment.product_id) {
                product.restock(adjustment.quantity, change.order.updated_at);
            }
        }

        if self.fault(|f| f.fail_on_apply_change) {
            return Err(StoreError::Unavailable(
                "order update failed".to_string(),
            ));
        }
        *state = staged;
        Ok(())
    }

    async fn payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        Ok(self.state.read().await.payments.get(&order_id).cloned())
    }

    async fn history(&self, order_id: OrderId) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .state
            .read()
            .await
            .history
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_order(&self, id: OrderId) -> Result<bool> {
        let mut state = self.state.write().await;
        let existed = state.orders.remove(&id).is_some();
        state.payments.remove(&id);
        state.history.remove(&id);
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::{Money, SessionId, ShopId, UserId};
    use domain::{
        Actor, DomainError, PaymentMethod, ShipmentDetails, ShippingAddress,
    };

    fn address() -> ShippingAddress {
        ShippingAddress {
            full_name: "Efua Asante".to_string(),
            street: "7 Liberation Rd".to_string(),
            city: "Accra".to_string(),
            state: "Greater Accra".to_string(),
            zip_code: None,
            country: "Ghana".to_string(),
            phone: "0209876543".to_string(),
        }
    }

    async fn seeded(stock: u32) -> (InMemoryStore, Product) {
        let store = InMemoryStore::new();
        let product = Product::new(
            ShopId::new(),
            "Basket",
            Money::from_cents(1000),
            stock,
            Utc::now(),
        )
        .unwrap();
        store.save_product(&product).await.unwrap();
        (store, product)
    }

    fn request(product: &Product, quantity: u32) -> CheckoutRequest {
        CheckoutRequest {
            user_id: UserId::new(),
            cart_id: CartId::new(),
            lines: vec![(product.id, quantity)],
            shipping_address: address(),
            payment_method: PaymentMethod::Momo,
            now: Utc::now(),
        }
    }

    #[tokio::test]
    async fn resolve_returns_existing_cart() {
        let store = InMemoryStore::new();
        let owner = CartOwner::Session(SessionId::new());

        let (first, created) = store.resolve(owner, Utc::now()).await.unwrap();
        assert!(created);
        let (second, created) = store.resolve(owner, Utc::now()).await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(store.cart_count().await, 1);
    }

    #[tokio::test]
    async fn upsert_overwrites_single_row() {
        let (store, product) = seeded(5).await;
        let (cart, _) = store
            .resolve(CartOwner::User(UserId::new()), Utc::now())
            .await
            .unwrap();

        for quantity in [1, 3] {
            store
                .upsert_item(&CartItem {
                    cart_id: cart.id,
                    product_id: product.id,
                    quantity,
                    updated_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let items = store.items(cart.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 3);
    }

    #[tokio::test]
    async fn sweep_deletes_only_stale_carts() {
        let store = InMemoryStore::new();
        let old = Utc::now() - Duration::days(8);
        let (stale, _) = store
            .resolve(CartOwner::Session(SessionId::new()), old)
            .await
            .unwrap();
        store
            .resolve(CartOwner::User(UserId::new()), Utc::now())
            .await
            .unwrap();

        let swept = store
            .sweep_stale(Utc::now() - Duration::days(7))
            .await
            .unwrap();

        assert_eq!(swept, 1);
        assert!(store.get_cart(stale.id).await.unwrap().is_none());
        assert_eq!(store.cart_count().await, 1);
    }

    #[tokio::test]
    async fn place_order_decrements_stock() {
        let (store, product) = seeded(5).await;

        let placed = store.place_order(request(&product, 2)).await.unwrap();

        let stored = store.product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock_quantity, 3);
        assert!(store.get_order(placed.order.id).await.unwrap().is_some());
        assert_eq!(
            store.payment_for_order(placed.order.id).await.unwrap(),
            Some(placed.payment)
        );
        assert_eq!(store.history(placed.order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_payment_insert_leaves_nothing_behind() {
        let (store, product) = seeded(5).await;
        store.set_fail_on_payment_insert(true);

        let result = store.place_order(request(&product, 2)).await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.payment_count().await, 0);
        assert_eq!(
            store.product(product.id).await.unwrap().unwrap().stock_quantity,
            5
        );
    }

    #[tokio::test]
    async fn insufficient_stock_is_rejected() {
        let (store, product) = seeded(1).await;
        let result = store.place_order(request(&product, 2)).await;
        assert!(matches!(
            result,
            Err(StoreError::Rejected(DomainError::InsufficientStock { .. }))
        ));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn stale_change_is_a_conflict() {
        let (store, product) = seeded(5).await;
        let placed = store.place_order(request(&product, 1)).await.unwrap();
        let actor = Actor::shop(UserId::new(), product.shop_id);

        let first = placed
            .order
            .ship(&actor, ShipmentDetails::default(), Utc::now())
            .unwrap();
        let second = placed.order.cancel(&actor, "duplicate", Utc::now()).unwrap();

        store.apply_change(&first).await.unwrap();
        let err = store.apply_change(&second).await.unwrap_err();

        assert!(matches!(err, StoreError::ConcurrencyConflict { .. }));
        assert_eq!(
            store.product(product.id).await.unwrap().unwrap().stock_quantity,
            4
        );
    }

    #[tokio::test]
    async fn delete_order_keeps_stock() {
        let (store, product) = seeded(5).await;
        let placed = store.place_order(request(&product, 2)).await.unwrap();

        assert!(store.delete_order(placed.order.id).await.unwrap());
        assert!(!store.delete_order(placed.order.id).await.unwrap());
        assert!(store.history(placed.order.id).await.unwrap().is_empty());
        assert_eq!(
            store.product(product.id).await.unwrap().unwrap().stock_quantity,
            3
        );
    }
}
