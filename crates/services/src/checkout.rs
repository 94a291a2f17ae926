//! Checkout orchestration.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use domain::{Actor, CartOwner, Order, PaymentMethod, ShippingAddress};
use store::{CartStore, CheckoutRequest, OrderStore};

use crate::error::{CommerceError, Result};
use crate::notifier::{NotificationKind, Notifier, dispatch};

/// Turns an authenticated user's cart into an order.
///
/// The stock re-check, the order rows, the pending payment and the stock
/// decrements all happen inside [`OrderStore::place_order`]. This service
/// only gathers the cart lines beforehand and tidies up afterwards.
pub struct CheckoutService<S, C: ?Sized> {
    store: S,
    carts: Arc<C>,
    notifier: Arc<dyn Notifier>,
}

impl<S, C> CheckoutService<S, C>
where
    S: OrderStore,
    C: CartStore + ?Sized,
{
    /// Creates a new checkout service.
    pub fn new(store: S, carts: Arc<C>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            carts,
            notifier,
        }
    }

    /// Places an order from the actor's cart.
    ///
    /// Anonymous callers get `AuthenticationRequired`; an empty cart gives
    /// `EmptyCart`. On success the cart is emptied and a confirmation is
    /// sent in the background.
    #[tracing::instrument(skip(self, shipping_address), fields(actor = ?actor.map(|a| a.subject_id)))]
    pub async fn checkout(
        &self,
        actor: Option<&Actor>,
        shipping_address: ShippingAddress,
        payment_method: PaymentMethod,
    ) -> Result<Order> {
        let started = Instant::now();
        let result = self
            .place(actor, shipping_address, payment_method)
            .await;
        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());

        match result {
            Ok(order) => {
                metrics::counter!("checkouts_total").increment(1);
                tracing::info!(
                    order_id = %order.id,
                    total = %order.total_amount,
                    items = order.items.len(),
                    "order placed"
                );
                dispatch(
                    Arc::clone(&self.notifier),
                    NotificationKind::OrderConfirmed,
                    order.clone(),
                );
                Ok(order)
            }
            Err(err) => {
                metrics::counter!("checkout_failures_total", "reason" => err.reason())
                    .increment(1);
                tracing::warn!(error = %err, "checkout rejected");
                Err(err)
            }
        }
    }

    async fn place(
        &self,
        actor: Option<&Actor>,
        shipping_address: ShippingAddress,
        payment_method: PaymentMethod,
    ) -> Result<Order> {
        let actor = actor.ok_or(CommerceError::AuthenticationRequired)?;
        let now = Utc::now();

        let (cart, _) = self
            .carts
            .resolve(CartOwner::User(actor.subject_id), now)
            .await?;
        let lines: Vec<_> = self
            .carts
            .items(cart.id)
            .await?
            .into_iter()
            .map(|item| (item.product_id, item.quantity))
            .collect();
        if lines.is_empty() {
            return Err(CommerceError::EmptyCart);
        }

        let placed = self
            .store
            .place_order(CheckoutRequest {
                user_id: actor.subject_id,
                cart_id: cart.id,
                lines,
                shipping_address,
                payment_method,
                now,
            })
            .await?;

        // The order is committed at this point; a cart that fails to clear
        // must not turn it into an error.
        if let Err(err) = self.carts.clear(cart.id, Utc::now()).await {
            tracing::warn!(cart_id = %cart.id, error = %err, "failed to clear cart after checkout");
        }

        Ok(placed.order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::InMemoryNotifier;
    use common::{Money, ShopId, UserId};
    use domain::{CartItem, OrderStatus, Product};
    use store::{InMemoryStore, InventoryLedger};

    fn address() -> ShippingAddress {
        ShippingAddress {
            full_name: "Esi Mensah".to_string(),
            street: "5 Ring Road".to_string(),
            city: "Accra".to_string(),
            state: "Greater Accra".to_string(),
            zip_code: None,
            country: "Ghana".to_string(),
            phone: "0241234567".to_string(),
        }
    }

    async fn seeded(stock: u32, quantity: u32) -> (InMemoryStore, Product, UserId) {
        let store = InMemoryStore::new();
        let product = Product::new(
            ShopId::new(),
            "Woven basket",
            Money::from_cents(1500),
            stock,
            Utc::now(),
        )
        .unwrap();
        store.save_product(&product).await.unwrap();

        let user = UserId::new();
        let (cart, _) = store
            .resolve(CartOwner::User(user), Utc::now())
            .await
            .unwrap();
        store
            .upsert_item(&CartItem {
                cart_id: cart.id,
                product_id: product.id,
                quantity,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        (store, product, user)
    }

    fn service(store: &InMemoryStore) -> CheckoutService<InMemoryStore, InMemoryStore> {
        CheckoutService::new(
            store.clone(),
            Arc::new(store.clone()),
            Arc::new(InMemoryNotifier::new()),
        )
    }

    #[tokio::test]
    async fn anonymous_checkout_is_rejected() {
        let (store, _, _) = seeded(5, 1).await;
        let err = service(&store)
            .checkout(None, address(), PaymentMethod::Momo)
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::AuthenticationRequired));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn checkout_empties_the_cart() {
        let (store, product, user) = seeded(5, 2).await;
        let order = service(&store)
            .checkout(Some(&Actor::user(user)), address(), PaymentMethod::Momo)
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.total_amount, Money::from_cents(3000));
        let (cart, _) = store
            .resolve(CartOwner::User(user), Utc::now())
            .await
            .unwrap();
        assert!(store.items(cart.id).await.unwrap().is_empty());
        let product = store.product(product.id).await.unwrap().unwrap();
        assert_eq!(product.stock_quantity, 3);
    }

    #[tokio::test]
    async fn empty_cart_is_rejected() {
        let store = InMemoryStore::new();
        let err = service(&store)
            .checkout(
                Some(&Actor::user(UserId::new())),
                address(),
                PaymentMethod::Momo,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::EmptyCart));
    }

    #[tokio::test]
    async fn invalid_address_is_rejected_before_any_write() {
        let (store, product, user) = seeded(5, 2).await;
        let mut bad = address();
        bad.phone = "123".to_string();

        let err = service(&store)
            .checkout(Some(&Actor::user(user)), bad, PaymentMethod::Momo)
            .await
            .unwrap_err();

        assert!(matches!(err, CommerceError::InvalidInput(_)));
        assert_eq!(store.order_count().await, 0);
        let product = store.product(product.id).await.unwrap().unwrap();
        assert_eq!(product.stock_quantity, 5);
    }
}
