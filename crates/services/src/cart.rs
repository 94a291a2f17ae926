//! Cart service: resolution, item mutations and live quotes.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{CartId, ProductId, SessionId, UserId};
use domain::{Cart, CartItem, CartOwner, CartView, ensure_cart_quantity};
use store::{CartStore, InventoryLedger};

use crate::error::{CommerceError, Result};

/// Outcome of [`CartService::resolve_cart`].
#[derive(Debug, Clone)]
pub struct ResolvedCart {
    pub cart: Cart,
    /// The anonymous session the cart is keyed by; `None` for user carts.
    pub session_id: Option<SessionId>,
    /// True when the cart was created by this call.
    pub is_new: bool,
}

/// Service for managing carts.
///
/// Stock checks made here are advisory. The authoritative re-check happens
/// inside the checkout transaction.
pub struct CartService<C: ?Sized, I> {
    carts: Arc<C>,
    inventory: I,
}

impl<C, I> CartService<C, I>
where
    C: CartStore + ?Sized,
    I: InventoryLedger,
{
    /// Creates a new cart service.
    pub fn new(carts: Arc<C>, inventory: I) -> Self {
        Self { carts, inventory }
    }

    /// Returns the underlying cart store.
    pub fn store(&self) -> &Arc<C> {
        &self.carts
    }

    /// Finds or creates the cart for an identity.
    ///
    /// A user id wins over a session id; the two carts are never merged.
    /// Without either, a new session id is minted.
    #[tracing::instrument(skip(self))]
    pub async fn resolve_cart(
        &self,
        user_id: Option<UserId>,
        session_id: Option<SessionId>,
    ) -> Result<ResolvedCart> {
        let owner = match (user_id, session_id) {
            (Some(user_id), _) => CartOwner::User(user_id),
            (None, Some(session_id)) => CartOwner::Session(session_id),
            (None, None) => CartOwner::Session(SessionId::new()),
        };

        let (cart, is_new) = self.carts.resolve(owner, Utc::now()).await?;
        if is_new {
            tracing::debug!(cart_id = %cart.id, "cart created");
        }
        Ok(ResolvedCart {
            session_id: cart.session_id(),
            cart,
            is_new,
        })
    }

    /// Adds `quantity` units of a product, accumulating onto any existing
    /// line for that product.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartView> {
        if quantity == 0 {
            return Err(CommerceError::InvalidInput(
                "quantity must be a positive integer".to_string(),
            ));
        }
        self.require_cart(cart_id).await?;
        let product = self
            .inventory
            .product(product_id)
            .await?
            .ok_or_else(|| CommerceError::not_found("Product", product_id))?;

        let existing = self
            .carts
            .item(cart_id, product_id)
            .await?
            .map(|item| item.quantity)
            .unwrap_or(0);
        let total = existing.checked_add(quantity).ok_or_else(|| {
            CommerceError::InvalidInput("quantity is too large".to_string())
        })?;
        ensure_cart_quantity(&product, total)?;

        self.carts
            .upsert_item(&CartItem {
                cart_id,
                product_id,
                quantity: total,
                updated_at: Utc::now(),
            })
            .await?;
        self.read_cart(cart_id).await
    }

    /// Overwrites the quantity of an existing line.
    #[tracing::instrument(skip(self))]
    pub async fn update_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartView> {
        if quantity == 0 {
            return Err(CommerceError::InvalidInput(
                "quantity must be a positive integer".to_string(),
            ));
        }
        self.carts
            .item(cart_id, product_id)
            .await?
            .ok_or_else(|| CommerceError::not_found("Cart item", product_id))?;
        let product = self
            .inventory
            .product(product_id)
            .await?
            .ok_or_else(|| CommerceError::not_found("Product", product_id))?;
        ensure_cart_quantity(&product, quantity)?;

        self.carts
            .upsert_item(&CartItem {
                cart_id,
                product_id,
                quantity,
                updated_at: Utc::now(),
            })
            .await?;
        self.read_cart(cart_id).await
    }

    /// Removes a line from the cart.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, cart_id: CartId, product_id: ProductId) -> Result<CartView> {
        if !self
            .carts
            .remove_item(cart_id, product_id, Utc::now())
            .await?
        {
            return Err(CommerceError::not_found("Cart item", product_id));
        }
        self.read_cart(cart_id).await
    }

    /// Quotes the cart at current product prices.
    #[tracing::instrument(skip(self))]
    pub async fn read_cart(&self, cart_id: CartId) -> Result<CartView> {
        if self.carts.get_cart(cart_id).await?.is_none() {
            if self.carts.expires_idle_carts() {
                return Ok(CartView::empty(cart_id));
            }
            return Err(CommerceError::not_found("Cart", cart_id));
        }

        let items = self.carts.items(cart_id).await?;
        if items.is_empty() {
            return Ok(CartView::empty(cart_id));
        }
        let ids: Vec<ProductId> = items.iter().map(|item| item.product_id).collect();
        let mut products: HashMap<ProductId, _> = self
            .inventory
            .products(&ids)
            .await?
            .into_iter()
            .map(|product| (product.id, product))
            .collect();

        Ok(CartView::from_lines(
            cart_id,
            items.into_iter().map(|item| {
                let product = products.remove(&item.product_id);
                (item, product)
            }),
        )?)
    }

    /// Deletes every line of the cart.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, cart_id: CartId) -> Result<()> {
        self.carts.clear(cart_id, Utc::now()).await?;
        Ok(())
    }

    /// Deletes carts not modified within `max_age_days`.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_stale(&self, max_age_days: u32) -> Result<u64> {
        let Some(cutoff) = Duration::try_days(i64::from(max_age_days))
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            tracing::warn!(max_age_days, "retention reaches past the calendar, nothing swept");
            return Ok(0);
        };
        let swept = self.carts.sweep_stale(cutoff).await?;
        metrics::counter!("carts_swept_total").increment(swept);
        tracing::info!(swept, max_age_days, "stale carts swept");
        Ok(swept)
    }

    async fn require_cart(&self, cart_id: CartId) -> Result<Cart> {
        self.carts
            .get_cart(cart_id)
            .await?
            .ok_or_else(|| CommerceError::not_found("Cart", cart_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Money, ShopId};
    use domain::Product;
    use store::InMemoryStore;

    async fn setup(stock: u32) -> (CartService<InMemoryStore, InMemoryStore>, Product) {
        let store = InMemoryStore::new();
        let product = Product::new(
            ShopId::new(),
            "Kente scarf",
            Money::from_cents(1000),
            stock,
            Utc::now(),
        )
        .unwrap();
        store.save_product(&product).await.unwrap();
        (CartService::new(Arc::new(store.clone()), store), product)
    }

    #[tokio::test]
    async fn anonymous_resolution_mints_a_session() {
        let (service, _) = setup(1).await;

        let first = service.resolve_cart(None, None).await.unwrap();
        assert!(first.is_new);
        let session = first.session_id.unwrap();

        let again = service.resolve_cart(None, Some(session)).await.unwrap();
        assert!(!again.is_new);
        assert_eq!(again.cart.id, first.cart.id);
    }

    #[tokio::test]
    async fn user_and_session_carts_stay_separate() {
        let (service, _) = setup(1).await;
        let anonymous = service.resolve_cart(None, None).await.unwrap();
        let user = service
            .resolve_cart(Some(UserId::new()), anonymous.session_id)
            .await
            .unwrap();

        assert_ne!(user.cart.id, anonymous.cart.id);
        assert!(user.session_id.is_none());
    }

    #[tokio::test]
    async fn add_checks_accumulated_quantity_against_stock() {
        let (service, product) = setup(3).await;
        let cart = service.resolve_cart(None, None).await.unwrap().cart;

        service.add_item(cart.id, product.id, 2).await.unwrap();
        let err = service.add_item(cart.id, product.id, 2).await.unwrap_err();

        assert!(matches!(
            err,
            CommerceError::InsufficientStock {
                requested: 4,
                available: 3,
                ..
            }
        ));
        let view = service.read_cart(cart.id).await.unwrap();
        assert_eq!(view.item(product.id).unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn unknown_or_removed_products_are_not_found() {
        let (service, product) = setup(3).await;
        let cart = service.resolve_cart(None, None).await.unwrap().cart;

        assert!(matches!(
            service.add_item(cart.id, ProductId::new(), 1).await,
            Err(CommerceError::NotFound { .. })
        ));

        service
            .inventory
            .remove_product(product.id, Utc::now())
            .await
            .unwrap();
        assert!(matches!(
            service.add_item(cart.id, product.id, 1).await,
            Err(CommerceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn update_and_remove_require_existing_line() {
        let (service, product) = setup(3).await;
        let cart = service.resolve_cart(None, None).await.unwrap().cart;

        assert!(matches!(
            service.update_item(cart.id, product.id, 1).await,
            Err(CommerceError::NotFound { .. })
        ));
        assert!(matches!(
            service.remove_item(cart.id, product.id).await,
            Err(CommerceError::NotFound { .. })
        ));
        assert!(matches!(
            service.add_item(cart.id, product.id, 0).await,
            Err(CommerceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn remove_and_clear_empty_the_quote() {
        let (service, product) = setup(3).await;
        let cart = service.resolve_cart(None, None).await.unwrap().cart;
        service.add_item(cart.id, product.id, 1).await.unwrap();

        let view = service.remove_item(cart.id, product.id).await.unwrap();
        assert!(view.is_empty());

        service.add_item(cart.id, product.id, 2).await.unwrap();
        service.clear(cart.id).await.unwrap();
        let view = service.read_cart(cart.id).await.unwrap();
        assert!(view.is_empty());
        assert_eq!(view.total_amount, Money::zero());
    }

    #[tokio::test]
    async fn line_total_beyond_money_range_is_rejected() {
        let store = InMemoryStore::new();
        let yacht = Product::new(
            ShopId::new(),
            "Yacht",
            Money::from_cents(domain::MAX_PRICE_CENTS),
            u32::MAX,
            Utc::now(),
        )
        .unwrap();
        store.save_product(&yacht).await.unwrap();
        let service = CartService::new(Arc::new(store.clone()), store);
        let cart = service.resolve_cart(None, None).await.unwrap().cart;

        let err = service
            .add_item(cart.id, yacht.id, 1_000_000_000)
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::InvalidInput(_)));
        assert!(service.read_cart(cart.id).await.unwrap().is_empty());

        let view = service
            .add_item(cart.id, yacht.id, 900_000_000)
            .await
            .unwrap();
        assert_eq!(view.total_amount, Money::from_cents(9_000_000_000_000_000_000));
    }

    #[tokio::test]
    async fn removed_products_do_not_count_toward_the_quote() {
        let (service, product) = setup(3).await;
        let cart = service.resolve_cart(None, None).await.unwrap().cart;
        service.add_item(cart.id, product.id, 2).await.unwrap();

        service
            .inventory
            .remove_product(product.id, Utc::now())
            .await
            .unwrap();
        let view = service.read_cart(cart.id).await.unwrap();
        assert!(!view.item(product.id).unwrap().available);
        assert_eq!(view.total_amount, Money::zero());
    }

    #[tokio::test]
    async fn sweep_with_retention_past_the_calendar_is_a_no_op() {
        let (service, product) = setup(3).await;
        let cart = service.resolve_cart(None, None).await.unwrap().cart;
        service.add_item(cart.id, product.id, 1).await.unwrap();

        assert_eq!(service.sweep_stale(u32::MAX).await.unwrap(), 0);
        assert_eq!(service.read_cart(cart.id).await.unwrap().items.len(), 1);
    }

    #[tokio::test]
    async fn durable_backing_reports_unknown_cart() {
        let (service, _) = setup(1).await;
        assert!(matches!(
            service.read_cart(CartId::new()).await,
            Err(CommerceError::NotFound { .. })
        ));
    }
}
