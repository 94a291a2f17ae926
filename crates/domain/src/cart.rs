//! Carts: pending, pre-purchase selections.

use chrono::{DateTime, Utc};
use common::{CartId, Money, ProductId, SessionId, ShopId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::product::Product;

/// Who a cart belongs to. Exactly one identity owns a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum CartOwner {
    User(UserId),
    Session(SessionId),
}

/// A cart record. Items are stored separately, keyed by `(cart_id, product_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub id: CartId,
    pub owner: CartOwner,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Creates an empty cart for the given owner.
    pub fn new(owner: CartOwner, now: DateTime<Utc>) -> Self {
        Self {
            id: CartId::new(),
            owner,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self.owner {
            CartOwner::User(id) => Some(id),
            CartOwner::Session(_) => None,
        }
    }

    pub fn session_id(&self) -> Option<SessionId> {
        match self.owner {
            CartOwner::Session(id) => Some(id),
            CartOwner::User(_) => None,
        }
    }
}

/// One product selection in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub updated_at: DateTime<Utc>,
}

/// A cart item joined with live product data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: ProductId,
    pub shop_id: ShopId,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub stock_quantity: u32,
    /// False once the product was removed from the catalog.
    pub available: bool,
    pub subtotal: Money,
}

/// A live quote of a cart. Prices are current, not locked in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub cart_id: CartId,
    pub items: Vec<CartLine>,
    pub total_amount: Money,
}

impl CartView {
    pub fn empty(cart_id: CartId) -> Self {
        Self {
            cart_id,
            items: Vec::new(),
            total_amount: Money::zero(),
        }
    }

    /// Builds the quote from items and their current products.
    ///
    /// Items whose product no longer exists at all are skipped. Lines of
    /// removed products are listed but left out of the total, since checkout
    /// would refuse them.
    pub fn from_lines(
        cart_id: CartId,
        lines: impl IntoIterator<Item = (CartItem, Option<Product>)>,
    ) -> Result<Self, DomainError> {
        let items = lines
            .into_iter()
            .filter_map(|(item, product)| product.map(|product| (item, product)))
            .map(|(item, product)| -> Result<CartLine, DomainError> {
                Ok(CartLine {
                    product_id: product.id,
                    shop_id: product.shop_id,
                    subtotal: line_subtotal(&product, item.quantity)?,
                    available: product.is_listed(),
                    name: product.name,
                    unit_price: product.price,
                    quantity: item.quantity,
                    stock_quantity: product.stock_quantity,
                })
            })
            .collect::<Result<Vec<CartLine>, DomainError>>()?;
        let total_amount = Money::checked_sum(
            items
                .iter()
                .filter(|line| line.available)
                .map(|line| line.subtotal),
        )
        .ok_or_else(amount_too_large)?;

        Ok(Self {
            cart_id,
            items,
            total_amount,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, product_id: ProductId) -> Option<&CartLine> {
        self.items.iter().find(|line| line.product_id == product_id)
    }
}

/// Advisory stock check for a cart mutation that would leave `quantity`
/// units of `product` in the cart.
pub fn ensure_cart_quantity(product: &Product, quantity: u32) -> Result<(), DomainError> {
    if quantity == 0 {
        return Err(DomainError::InvalidInput(
            "quantity must be a positive integer".to_string(),
        ));
    }
    product.ensure_available(quantity)?;
    line_subtotal(product, quantity).map(|_| ())
}

fn line_subtotal(product: &Product, quantity: u32) -> Result<Money, DomainError> {
    product
        .price
        .checked_multiply(quantity)
        .ok_or_else(amount_too_large)
}

pub(crate) fn amount_too_large() -> DomainError {
    DomainError::InvalidInput("amount exceeds the supported range".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(price_cents: i64, stock: u32) -> Product {
        Product::new(
            ShopId::new(),
            "Item",
            Money::from_cents(price_cents),
            stock,
            Utc::now(),
        )
        .unwrap()
    }

    fn item(cart_id: CartId, product: &Product, quantity: u32) -> CartItem {
        CartItem {
            cart_id,
            product_id: product.id,
            quantity,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn owner_accessors_are_exclusive() {
        let user = Cart::new(CartOwner::User(UserId::new()), Utc::now());
        assert!(user.user_id().is_some());
        assert!(user.session_id().is_none());

        let session = Cart::new(CartOwner::Session(SessionId::new()), Utc::now());
        assert!(session.user_id().is_none());
        assert!(session.session_id().is_some());
    }

    #[test]
    fn quote_totals_live_prices() {
        let cart_id = CartId::new();
        let a = product(1000, 5);
        let b = product(500, 3);

        let view = CartView::from_lines(
            cart_id,
            vec![
                (item(cart_id, &a, 2), Some(a.clone())),
                (item(cart_id, &b, 1), Some(b.clone())),
            ],
        )
        .unwrap();

        assert_eq!(view.items.len(), 2);
        assert_eq!(view.total_amount, Money::from_cents(2500));
        assert_eq!(view.item(a.id).unwrap().subtotal, Money::from_cents(2000));
    }

    #[test]
    fn quote_flags_removed_products_and_skips_missing_ones() {
        let cart_id = CartId::new();
        let mut removed = product(700, 2);
        removed.remove(Utc::now());
        let gone = product(100, 1);
        let kept = product(300, 4);

        let view = CartView::from_lines(
            cart_id,
            vec![
                (item(cart_id, &removed, 1), Some(removed.clone())),
                (item(cart_id, &gone, 1), None),
                (item(cart_id, &kept, 2), Some(kept.clone())),
            ],
        )
        .unwrap();

        assert_eq!(view.items.len(), 2);
        let removed_line = view.item(removed.id).unwrap();
        assert!(!removed_line.available);
        assert_eq!(removed_line.subtotal, Money::from_cents(700));
        assert_eq!(view.total_amount, Money::from_cents(600));
    }

    #[test]
    fn quote_rejects_totals_beyond_money_range() {
        let cart_id = CartId::new();
        let pricey = product(crate::product::MAX_PRICE_CENTS, u32::MAX);
        let other = product(crate::product::MAX_PRICE_CENTS, u32::MAX);

        // Each line fits on its own; the sum does not.
        let quantity = 900_000_000;
        let err = CartView::from_lines(
            cart_id,
            vec![
                (item(cart_id, &pricey, quantity), Some(pricey.clone())),
                (item(cart_id, &other, quantity), Some(other.clone())),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }

    #[test]
    fn cart_quantity_must_be_positive_and_in_stock() {
        let p = product(1000, 5);
        assert!(ensure_cart_quantity(&p, 5).is_ok());
        assert!(matches!(
            ensure_cart_quantity(&p, 0),
            Err(DomainError::InvalidInput(_))
        ));
        assert!(matches!(
            ensure_cart_quantity(&p, 6),
            Err(DomainError::InsufficientStock { .. })
        ));
    }

    #[test]
    fn cart_quantity_rejects_overflowing_line_total() {
        let p = product(crate::product::MAX_PRICE_CENTS, u32::MAX);
        assert!(ensure_cart_quantity(&p, 900_000_000).is_ok());
        assert!(matches!(
            ensure_cart_quantity(&p, 1_000_000_000),
            Err(DomainError::InvalidInput(_))
        ));
    }
}
