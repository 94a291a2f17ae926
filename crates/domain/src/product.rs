//! Products and their stock lifecycle.

use chrono::{DateTime, Utc};
use common::{Money, ProductId, ShopId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Highest unit price a product may be listed at (100,000,000.00).
pub const MAX_PRICE_CENTS: i64 = 10_000_000_000;

/// Catalog visibility of a product.
///
/// ```text
/// Active ◄──► OutOfStock      (driven by stock reaching / leaving zero)
///    │            │
///    └─────┬──────┘
///          ▼
///       Removed               (soft delete, sticky)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductLifecycle {
    #[default]
    Active,
    OutOfStock,
    Removed,
}

impl ProductLifecycle {
    /// Returns the lifecycle name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductLifecycle::Active => "ACTIVE",
            ProductLifecycle::OutOfStock => "OUT_OF_STOCK",
            ProductLifecycle::Removed => "REMOVED",
        }
    }

    /// Lifecycle implied by a stock level. `Removed` never changes.
    fn for_stock(self, stock_quantity: u32) -> Self {
        match self {
            ProductLifecycle::Removed => ProductLifecycle::Removed,
            _ if stock_quantity == 0 => ProductLifecycle::OutOfStock,
            _ => ProductLifecycle::Active,
        }
    }
}

impl std::fmt::Display for ProductLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProductLifecycle {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(ProductLifecycle::Active),
            "OUT_OF_STOCK" => Ok(ProductLifecycle::OutOfStock),
            "REMOVED" => Ok(ProductLifecycle::Removed),
            other => Err(DomainError::InvalidInput(format!(
                "unknown product lifecycle: {other}"
            ))),
        }
    }
}

/// A product as tracked by the inventory ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub shop_id: ShopId,
    pub name: String,
    pub price: Money,
    pub stock_quantity: u32,
    pub lifecycle: ProductLifecycle,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Creates a new product listing for a shop.
    pub fn new(
        shop_id: ShopId,
        name: impl Into<String>,
        price: Money,
        stock_quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::InvalidInput(
                "product name is required".to_string(),
            ));
        }
        if !price.is_positive() {
            return Err(DomainError::InvalidInput(format!(
                "price must be greater than 0, got {}",
                price.cents()
            )));
        }
        if price.cents() > MAX_PRICE_CENTS {
            return Err(DomainError::InvalidInput(format!(
                "price must be at most {MAX_PRICE_CENTS} cents, got {}",
                price.cents()
            )));
        }

        Ok(Self {
            id: ProductId::new(),
            shop_id,
            name,
            price,
            stock_quantity,
            lifecycle: ProductLifecycle::Active.for_stock(stock_quantity),
            created_at: now,
            updated_at: now,
        })
    }

    /// Returns true unless the product was soft-deleted.
    pub fn is_listed(&self) -> bool {
        self.lifecycle != ProductLifecycle::Removed
    }

    /// Checks that `requested` units could be bought right now.
    ///
    /// Removed products are reported as not found.
    pub fn ensure_available(&self, requested: u32) -> Result<(), DomainError> {
        if !self.is_listed() {
            return Err(DomainError::not_found("Product", self.id));
        }
        if requested > self.stock_quantity {
            return Err(DomainError::InsufficientStock {
                product_id: self.id,
                requested,
                available: self.stock_quantity,
            });
        }
        Ok(())
    }

    /// Takes `quantity` units out of stock.
    pub fn withdraw(&mut self, quantity: u32, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_available(quantity)?;
        self.stock_quantity -= quantity;
        self.lifecycle = self.lifecycle.for_stock(self.stock_quantity);
        self.updated_at = now;
        Ok(())
    }

    /// Puts `quantity` units back into stock.
    ///
    /// Restocking a removed product still counts the units; it stays removed.
    pub fn restock(&mut self, quantity: u32, now: DateTime<Utc>) {
        self.stock_quantity = self.stock_quantity.saturating_add(quantity);
        self.lifecycle = self.lifecycle.for_stock(self.stock_quantity);
        self.updated_at = now;
    }

    /// Soft-deletes the product.
    pub fn remove(&mut self, now: DateTime<Utc>) {
        self.lifecycle = ProductLifecycle::Removed;
        self.updated_at = now;
    }
}
