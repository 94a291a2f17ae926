//! Product catalog management.

use chrono::Utc;
use common::{Money, ProductId, ShopId};
use domain::{Actor, Product, Role};
use store::InventoryLedger;

use crate::error::{CommerceError, Result};

/// Input for [`CatalogService::create`].
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub price: Money,
    pub stock_quantity: u32,
    /// Required when an admin lists on behalf of a shop; a shop actor may
    /// omit it.
    pub shop_id: Option<ShopId>,
}

/// Service for listing, creating and retiring products.
pub struct CatalogService<I> {
    inventory: I,
}

impl<I: InventoryLedger> CatalogService<I> {
    /// Creates a new catalog service.
    pub fn new(inventory: I) -> Self {
        Self { inventory }
    }

    /// Lists every product that was not removed.
    #[tracing::instrument(skip(self))]
    pub async fn catalog(&self) -> Result<Vec<Product>> {
        Ok(self.inventory.catalog().await?)
    }

    /// Reads a listed product. Removed products are not found.
    #[tracing::instrument(skip(self))]
    pub async fn product(&self, product_id: ProductId) -> Result<Product> {
        self.inventory
            .product(product_id)
            .await?
            .filter(Product::is_listed)
            .ok_or_else(|| CommerceError::not_found("Product", product_id))
    }

    /// Lists a new product for the actor's shop.
    #[tracing::instrument(skip(self, input), fields(actor = %actor.subject_id))]
    pub async fn create(&self, actor: &Actor, input: NewProduct) -> Result<Product> {
        let shop_id = match actor.role {
            Role::Admin => input.shop_id.ok_or_else(|| {
                CommerceError::InvalidInput("shopId is required".to_string())
            })?,
            _ => {
                let own = actor.selling_shop()?;
                if input.shop_id.is_some_and(|requested| requested != own) {
                    return Err(CommerceError::Forbidden(
                        "cannot list products for another shop".to_string(),
                    ));
                }
                own
            }
        };

        let product = Product::new(
            shop_id,
            input.name,
            input.price,
            input.stock_quantity,
            Utc::now(),
        )?;
        self.inventory.save_product(&product).await?;
        tracing::info!(product_id = %product.id, %shop_id, "product listed");
        Ok(product)
    }

    /// Adds units to a product's stock.
    #[tracing::instrument(skip(self), fields(actor = %actor.subject_id))]
    pub async fn restock(
        &self,
        actor: &Actor,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Product> {
        if quantity == 0 {
            return Err(CommerceError::InvalidInput(
                "quantity must be a positive integer".to_string(),
            ));
        }
        let product = self.product(product_id).await?;
        actor.ensure_manages_shop(product.shop_id)?;
        Ok(self
            .inventory
            .restock(product_id, quantity, Utc::now())
            .await?)
    }

    /// Soft-deletes a product. It stays resolvable for past orders.
    #[tracing::instrument(skip(self), fields(actor = %actor.subject_id))]
    pub async fn remove(&self, actor: &Actor, product_id: ProductId) -> Result<Product> {
        let product = self.product(product_id).await?;
        actor.ensure_manages_shop(product.shop_id)?;
        let removed = self
            .inventory
            .remove_product(product_id, Utc::now())
            .await?;
        tracing::info!(%product_id, "product removed");
        Ok(removed)
    }
}
