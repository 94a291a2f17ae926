use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartId, ProductId};
use domain::{Cart, CartItem, CartOwner};
use moka::{Expiry, future::Cache};

use crate::{Result, StoreError, store::CartStore};

/// Upper bound on live carts held in memory.
const MAX_CARTS: u64 = 100_000;

/// Entry expiry that restarts on every write and ignores reads.
struct SlidingOnWrite {
    idle: Duration,
}

impl<K, V> Expiry<K, V> for SlidingOnWrite {
    fn expire_after_create(&self, _key: &K, _value: &V, _created_at: Instant) -> Option<Duration> {
        Some(self.idle)
    }

    fn expire_after_update(
        &self,
        _key: &K,
        _value: &V,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(self.idle)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    cart: Cart,
    items: Vec<CartItem>,
}

/// Cart backing that keeps one entry per identity and drops it once it has
/// not been modified for the idle period.
///
/// Expired carts cannot be looked up any more; the cart service reports them
/// as empty. [`CartStore::sweep_stale`] has nothing to do here.
#[derive(Clone)]
pub struct ExpiringCartStore {
    carts: Cache<CartOwner, Entry>,
    owners: Cache<CartId, CartOwner>,
}

impl ExpiringCartStore {
    /// Creates a store whose carts expire after `idle` without modification.
    pub fn new(idle: Duration) -> Self {
        Self {
            carts: Cache::builder()
                .max_capacity(MAX_CARTS)
                .expire_after(SlidingOnWrite { idle })
                .build(),
            owners: Cache::builder()
                .max_capacity(MAX_CARTS)
                .expire_after(SlidingOnWrite { idle })
                .build(),
        }
    }

    async fn entry(&self, cart_id: CartId) -> Option<Entry> {
        let owner = self.owners.get(&cart_id).await?;
        self.carts.get(&owner).await
    }

    async fn write(&self, entry: Entry) {
        self.owners.insert(entry.cart.id, entry.cart.owner).await;
        self.carts.insert(entry.cart.owner, entry).await;
    }

    async fn modify(
        &self,
        cart_id: CartId,
        now: DateTime<Utc>,
        apply: impl FnOnce(&mut Vec<CartItem>) -> bool,
    ) -> Result<bool> {
        let Some(mut entry) = self.entry(cart_id).await else {
            return Err(StoreError::not_found("Cart", cart_id));
        };
        let changed = apply(&mut entry.items);
        if changed {
            entry.cart.updated_at = now;
            self.write(entry).await;
        }
        Ok(changed)
    }
}

impl Default for ExpiringCartStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(24 * 60 * 60))
    }
}

#[async_trait]
impl CartStore for ExpiringCartStore {
    async fn resolve(&self, owner: CartOwner, now: DateTime<Utc>) -> Result<(Cart, bool)> {
        if let Some(entry) = self.carts.get(&owner).await {
            return Ok((entry.cart, false));
        }
        let cart = Cart::new(owner, now);
        self.write(Entry {
            cart: cart.clone(),
            items: Vec::new(),
        })
        .await;
        Ok((cart, true))
    }

    async fn get_cart(&self, id: CartId) -> Result<Option<Cart>> {
        Ok(self.entry(id).await.map(|entry| entry.cart))
    }

    async fn items(&self, cart_id: CartId) -> Result<Vec<CartItem>> {
        Ok(self
            .entry(cart_id)
            .await
            .map(|entry| entry.items)
            .unwrap_or_default())
    }

    async fn item(&self, cart_id: CartId, product_id: ProductId) -> Result<Option<CartItem>> {
        Ok(self.entry(cart_id).await.and_then(|entry| {
            entry
                .items
                .into_iter()
                .find(|item| item.product_id == product_id)
        }))
    }

    async fn upsert_item(&self, item: &CartItem) -> Result<()> {
        let item = item.clone();
        let now = item.updated_at;
        self.modify(item.cart_id, now, move |items| {
            match items.iter_mut().find(|i| i.product_id == item.product_id) {
                Some(existing) => *existing = item,
                None => items.push(item),
            }
            true
        })
        .await?;
        Ok(())
    }

    async fn remove_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        match self
            .modify(cart_id, now, |items| {
                let before = items.len();
                items.retain(|item| item.product_id != product_id);
                items.len() != before
            })
            .await
        {
            Err(StoreError::NotFound { .. }) => Ok(false),
            other => other,
        }
    }

    async fn clear(&self, cart_id: CartId, now: DateTime<Utc>) -> Result<()> {
        match self
            .modify(cart_id, now, |items| {
                items.clear();
                true
            })
            .await
        {
            Err(StoreError::NotFound { .. }) | Ok(_) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn sweep_stale(&self, _cutoff: DateTime<Utc>) -> Result<u64> {
        Ok(0)
    }

    fn expires_idle_carts(&self) -> bool {
        true
    }
}
