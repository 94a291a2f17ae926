//! Background removal of abandoned carts.

use std::sync::Arc;
use std::time::Duration;

use store::{CartStore, InventoryLedger};
use tokio::task::JoinHandle;

use crate::cart::CartService;

/// Starts a task that deletes carts idle for more than `retention_days`,
/// once per `interval`. The first pass runs immediately.
///
/// The task runs until the returned handle is aborted.
pub fn spawn_cart_sweeper<C, I>(
    service: Arc<CartService<C, I>>,
    retention_days: u32,
    interval: Duration,
) -> JoinHandle<()>
where
    C: CartStore + ?Sized + 'static,
    I: InventoryLedger + 'static,
{
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(retention_days, interval_secs = interval.as_secs(), "cart sweeper started");
        loop {
            timer.tick().await;
            if let Err(err) = service.sweep_stale(retention_days).await {
                tracing::error!(error = %err, "cart sweep failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{SessionId, UserId};
    use domain::CartOwner;
    use store::InMemoryStore;

    #[tokio::test]
    async fn sweeper_removes_stale_carts_only() {
        let store = InMemoryStore::new();
        store
            .resolve(
                CartOwner::User(UserId::new()),
                Utc::now() - chrono::Duration::days(30),
            )
            .await
            .unwrap();
        store
            .resolve(CartOwner::Session(SessionId::new()), Utc::now())
            .await
            .unwrap();

        let service = Arc::new(CartService::new(Arc::new(store.clone()), store.clone()));
        let handle = spawn_cart_sweeper(service, 7, Duration::from_millis(20));

        for _ in 0..100 {
            if store.cart_count().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();

        assert_eq!(store.cart_count().await, 1);
    }
}
