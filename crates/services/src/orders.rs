//! Order reads and fulfillment transitions.

use std::sync::Arc;

use chrono::Utc;
use common::{OrderId, OrderItemId};
use domain::{
    Actor, HistoryEntry, ItemStatusUpdate, Order, OrderChange, OrderItem, OrderScope, Payment,
    ShipmentDetails,
};
use store::OrderStore;

use crate::error::{CommerceError, Result};
use crate::notifier::{NotificationKind, Notifier, dispatch};

/// Service for reading orders and moving them through fulfillment.
///
/// Every transition is computed on a loaded snapshot and written back with
/// the snapshot's version, so a concurrent writer makes the later one fail
/// without side effects.
pub struct OrderService<S> {
    store: S,
    notifier: Arc<dyn Notifier>,
}

impl<S: OrderStore> OrderService<S> {
    /// Creates a new order service.
    pub fn new(store: S, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Lists the orders visible to `actor`, newest first.
    ///
    /// Shops receive only their own line items.
    #[tracing::instrument(skip(self), fields(actor = %actor.subject_id))]
    pub async fn list(&self, actor: &Actor) -> Result<Vec<Order>> {
        let scope = OrderScope::for_actor(actor)?;
        let orders = self.store.list_orders(scope).await?;
        Ok(orders
            .into_iter()
            .filter_map(|order| scope.project(order))
            .collect())
    }

    /// Reads one order through the actor's scope.
    #[tracing::instrument(skip(self), fields(actor = %actor.subject_id))]
    pub async fn get(&self, actor: &Actor, order_id: OrderId) -> Result<Order> {
        let order = self.load(order_id).await?;
        Ok(OrderScope::for_actor(actor)?.authorize_read(order)?)
    }

    /// Returns the payment record of a visible order.
    #[tracing::instrument(skip(self), fields(actor = %actor.subject_id))]
    pub async fn payment(&self, actor: &Actor, order_id: OrderId) -> Result<Payment> {
        self.get(actor, order_id).await?;
        self.store
            .payment_for_order(order_id)
            .await?
            .ok_or_else(|| CommerceError::not_found("Payment", order_id))
    }

    /// Returns the history of a visible order, oldest first.
    ///
    /// A shop sees order-level entries and entries about its own items.
    #[tracing::instrument(skip(self), fields(actor = %actor.subject_id))]
    pub async fn history(&self, actor: &Actor, order_id: OrderId) -> Result<Vec<HistoryEntry>> {
        let visible = self.get(actor, order_id).await?;
        let entries = self.store.history(order_id).await?;
        if !matches!(OrderScope::for_actor(actor)?, OrderScope::Shop(_)) {
            return Ok(entries);
        }
        Ok(entries
            .into_iter()
            .filter(|entry| match entry.order_item_id {
                None => true,
                Some(item_id) => visible.item(item_id).is_some(),
            })
            .collect())
    }

    /// Ships every line of an order.
    #[tracing::instrument(skip(self), fields(actor = %actor.subject_id))]
    pub async fn ship(
        &self,
        actor: &Actor,
        order_id: OrderId,
        details: ShipmentDetails,
    ) -> Result<Order> {
        let order = self.load(order_id).await?;
        let change = order.ship(actor, details, Utc::now())?;
        self.commit(change, Some(NotificationKind::OrderShipped))
            .await
    }

    /// Marks a shipped order delivered.
    #[tracing::instrument(skip(self), fields(actor = %actor.subject_id))]
    pub async fn deliver(&self, actor: &Actor, order_id: OrderId) -> Result<Order> {
        let order = self.load(order_id).await?;
        let change = order.deliver(actor, Utc::now())?;
        self.commit(change, Some(NotificationKind::OrderDelivered))
            .await
    }

    /// Cancels an order and puts its pending units back into stock.
    #[tracing::instrument(skip(self), fields(actor = %actor.subject_id))]
    pub async fn cancel(&self, actor: &Actor, order_id: OrderId, reason: &str) -> Result<Order> {
        let order = self.load(order_id).await?;
        let change = order.cancel(actor, reason, Utc::now())?;
        let restocked: u32 = change.restock.iter().map(|adj| adj.quantity).sum();
        let order = self
            .commit(change, Some(NotificationKind::OrderCancelled))
            .await?;
        tracing::info!(order_id = %order.id, restocked, "order cancelled");
        Ok(order)
    }

    /// Moves one line item and re-derives the order status.
    #[tracing::instrument(skip(self, update), fields(actor = %actor.subject_id, status = %update.status))]
    pub async fn update_item_status(
        &self,
        actor: &Actor,
        item_id: OrderItemId,
        update: ItemStatusUpdate,
    ) -> Result<OrderItem> {
        let order = self
            .store
            .find_order_by_item(item_id)
            .await?
            .ok_or_else(|| CommerceError::not_found("Order item", item_id))?;
        let change = order.update_item_status(actor, item_id, update, Utc::now())?;
        let order = self.commit(change, None).await?;
        order
            .item(item_id)
            .cloned()
            .ok_or_else(|| CommerceError::not_found("Order item", item_id))
    }

    /// Purges an order with its items, payment and history. Admin only.
    ///
    /// Stock is left as is.
    #[tracing::instrument(skip(self), fields(actor = %actor.subject_id))]
    pub async fn delete(&self, actor: &Actor, order_id: OrderId) -> Result<()> {
        if !actor.is_admin() {
            return Err(CommerceError::Forbidden(
                "only an admin may delete orders".to_string(),
            ));
        }
        if !self.store.delete_order(order_id).await? {
            return Err(CommerceError::not_found("Order", order_id));
        }
        tracing::info!(%order_id, "order deleted");
        Ok(())
    }

    async fn load(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| CommerceError::not_found("Order", order_id))
    }

    async fn commit(&self, change: OrderChange, notify: Option<NotificationKind>) -> Result<Order> {
        self.store.apply_change(&change).await?;
        metrics::counter!("order_transitions_total", "action" => change.action.as_str())
            .increment(1);
        tracing::info!(
            order_id = %change.order.id,
            action = change.action.as_str(),
            status = %change.order.status,
            version = change.order.version,
            "order transition committed"
        );

        if let Some(kind) = notify {
            dispatch(Arc::clone(&self.notifier), kind, change.order.clone());
        }
        Ok(change.order)
    }
}
