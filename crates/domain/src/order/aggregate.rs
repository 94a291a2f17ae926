//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, OrderItemId, ProductId, ShopId, UserId};
use serde::{Deserialize, Serialize};

use super::state::{FulfillmentStatus, OrderStatus, derive_order_status};
use super::value_objects::{
    HistoryEntry, ItemStatusUpdate, ShipmentDetails, ShippingAddress, StockAdjustment,
};
use crate::access::Actor;
use crate::error::DomainError;

/// One line of a placed order. Price is a snapshot taken at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub shop_id: ShopId,
    pub quantity: u32,
    pub unit_price: Money,
    pub status: FulfillmentStatus,
    pub tracking_number: Option<String>,
    pub carrier_name: Option<String>,
    pub notes: Option<String>,
    pub status_updated_at: Option<DateTime<Utc>>,
    pub status_updated_by: Option<UserId>,
}

impl OrderItem {
    /// Returns the total price for this line (quantity * unit_price).
    pub fn subtotal(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// Order aggregate root.
///
/// The item set is fixed at checkout; afterwards only statuses and
/// fulfillment metadata change. `version` increments on every persisted
/// change and guards against concurrent transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub total_amount: Money,
    pub status: OrderStatus,
    pub shipping_address: ShippingAddress,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

/// Which fulfillment action produced an [`OrderChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderAction {
    Ship,
    Deliver,
    Cancel,
    UpdateItem,
}

impl OrderAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderAction::Ship => "ship",
            OrderAction::Deliver => "deliver",
            OrderAction::Cancel => "cancel",
            OrderAction::UpdateItem => "update_item",
        }
    }
}

/// Everything one transition writes, to be persisted atomically.
#[derive(Debug, Clone)]
pub struct OrderChange {
    pub action: OrderAction,
    /// The order as it must look after the change, with `version` bumped.
    pub order: Order,
    /// Version the stored order must still have for the change to apply.
    pub expected_version: i64,
    pub history: Vec<HistoryEntry>,
    /// Stock to put back in the same transaction.
    pub restock: Vec<StockAdjustment>,
}

// Query methods
impl Order {
    /// Returns an item by id.
    pub fn item(&self, item_id: OrderItemId) -> Option<&OrderItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    /// Returns true if any line of this order is sold by `shop_id`.
    pub fn involves_shop(&self, shop_id: ShopId) -> bool {
        self.items.iter().any(|item| item.shop_id == shop_id)
    }

    /// Returns the total quantity of all items.
    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    /// Returns true if the order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// Command methods (return the change to persist)
impl Order {
    /// Ships the whole order.
    pub fn ship(
        &self,
        actor: &Actor,
        details: ShipmentDetails,
        now: DateTime<Utc>,
    ) -> Result<OrderChange, DomainError> {
        self.ensure_sells_every_item(actor, "ship")?;
        if !self.status.can_ship() {
            return Err(self.invalid_transition("ship"));
        }

        let mut next = self.clone();
        next.status = OrderStatus::Shipped;
        next.shipped_at = Some(now);
        next.tracking_number = details.tracking_number.clone().or(next.tracking_number);
        next.carrier = details.carrier.clone().or(next.carrier);
        for item in next
            .items
            .iter_mut()
            .filter(|item| item.status == FulfillmentStatus::Pending)
        {
            item.status = FulfillmentStatus::Shipped;
            item.tracking_number = details.tracking_number.clone().or(item.tracking_number.take());
            item.carrier_name = details.carrier.clone().or(item.carrier_name.take());
            item.status_updated_at = Some(now);
            item.status_updated_by = Some(actor.subject_id);
        }

        let note = match (&details.tracking_number, &details.carrier) {
            (Some(tracking), Some(carrier)) => {
                format!("Order shipped via {carrier}, tracking {tracking}")
            }
            (Some(tracking), None) => format!("Order shipped, tracking {tracking}"),
            _ => "Order shipped".to_string(),
        };
        Ok(self.change(OrderAction::Ship, next, actor, note, Vec::new(), now))
    }

    /// Marks a shipped order as delivered.
    pub fn deliver(&self, actor: &Actor, now: DateTime<Utc>) -> Result<OrderChange, DomainError> {
        self.ensure_sells_every_item(actor, "deliver")?;
        if !self.status.can_deliver() {
            return Err(self.invalid_transition("deliver"));
        }

        let mut next = self.clone();
        next.status = OrderStatus::Delivered;
        next.delivered_at = Some(now);
        for item in next
            .items
            .iter_mut()
            .filter(|item| item.status == FulfillmentStatus::Shipped)
        {
            item.status = FulfillmentStatus::Delivered;
            item.status_updated_at = Some(now);
            item.status_updated_by = Some(actor.subject_id);
        }

        Ok(self.change(
            OrderAction::Deliver,
            next,
            actor,
            "Order delivered".to_string(),
            Vec::new(),
            now,
        ))
    }

    /// Cancels an order that has not started shipping and puts its stock back.
    ///
    /// Allowed for the shop selling every item, or for an admin.
    pub fn cancel(
        &self,
        actor: &Actor,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<OrderChange, DomainError> {
        if !actor.is_admin() {
            self.ensure_sells_every_item(actor, "cancel")?;
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DomainError::InvalidInput(
                "cancellation reason is required".to_string(),
            ));
        }
        let untouched = self.items.iter().all(|item| {
            matches!(
                item.status,
                FulfillmentStatus::Pending | FulfillmentStatus::Cancelled
            )
        });
        if !self.status.can_cancel() || !untouched {
            return Err(self.invalid_transition("cancel"));
        }

        let mut next = self.clone();
        next.status = OrderStatus::Cancelled;
        next.cancelled_at = Some(now);
        next.cancellation_reason = Some(reason.to_string());

        let mut restock = Vec::new();
        for item in next
            .items
            .iter_mut()
            .filter(|item| item.status == FulfillmentStatus::Pending)
        {
            item.status = FulfillmentStatus::Cancelled;
            item.status_updated_at = Some(now);
            item.status_updated_by = Some(actor.subject_id);
            restock.push(StockAdjustment {
                product_id: item.product_id,
                quantity: item.quantity,
            });
        }

        Ok(self.change(
            OrderAction::Cancel,
            next,
            actor,
            format!("Order cancelled: {reason}"),
            restock,
            now,
        ))
    }

    /// Moves a single line item, then re-derives the order status from all
    /// sibling items.
    pub fn update_item_status(
        &self,
        actor: &Actor,
        item_id: OrderItemId,
        update: ItemStatusUpdate,
        now: DateTime<Utc>,
    ) -> Result<OrderChange, DomainError> {
        let current = self
            .item(item_id)
            .ok_or_else(|| DomainError::not_found("Order item", item_id))?;
        if actor.selling_shop()? != current.shop_id {
            return Err(DomainError::Forbidden(
                "order item belongs to another shop".to_string(),
            ));
        }
        if !current.status.can_transition_to(update.status) {
            return Err(DomainError::InvalidStateTransition {
                current: current.status.as_str(),
                action: transition_action(update.status),
            });
        }

        let mut next = self.clone();
        let mut restock = Vec::new();
        if let Some(item) = next.items.iter_mut().find(|item| item.id == item_id) {
            if update.status == FulfillmentStatus::Cancelled
                && item.status != FulfillmentStatus::Cancelled
            {
                restock.push(StockAdjustment {
                    product_id: item.product_id,
                    quantity: item.quantity,
                });
            }
            item.status = update.status;
            if update.tracking_number.is_some() {
                item.tracking_number = update.tracking_number.clone();
            }
            if update.carrier_name.is_some() {
                item.carrier_name = update.carrier_name.clone();
            }
            if update.notes.is_some() {
                item.notes = update.notes.clone();
            }
            item.status_updated_at = Some(now);
            item.status_updated_by = Some(actor.subject_id);
        }

        next.status = derive_order_status(next.status, next.items.iter().map(|i| i.status));
        next.version = self.version + 1;
        next.updated_at = now;

        let mut history = vec![HistoryEntry::new(
            self.id,
            Some(item_id),
            update.status.as_str(),
            update
                .notes
                .clone()
                .unwrap_or_else(|| format!("Item marked {}", update.status)),
            Some(actor.subject_id),
            now,
        )];
        if next.status != self.status {
            history.push(HistoryEntry::new(
                self.id,
                None,
                next.status.as_str(),
                "All items delivered or cancelled",
                Some(actor.subject_id),
                now,
            ));
        }

        Ok(OrderChange {
            action: OrderAction::UpdateItem,
            order: next,
            expected_version: self.version,
            history,
            restock,
        })
    }

    fn ensure_sells_every_item(
        &self,
        actor: &Actor,
        action: &'static str,
    ) -> Result<(), DomainError> {
        let shop_id = actor.selling_shop()?;
        if self.items.iter().any(|item| item.shop_id != shop_id) {
            return Err(DomainError::Forbidden(format!(
                "cannot {action} an order containing items of another shop"
            )));
        }
        Ok(())
    }

    fn invalid_transition(&self, action: &'static str) -> DomainError {
        DomainError::InvalidStateTransition {
            current: self.status.as_str(),
            action,
        }
    }

    fn change(
        &self,
        action: OrderAction,
        mut next: Order,
        actor: &Actor,
        note: String,
        restock: Vec<StockAdjustment>,
        now: DateTime<Utc>,
    ) -> OrderChange {
        next.version = self.version + 1;
        next.updated_at = now;
        let history = vec![HistoryEntry::new(
            self.id,
            None,
            next.status.as_str(),
            note,
            Some(actor.subject_id),
            now,
        )];
        OrderChange {
            action,
            order: next,
            expected_version: self.version,
            history,
            restock,
        }
    }
}

fn transition_action(target: FulfillmentStatus) -> &'static str {
    match target {
        FulfillmentStatus::Pending => "reset item to pending",
        FulfillmentStatus::Shipped => "ship item",
        FulfillmentStatus::Delivered => "deliver item",
        FulfillmentStatus::Cancelled => "cancel item",
    }
}
