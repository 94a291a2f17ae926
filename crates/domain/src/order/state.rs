//! Order and fulfillment state machines.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Order-level lifecycle.
///
/// State transitions:
/// ```text
/// Processing ──► Shipped ──► Delivered
///     │
///     └──► Cancelled
///
/// any non-terminal ──► Completed   (derived: every item Delivered or Cancelled)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order placed, stock reserved, awaiting shipment.
    #[default]
    Processing,

    /// Handed to a carrier.
    Shipped,

    /// Received by the customer (terminal state).
    Delivered,

    /// Cancelled before shipment, stock restored (terminal state).
    Cancelled,

    /// Every line item reached a terminal fulfillment status (terminal state).
    Completed,
}

impl OrderStatus {
    /// Returns true if the order can be shipped in this state.
    pub fn can_ship(&self) -> bool {
        matches!(self, OrderStatus::Processing)
    }

    /// Returns true if the order can be marked delivered in this state.
    pub fn can_deliver(&self) -> bool {
        matches!(self, OrderStatus::Shipped)
    }

    /// Returns true if the order can be cancelled in this state.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Processing)
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Completed
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Completed => "COMPLETED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROCESSING" => Ok(OrderStatus::Processing),
            "SHIPPED" => Ok(OrderStatus::Shipped),
            "DELIVERED" => Ok(OrderStatus::Delivered),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            "COMPLETED" => Ok(OrderStatus::Completed),
            other => Err(DomainError::InvalidInput(format!(
                "unknown order status: {other}"
            ))),
        }
    }
}

/// Per-line-item delivery lifecycle, independent across the shops of an order.
///
/// ```text
/// Pending ──► Shipped ──► Delivered
///    │
///    └──► Cancelled
/// ```
/// Re-asserting a non-terminal status is allowed so that tracking metadata
/// and notes can be amended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FulfillmentStatus {
    #[default]
    Pending,
    Shipped,
    Delivered,
    Cancelled,
}

impl FulfillmentStatus {
    pub fn can_transition_to(&self, next: FulfillmentStatus) -> bool {
        use FulfillmentStatus::*;
        matches!(
            (self, next),
            (Pending, Pending | Shipped | Cancelled) | (Shipped, Shipped | Delivered)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FulfillmentStatus::Delivered | FulfillmentStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentStatus::Pending => "PENDING",
            FulfillmentStatus::Shipped => "SHIPPED",
            FulfillmentStatus::Delivered => "DELIVERED",
            FulfillmentStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for FulfillmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FulfillmentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(FulfillmentStatus::Pending),
            "SHIPPED" => Ok(FulfillmentStatus::Shipped),
            "DELIVERED" => Ok(FulfillmentStatus::Delivered),
            "CANCELLED" => Ok(FulfillmentStatus::Cancelled),
            other => Err(DomainError::InvalidInput(format!(
                "unknown fulfillment status: {other}"
            ))),
        }
    }
}

/// Recomputes the order status from the statuses of all its items.
///
/// Terminal order states are kept as they are. Otherwise the order is
/// `Completed` once every item is `Delivered` or `Cancelled`, and keeps its
/// current status while any item is still open.
pub fn derive_order_status(
    current: OrderStatus,
    items: impl IntoIterator<Item = FulfillmentStatus>,
) -> OrderStatus {
    if current.is_terminal() {
        return current;
    }

    let mut any = false;
    for status in items {
        if !status.is_terminal() {
            return current;
        }
        any = true;
    }

    if any { OrderStatus::Completed } else { current }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_processing() {
        assert_eq!(OrderStatus::default(), OrderStatus::Processing);
        assert_eq!(FulfillmentStatus::default(), FulfillmentStatus::Pending);
    }

    #[test]
    fn test_only_processing_can_ship() {
        assert!(OrderStatus::Processing.can_ship());
        assert!(!OrderStatus::Shipped.can_ship());
        assert!(!OrderStatus::Delivered.can_ship());
        assert!(!OrderStatus::Cancelled.can_ship());
        assert!(!OrderStatus::Completed.can_ship());
    }

    #[test]
    fn test_only_shipped_can_deliver() {
        assert!(!OrderStatus::Processing.can_deliver());
        assert!(OrderStatus::Shipped.can_deliver());
        assert!(!OrderStatus::Delivered.can_deliver());
        assert!(!OrderStatus::Cancelled.can_deliver());
        assert!(!OrderStatus::Completed.can_deliver());
    }

    #[test]
    fn test_only_processing_can_cancel() {
        assert!(OrderStatus::Processing.can_cancel());
        assert!(!OrderStatus::Shipped.can_cancel());
        assert!(!OrderStatus::Delivered.can_cancel());
        assert!(!OrderStatus::Cancelled.can_cancel());
        assert!(!OrderStatus::Completed.can_cancel());
    }

    #[test]
    fn test_item_transitions() {
        use FulfillmentStatus::*;
        assert!(Pending.can_transition_to(Shipped));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Shipped.can_transition_to(Delivered));
        assert!(Shipped.can_transition_to(Shipped));

        assert!(!Pending.can_transition_to(Delivered));
        assert!(!Shipped.can_transition_to(Cancelled));
        assert!(!Shipped.can_transition_to(Pending));
        assert!(!Delivered.can_transition_to(Delivered));
        assert!(!Delivered.can_transition_to(Shipped));
        assert!(!Cancelled.can_transition_to(Pending));
    }

    #[test]
    fn test_derive_completed_when_all_items_terminal() {
        use FulfillmentStatus::*;
        assert_eq!(
            derive_order_status(OrderStatus::Processing, [Delivered, Cancelled]),
            OrderStatus::Completed
        );
        assert_eq!(
            derive_order_status(OrderStatus::Shipped, [Delivered, Delivered]),
            OrderStatus::Completed
        );
    }

    #[test]
    fn test_derive_keeps_status_while_items_open() {
        use FulfillmentStatus::*;
        assert_eq!(
            derive_order_status(OrderStatus::Processing, [Delivered, Shipped]),
            OrderStatus::Processing
        );
        assert_eq!(
            derive_order_status(OrderStatus::Processing, []),
            OrderStatus::Processing
        );
        assert_eq!(
            derive_order_status(OrderStatus::Cancelled, [Cancelled]),
            OrderStatus::Cancelled
        );
    }

    #[test]
    fn test_string_roundtrip() {
        for status in [
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
            OrderStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
            assert_eq!(status.to_string(), status.as_str());
        }
        assert!("PENDING".parse::<OrderStatus>().is_err());
        assert_eq!(
            "SHIPPED".parse::<FulfillmentStatus>().unwrap(),
            FulfillmentStatus::Shipped
        );
    }
}
