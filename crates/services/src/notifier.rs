//! Outbound customer notifications.
//!
//! Delivery (address lookup, templating, email) belongs to an external
//! collaborator. The core only calls the [`Notifier`] trait after a change
//! has been committed, on a spawned task, and never waits for the outcome.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{OrderId, UserId};
use domain::Order;
use thiserror::Error;

/// A notification could not be delivered.
#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Which customer notification to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    OrderConfirmed,
    OrderShipped,
    OrderDelivered,
    OrderCancelled,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::OrderConfirmed => "order_confirmed",
            NotificationKind::OrderShipped => "order_shipped",
            NotificationKind::OrderDelivered => "order_delivered",
            NotificationKind::OrderCancelled => "order_cancelled",
        }
    }
}

/// Trait for the notification collaborator.
///
/// The recipient is the purchasing user; resolving it to an address is the
/// implementation's concern.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn order_confirmed(&self, recipient: UserId, order: &Order) -> Result<(), NotifyError>;

    async fn order_shipped(&self, recipient: UserId, order: &Order) -> Result<(), NotifyError>;

    async fn order_delivered(&self, recipient: UserId, order: &Order) -> Result<(), NotifyError>;

    async fn order_cancelled(&self, recipient: UserId, order: &Order) -> Result<(), NotifyError>;
}

/// Sends `kind` for `order` in the background.
///
/// Failures are logged and counted, never returned.
pub fn dispatch(notifier: Arc<dyn Notifier>, kind: NotificationKind, order: Order) {
    tokio::spawn(async move {
        let recipient = order.user_id;
        let result = match kind {
            NotificationKind::OrderConfirmed => notifier.order_confirmed(recipient, &order).await,
            NotificationKind::OrderShipped => notifier.order_shipped(recipient, &order).await,
            NotificationKind::OrderDelivered => notifier.order_delivered(recipient, &order).await,
            NotificationKind::OrderCancelled => notifier.order_cancelled(recipient, &order).await,
        };
        if let Err(err) = result {
            metrics::counter!("notifications_failed_total", "kind" => kind.as_str()).increment(1);
            tracing::warn!(order_id = %order.id, kind = kind.as_str(), error = %err, "notification failed");
        }
    });
}

/// Notifier that only writes a log line per notification.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

impl TracingNotifier {
    fn log(kind: NotificationKind, recipient: UserId, order: &Order) {
        tracing::info!(
            kind = kind.as_str(),
            %recipient,
            order_id = %order.id,
            status = %order.status,
            "customer notification"
        );
    }
}

#[async_trait]
impl Notifier for TracingNotifier {
    async fn order_confirmed(&self, recipient: UserId, order: &Order) -> Result<(), NotifyError> {
        Self::log(NotificationKind::OrderConfirmed, recipient, order);
        Ok(())
    }

    async fn order_shipped(&self, recipient: UserId, order: &Order) -> Result<(), NotifyError> {
        Self::log(NotificationKind::OrderShipped, recipient, order);
        Ok(())
    }

    async fn order_delivered(&self, recipient: UserId, order: &Order) -> Result<(), NotifyError> {
        Self::log(NotificationKind::OrderDelivered, recipient, order);
        Ok(())
    }

    async fn order_cancelled(&self, recipient: UserId, order: &Order) -> Result<(), NotifyError> {
        Self::log(NotificationKind::OrderCancelled, recipient, order);
        Ok(())
    }
}

/// A notification recorded by [`InMemoryNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub kind: NotificationKind,
    pub recipient: UserId,
    pub order_id: OrderId,
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<SentNotification>,
    attempts: usize,
    fail: bool,
}

/// In-memory notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<Mutex<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    /// Creates a new in-memory notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures every following notification to fail.
    pub fn set_fail(&self, fail: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.fail = fail;
        }
    }

    /// Returns the notifications delivered so far.
    pub fn sent(&self) -> Vec<SentNotification> {
        self.state
            .lock()
            .map(|state| state.sent.clone())
            .unwrap_or_default()
    }

    /// Returns how many notifications were attempted, failed ones included.
    pub fn attempts(&self) -> usize {
        self.state.lock().map(|state| state.attempts).unwrap_or(0)
    }

    /// Waits until at least `count` notifications were attempted, or one
    /// second passed. Dispatch runs on spawned tasks.
    pub async fn wait_for_attempts(&self, count: usize) -> usize {
        for _ in 0..100 {
            if self.attempts() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.attempts()
    }

    fn record(
        &self,
        kind: NotificationKind,
        recipient: UserId,
        order: &Order,
    ) -> Result<(), NotifyError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| NotifyError("notifier state poisoned".to_string()))?;
        state.attempts += 1;
        if state.fail {
            return Err(NotifyError(format!(
                "{} to {recipient} rejected",
                kind.as_str()
            )));
        }
        state.sent.push(SentNotification {
            kind,
            recipient,
            order_id: order.id,
        });
        Ok(())
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn order_confirmed(&self, recipient: UserId, order: &Order) -> Result<(), NotifyError> {
        self.record(NotificationKind::OrderConfirmed, recipient, order)
    }

    async fn order_shipped(&self, recipient: UserId, order: &Order) -> Result<(), NotifyError> {
        self.record(NotificationKind::OrderShipped, recipient, order)
    }

    async fn order_delivered(&self, recipient: UserId, order: &Order) -> Result<(), NotifyError> {
        self.record(NotificationKind::OrderDelivered, recipient, order)
    }

    async fn order_cancelled(&self, recipient: UserId, order: &Order) -> Result<(), NotifyError> {
        self.record(NotificationKind::OrderCancelled, recipient, order)
    }
}
