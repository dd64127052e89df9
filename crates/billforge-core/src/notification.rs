//! Notification contract (§6): fire-and-forget dispatch over a narrow
//! interface. Retries, delivery guarantees, and the concrete channel
//! (email/SMS/push) are an external collaborator's job; this crate only
//! specifies the seam and ships a logging stand-in.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    SubscriptionCreated,
    TrialEnding,
    SubscriptionExpiring,
    PaymentSuccess,
    PaymentFailed,
    SubscriptionCancelled,
    UpgradeCompleted,
}

impl NotificationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationEvent::SubscriptionCreated => "subscription_created",
            NotificationEvent::TrialEnding => "trial_ending",
            NotificationEvent::SubscriptionExpiring => "subscription_expiring",
            NotificationEvent::PaymentSuccess => "payment_success",
            NotificationEvent::PaymentFailed => "payment_failed",
            NotificationEvent::SubscriptionCancelled => "subscription_cancelled",
            NotificationEvent::UpgradeCompleted => "upgrade_completed",
        }
    }
}

/// `send(user_id, event_type, data)` — fire-and-forget; the caller does not
/// await delivery confirmation and a failure here must never roll back a
/// lifecycle or billing operation.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, user_id: Uuid, event: NotificationEvent, data: Value);
}

/// Stand-in for a real email/SMS/push dispatcher: logs at `info` and
/// returns unconditionally.
#[derive(Debug, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send(&self, user_id: Uuid, event: NotificationEvent, data: Value) {
        info!(
            user_id = %user_id,
            event = event.as_str(),
            data = %data,
            "notification dispatched"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn logging_notifier_does_not_panic() {
        let notifier = LoggingNotifier;
        notifier
            .send(Uuid::new_v4(), NotificationEvent::PaymentSuccess, serde_json::json!({"amount": "10.00"}))
            .await;
    }
}
