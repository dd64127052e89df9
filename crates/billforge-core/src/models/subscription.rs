use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Pending,
    Trial,
    Active,
    PastDue,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    /// Cancelled and expired are terminal; no further field mutation except
    /// audit fields (§3).
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionStatus::Cancelled | SubscriptionStatus::Expired)
    }

    /// "non-terminal" as used by the at-most-one-subscription-per-(user,plan)
    /// invariant: pending, trial, active, past_due.
    pub fn is_non_terminal(&self) -> bool {
        !self.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationReason {
    UserRequested,
    NonPayment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub trial_end: Option<DateTime<Utc>>,
    pub payment_method_id: Uuid,
    pub cancel_at_period_end: bool,
    pub retry_count: u32,
    pub auto_renew: bool,
    pub retry_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<CancellationReason>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn is_in_trial(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Trial && self.trial_end.map(|end| now <= end).unwrap_or(false)
    }

    pub fn period_days(&self) -> i64 {
        (self.current_period_end - self.current_period_start).num_days()
    }

    /// Days elapsed into the current period, clamped to [0, total] as
    /// required by `prorate` (§4.4).
    pub fn days_used(&self, now: DateTime<Utc>) -> i64 {
        let used = (now - self.current_period_start).num_days();
        used.clamp(0, self.period_days())
    }
}

/// Summary projection returned by the six HTTP-surface verbs (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionSummary {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub trial_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub retry_count: u32,
}

impl From<&Subscription> for SubscriptionSummary {
    fn from(s: &Subscription) -> Self {
        Self {
            id: s.id,
            user_id: s.user_id,
            plan_id: s.plan_id,
            status: s.status,
            current_period_start: s.current_period_start,
            current_period_end: s.current_period_end,
            trial_end: s.trial_end,
            cancel_at_period_end: s.cancel_at_period_end,
            retry_count: s.retry_count,
        }
    }
}
