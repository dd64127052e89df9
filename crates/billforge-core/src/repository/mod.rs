//! Persistence contract (§6) and an in-memory reference implementation.
//!
//! Production persistence is an external collaborator; this crate only
//! specifies the trait and ships a `dashmap`-backed implementation that is
//! sufficient for tests, demos, and single-process deployments.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Error;
use crate::models::{AuditEntry, PaymentMethod, Plan, PromoCode, Subscription, Transaction, User};

pub use memory::InMemoryRepository;

/// CRUD on every entity in §3, plus the two query capabilities the billing
/// engine needs: `subscriptions_due_for_payment` and
/// `failed_transactions_eligible_for_retry`.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_user(&self, id: Uuid) -> Result<User, Error>;
    async fn put_user(&self, user: User) -> Result<(), Error>;

    async fn get_plan(&self, id: Uuid) -> Result<Plan, Error>;
    async fn put_plan(&self, plan: Plan) -> Result<(), Error>;

    async fn get_payment_method(&self, id: Uuid) -> Result<PaymentMethod, Error>;
    async fn put_payment_method(&self, method: PaymentMethod) -> Result<(), Error>;

    async fn get_subscription(&self, id: Uuid) -> Result<Subscription, Error>;
    async fn put_subscription(&self, subscription: Subscription) -> Result<(), Error>;

    /// Non-terminal subscriptions (pending, trial, active, past_due) for a
    /// given (user, plan) pair — used to enforce the at-most-one invariant.
    async fn find_active_subscription(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
    ) -> Result<Option<Subscription>, Error>;

    /// Subscriptions where `status = active`, `current_period_end <= now`,
    /// and `auto_renew = true` (§4.6 step 1).
    async fn subscriptions_due_for_payment(&self, now: DateTime<Utc>) -> Result<Vec<Subscription>, Error>;

    /// Subscriptions in `trial` whose `trial_end <= now` (drives the trial
    /// conversion tick described in §6's scheduled jobs).
    async fn trials_ending(&self, now: DateTime<Utc>) -> Result<Vec<Subscription>, Error>;

    /// Subscriptions expiring within `within` of `now` (§6 daily 09:00 scan).
    async fn subscriptions_expiring_within(
        &self,
        now: DateTime<Utc>,
        within: chrono::Duration,
    ) -> Result<Vec<Subscription>, Error>;

    async fn get_transaction(&self, id: Uuid) -> Result<Transaction, Error>;
    async fn put_transaction(&self, transaction: Transaction) -> Result<(), Error>;

    /// Most recent completed transaction for a subscription (needed to
    /// issue a refund on immediate cancel, §4.5).
    async fn latest_completed_transaction(
        &self,
        subscription_id: Uuid,
    ) -> Result<Option<Transaction>, Error>;

    /// Transactions whose linked subscription is `past_due` or `pending`
    /// with `retry_count < max_retries` and `retry_at <= now` (§4.6).
    async fn failed_transactions_eligible_for_retry(
        &self,
        now: DateTime<Utc>,
        max_retries: u32,
    ) -> Result<Vec<Subscription>, Error>;

    async fn get_promo(&self, code: &str) -> Result<PromoCode, Error>;
    async fn put_promo(&self, promo: PromoCode) -> Result<(), Error>;

    async fn append_audit(&self, entry: AuditEntry) -> Result<(), Error>;
    async fn audit_trail(&self, subscription_id: Uuid) -> Result<Vec<AuditEntry>, Error>;
}
