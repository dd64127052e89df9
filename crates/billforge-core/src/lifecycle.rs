//! Lifecycle manager (§4.5): the state machine for a single subscription —
//! create, cancel, upgrade, renew — plus the audit trail every transition
//! writes.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::Error;
use crate::lock::SubscriptionLocks;
use crate::models::{AuditEntry, CancellationReason, Subscription, SubscriptionStatus, SubscriptionSummary, TransactionType};
use crate::money::Money;
use crate::notification::{NotificationEvent, Notifier};
use crate::plan_calculator::PlanCalculator;
use crate::processor::PaymentProcessor;
use crate::repository::Repository;
use crate::retry::compute_retry_at;

/// Returned by `create`; mirrors the HTTP-surface contract in §6.
#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub subscription_id: Uuid,
    pub transaction_id: Option<Uuid>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub next_billing_date: DateTime<Utc>,
}

pub struct LifecycleManager {
    repository: Arc<dyn Repository>,
    plan_calculator: Arc<PlanCalculator>,
    processor: Arc<PaymentProcessor>,
    clock: Arc<dyn Clock>,
    locks: Arc<SubscriptionLocks>,
    notifier: Arc<dyn Notifier>,
    retry_delay_days: Vec<i64>,
}

impl LifecycleManager {
    pub fn new(
        repository: Arc<dyn Repository>,
        plan_calculator: Arc<PlanCalculator>,
        processor: Arc<PaymentProcessor>,
        clock: Arc<dyn Clock>,
        locks: Arc<SubscriptionLocks>,
        notifier: Arc<dyn Notifier>,
        retry_delay_days: Vec<i64>,
    ) -> Self {
        Self {
            repository,
            plan_calculator,
            processor,
            clock,
            locks,
            notifier,
            retry_delay_days,
        }
    }

    /// Rejects if a non-terminal subscription already exists for
    /// (user, plan). Creates in `trial` when the plan has a trial period
    /// (no immediate charge), else `pending` with an immediate charge
    /// attempt.
    pub async fn create(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
        payment_method_id: Uuid,
        promo_code: Option<&str>,
    ) -> Result<CreateOutcome, Error> {
        if self.repository.find_active_subscription(user_id, plan_id).await?.is_some() {
            return Err(Error::already_active(format!(
                "user {} already has a non-terminal subscription on plan {}",
                user_id, plan_id
            )));
        }

        let plan = self.plan_calculator.get_plan(plan_id).await?;
        let now = self.clock.now();
        let subscription_id = Uuid::new_v4();

        let discount = match promo_code {
            Some(code) => self.plan_calculator.apply_promo(code, &plan, user_id, now).await?,
            None => Money::zero(plan.price.currency()),
        };

        if plan.has_trial() {
            let trial_end = now + Duration::days(plan.trial_period_days);
            let period_end = now + Duration::days(plan.billing_cycle_days);
            let subscription = Subscription {
                id: subscription_id,
                user_id,
                plan_id,
                status: SubscriptionStatus::Trial,
                current_period_start: now,
                current_period_end: period_end,
                trial_end: Some(trial_end),
                payment_method_id,
                cancel_at_period_end: false,
                retry_count: 0,
                auto_renew: true,
                retry_at: None,
                cancellation_reason: None,
                cancelled_at: None,
                created_at: now,
                updated_at: now,
            };
            self.repository.put_subscription(subscription.clone()).await?;
            self.audit(subscription_id, "create", json!(null), &subscription, "user", now).await?;
            self.notifier
                .send(user_id, NotificationEvent::SubscriptionCreated, json!({"subscription_id": subscription_id}))
                .await;
            return Ok(CreateOutcome {
                subscription_id,
                transaction_id: None,
                trial_ends_at: Some(trial_end),
                next_billing_date: period_end,
            });
        }

        let amount = plan.price.checked_sub(&discount)?;
        let period_end = now + Duration::days(plan.billing_cycle_days);
        let mut subscription = Subscription {
            id: subscription_id,
            user_id,
            plan_id,
            status: SubscriptionStatus::Pending,
            current_period_start: now,
            current_period_end: period_end,
            trial_end: None,
            payment_method_id,
            cancel_at_period_end: false,
            retry_count: 0,
            auto_renew: true,
            retry_at: None,
            cancellation_reason: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        };
        self.repository.put_subscription(subscription.clone()).await?;

        match self
            .processor
            .charge(user_id, Some(subscription_id), amount, payment_method_id, TransactionType::Initial, "subscription creation", json!({}))
            .await
        {
            Ok(transaction) => {
                let before = subscription.clone();
                subscription.status = SubscriptionStatus::Active;
                subscription.updated_at = now;
                self.repository.put_subscription(subscription.clone()).await?;
                self.audit(subscription_id, "create", &before, &subscription, "user", now).await?;
                self.notifier
                    .send(user_id, NotificationEvent::SubscriptionCreated, json!({"subscription_id": subscription_id}))
                    .await;
                Ok(CreateOutcome {
                    subscription_id,
                    transaction_id: Some(transaction.id),
                    trial_ends_at: None,
                    next_billing_date: period_end,
                })
            }
            Err(err) => {
                // The very first charge attempt: retry_count goes 0 -> 1
                // regardless of failure classification (§4.5), unlike the
                // non-incrementing gateway-error rule that applies once a
                // subscription already has retry state (§4.6e).
                let before = subscription.clone();
                subscription.retry_count = 1;
                subscription.retry_at = Some(compute_retry_at(now, 1, &self.retry_delay_days));
                subscription.updated_at = now;
                self.repository.put_subscription(subscription.clone()).await?;
                self.audit(subscription_id, "create_charge_failed", &before, &subscription, "user", now).await?;
                Err(err)
            }
        }
    }

    /// `immediate = false` defers to the period-end tick; `immediate = true`
    /// refunds the unused remainder and transitions to `cancelled`
    /// synchronously, failing with no state change if the refund fails.
    pub async fn cancel(&self, subscription_id: Uuid, immediate: bool) -> Result<SubscriptionSummary, Error> {
        let _guard = self.locks.acquire(subscription_id).await;
        let mut subscription = self.repository.get_subscription(subscription_id).await?;
        if subscription.status.is_terminal() {
            return Err(Error::invalid_input("already cancelled"));
        }

        let now = self.clock.now();
        let before = subscription.clone();

        if !immediate {
            subscription.cancel_at_period_end = true;
            subscription.updated_at = now;
            self.repository.put_subscription(subscription.clone()).await?;
            self.audit(subscription_id, "cancel_at_period_end", &before, &subscription, "user", now).await?;
            return Ok(SubscriptionSummary::from(&subscription));
        }

        let plan = self.plan_calculator.get_plan(subscription.plan_id).await?;
        let refund_amount = self.plan_calculator.prorate_refund(&subscription, &plan, now)?;

        if !refund_amount.is_zero() {
            let latest = self
                .repository
                .latest_completed_transaction(subscription_id)
                .await?
                .ok_or_else(|| Error::internal(format!("subscription {} has no completed charge to refund", subscription_id)))?;
            let reference = latest
                .gateway_reference
                .as_deref()
                .ok_or_else(|| Error::internal("completed transaction missing gateway_reference"))?;
            // Refund failure leaves the subscription untouched — the
            // operation fails with no partial state change (§4.5, §7).
            self.processor.refund(subscription.user_id, Some(subscription_id), reference, refund_amount).await?;
        }

        subscription.status = SubscriptionStatus::Cancelled;
        subscription.cancellation_reason = Some(CancellationReason::UserRequested);
        subscription.cancelled_at = Some(now);
        subscription.updated_at = now;
        self.repository.put_subscription(subscription.clone()).await?;
        self.audit(subscription_id, "cancel_immediate", &before, &subscription, "user", now).await?;
        self.notifier
            .send(subscription.user_id, NotificationEvent::SubscriptionCancelled, json!({"subscription_id": subscription_id}))
            .await;
        Ok(SubscriptionSummary::from(&subscription))
    }

    /// Requires `active` or `trial`; requires `new_plan.price > current_plan.price`.
    /// The period is kept unchanged on upgrade (§9 open-question decision).
    pub async fn upgrade(&self, subscription_id: Uuid, new_plan_id: Uuid) -> Result<SubscriptionSummary, Error> {
        let _guard = self.locks.acquire(subscription_id).await;
        let mut subscription = self.repository.get_subscription(subscription_id).await?;
        if !matches!(subscription.status, SubscriptionStatus::Active | SubscriptionStatus::Trial) {
            return Err(Error::invalid_input(format!(
                "subscription {} must be active or in trial to upgrade",
                subscription_id
            )));
        }

        let current_plan = self.plan_calculator.get_plan(subscription.plan_id).await?;
        let new_plan = self.plan_calculator.get_plan(new_plan_id).await?;
        if new_plan.price.amount() <= current_plan.price.amount() {
            return Err(Error::invalid_input("upgrade target plan must be strictly more expensive than the current plan"));
        }

        let now = self.clock.now();
        let amount_due = self.plan_calculator.prorate(&subscription, &current_plan, &new_plan, now)?;

        if !amount_due.is_zero() {
            self.processor
                .charge(subscription.user_id, Some(subscription_id), amount_due, subscription.payment_method_id, TransactionType::Upgrade, "plan upgrade", json!({}))
                .await?;
        }

        let before = subscription.clone();
        subscription.plan_id = new_plan_id;
        subscription.retry_count = 0;
        subscription.updated_at = now;
        self.repository.put_subscription(subscription.clone()).await?;
        self.audit(subscription_id, "upgrade", &before, &subscription, "user", now).await?;
        self.notifier
            .send(subscription.user_id, NotificationEvent::UpgradeCompleted, json!({"subscription_id": subscription_id, "new_plan_id": new_plan_id}))
            .await;
        Ok(SubscriptionSummary::from(&subscription))
    }

    /// Manual renewal. A failed charge behaves exactly as a scheduled
    /// renewal failure (§4.6): enters `past_due` with a retry scheduled.
    pub async fn renew(&self, subscription_id: Uuid) -> Result<SubscriptionSummary, Error> {
        let _guard = self.locks.acquire(subscription_id).await;
        let mut subscription = self.repository.get_subscription(subscription_id).await?;
        if subscription.status != SubscriptionStatus::Active {
            return Err(Error::invalid_input(format!("subscription {} must be active to renew", subscription_id)));
        }

        let plan = self.plan_calculator.get_plan(subscription.plan_id).await?;
        let now = self.clock.now();
        let before = subscription.clone();

        match self
            .processor
            .charge(subscription.user_id, Some(subscription_id), plan.price, subscription.payment_method_id, TransactionType::Renewal, "manual renewal", json!({}))
            .await
        {
            Ok(_) => {
                subscription.current_period_end += Duration::days(plan.billing_cycle_days);
                subscription.retry_count = 0;
                subscription.status = SubscriptionStatus::Active;
                subscription.updated_at = now;
                self.repository.put_subscription(subscription.clone()).await?;
                self.audit(subscription_id, "renew", &before, &subscription, "user", now).await?;
                self.notifier
                    .send(subscription.user_id, NotificationEvent::PaymentSuccess, json!({"subscription_id": subscription_id}))
                    .await;
                Ok(SubscriptionSummary::from(&subscription))
            }
            Err(err) => {
                crate::billing::apply_failure(&mut subscription, &plan, &err, now, &self.retry_delay_days);
                self.repository.put_subscription(subscription.clone()).await?;
                self.audit(subscription_id, "renew_charge_failed", &before, &subscription, "user", now).await?;
                if subscription.status == SubscriptionStatus::Cancelled {
                    self.notifier
                        .send(subscription.user_id, NotificationEvent::SubscriptionCancelled, json!({"subscription_id": subscription_id}))
                        .await;
                } else {
                    self.notifier
                        .send(subscription.user_id, NotificationEvent::PaymentFailed, json!({"subscription_id": subscription_id}))
                        .await;
                }
                Err(err)
            }
        }
    }

    async fn audit(
        &self,
        subscription_id: Uuid,
        action: &str,
        old_values: impl serde::Serialize,
        new_values: impl serde::Serialize,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        let entry = AuditEntry::new(
            subscription_id,
            action,
            serde_json::to_value(old_values)?,
            serde_json::to_value(new_values)?,
            actor,
            now,
        );
        self.repository.append_audit(entry).await
    }
}
