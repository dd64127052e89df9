//! Billing engine (§4.6): scan-due -> parallel charge -> retry policy ->
//! schedule next attempt.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tokio::sync::Semaphore;
use tracing::{error, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::Error;
use crate::invoice::InvoiceRenderer;
use crate::lock::SubscriptionLocks;
use crate::models::{AuditEntry, CancellationReason, Plan, Subscription, SubscriptionStatus, TransactionStatus, TransactionType};
use crate::notification::{NotificationEvent, Notifier};
use crate::plan_calculator::PlanCalculator;
use crate::processor::PaymentProcessor;
use crate::repository::Repository;
use crate::retry::{compute_retry_at, gateway_error_retry_at};

const DEFAULT_MAX_WORKERS: usize = 5;

/// Per-subscription outcome of a billing pass, never an aborting error —
/// one failed charge must never abort the batch (§7 propagation policy).
#[derive(Debug, Clone)]
pub struct BillingResult {
    pub subscription_id: Uuid,
    pub success: bool,
    pub error: Option<String>,
}

impl BillingResult {
    fn success(subscription_id: Uuid) -> Self {
        Self { subscription_id, success: true, error: None }
    }

    fn failure(subscription_id: Uuid, error: impl Into<String>) -> Self {
        Self { subscription_id, success: false, error: Some(error.into()) }
    }

    fn locked(subscription_id: Uuid) -> Self {
        Self::failure(subscription_id, "locked")
    }
}

pub struct BillingEngine {
    repository: Arc<dyn Repository>,
    plan_calculator: Arc<PlanCalculator>,
    processor: Arc<PaymentProcessor>,
    clock: Arc<dyn Clock>,
    locks: Arc<SubscriptionLocks>,
    notifier: Arc<dyn Notifier>,
    invoice_renderer: Arc<dyn InvoiceRenderer>,
    max_workers: usize,
    retry_delay_days: Vec<i64>,
}

impl BillingEngine {
    /// The engine's time source, exposed so callers (e.g. the admin API's
    /// fire-and-forget billing trigger) can stamp a `started_at` without
    /// reaching for `Utc::now()` directly.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repository: Arc<dyn Repository>,
        plan_calculator: Arc<PlanCalculator>,
        processor: Arc<PaymentProcessor>,
        clock: Arc<dyn Clock>,
        locks: Arc<SubscriptionLocks>,
        notifier: Arc<dyn Notifier>,
        invoice_renderer: Arc<dyn InvoiceRenderer>,
        max_workers: usize,
        retry_delay_days: Vec<i64>,
    ) -> Self {
        Self {
            repository,
            plan_calculator,
            processor,
            clock,
            locks,
            notifier,
            invoice_renderer,
            max_workers: if max_workers == 0 { DEFAULT_MAX_WORKERS } else { max_workers },
            retry_delay_days,
        }
    }

    /// Scans for subscriptions due for renewal and fans them out across a
    /// bounded worker pool gated by a semaphore (§4.6, §9), never one
    /// unbounded `tokio::spawn` per subscription.
    pub async fn process_recurring_payments(self: &Arc<Self>) -> Result<Vec<BillingResult>, Error> {
        let now = self.clock.now();
        let due = self.repository.subscriptions_due_for_payment(now).await?;

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut handles = Vec::with_capacity(due.len());
        for subscription in due {
            let engine = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
                engine.process_one_due(subscription).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(join_error) => error!("billing worker panicked: {}", join_error),
            }
        }
        Ok(results)
    }

    async fn process_one_due(&self, subscription: Subscription) -> BillingResult {
        let subscription_id = subscription.id;
        let guard = match self.locks.try_acquire(subscription_id) {
            Ok(guard) => guard,
            Err(_) => return BillingResult::locked(subscription_id),
        };
        let result = self.attempt_and_apply(subscription, true).await;
        drop(guard);
        result
    }

    /// Re-runs the charge pipeline for subscriptions the repository reports
    /// as retry-eligible: `past_due` or `pending`, `retry_count < max_retries`,
    /// `retry_at <= now` (§4.6).
    pub async fn retry_failed_payments(self: &Arc<Self>, max_retries: u32) -> Result<Vec<BillingResult>, Error> {
        let now = self.clock.now();
        let eligible = self.repository.failed_transactions_eligible_for_retry(now, max_retries).await?;

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut handles = Vec::with_capacity(eligible.len());
        for subscription in eligible {
            let engine = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
                engine.retry_one(subscription).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(join_error) => error!("retry worker panicked: {}", join_error),
            }
        }
        Ok(results)
    }

    async fn retry_one(&self, subscription: Subscription) -> BillingResult {
        let subscription_id = subscription.id;
        let guard = match self.locks.try_acquire(subscription_id) {
            Ok(guard) => guard,
            Err(_) => return BillingResult::locked(subscription_id),
        };
        // A subscription that was never active yet (`pending`) has its
        // period already laid out at creation time — a successful retry of
        // its *initial* charge must not additionally extend it. Only a
        // subscription that was already cycling (`past_due`) gets its
        // period extended on the deferred renewal succeeding.
        let extend_on_success = subscription.status != SubscriptionStatus::Pending;
        let result = self.attempt_and_apply(subscription, extend_on_success).await;
        drop(guard);
        result
    }

    /// Converts subscriptions whose trial has ended into an immediate charge
    /// attempt (§3, §4.5: "trial_end reached -> active, with automatic
    /// charge attempt"). Not one of the fixed wall-clock jobs enumerated in
    /// §6 — trial boundaries fall at arbitrary times of day, so this is
    /// driven by its own hourly sweep alongside the retry sweep rather than
    /// a daily tick (see the CLI's job wiring).
    pub async fn process_trial_conversions(self: &Arc<Self>) -> Result<Vec<BillingResult>, Error> {
        let now = self.clock.now();
        let ending = self.repository.trials_ending(now).await?;

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut handles = Vec::with_capacity(ending.len());
        for subscription in ending {
            let engine = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
                engine.convert_one_trial(subscription).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(join_error) => error!("trial conversion worker panicked: {}", join_error),
            }
        }
        Ok(results)
    }

    async fn convert_one_trial(&self, subscription: Subscription) -> BillingResult {
        let subscription_id = subscription.id;
        let guard = match self.locks.try_acquire(subscription_id) {
            Ok(guard) => guard,
            Err(_) => return BillingResult::locked(subscription_id),
        };
        // `current_period_end` was already laid out at trial creation to
        // cover the first billing cycle (§4.5 create) — conversion charges
        // into that period, it does not extend it.
        let result = self.attempt_and_apply(subscription, false).await;
        drop(guard);
        result
    }

    async fn attempt_and_apply(&self, mut subscription: Subscription, extend_on_success: bool) -> BillingResult {
        let subscription_id = subscription.id;
        let plan = match self.plan_calculator.get_plan(subscription.plan_id).await {
            Ok(plan) => plan,
            Err(err) => return BillingResult::failure(subscription_id, err.to_string()),
        };

        let before = subscription.clone();
        let now = self.clock.now();
        let charge = self
            .processor
            .charge(
                subscription.user_id,
                Some(subscription_id),
                plan.price,
                subscription.payment_method_id,
                TransactionType::Renewal,
                "scheduled billing",
                json!({}),
            )
            .await;

        match charge {
            Ok(_) => {
                if extend_on_success {
                    subscription.current_period_end += Duration::days(plan.billing_cycle_days);
                }
                subscription.status = SubscriptionStatus::Active;
                subscription.retry_count = 0;
                subscription.retry_at = None;
                subscription.updated_at = now;
                self.persist_and_audit(subscription_id, "billing_charge_succeeded", &before, &subscription, now).await;
                self.notifier
                    .send(subscription.user_id, NotificationEvent::PaymentSuccess, json!({"subscription_id": subscription_id}))
                    .await;
                BillingResult::success(subscription_id)
            }
            Err(err) => {
                if matches!(err, Error::PaymentGatewayError(_)) {
                    warn!(subscription_id = %subscription_id, error = %err, "admin alert: non-deterministic gateway failure");
                }
                apply_failure(&mut subscription, &plan, &err, now, &self.retry_delay_days);
                self.persist_and_audit(subscription_id, "billing_charge_failed", &before, &subscription, now).await;
                let event = if subscription.status == SubscriptionStatus::Cancelled {
                    NotificationEvent::SubscriptionCancelled
                } else {
                    NotificationEvent::PaymentFailed
                };
                self.notifier.send(subscription.user_id, event, json!({"subscription_id": subscription_id})).await;
                BillingResult::failure(subscription_id, err.to_string())
            }
        }
    }

    async fn persist_and_audit(&self, subscription_id: Uuid, action: &str, before: &Subscription, after: &Subscription, now: DateTime<Utc>) {
        if let Err(err) = self.repository.put_subscription(after.clone()).await {
            error!(subscription_id = %subscription_id, error = %err, "failed to persist billing outcome");
            return;
        }
        let Ok(old_values) = serde_json::to_value(before) else { return };
        let Ok(new_values) = serde_json::to_value(after) else { return };
        let entry = AuditEntry::new(subscription_id, action, old_values, new_values, "billing_engine", now);
        if let Err(err) = self.repository.append_audit(entry).await {
            error!(subscription_id = %subscription_id, error = %err, "failed to append audit entry");
        }
    }

    /// Fetches Transaction + User + Subscription + Plan and renders an
    /// invoice document via the injected `InvoiceRenderer` (§4.6, §6).
    /// Renders the invoice for `transaction_id` if given, otherwise the
    /// latest completed transaction for `subscription_id` (§6: `get_invoice
    /// (subscription_id, transaction_id?)`).
    pub async fn generate_invoice(
        &self,
        subscription_id: Uuid,
        transaction_id: Option<Uuid>,
    ) -> Result<Vec<u8>, Error> {
        let transaction = match transaction_id {
            Some(transaction_id) => self.repository.get_transaction(transaction_id).await?,
            None => self
                .repository
                .latest_completed_transaction(subscription_id)
                .await?
                .ok_or_else(|| Error::not_found(format!("no completed transaction for subscription {}", subscription_id)))?,
        };
        if transaction.status != TransactionStatus::Completed {
            return Err(Error::not_found(format!("transaction {} is not completed", transaction.id)));
        }
        if transaction.subscription_id != Some(subscription_id) {
            return Err(Error::not_found(format!(
                "transaction {} is not linked to subscription {}",
                transaction.id, subscription_id
            )));
        }
        let user = self.repository.get_user(transaction.user_id).await?;
        let subscription = self.repository.get_subscription(subscription_id).await?;
        let plan = self.plan_calculator.get_plan(subscription.plan_id).await?;
        Ok(self.invoice_renderer.render(&transaction, &user, &subscription, &plan))
    }

    /// Daily 09:00 scan (§6): notifies subscriptions whose current period
    /// ends within `within` of now. Notify-only — no state mutation.
    pub async fn notify_expiring_subscriptions(&self, within: Duration) -> Result<usize, Error> {
        let now = self.clock.now();
        let expiring = self.repository.subscriptions_expiring_within(now, within).await?;
        for subscription in &expiring {
            self.notifier
                .send(
                    subscription.user_id,
                    NotificationEvent::SubscriptionExpiring,
                    json!({
                        "subscription_id": subscription.id,
                        "current_period_end": subscription.current_period_end,
                    }),
                )
                .await;
        }
        Ok(expiring.len())
    }

    /// Daily 10:00 scan (§6): notifies trials whose `trial_end` falls
    /// within `within` of now. Notify-only — no state mutation.
    pub async fn notify_trials_ending(&self, within: Duration) -> Result<usize, Error> {
        let now = self.clock.now();
        let ending = self.repository.trials_ending(now + within).await?;
        for subscription in &ending {
            self.notifier
                .send(
                    subscription.user_id,
                    NotificationEvent::TrialEnding,
                    json!({
                        "subscription_id": subscription.id,
                        "trial_end": subscription.trial_end,
                    }),
                )
                .await;
        }
        Ok(ending.len())
    }
}

/// The retry/cancel policy shared by the billing engine's scan and retry
/// sweep, and the lifecycle manager's manual `renew` (§4.5, §4.6d/e).
/// `pending` subscriptions stay `pending` across retries (only a
/// `past_due`/`active` subscription moves to `past_due`); either kind
/// transitions to `cancelled` once `retry_count` reaches `plan.max_retries`.
pub(crate) fn apply_failure(subscription: &mut Subscription, plan: &Plan, error: &Error, now: DateTime<Utc>, retry_delay_days: &[i64]) {
    match error {
        Error::InsufficientFunds(_) => {
            subscription.retry_count += 1;
            if subscription.retry_count >= plan.max_retries {
                subscription.status = SubscriptionStatus::Cancelled;
                subscription.cancellation_reason = Some(CancellationReason::NonPayment);
                subscription.cancelled_at = Some(now);
                subscription.retry_at = None;
            } else {
                if subscription.status != SubscriptionStatus::Pending {
                    subscription.status = SubscriptionStatus::PastDue;
                }
                subscription.retry_at = Some(compute_retry_at(now, subscription.retry_count, retry_delay_days));
            }
        }
        _ => {
            // Non-deterministic gateway failures never increment retry_count (§4.6e).
            if subscription.status != SubscriptionStatus::Pending {
                subscription.status = SubscriptionStatus::PastDue;
            }
            subscription.retry_at = Some(gateway_error_retry_at(now));
        }
    }
    subscription.updated_at = now;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::lifecycle::LifecycleManager;
    use crate::models::{PaymentMethod, User, UserRole};
    use crate::money::{Currency, Money};
    use crate::payment::{MockGateway, PaymentGateway};
    use crate::repository::InMemoryRepository;
    use crate::invoice::HtmlInvoiceRenderer;
    use rust_decimal_macros::dec;

    struct Fixture {
        lifecycle: LifecycleManager,
        engine: Arc<BillingEngine>,
        repository: Arc<InMemoryRepository>,
        clock: Arc<FakeClock>,
        gateway_switch: Arc<MockGatewaySwitch>,
        user_id: Uuid,
        payment_method_id: Uuid,
    }

    /// Lets a single test flip the mock gateway's success rate mid-run
    /// (scenario 2: fails, then succeeds once retried).
    struct MockGatewaySwitch {
        inner: std::sync::Mutex<Arc<MockGateway>>,
    }

    #[async_trait::async_trait]
    impl PaymentGateway for MockGatewaySwitch {
        fn id(&self) -> &'static str {
            "mock"
        }
        async fn charge(
            &self,
            amount: rust_decimal::Decimal,
            currency: Currency,
            payment_method_id: &str,
            customer: &crate::payment::CustomerData,
            idempotency_key: &str,
        ) -> Result<crate::payment::ChargeReceipt, crate::payment::GatewayFailure> {
            let gw = self.inner.lock().unwrap().clone();
            gw.charge(amount, currency, payment_method_id, customer, idempotency_key).await
        }
        async fn refund(&self, gateway_reference: &str, amount: rust_decimal::Decimal) -> Result<crate::payment::RefundReceipt, crate::payment::GatewayFailure> {
            let gw = self.inner.lock().unwrap().clone();
            gw.refund(gateway_reference, amount).await
        }
        async fn register_method(&self, token: &str, customer: &crate::payment::CustomerData) -> Result<crate::payment::RegisteredMethod, crate::payment::GatewayFailure> {
            let gw = self.inner.lock().unwrap().clone();
            gw.register_method(token, customer).await
        }
        fn verify_webhook(&self, payload: &[u8], signature: &str) -> bool {
            self.inner.lock().unwrap().verify_webhook(payload, signature)
        }
    }

    impl MockGatewaySwitch {
        fn new(rate: f64) -> Arc<Self> {
            Arc::new(Self { inner: std::sync::Mutex::new(Arc::new(MockGateway::new(rate))) })
        }
        fn set_rate(&self, rate: f64) {
            *self.inner.lock().unwrap() = Arc::new(MockGateway::new(rate));
        }
    }

    async fn fixture(success_rate: f64) -> Fixture {
        let repository = Arc::new(InMemoryRepository::new());
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let gateway_switch = MockGatewaySwitch::new(success_rate);
        let gateway: Arc<dyn PaymentGateway> = gateway_switch.clone();
        let processor = Arc::new(PaymentProcessor::new(repository.clone(), gateway, clock.clone()));
        let plan_calculator = Arc::new(PlanCalculator::new(repository.clone()));
        let locks = Arc::new(SubscriptionLocks::new());
        let notifier: Arc<dyn Notifier> = Arc::new(crate::notification::LoggingNotifier);
        let invoice_renderer: Arc<dyn InvoiceRenderer> = Arc::new(HtmlInvoiceRenderer);

        let user_id = Uuid::new_v4();
        repository
            .put_user(User {
                id: user_id,
                email: "u1@example.com".into(),
                role: UserRole::User,
                balance: dec!(0),
                balance_currency: Currency::Rub,
                active: true,
                created_at: clock.now(),
            })
            .await
            .unwrap();
        let payment_method_id = Uuid::new_v4();
        repository
            .put_payment_method(PaymentMethod {
                id: payment_method_id,
                user_id,
                gateway: "mock".into(),
                external_id: "pm_ext".into(),
                valid: true,
                expires_at: None,
                created_at: clock.now(),
            })
            .await
            .unwrap();

        let lifecycle = LifecycleManager::new(
            repository.clone(),
            plan_calculator.clone(),
            processor.clone(),
            clock.clone() as Arc<dyn Clock>,
            locks.clone(),
            notifier.clone(),
            vec![1, 3, 7],
        );
        let engine = Arc::new(BillingEngine::new(
            repository.clone(),
            plan_calculator,
            processor,
            clock.clone() as Arc<dyn Clock>,
            locks,
            notifier,
            invoice_renderer,
            5,
            vec![1, 3, 7],
        ));

        Fixture { lifecycle, engine, repository, clock, gateway_switch, user_id, payment_method_id }
    }

    async fn put_plan(repository: &InMemoryRepository, price: rust_decimal::Decimal, max_retries: u32) -> Uuid {
        let plan_id = Uuid::new_v4();
        repository
            .put_plan(Plan {
                id: plan_id,
                name: "plan".into(),
                price: Money::new(price, Currency::Rub),
                billing_cycle_days: 30,
                trial_period_days: 0,
                max_retries,
                active: true,
            })
            .await
            .unwrap();
        plan_id
    }

    #[tokio::test]
    async fn scenario_one_happy_path_create_then_scan() {
        let f = fixture(1.0).await;
        let plan_id = put_plan(&f.repository, dec!(1000), 3).await;
        let outcome = f.lifecycle.create(f.user_id, plan_id, f.payment_method_id, None).await.unwrap();

        f.clock.advance(Duration::days(30));
        let results = f.engine.process_recurring_payments().await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].success);

        let sub = f.repository.get_subscription(outcome.subscription_id).await.unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.retry_count, 0);
        assert_eq!(sub.current_period_end, outcome.next_billing_date + Duration::days(30));
    }

    #[tokio::test]
    async fn scenario_two_insufficient_funds_then_eventual_success() {
        let f = fixture(0.0).await;
        let plan_id = put_plan(&f.repository, dec!(1000), 3).await;
        let err = f.lifecycle.create(f.user_id, plan_id, f.payment_method_id, None).await.unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds(_)));

        let sub = f.repository.find_active_subscription(f.user_id, plan_id).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Pending);
        assert_eq!(sub.retry_count, 1);

        f.clock.advance(Duration::days(1));
        f.gateway_switch.set_rate(1.0);
        let results = f.engine.retry_failed_payments(3).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].success);

        let sub = f.repository.get_subscription(sub.id).await.unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.retry_count, 0);
    }

    #[tokio::test]
    async fn scenario_three_retries_exhausted_cancels() {
        let f = fixture(0.0).await;
        let plan_id = put_plan(&f.repository, dec!(1000), 2).await;
        f.lifecycle.create(f.user_id, plan_id, f.payment_method_id, None).await.unwrap_err();

        let sub = f.repository.find_active_subscription(f.user_id, plan_id).await.unwrap().unwrap();
        assert_eq!(sub.retry_count, 1);

        f.clock.advance(Duration::days(1));
        let results = f.engine.retry_failed_payments(2).await.unwrap();
        assert!(!results[0].success);
        let sub = f.repository.get_subscription(sub.id).await.unwrap();
        assert_eq!(sub.retry_count, 2);
        assert_eq!(sub.status, SubscriptionStatus::Pending);

        f.clock.advance(Duration::days(3));
        let results = f.engine.retry_failed_payments(2).await.unwrap();
        assert!(!results[0].success);
        let sub = f.repository.get_subscription(sub.id).await.unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Cancelled);
    }

    #[tokio::test]
    async fn locked_subscription_is_skipped_not_retried() {
        let f = fixture(1.0).await;
        let plan_id = put_plan(&f.repository, dec!(1000), 3).await;
        let outcome = f.lifecycle.create(f.user_id, plan_id, f.payment_method_id, None).await.unwrap();
        f.clock.advance(Duration::days(30));

        let guard = f.engine.locks.try_acquire(outcome.subscription_id);
        assert!(guard.is_ok());
        let results = f.engine.process_recurring_payments().await.unwrap();
        assert_eq!(results[0].error.as_deref(), Some("locked"));
    }

    #[tokio::test]
    async fn scenario_six_trial_conversion_charges_into_existing_period() {
        let f = fixture(1.0).await;
        let plan_id = Uuid::new_v4();
        f.repository
            .put_plan(Plan {
                id: plan_id,
                name: "trial-plan".into(),
                price: Money::new(dec!(1000), Currency::Rub),
                billing_cycle_days: 30,
                trial_period_days: 7,
                max_retries: 3,
                active: true,
            })
            .await
            .unwrap();

        let outcome = f.lifecycle.create(f.user_id, plan_id, f.payment_method_id, None).await.unwrap();
        let sub = f.repository.get_subscription(outcome.subscription_id).await.unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Trial);
        assert_eq!(sub.current_period_end, outcome.next_billing_date);

        f.clock.advance(Duration::days(7));
        let results = f.engine.process_trial_conversions().await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].success);

        let sub = f.repository.get_subscription(outcome.subscription_id).await.unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.current_period_end, outcome.next_billing_date);
    }

    #[tokio::test]
    async fn trial_conversion_failure_moves_to_past_due_with_retry_scheduled() {
        let f = fixture(0.0).await;
        let plan_id = Uuid::new_v4();
        f.repository
            .put_plan(Plan {
                id: plan_id,
                name: "trial-plan".into(),
                price: Money::new(dec!(1000), Currency::Rub),
                billing_cycle_days: 30,
                trial_period_days: 7,
                max_retries: 3,
                active: true,
            })
            .await
            .unwrap();

        let outcome = f.lifecycle.create(f.user_id, plan_id, f.payment_method_id, None).await.unwrap();
        f.clock.advance(Duration::days(7));
        let results = f.engine.process_trial_conversions().await.unwrap();
        assert!(!results[0].success);

        let sub = f.repository.get_subscription(outcome.subscription_id).await.unwrap();
        assert_eq!(sub.status, SubscriptionStatus::PastDue);
        assert_eq!(sub.retry_count, 1);
        assert!(sub.retry_at.is_some());
    }
}
