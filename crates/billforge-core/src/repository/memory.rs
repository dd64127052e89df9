use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::Error;
use crate::models::{
    AuditEntry, PaymentMethod, Plan, PromoCode, Subscription, SubscriptionStatus, Transaction,
    TransactionStatus, User,
};

use super::Repository;

/// `dashmap`-backed reference persistence, sufficient for tests, demos, and
/// single-process deployments. A production SQL-backed implementation of
/// [`Repository`] is an external integration left unimplemented here.
#[derive(Default)]
pub struct InMemoryRepository {
    users: DashMap<Uuid, User>,
    plans: DashMap<Uuid, Plan>,
    payment_methods: DashMap<Uuid, PaymentMethod>,
    subscriptions: DashMap<Uuid, Subscription>,
    transactions: DashMap<Uuid, Transaction>,
    promos: DashMap<String, PromoCode>,
    audit: DashMap<Uuid, Vec<AuditEntry>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: Uuid) -> Result<User, Error> {
        self.users
            .get(&id)
            .map(|r| r.clone())
            .ok_or_else(|| Error::not_found(format!("user {}", id)))
    }

    async fn put_user(&self, user: User) -> Result<(), Error> {
        self.users.insert(user.id, user);
        Ok(())
    }

    async fn get_plan(&self, id: Uuid) -> Result<Plan, Error> {
        self.plans
            .get(&id)
            .map(|r| r.clone())
            .ok_or_else(|| Error::not_found(format!("plan {}", id)))
    }

    async fn put_plan(&self, plan: Plan) -> Result<(), Error> {
        self.plans.insert(plan.id, plan);
        Ok(())
    }

    async fn get_payment_method(&self, id: Uuid) -> Result<PaymentMethod, Error> {
        self.payment_methods
            .get(&id)
            .map(|r| r.clone())
            .ok_or_else(|| Error::not_found(format!("payment method {}", id)))
    }

    async fn put_payment_method(&self, method: PaymentMethod) -> Result<(), Error> {
        self.payment_methods.insert(method.id, method);
        Ok(())
    }

    async fn get_subscription(&self, id: Uuid) -> Result<Subscription, Error> {
        self.subscriptions
            .get(&id)
            .map(|r| r.clone())
            .ok_or_else(|| Error::not_found(format!("subscription {}", id)))
    }

    async fn put_subscription(&self, subscription: Subscription) -> Result<(), Error> {
        self.subscriptions.insert(subscription.id, subscription);
        Ok(())
    }

    async fn find_active_subscription(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
    ) -> Result<Option<Subscription>, Error> {
        Ok(self
            .subscriptions
            .iter()
            .find(|s| s.user_id == user_id && s.plan_id == plan_id && s.status.is_non_terminal())
            .map(|r| r.clone()))
    }

    async fn subscriptions_due_for_payment(&self, now: DateTime<Utc>) -> Result<Vec<Subscription>, Error> {
        Ok(self
            .subscriptions
            .iter()
            .filter(|s| {
                s.status == SubscriptionStatus::Active
                    && s.current_period_end <= now
                    && s.auto_renew
            })
            .map(|r| r.clone())
            .collect())
    }

    async fn trials_ending(&self, now: DateTime<Utc>) -> Result<Vec<Subscription>, Error> {
        Ok(self
            .subscriptions
            .iter()
            .filter(|s| {
                s.status == SubscriptionStatus::Trial
                    && s.trial_end.map(|end| end <= now).unwrap_or(false)
            })
            .map(|r| r.clone())
            .collect())
    }

    async fn subscriptions_expiring_within(
        &self,
        now: DateTime<Utc>,
        within: chrono::Duration,
    ) -> Result<Vec<Subscription>, Error> {
        let horizon = now + within;
        Ok(self
            .subscriptions
            .iter()
            .filter(|s| {
                s.status == SubscriptionStatus::Active
                    && s.current_period_end <= horizon
                    && s.current_period_end > now
            })
            .map(|r| r.clone())
            .collect())
    }

    async fn get_transaction(&self, id: Uuid) -> Result<Transaction, Error> {
        self.transactions
            .get(&id)
            .map(|r| r.clone())
            .ok_or_else(|| Error::not_found(format!("transaction {}", id)))
    }

    async fn put_transaction(&self, transaction: Transaction) -> Result<(), Error> {
        self.transactions.insert(transaction.id, transaction);
        Ok(())
    }

    async fn latest_completed_transaction(
        &self,
        subscription_id: Uuid,
    ) -> Result<Option<Transaction>, Error> {
        Ok(self
            .transactions
            .iter()
            .filter(|t| {
                t.subscription_id == Some(subscription_id) && t.status == TransactionStatus::Completed
            })
            .max_by_key(|t| t.created_at)
            .map(|r| r.clone()))
    }

    async fn failed_transactions_eligible_for_retry(
        &self,
        now: DateTime<Utc>,
        max_retries: u32,
    ) -> Result<Vec<Subscription>, Error> {
        Ok(self
            .subscriptions
            .iter()
            .filter(|s| {
                matches!(s.status, SubscriptionStatus::PastDue | SubscriptionStatus::Pending)
                    && s.retry_count < max_retries
                    && s.retry_at.map(|at| at <= now).unwrap_or(false)
            })
            .map(|r| r.clone())
            .collect())
    }

    async fn get_promo(&self, code: &str) -> Result<PromoCode, Error> {
        self.promos
            .get(code)
            .map(|r| r.clone())
            .ok_or_else(|| Error::not_found(format!("promo code {}", code)))
    }

    async fn put_promo(&self, promo: PromoCode) -> Result<(), Error> {
        self.promos.insert(promo.code.clone(), promo);
        Ok(())
    }

    async fn append_audit(&self, entry: AuditEntry) -> Result<(), Error> {
        self.audit.entry(entry.subscription_id).or_default().push(entry);
        Ok(())
    }

    async fn audit_trail(&self, subscription_id: Uuid) -> Result<Vec<AuditEntry>, Error> {
        Ok(self.audit.get(&subscription_id).map(|r| r.clone()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::{Currency, Money};
    use rust_decimal_macros::dec;

    fn sample_plan(id: Uuid) -> Plan {
        Plan {
            id,
            name: "basic".into(),
            price: Money::new(dec!(1000), Currency::Rub),
            billing_cycle_days: 30,
            trial_period_days: 0,
            max_retries: 3,
            active: true,
        }
    }

    #[tokio::test]
    async fn round_trips_a_plan() {
        let repo = InMemoryRepository::new();
        let id = Uuid::new_v4();
        repo.put_plan(sample_plan(id)).await.unwrap();
        let fetched = repo.get_plan(id).await.unwrap();
        assert_eq!(fetched.id, id);
    }

    #[tokio::test]
    async fn missing_plan_is_not_found() {
        let repo = InMemoryRepository::new();
        assert!(repo.get_plan(Uuid::new_v4()).await.is_err());
    }
}
