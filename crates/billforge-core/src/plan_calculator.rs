//! Plan lookup, promo application, and proration arithmetic (§4.4).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::Error;
use crate::models::{Discount, Plan, Subscription};
use crate::money::Money;
use crate::repository::Repository;

pub struct PlanCalculator {
    repository: Arc<dyn Repository>,
}

impl PlanCalculator {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    /// Fails with `NotFound` if the plan is missing or inactive.
    pub async fn get_plan(&self, plan_id: Uuid) -> Result<Plan, Error> {
        let plan = self.repository.get_plan(plan_id).await?;
        if !plan.active {
            return Err(Error::not_found(format!("plan {} is not active", plan_id)));
        }
        Ok(plan)
    }

    /// Validates the promo against `plan`/`user_id`/`now`, records the use
    /// (incrementing `used_count`, appending `user_id`), and returns the
    /// discount amount — never more than `plan.price`.
    pub async fn apply_promo(&self, code: &str, plan: &Plan, user_id: Uuid, now: DateTime<Utc>) -> Result<Money, Error> {
        let mut promo = self.repository.get_promo(code).await?;

        if !promo.is_within_window(now) {
            return Err(Error::invalid_input(format!("promo code {} is not currently valid", code)));
        }
        if !promo.has_uses_remaining() {
            return Err(Error::invalid_input(format!("promo code {} has no uses remaining", code)));
        }
        if !promo.allows_plan(plan.id) {
            return Err(Error::invalid_input(format!("promo code {} does not apply to this plan", code)));
        }
        if promo.already_used_by(user_id) {
            return Err(Error::invalid_input(format!("promo code {} already used by this user", code)));
        }

        let raw_discount = match promo.discount {
            Discount::Percentage(pct) => plan.price.mul_scalar(pct),
            Discount::Fixed(amount) => Money::new(amount, plan.price.currency()),
        };
        let discount = plan.price.min(&raw_discount)?.round_half_up();

        promo.used_count += 1;
        promo.users_applied.push(user_id);
        self.repository.put_promo(promo).await?;

        Ok(discount)
    }

    /// `amount_due = max(0, (new.price/total)·remaining − (current.price/total)·used)`,
    /// rounded half-up. Negative results clamp to zero (§4.4).
    pub fn prorate(&self, subscription: &Subscription, current_plan: &Plan, new_plan: &Plan, now: DateTime<Utc>) -> Result<Money, Error> {
        let currency = current_plan.price.currency();
        if new_plan.price.currency() != currency {
            return Err(Error::invalid_input("cannot prorate across currencies"));
        }

        let total = Decimal::from(subscription.period_days().max(1));
        let used = Decimal::from(subscription.days_used(now));
        let remaining = total - used;

        let new_share = new_plan.price.amount() / total * remaining;
        let current_share = current_plan.price.amount() / total * used;
        let amount_due = (new_share - current_share).max(Decimal::ZERO);

        Ok(Money::new(amount_due, currency).round_half_up())
    }

    /// Refund owed on immediate cancellation: `plan.price * remaining_days /
    /// total_days`, rounded half-up, clamped to >= 0 (§4.5).
    pub fn prorate_refund(&self, subscription: &Subscription, plan: &Plan, now: DateTime<Utc>) -> Result<Money, Error> {
        let total = Decimal::from(subscription.period_days().max(1));
        let used = Decimal::from(subscription.days_used(now));
        let remaining = (total - used).max(Decimal::ZERO);

        let refund = (plan.price.amount() / total * remaining).max(Decimal::ZERO);
        Ok(Money::new(refund, plan.price.currency()).round_half_up())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;
    use crate::repository::InMemoryRepository;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn plan(id: Uuid, price: Decimal) -> Plan {
        Plan {
            id,
            name: "test".into(),
            price: Money::new(price, Currency::Rub),
            billing_cycle_days: 30,
            trial_period_days: 0,
            max_retries: 3,
            active: true,
        }
    }

    fn subscription(plan_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> Subscription {
        Subscription {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            plan_id,
            status: crate::models::SubscriptionStatus::Active,
            current_period_start: start,
            current_period_end: end,
            trial_end: None,
            payment_method_id: Uuid::new_v4(),
            cancel_at_period_end: false,
            retry_count: 0,
            auto_renew: true,
            retry_at: None,
            cancellation_reason: None,
            cancelled_at: None,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn prorate_matches_scenario_five() {
        let repo = Arc::new(InMemoryRepository::new());
        let calc = PlanCalculator::new(repo);
        let current = plan(Uuid::new_v4(), dec!(1000));
        let new = plan(Uuid::new_v4(), dec!(3000));
        let start = Utc::now() - Duration::days(10);
        let end = start + Duration::days(30);
        let sub = subscription(current.id, start, end);

        let amount = calc.prorate(&sub, &current, &new, start + Duration::days(10)).unwrap();
        assert_eq!(amount.amount(), dec!(1666.67));
    }

    #[test]
    fn prorate_refund_matches_scenario_four() {
        let repo = Arc::new(InMemoryRepository::new());
        let calc = PlanCalculator::new(repo);
        let plan = plan(Uuid::new_v4(), dec!(1000));
        let start = Utc::now() - Duration::days(10);
        let end = start + Duration::days(30);
        let sub = subscription(plan.id, start, end);

        let refund = calc.prorate_refund(&sub, &plan, start + Duration::days(10)).unwrap();
        assert_eq!(refund.amount(), dec!(666.67));
    }

    #[test]
    fn prorate_clamps_to_zero_when_remaining_is_zero() {
        let repo = Arc::new(InMemoryRepository::new());
        let calc = PlanCalculator::new(repo);
        let current = plan(Uuid::new_v4(), dec!(1000));
        let new = plan(Uuid::new_v4(), dec!(3000));
        let start = Utc::now() - Duration::days(30);
        let end = start + Duration::days(30);
        let sub = subscription(current.id, start, end);

        let amount = calc.prorate(&sub, &current, &new, end).unwrap();
        assert_eq!(amount.amount(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn apply_promo_rejects_second_use_by_same_user() {
        let repo = Arc::new(InMemoryRepository::new());
        let plan_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        repo.put_promo(crate::models::PromoCode {
            code: "WELCOME10".into(),
            discount: Discount::Percentage(dec!(0.10)),
            valid_from: now - Duration::days(1),
            valid_to: now + Duration::days(1),
            max_uses: None,
            used_count: 0,
            plan_allow_list: None,
            users_applied: vec![],
        })
        .await
        .unwrap();

        let calc = PlanCalculator::new(repo);
        let the_plan = plan(plan_id, dec!(1000));

        let first = calc.apply_promo("WELCOME10", &the_plan, user_id, now).await.unwrap();
        assert_eq!(first.amount(), dec!(100));

        let second = calc.apply_promo("WELCOME10", &the_plan, user_id, now).await;
        assert!(second.is_err());
    }
}
