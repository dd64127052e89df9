//! Payment processor (§4.3): idempotent single-payment execution plus
//! persistence of the transaction record.

use std::sync::Arc;

use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::Error;
use crate::models::{Transaction, TransactionType, User};
use crate::money::Money;
use crate::payment::{CustomerData, PaymentGateway};
use crate::repository::Repository;

pub struct PaymentProcessor {
    repository: Arc<dyn Repository>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
}

impl PaymentProcessor {
    pub fn new(repository: Arc<dyn Repository>, gateway: Arc<dyn PaymentGateway>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, gateway, clock }
    }

    /// Runs the full charge pipeline: persist pending, invoke gateway,
    /// update to completed/failed. `metadata` is accepted for parity with
    /// the external contract but is not otherwise interpreted here.
    pub async fn charge(
        &self,
        user_id: Uuid,
        subscription_id: Option<Uuid>,
        amount: Money,
        payment_method_id: Uuid,
        transaction_type: TransactionType,
        _description: &str,
        _metadata: Value,
    ) -> Result<Transaction, Error> {
        if amount.is_zero() {
            return Err(Error::invalid_input("charge amount must be non-zero"));
        }

        let user = self.repository.get_user(user_id).await?;
        let payment_method = self.repository.get_payment_method(payment_method_id).await?;

        let now = self.clock.now();
        let transaction_id = Uuid::new_v4();
        let pending = Transaction::pending(
            transaction_id,
            user_id,
            subscription_id,
            amount,
            transaction_type,
            self.gateway.id(),
            now,
        )?;
        self.repository.put_transaction(pending.clone()).await?;

        let idempotency_key = idempotency_key(transaction_id);
        let customer = customer_data(&user);

        let outcome = self
            .gateway
            .charge(
                amount.amount(),
                amount.currency(),
                &payment_method.external_id,
                &customer,
                &idempotency_key,
            )
            .await;

        let mut transaction = pending;
        let completed_at = self.clock.now();
        match outcome {
            Ok(receipt) => {
                transaction.mark_completed(receipt.gateway_reference, completed_at);
                self.repository.put_transaction(transaction.clone()).await?;
                Ok(transaction)
            }
            Err(failure) => {
                transaction.mark_failed(failure.to_string(), completed_at);
                self.repository.put_transaction(transaction.clone()).await?;
                Err(failure.into_error())
            }
        }
    }

    /// Issues a refund against a previously completed charge. Does not
    /// itself decide whether a refund is owed — the lifecycle manager
    /// computes the amount (§4.5).
    pub async fn refund(
        &self,
        user_id: Uuid,
        subscription_id: Option<Uuid>,
        original_reference: &str,
        amount: Money,
    ) -> Result<Transaction, Error> {
        let now = self.clock.now();
        let transaction_id = Uuid::new_v4();
        let mut transaction = Transaction::pending(
            transaction_id,
            user_id,
            subscription_id,
            amount.negate(),
            TransactionType::Refund,
            self.gateway.id(),
            now,
        )?;
        self.repository.put_transaction(transaction.clone()).await?;

        match self.gateway.refund(original_reference, amount.amount()).await {
            Ok(receipt) => {
                transaction.mark_completed(receipt.refund_reference, self.clock.now());
                self.repository.put_transaction(transaction.clone()).await?;
                Ok(transaction)
            }
            Err(failure) => {
                transaction.mark_failed(failure.to_string(), self.clock.now());
                self.repository.put_transaction(transaction.clone()).await?;
                Err(failure.into_error())
            }
        }
    }
}

/// `idempotency_key = H(transaction_id)`, a hex-encoded SHA-256 digest.
fn idempotency_key(transaction_id: Uuid) -> String {
    let mut hasher = Sha256::new();
    hasher.update(transaction_id.as_bytes());
    hex::encode(hasher.finalize())
}

fn customer_data(user: &User) -> CustomerData {
    CustomerData {
        user_id: user.id,
        email: user.email.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::models::{PaymentMethod, UserRole};
    use crate::money::Currency;
    use crate::payment::MockGateway;
    use crate::repository::InMemoryRepository;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    async fn seeded() -> (PaymentProcessor, Uuid, Uuid) {
        let repo = Arc::new(InMemoryRepository::new());
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(Utc::now()));
        let user_id = Uuid::new_v4();
        repo.put_user(User {
            id: user_id,
            email: "a@example.com".into(),
            role: UserRole::User,
            balance: dec!(0),
            balance_currency: Currency::Rub,
            active: true,
            created_at: clock.now(),
        })
        .await
        .unwrap();

        let pm_id = Uuid::new_v4();
        repo.put_payment_method(PaymentMethod {
            id: pm_id,
            user_id,
            gateway: "mock".into(),
            external_id: "pm_ext_1".into(),
            valid: true,
            expires_at: None,
            created_at: clock.now(),
        })
        .await
        .unwrap();

        let gateway: Arc<dyn PaymentGateway> = Arc::new(MockGateway::new(1.0));
        (PaymentProcessor::new(repo, gateway, clock), user_id, pm_id)
    }

    #[tokio::test]
    async fn successful_charge_marks_transaction_completed() {
        let (processor, user_id, pm_id) = seeded().await;
        let tx = processor
            .charge(
                user_id,
                None,
                Money::new(dec!(1000), Currency::Rub),
                pm_id,
                TransactionType::Initial,
                "test",
                serde_json::json!({}),
            )
            .await
            .unwrap();
        assert!(tx.gateway_reference.is_some());
    }

    #[tokio::test]
    async fn zero_amount_charge_is_rejected() {
        let (processor, user_id, pm_id) = seeded().await;
        let result = processor
            .charge(
                user_id,
                None,
                Money::zero(Currency::Rub),
                pm_id,
                TransactionType::Initial,
                "test",
                serde_json::json!({}),
            )
            .await;
        assert!(result.is_err());
    }
}
