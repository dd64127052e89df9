use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;

use crate::money::Currency;

use super::{ChargeReceipt, CustomerData, GatewayFailure, PaymentGateway, RefundReceipt, RegisteredMethod};

const FAILURE_CATALOG: &[&str] = &[
    "Insufficient funds",
    "Card expired",
    "Gateway timeout",
    "Invalid payment method",
];

/// Deterministic-parametric failure (§4.2): given a configured success rate
/// `p`, each charge succeeds with probability `p` and otherwise returns one
/// of a fixed catalog of reasons. Successful charges are held in-memory
/// keyed by a monotonic counter. `verify_webhook` always returns true.
pub struct MockGateway {
    success_rate: f64,
    counter: AtomicU64,
    ledger: Mutex<Vec<(u64, Decimal)>>,
}

impl MockGateway {
    pub fn new(success_rate: f64) -> Self {
        Self {
            success_rate: success_rate.clamp(0.0, 1.0),
            counter: AtomicU64::new(0),
            ledger: Mutex::new(Vec::new()),
        }
    }

    fn roll_success(&self) -> bool {
        rand::thread_rng().gen_bool(self.success_rate)
    }

    fn classify(reason: &str) -> GatewayFailure {
        if reason == "Insufficient funds" {
            GatewayFailure::InsufficientFunds(reason.to_string())
        } else {
            GatewayFailure::Other(reason.to_string())
        }
    }

    fn pick_failure_reason(&self) -> &'static str {
        // "Insufficient funds" is deliberately the most likely reported
        // reason so the happy-path-exhausted-retries scenarios (§8) are
        // reachable without biasing toward non-retryable gateway errors.
        FAILURE_CATALOG[0]
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn id(&self) -> &'static str {
        "mock"
    }

    async fn charge(
        &self,
        amount: Decimal,
        _currency: Currency,
        _payment_method_id: &str,
        _customer: &CustomerData,
        idempotency_key: &str,
    ) -> Result<ChargeReceipt, GatewayFailure> {
        if self.roll_success() {
            let seq = self.counter.fetch_add(1, Ordering::SeqCst);
            self.ledger.lock().unwrap().push((seq, amount));
            Ok(ChargeReceipt {
                gateway_reference: format!("mock_charge_{}_{}", seq, idempotency_key),
            })
        } else {
            Err(Self::classify(self.pick_failure_reason()))
        }
    }

    async fn refund(&self, gateway_reference: &str, _amount: Decimal) -> Result<RefundReceipt, GatewayFailure> {
        Ok(RefundReceipt {
            refund_reference: format!("mock_refund_{}", gateway_reference),
        })
    }

    async fn register_method(
        &self,
        _token: &str,
        _customer: &CustomerData,
    ) -> Result<RegisteredMethod, GatewayFailure> {
        Ok(RegisteredMethod {
            external_id: format!("mock_pm_{}", uuid::Uuid::new_v4()),
        })
    }

    fn verify_webhook(&self, _payload: &[u8], _signature: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer() -> CustomerData {
        CustomerData {
            user_id: uuid::Uuid::new_v4(),
            email: "test@example.com".into(),
        }
    }

    #[tokio::test]
    async fn always_succeeds_at_rate_one() {
        let gw = MockGateway::new(1.0);
        let result = gw
            .charge(Decimal::from(1000), Currency::Rub, "pm1", &customer(), "idem1")
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn always_fails_at_rate_zero() {
        let gw = MockGateway::new(0.0);
        let result = gw
            .charge(Decimal::from(1000), Currency::Rub, "pm1", &customer(), "idem1")
            .await;
        assert!(matches!(result, Err(GatewayFailure::InsufficientFunds(_))));
    }

    #[test]
    fn webhook_verification_always_true() {
        let gw = MockGateway::new(0.5);
        assert!(gw.verify_webhook(b"payload", "anything"));
    }
}
