//! Payment gateway abstraction (§4.2): a uniform capability set over
//! heterogeneous external providers.

pub mod factory;
pub mod mock;
pub mod real;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::money::Currency;

pub use factory::build_gateway;
pub use mock::MockGateway;
pub use real::RealGateway;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerData {
    pub user_id: uuid::Uuid,
    pub email: String,
}

/// Outcome of a `charge` call. `Ok` carries the gateway's reference for the
/// charge; `Err` is a classified failure reason, never a raw provider error
/// string, so callers can tell insufficient-funds from any other failure
/// without string matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayFailure {
    InsufficientFunds(String),
    Other(String),
}

impl std::fmt::Display for GatewayFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayFailure::InsufficientFunds(msg) => write!(f, "{}", msg),
            GatewayFailure::Other(msg) => write!(f, "{}", msg),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChargeReceipt {
    pub gateway_reference: String,
}

#[derive(Debug, Clone)]
pub struct RefundReceipt {
    pub refund_reference: String,
}

#[derive(Debug, Clone)]
pub struct RegisteredMethod {
    pub external_id: String,
}

/// A uniform capability set: charge / refund / register method / verify
/// webhook, over a closed set of concrete providers (§9 design notes).
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// The tag this gateway was constructed under (`"mock"`, `"yoomoney"`).
    fn id(&self) -> &'static str;

    async fn charge(
        &self,
        amount: Decimal,
        currency: Currency,
        payment_method_id: &str,
        customer: &CustomerData,
        idempotency_key: &str,
    ) -> Result<ChargeReceipt, GatewayFailure>;

    async fn refund(
        &self,
        gateway_reference: &str,
        amount: Decimal,
    ) -> Result<RefundReceipt, GatewayFailure>;

    async fn register_method(
        &self,
        token: &str,
        customer: &CustomerData,
    ) -> Result<RegisteredMethod, GatewayFailure>;

    /// Verify a webhook payload's signature. Real gateways must do this in
    /// constant time; the mock always returns true.
    fn verify_webhook(&self, payload: &[u8], signature: &str) -> bool;
}

impl GatewayFailure {
    pub fn into_error(self) -> Error {
        match self {
            GatewayFailure::InsufficientFunds(msg) => Error::insufficient_funds(msg),
            GatewayFailure::Other(msg) => Error::gateway(msg),
        }
    }
}
