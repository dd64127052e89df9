use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;

use crate::money::Currency;

use super::{ChargeReceipt, CustomerData, GatewayFailure, PaymentGateway, RefundReceipt, RegisteredMethod};

type HmacSha256 = Hmac<Sha256>;

/// HTTP client to an external provider (§4.2). Request timeout 30s,
/// authorization via basic credentials, every request carries a unique
/// idempotency key so the provider dedupes retries.
pub struct RealGateway {
    base_url: String,
    username: String,
    password: String,
    webhook_secret: String,
    client: reqwest::Client,
}

impl RealGateway {
    pub fn new(base_url: String, username: String, password: String, webhook_secret: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client with a fixed timeout always builds");
        Self {
            base_url,
            username,
            password,
            webhook_secret,
            client,
        }
    }

    fn classify_failure(reason_code: Option<&str>, message: String) -> GatewayFailure {
        match reason_code {
            Some("insufficient_funds") => GatewayFailure::InsufficientFunds(message),
            _ => GatewayFailure::Other(message),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GatewayChargeResponse {
    ok: bool,
    reference: Option<String>,
    reason_code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayRefundResponse {
    ok: bool,
    reference: Option<String>,
    reason_code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayRegisterResponse {
    ok: bool,
    external_id: Option<String>,
    reason_code: Option<String>,
    message: Option<String>,
}

#[async_trait]
impl PaymentGateway for RealGateway {
    fn id(&self) -> &'static str {
        "yoomoney"
    }

    async fn charge(
        &self,
        amount: Decimal,
        currency: Currency,
        payment_method_id: &str,
        customer: &CustomerData,
        idempotency_key: &str,
    ) -> Result<ChargeReceipt, GatewayFailure> {
        let response = self
            .client
            .post(format!("{}/charges", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .header("Idempotency-Key", idempotency_key)
            .json(&serde_json::json!({
                "amount": amount.to_string(),
                "currency": currency.to_string(),
                "payment_method_id": payment_method_id,
                "customer_id": customer.user_id,
            }))
            .send()
            .await
            .map_err(|e| GatewayFailure::Other(format!("gateway request failed: {}", e)))?;

        let body: GatewayChargeResponse = response
            .json()
            .await
            .map_err(|e| GatewayFailure::Other(format!("gateway response decode failed: {}", e)))?;

        if body.ok {
            let reference = body
                .reference
                .ok_or_else(|| GatewayFailure::Other("gateway ok but no reference".to_string()))?;
            Ok(ChargeReceipt { gateway_reference: reference })
        } else {
            Err(Self::classify_failure(
                body.reason_code.as_deref(),
                body.message.unwrap_or_else(|| "charge declined".to_string()),
            ))
        }
    }

    async fn refund(&self, gateway_reference: &str, amount: Decimal) -> Result<RefundReceipt, GatewayFailure> {
        let response = self
            .client
            .post(format!("{}/refunds", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .json(&serde_json::json!({
                "charge_reference": gateway_reference,
                "amount": amount.to_string(),
            }))
            .send()
            .await
            .map_err(|e| GatewayFailure::Other(format!("gateway request failed: {}", e)))?;

        let body: GatewayRefundResponse = response
            .json()
            .await
            .map_err(|e| GatewayFailure::Other(format!("gateway response decode failed: {}", e)))?;

        if body.ok {
            let reference = body
                .reference
                .ok_or_else(|| GatewayFailure::Other("gateway ok but no reference".to_string()))?;
            Ok(RefundReceipt { refund_reference: reference })
        } else {
            Err(Self::classify_failure(
                body.reason_code.as_deref(),
                body.message.unwrap_or_else(|| "refund declined".to_string()),
            ))
        }
    }

    async fn register_method(
        &self,
        token: &str,
        customer: &CustomerData,
    ) -> Result<RegisteredMethod, GatewayFailure> {
        let response = self
            .client
            .post(format!("{}/payment_methods", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .json(&serde_json::json!({
                "token": token,
                "customer_id": customer.user_id,
                "email": customer.email,
            }))
            .send()
            .await
            .map_err(|e| GatewayFailure::Other(format!("gateway request failed: {}", e)))?;

        let body: GatewayRegisterResponse = response
            .json()
            .await
            .map_err(|e| GatewayFailure::Other(format!("gateway response decode failed: {}", e)))?;

        if body.ok {
            let external_id = body
                .external_id
                .ok_or_else(|| GatewayFailure::Other("gateway ok but no external_id".to_string()))?;
            Ok(RegisteredMethod { external_id })
        } else {
            Err(Self::classify_failure(
                body.reason_code.as_deref(),
                body.message.unwrap_or_else(|| "registration declined".to_string()),
            ))
        }
    }

    /// Computes HMAC-SHA256 of the payload with the shared secret and
    /// constant-time-compares against the provided signature, via the
    /// `hmac` crate's own constant-time `verify_slice` rather than a manual
    /// `==` on hex strings.
    fn verify_webhook(&self, payload: &[u8], signature: &str) -> bool {
        let Ok(signature_bytes) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(self.webhook_secret.as_bytes()) else {
            return false;
        };
        mac.update(payload);
        mac.verify_slice(&signature_bytes).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_signature_round_trips() {
        let gateway = RealGateway::new(
            "https://example.invalid".into(),
            "user".into(),
            "pass".into(),
            "shared-secret".into(),
        );
        let payload = b"{\"event\":\"charge.succeeded\"}";
        let mut mac = HmacSha256::new_from_slice(b"shared-secret").unwrap();
        mac.update(payload);
        let signature = hex::encode(mac.finalize().into_bytes());

        assert!(gateway.verify_webhook(payload, &signature));
        assert!(!gateway.verify_webhook(payload, "0000"));
    }
}
