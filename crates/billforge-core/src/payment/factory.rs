use std::sync::Arc;

use crate::config::{Config, PaymentGatewayKind};
use crate::error::Error;

use super::{MockGateway, PaymentGateway, RealGateway};

/// Maps the configured tag to a concrete gateway. Unknown tags fail
/// construction rather than falling back to a default (§4.2, §9).
pub fn build_gateway(config: &Config) -> Result<Arc<dyn PaymentGateway>, Error> {
    match config.payment_gateway {
        PaymentGatewayKind::Mock => Ok(Arc::new(MockGateway::new(config.payment_success_rate))),
        PaymentGatewayKind::Yoomoney => {
            let base_url = std::env::var("GATEWAY_BASE_URL")
                .map_err(|_| Error::config("GATEWAY_BASE_URL is required for the yoomoney gateway"))?;
            let username = std::env::var("GATEWAY_USERNAME")
                .map_err(|_| Error::config("GATEWAY_USERNAME is required for the yoomoney gateway"))?;
            let password = std::env::var("GATEWAY_PASSWORD")
                .map_err(|_| Error::config("GATEWAY_PASSWORD is required for the yoomoney gateway"))?;
            let webhook_secret = std::env::var("GATEWAY_WEBHOOK_SECRET").map_err(|_| {
                Error::config("GATEWAY_WEBHOOK_SECRET is required for the yoomoney gateway")
            })?;
            Ok(Arc::new(RealGateway::new(base_url, username, password, webhook_secret)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            database_url: "postgres://localhost/billforge".into(),
            db_pool_size: 20,
            db_max_overflow: 10,
            payment_gateway: PaymentGatewayKind::Mock,
            payment_success_rate: 0.95,
            secret_key: "secret".into(),
            access_token_expire_minutes: 30,
            scheduler_max_workers: 10,
            billing_hour: 2,
            billing_minute: 0,
            max_payment_retries: 3,
            retry_delay_days: vec![1, 3, 7],
            server_host: "0.0.0.0".into(),
            server_port: 8080,
        }
    }

    #[test]
    fn builds_mock_gateway_without_extra_env() {
        let gateway = build_gateway(&base_config()).unwrap();
        assert_eq!(gateway.id(), "mock");
    }
}
