//! Environment-driven configuration, following the load/from_env/validate
//! split used across the workspace's other services.

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Required. Connection string for the external persistence layer.
    pub database_url: String,
    #[serde(default = "default_db_pool_size")]
    pub db_pool_size: u32,
    #[serde(default = "default_db_max_overflow")]
    pub db_max_overflow: u32,

    #[serde(default)]
    pub payment_gateway: PaymentGatewayKind,
    #[serde(default = "default_payment_success_rate")]
    pub payment_success_rate: f64,

    /// Required. Signing secret for the external auth layer.
    pub secret_key: String,
    #[serde(default = "default_access_token_expire_minutes")]
    pub access_token_expire_minutes: u32,

    #[serde(default = "default_scheduler_max_workers")]
    pub scheduler_max_workers: usize,
    #[serde(default = "default_billing_hour")]
    pub billing_hour: u32,
    #[serde(default = "default_billing_minute")]
    pub billing_minute: u32,

    #[serde(default = "default_max_payment_retries")]
    pub max_payment_retries: u32,
    #[serde(default = "default_retry_delay_days")]
    pub retry_delay_days: Vec<i64>,

    #[serde(default = "default_server_host")]
    pub server_host: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentGatewayKind {
    #[default]
    Mock,
    Yoomoney,
}

impl PaymentGatewayKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentGatewayKind::Mock => "mock",
            PaymentGatewayKind::Yoomoney => "yoomoney",
        }
    }

    pub fn parse(tag: &str) -> Result<Self, Error> {
        match tag {
            "mock" => Ok(PaymentGatewayKind::Mock),
            "yoomoney" => Ok(PaymentGatewayKind::Yoomoney),
            other => Err(Error::config(format!("unknown PAYMENT_GATEWAY tag: {}", other))),
        }
    }
}

fn default_db_pool_size() -> u32 {
    20
}
fn default_db_max_overflow() -> u32 {
    10
}
fn default_payment_success_rate() -> f64 {
    0.95
}
fn default_access_token_expire_minutes() -> u32 {
    30
}
fn default_scheduler_max_workers() -> usize {
    10
}
fn default_billing_hour() -> u32 {
    2
}
fn default_billing_minute() -> u32 {
    0
}
fn default_max_payment_retries() -> u32 {
    3
}
fn default_retry_delay_days() -> Vec<i64> {
    vec![1, 3, 7]
}
fn default_server_host() -> String {
    "0.0.0.0".into()
}
fn default_server_port() -> u16 {
    8080
}

impl Config {
    /// Load configuration from environment variables, per the external
    /// interfaces contract. `DATABASE_URL` and `SECRET_KEY` are required;
    /// everything else falls back to the documented default.
    pub fn from_env() -> Result<Self, Error> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| Error::config("DATABASE_URL is required"))?;
        let secret_key =
            std::env::var("SECRET_KEY").map_err(|_| Error::config("SECRET_KEY is required"))?;

        let config = Self {
            database_url,
            db_pool_size: env_or("DB_POOL_SIZE", default_db_pool_size()),
            db_max_overflow: env_or("DB_MAX_OVERFLOW", default_db_max_overflow()),
            payment_gateway: std::env::var("PAYMENT_GATEWAY")
                .ok()
                .map(|v| PaymentGatewayKind::parse(&v))
                .transpose()?
                .unwrap_or_default(),
            payment_success_rate: env_or("PAYMENT_SUCCESS_RATE", default_payment_success_rate()),
            secret_key,
            access_token_expire_minutes: env_or(
                "ACCESS_TOKEN_EXPIRE_MINUTES",
                default_access_token_expire_minutes(),
            ),
            scheduler_max_workers: env_or("SCHEDULER_MAX_WORKERS", default_scheduler_max_workers()),
            billing_hour: env_or("BILLING_HOUR", default_billing_hour()),
            billing_minute: env_or("BILLING_MINUTE", default_billing_minute()),
            max_payment_retries: env_or("MAX_PAYMENT_RETRIES", default_max_payment_retries()),
            retry_delay_days: std::env::var("RETRY_DELAY_DAYS")
                .ok()
                .map(|v| parse_retry_delay_days(&v))
                .transpose()?
                .unwrap_or_else(default_retry_delay_days),
            server_host: std::env::var("SERVER_HOST").unwrap_or_else(|_| default_server_host()),
            server_port: env_or("SERVER_PORT", default_server_port()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, with environment variables
    /// overriding any value also present there. Used by the CLI's
    /// `--config` flag.
    pub fn load(path: &str) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read config file: {}", e)))?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.database_url.is_empty() {
            return Err(Error::config("DATABASE_URL must not be empty"));
        }
        if self.secret_key.is_empty() {
            return Err(Error::config("SECRET_KEY must not be empty"));
        }
        if self.db_pool_size == 0 {
            return Err(Error::config("DB_POOL_SIZE must be > 0"));
        }
        if self.scheduler_max_workers == 0 {
            return Err(Error::config("SCHEDULER_MAX_WORKERS must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.payment_success_rate) {
            return Err(Error::config("PAYMENT_SUCCESS_RATE must be in [0, 1]"));
        }
        if self.billing_hour > 23 {
            return Err(Error::config("BILLING_HOUR must be in 0..=23"));
        }
        if self.billing_minute > 59 {
            return Err(Error::config("BILLING_MINUTE must be in 0..=59"));
        }
        if self.max_payment_retries == 0 {
            return Err(Error::config("MAX_PAYMENT_RETRIES must be > 0"));
        }
        Ok(())
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_retry_delay_days(raw: &str) -> Result<Vec<i64>, Error> {
    raw.trim_matches(|c| c == '[' || c == ']')
        .split(',')
        .map(|s| {
            s.trim()
                .parse::<i64>()
                .map_err(|_| Error::config(format!("invalid RETRY_DELAY_DAYS entry: {}", s)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_retry_delay_days_list() {
        assert_eq!(parse_retry_delay_days("[1,3,7]").unwrap(), vec![1, 3, 7]);
        assert_eq!(parse_retry_delay_days("1, 3, 7").unwrap(), vec![1, 3, 7]);
    }

    #[test]
    fn rejects_gateway_success_rate_out_of_range() {
        let mut cfg = sample();
        cfg.payment_success_rate = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_gateway_tag_fails() {
        assert!(PaymentGatewayKind::parse("stripe").is_err());
    }

    fn sample() -> Config {
        Config {
            database_url: "postgres://localhost/billforge".into(),
            db_pool_size: 20,
            db_max_overflow: 10,
            payment_gateway: PaymentGatewayKind::Mock,
            payment_success_rate: 0.95,
            secret_key: "test-secret".into(),
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
}
