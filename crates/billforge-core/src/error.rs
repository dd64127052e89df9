use std::fmt;

/// Crate-wide error type.
#[derive(Debug)]
pub enum Error {
    /// The referenced entity does not exist.
    NotFound(String),

    /// Malformed arguments or a violated precondition.
    InvalidInput(String),

    /// Subscription create attempted while a non-terminal one already exists.
    AlreadyActive(String),

    /// The gateway reported a funds-related failure.
    InsufficientFunds(String),

    /// Any other gateway failure: timeout, protocol, unknown reason.
    PaymentGatewayError(String),

    /// The per-subscription lock is held elsewhere.
    LockUnavailable(String),

    /// Invariant violation or persistence failure. The operation must not
    /// leave entities half-applied.
    Internal(String),

    /// Configuration errors encountered loading or validating `Config`.
    Config(String),

    /// Outbound HTTP/network errors (gateway calls).
    Network(String),

    /// Serialization errors.
    Serialization(serde_json::Error),

    /// IO errors.
    Io(std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(msg) => write!(f, "not found: {}", msg),
            Error::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            Error::AlreadyActive(msg) => write!(f, "already active: {}", msg),
            Error::InsufficientFunds(msg) => write!(f, "insufficient funds: {}", msg),
            Error::PaymentGatewayError(msg) => write!(f, "payment gateway error: {}", msg),
            Error::LockUnavailable(msg) => write!(f, "lock unavailable: {}", msg),
            Error::Internal(msg) => write!(f, "internal error: {}", msg),
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
            Error::Network(msg) => write!(f, "network error: {}", msg),
            Error::Serialization(e) => write!(f, "serialization error: {}", e),
            Error::Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Serialization(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Serialization(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::Io(error)
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::Config(error.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Error::Network(error.to_string())
    }
}

impl From<uuid::Error> for Error {
    fn from(error: uuid::Error) -> Self {
        Error::InvalidInput(format!("invalid uuid: {}", error))
    }
}

impl Error {
    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn invalid_input<T: Into<String>>(msg: T) -> Self {
        Error::InvalidInput(msg.into())
    }

    pub fn already_active<T: Into<String>>(msg: T) -> Self {
        Error::AlreadyActive(msg.into())
    }

    pub fn insufficient_funds<T: Into<String>>(msg: T) -> Self {
        Error::InsufficientFunds(msg.into())
    }

    pub fn gateway<T: Into<String>>(msg: T) -> Self {
        Error::PaymentGatewayError(msg.into())
    }

    pub fn lock_unavailable<T: Into<String>>(msg: T) -> Self {
        Error::LockUnavailable(msg.into())
    }

    pub fn internal<T: Into<String>>(msg: T) -> Self {
        Error::Internal(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        Error::Config(msg.into())
    }

    /// HTTP status code for the thin API layer.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound(_) => 404,
            Error::InvalidInput(_) => 400,
            Error::AlreadyActive(_) => 400,
            Error::InsufficientFunds(_) => 402,
            Error::PaymentGatewayError(_) => 502,
            Error::LockUnavailable(_) => 409,
            Error::Internal(_) => 500,
            Error::Config(_) => 500,
            Error::Network(_) => 503,
            Error::Serialization(_) => 500,
            Error::Io(_) => 500,
        }
    }

    /// Category tag for structured logging.
    pub fn category(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::InvalidInput(_) => "invalid_input",
            Error::AlreadyActive(_) => "already_active",
            Error::InsufficientFunds(_) => "insufficient_funds",
            Error::PaymentGatewayError(_) => "payment_gateway_error",
            Error::LockUnavailable(_) => "lock_unavailable",
            Error::Internal(_) => "internal",
            Error::Config(_) => "config",
            Error::Network(_) => "network",
            Error::Serialization(_) => "serialization",
            Error::Io(_) => "io",
        }
    }
}
