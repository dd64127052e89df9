use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Currency;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Manager,
    User,
}

/// Owns PaymentMethods, Subscriptions, and Transactions; created externally,
/// referenced by the core (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub balance: Decimal,
    pub balance_currency: Currency,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// `balance >= 0` is an invariant of the data model; callers that adjust
    /// balance should check this before persisting.
    pub fn has_sufficient_balance(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }
}
