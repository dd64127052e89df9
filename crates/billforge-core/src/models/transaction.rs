use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Initial,
    Renewal,
    Upgrade,
    Refund,
    Manual,
}

/// `status = completed` implies a non-empty `gateway_reference` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub amount: Money,
    pub status: TransactionStatus,
    pub transaction_type: TransactionType,
    pub gateway: String,
    pub gateway_reference: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn pending(
        id: Uuid,
        user_id: Uuid,
        subscription_id: Option<Uuid>,
        amount: Money,
        transaction_type: TransactionType,
        gateway: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, Error> {
        if amount.is_zero() {
            return Err(Error::invalid_input("transaction amount must be non-zero"));
        }
        Ok(Self {
            id,
            user_id,
            subscription_id,
            amount,
            status: TransactionStatus::Pending,
            transaction_type,
            gateway: gateway.to_string(),
            gateway_reference: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn mark_completed(&mut self, gateway_reference: String, now: DateTime<Utc>) {
        self.status = TransactionStatus::Completed;
        self.gateway_reference = Some(gateway_reference);
        self.updated_at = now;
    }

    pub fn mark_failed(&mut self, error_message: String, now: DateTime<Utc>) {
        self.status = TransactionStatus::Failed;
        self.error_message = Some(error_message);
        self.updated_at = now;
    }
}
