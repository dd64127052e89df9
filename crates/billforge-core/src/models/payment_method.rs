use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique per (gateway, external_id) (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: Uuid,
    pub user_id: Uuid,
    pub gateway: String,
    pub external_id: String,
    pub valid: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PaymentMethod {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.valid && self.expires_at.map(|exp| exp > now).unwrap_or(true)
    }
}
