use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Money;

/// Immutable once referenced by any active subscription (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub price: Money,
    pub billing_cycle_days: i64,
    pub trial_period_days: i64,
    pub max_retries: u32,
    pub active: bool,
}

impl Plan {
    pub fn has_trial(&self) -> bool {
        self.trial_period_days > 0
    }
}
