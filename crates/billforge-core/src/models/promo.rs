use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Read-only during application; `used_count` is incremented exactly once
/// per successful application (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoCode {
    pub code: String,
    pub discount: Discount,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub max_uses: Option<u32>,
    pub used_count: u32,
    pub plan_allow_list: Option<Vec<Uuid>>,
    pub users_applied: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Discount {
    Percentage(Decimal),
    Fixed(Decimal),
}

impl PromoCode {
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        self.valid_from <= now && now <= self.valid_to
    }

    pub fn has_uses_remaining(&self) -> bool {
        self.max_uses.map(|max| self.used_count < max).unwrap_or(true)
    }

    pub fn allows_plan(&self, plan_id: Uuid) -> bool {
        self.plan_allow_list
            .as_ref()
            .map(|allowed| allowed.contains(&plan_id))
            .unwrap_or(true)
    }

    pub fn already_used_by(&self, user_id: Uuid) -> bool {
        self.users_applied.contains(&user_id)
    }
}
