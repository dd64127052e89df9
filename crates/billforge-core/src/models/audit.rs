use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only; per subscription, entries are in transition order (§3, §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub action: String,
    pub old_values: serde_json::Value,
    pub new_values: serde_json::Value,
    pub actor: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        subscription_id: Uuid,
        action: impl Into<String>,
        old_values: serde_json::Value,
        new_values: serde_json::Value,
        actor: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subscription_id,
            action: action.into(),
            old_values,
            new_values,
            actor: actor.into(),
            created_at: now,
        }
    }
}
