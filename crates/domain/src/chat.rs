//! `Chat` (spec.md §3). Read-only from the core's perspective — the
//! relational document/folder/chat subsystem that owns writes to this
//! entity is an out-of-scope external collaborator (spec.md §1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: uuid::Uuid,
    pub project_id: Option<uuid::Uuid>,
    pub user_id: uuid::Uuid,
    pub title: String,
    #[serde(default)]
    pub last_viewed_turn_id: Option<uuid::Uuid>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Chat {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
