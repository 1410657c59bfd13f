//! `Turn` (spec.md §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Complete,
    Streaming,
    Error,
}

/// Request parameters carried on an assistant turn (model, sampling
/// knobs, resolved system prompt, tool defs). Kept as a loosely typed
/// bag since provider-specific fields vary; `model`/`provider`/`system`
/// are pulled out because TurnService and the executor need to read
/// and rewrite them directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestParams {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub thinking: Option<bool>,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub tools: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: uuid::Uuid,
    pub chat_id: uuid::Uuid,
    #[serde(default)]
    pub prev_turn_id: Option<uuid::Uuid>,
    pub role: Role,
    pub status: TurnStatus,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub request_params: Option<RequestParams>,
    #[serde(default)]
    pub input_tokens: Option<u32>,
    #[serde(default)]
    pub output_tokens: Option<u32>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub response_metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Turn {
    pub fn new_user(chat_id: uuid::Uuid, prev_turn_id: Option<uuid::Uuid>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            chat_id,
            prev_turn_id,
            role: Role::User,
            status: TurnStatus::Complete,
            model: None,
            request_params: None,
            input_tokens: None,
            output_tokens: None,
            stop_reason: None,
            error: None,
            response_metadata: None,
            created_at: Utc::now(),
            completed_at: Some(Utc::now()),
        }
    }

    pub fn new_assistant(
        chat_id: uuid::Uuid,
        prev_turn_id: uuid::Uuid,
        model: String,
        request_params: RequestParams,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            chat_id,
            prev_turn_id: Some(prev_turn_id),
            role: Role::Assistant,
            status: TurnStatus::Streaming,
            model: Some(model),
            request_params: Some(request_params),
            input_tokens: None,
            output_tokens: None,
            stop_reason: None,
            error: None,
            response_metadata: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// True once the turn has reached one of its two terminal states
    /// (§3 invariant 1: `completed_at` set exactly once thereafter).
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TurnStatus::Complete | TurnStatus::Error)
    }
}
