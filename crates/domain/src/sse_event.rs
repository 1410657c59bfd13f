//! Client-facing SSE event types (spec.md §6 "SSE event types and
//! payload shapes"). Grounded on the teacher's `TurnEvent`
//! (`crates/gateway/src/runtime/turn.rs`) — same `#[serde(tag =
//! "type")]` + per-variant `rename` shape, reworked to this spec's
//! block-indexed event set.

use serde::{Deserialize, Serialize};

/// Wire event sent down the per-turn SSE channel.
///
/// `block_index` is always the turn-level sequence (after remapping),
/// per spec.md §6: "Clients thus see a single monotonic sequence space
/// even across tool continuations."
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SseEvent {
    TurnStart {
        turn_id: uuid::Uuid,
        model: String,
    },
    BlockStart {
        block_index: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        block_type: Option<String>,
    },
    BlockDelta {
        block_index: u32,
        delta_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        text_delta: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        signature_delta: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        json_delta: Option<serde_json::Value>,
    },
    BlockStop {
        block_index: u32,
    },
    TurnComplete {
        turn_id: uuid::Uuid,
        stop_reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        input_tokens: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        output_tokens: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        response_metadata: Option<serde_json::Value>,
    },
    TurnError {
        turn_id: uuid::Uuid,
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_block_index: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_cancelled: Option<bool>,
    },
}

impl SseEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::TurnStart { .. } => "turn_start",
            Self::BlockStart { .. } => "block_start",
            Self::BlockDelta { .. } => "block_delta",
            Self::BlockStop { .. } => "block_stop",
            Self::TurnComplete { .. } => "turn_complete",
            Self::TurnError { .. } => "turn_error",
        }
    }

    /// Terminal events end the live portion of a stream (§4.4 "On
    /// terminal events... the stream is marked finished").
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TurnComplete { .. } | Self::TurnError { .. })
    }
}
