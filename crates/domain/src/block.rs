//! Turn blocks (spec.md §3) — content units within a turn.
//!
//! Modeled as a tagged union rather than a string `block_type` column
//! plus a loose JSON blob, per spec.md §9 "Implementations in
//! sum-type-rich languages should model roles and block types as
//! tagged unions rather than strings; string tags are used only at the
//! wire." `BlockContent` is the single source of truth for which
//! fields a block type carries; the storage layer serializes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Side that executed a tool invocation (§4.5 "Tool classification").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionSide {
    Provider,
    Backend,
}

/// Discriminant matching spec.md §3's block type table. Kept alongside
/// `BlockContent` (rather than derived from it) because it is also the
/// wire-level `block_type` string used in `block_start` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Text,
    Thinking,
    ToolUse,
    ToolResult,
    Image,
    Reference,
    PartialReference,
    WebSearchUse,
    WebSearchResult,
}

impl BlockType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Thinking => "thinking",
            Self::ToolUse => "tool_use",
            Self::ToolResult => "tool_result",
            Self::Image => "image",
            Self::Reference => "reference",
            Self::PartialReference => "partial_reference",
            Self::WebSearchUse => "web_search_use",
            Self::WebSearchResult => "web_search_result",
        }
    }

    /// `text_content` is required for exactly these two types (§3 table).
    pub fn requires_text_content(self) -> bool {
        matches!(self, Self::Text | Self::Thinking)
    }

    /// `partial` status is only ever valid for `text` blocks (§3 invariants).
    pub fn can_be_partial(self) -> bool {
        matches!(self, Self::Text)
    }
}

/// Structured `content` payload, present exactly when the block type is
/// non-textual (§3). `Text`/`Thinking` carry their payload in
/// `TurnBlock::text_content` instead and have no `BlockContent` variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockContent {
    ToolUse {
        tool_use_id: String,
        tool_name: String,
        input: serde_json::Value,
        execution_side: ExecutionSide,
    },
    ToolResult {
        tool_use_id: String,
        tool_name: String,
        is_error: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Image {
        url: String,
        mime_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        alt_text: Option<String>,
    },
    Reference {
        ref_id: String,
        ref_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        version_timestamp: Option<DateTime<Utc>>,
    },
    PartialReference {
        ref_id: String,
        selection_start: u32,
        selection_end: u32,
    },
    WebSearchUse {
        tool_use_id: String,
        #[serde(default = "web_search_tool_name")]
        tool_name: String,
        query: String,
        #[serde(default = "provider_side")]
        execution_side: ExecutionSide,
    },
    WebSearchResult {
        tool_use_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        results: Option<serde_json::Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

fn web_search_tool_name() -> String {
    "web_search".into()
}
fn provider_side() -> ExecutionSide {
    ExecutionSide::Provider
}

impl BlockContent {
    pub fn block_type(&self) -> BlockType {
        match self {
            Self::ToolUse { .. } => BlockType::ToolUse,
            Self::ToolResult { .. } => BlockType::ToolResult,
            Self::Image { .. } => BlockType::Image,
            Self::Reference { .. } => BlockType::Reference,
            Self::PartialReference { .. } => BlockType::PartialReference,
            Self::WebSearchUse { .. } => BlockType::WebSearchUse,
            Self::WebSearchResult { .. } => BlockType::WebSearchResult,
        }
    }

    /// A backend-side `tool_use`, per the classification in spec.md §4.5:
    /// routed through the local `ToolRegistry`. Provider-executed tools
    /// (e.g. native web search) are never routed locally.
    pub fn is_backend_tool_use(&self) -> bool {
        matches!(
            self,
            Self::ToolUse { execution_side: ExecutionSide::Backend, .. }
        )
    }

    pub fn tool_use_id(&self) -> Option<&str> {
        match self {
            Self::ToolUse { tool_use_id, .. }
            | Self::ToolResult { tool_use_id, .. }
            | Self::WebSearchUse { tool_use_id, .. }
            | Self::WebSearchResult { tool_use_id, .. } => Some(tool_use_id),
            _ => None,
        }
    }
}

/// Persisted/in-flight status of a single block (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    Complete,
    /// Only valid for `text` blocks, and only when the parent turn ends
    /// in `error` (spec.md §3, §4.2 error handling).
    Partial,
}

/// One content unit within a turn (spec.md §3 `TurnBlock`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnBlock {
    pub turn_id: uuid::Uuid,
    /// Turn-level sequence; zero-based contiguous once the turn is
    /// complete (§3 invariants, §4.2 "Sequence remapping").
    pub sequence: u32,
    pub block_type: BlockType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<BlockContent>,
    pub status: BlockStatus,
    pub created_at: DateTime<Utc>,
}

impl TurnBlock {
    pub fn new_text(
        turn_id: uuid::Uuid,
        sequence: u32,
        text: impl Into<String>,
        status: BlockStatus,
    ) -> Self {
        Self {
            turn_id,
            sequence,
            block_type: BlockType::Text,
            text_content: Some(text.into()),
            content: None,
            status,
            created_at: Utc::now(),
        }
    }

    pub fn new_thinking(
        turn_id: uuid::Uuid,
        sequence: u32,
        text: impl Into<String>,
    ) -> Self {
        Self {
            turn_id,
            sequence,
            block_type: BlockType::Thinking,
            text_content: Some(text.into()),
            content: None,
            status: BlockStatus::Complete,
            created_at: Utc::now(),
        }
    }

    pub fn new_structured(
        turn_id: uuid::Uuid,
        sequence: u32,
        content: BlockContent,
    ) -> Self {
        Self {
            turn_id,
            sequence,
            block_type: content.block_type(),
            text_content: None,
            content: Some(content),
            status: BlockStatus::Complete,
            created_at: Utc::now(),
        }
    }

    /// Validate the §3 per-type field obligations. Used both for
    /// client-submitted blocks (TurnService) and as an internal sanity
    /// check before persistence.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::Error;

        if self.block_type.requires_text_content() {
            if self.text_content.as_deref().unwrap_or("").is_empty()
                && self.status != BlockStatus::Partial
            {
                return Err(Error::validation(format!(
                    "{} blocks require non-empty text_content",
                    self.block_type.as_str()
                )));
            }
            if self.content.is_some() {
                return Err(Error::validation(format!(
                    "{} blocks must not carry structured content",
                    self.block_type.as_str()
                )));
            }
        } else {
            if self.content.is_none() {
                return Err(Error::validation(format!(
                    "{} blocks require structured content",
                    self.block_type.as_str()
                )));
            }
            if let Some(content) = &self.content {
                if content.block_type() != self.block_type {
                    return Err(Error::validation(
                        "content kind does not match block_type".into(),
                    ));
                }
            }
        }

        if self.status == BlockStatus::Partial && !self.block_type.can_be_partial() {
            return Err(Error::validation(
                "partial status is only valid for text blocks".into(),
            ));
        }

        Ok(())
    }
}

/// A block stripped of turn-local bookkeeping (`turn_id`, `sequence`,
/// `status`, `created_at`) — the shape `MessageBuilder` (§4.6) hands to
/// providers, and the shape a `Provider` hands back for a freshly
/// completed block before the executor knows its turn-level sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBlock {
    pub block_type: BlockType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<BlockContent>,
}

impl From<&TurnBlock> for ContentBlock {
    fn from(b: &TurnBlock) -> Self {
        Self {
            block_type: b.block_type,
            text_content: b.text_content.clone(),
            content: b.content.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_block_requires_text_content() {
        let block = TurnBlock {
            text_content: None,
            ..TurnBlock::new_text(uuid::Uuid::new_v4(), 0, "", BlockStatus::Complete)
        };
        assert!(block.validate().is_err());
    }

    #[test]
    fn partial_status_rejected_for_tool_use() {
        let mut block = TurnBlock::new_structured(
            uuid::Uuid::new_v4(),
            0,
            BlockContent::ToolUse {
                tool_use_id: "u1".into(),
                tool_name: "doc_view".into(),
                input: serde_json::json!({}),
                execution_side: ExecutionSide::Backend,
            },
        );
        block.status = BlockStatus::Partial;
        assert!(block.validate().is_err());
    }

    #[test]
    fn backend_tool_use_is_classified_correctly() {
        let backend = BlockContent::ToolUse {
            tool_use_id: "u1".into(),
            tool_name: "doc_view".into(),
            input: serde_json::json!({}),
            execution_side: ExecutionSide::Backend,
        };
        assert!(backend.is_backend_tool_use());

        let provider = BlockContent::WebSearchUse {
            tool_use_id: "u2".into(),
            tool_name: "web_search".into(),
            query: "rust".into(),
            execution_side: ExecutionSide::Provider,
        };
        assert!(!provider.is_backend_tool_use());
    }
}
