//! Repository contracts the core depends on but does not implement
//! (spec.md §4.7, §1 "Out of scope... external collaborators").
//!
//! Grounded on the read/write split and per-entity method shape of the
//! teacher's `RunStore` (`crates/gateway/src/runtime/runs.rs`) and
//! `SessionStore` (`crates/sessions/src/store.rs`), narrowed to the
//! Turn/TurnBlock/Chat/Project/Document/Skill operations this spec names.

use turnengine_domain::chat::Chat;
use turnengine_domain::error::Result;
use turnengine_domain::turn::{Turn, TurnStatus};

use turnengine_domain::block::TurnBlock;

/// Fields updated on a completed or errored assistant turn (§4.7
/// `UpdateTurnMetadata`).
#[derive(Debug, Clone, Default)]
pub struct TurnMetadataUpdate {
    pub model: Option<String>,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub stop_reason: Option<String>,
    pub response_metadata: Option<serde_json::Value>,
}

/// Write capabilities the core needs on `Turn`/`TurnBlock` rows (§4.7
/// `TurnWriter`).
#[async_trait::async_trait]
pub trait TurnWriter: Send + Sync {
    /// Insert a single turn row. Fails if `prev_turn_id` references no
    /// existing turn in the same chat.
    async fn create_turn(&self, turn: Turn) -> Result<()>;

    /// Insert a single block row. Fails if `(turn_id, sequence)` collides.
    async fn create_turn_block(&self, block: TurnBlock) -> Result<()>;

    /// Batch variant of [`Self::create_turn_block`], preserving order.
    async fn create_turn_blocks(&self, blocks: Vec<TurnBlock>) -> Result<()>;

    /// Insert or replace a `text` block at `(turn_id, sequence)` with
    /// `status=partial` (§4.2 error-path partial text persistence).
    async fn upsert_partial_text_block(&self, block: TurnBlock) -> Result<()>;

    async fn update_turn_status(
        &self,
        turn_id: uuid::Uuid,
        status: TurnStatus,
        completed_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<()>;

    /// Sets `status=error` and the `error` field.
    async fn update_turn_error(&self, turn_id: uuid::Uuid, error_msg: String) -> Result<()>;

    async fn update_turn_metadata(
        &self,
        turn_id: uuid::Uuid,
        fields: TurnMetadataUpdate,
    ) -> Result<()>;

    /// Atomically inserts the user turn, its blocks (in order, sequence
    /// `0..n-1`), and the placeholder assistant turn (§4.1 "Atomic
    /// write... If any step fails, both turns roll back"). This is the
    /// one multi-row transaction the core requires.
    async fn create_initial_exchange(
        &self,
        user_turn: Turn,
        user_blocks: Vec<TurnBlock>,
        assistant_turn: Turn,
    ) -> Result<()>;
}

/// Read capabilities on `Turn`/`TurnBlock` rows (§4.7 `TurnReader`).
#[async_trait::async_trait]
pub trait TurnReader: Send + Sync {
    async fn get_turn(&self, id: uuid::Uuid) -> Result<Turn>;

    /// Blocks for one turn, ordered by `sequence`.
    async fn get_turn_blocks(&self, turn_id: uuid::Uuid) -> Result<Vec<TurnBlock>>;

    /// Batch variant of [`Self::get_turn_blocks`].
    async fn get_turn_blocks_for_turns(
        &self,
        turn_ids: &[uuid::Uuid],
    ) -> Result<std::collections::HashMap<uuid::Uuid, Vec<TurnBlock>>>;
}

/// Pagination direction for [`TurnNavigator::get_paginated_turns`] (§4.7:
/// "`both` splitting the limit asymmetrically 25% before / 75% after").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationDirection {
    Before,
    After,
    Both,
}

/// A page of turns plus the total number available in the requested
/// direction(s), so HTTP callers can report `{items, total}` (§6).
#[derive(Debug, Clone)]
pub struct PaginatedTurns {
    pub turns: Vec<Turn>,
    pub total: usize,
}

/// Conversation-graph traversal (§4.7 `TurnNavigator`).
#[async_trait::async_trait]
pub trait TurnNavigator: Send + Sync {
    /// Root-to-`id` sequence of turns, following `prev_turn_id` links.
    async fn get_turn_path(&self, id: uuid::Uuid) -> Result<Vec<Turn>>;

    async fn get_paginated_turns(
        &self,
        chat_id: uuid::Uuid,
        user_id: uuid::Uuid,
        from_turn_id: Option<uuid::Uuid>,
        limit: usize,
        direction: PaginationDirection,
    ) -> Result<PaginatedTurns>;
}

/// Read-only chat lookups (§4.7 `ChatStore`, §1 "read-only from the
/// core's perspective").
#[async_trait::async_trait]
pub trait ChatStore: Send + Sync {
    async fn get_chat(&self, chat_id: uuid::Uuid, user_id: uuid::Uuid) -> Result<Chat>;

    /// Fails on missing or soft-deleted chats (§4.7).
    async fn validate_chat(&self, chat_id: uuid::Uuid, user_id: uuid::Uuid) -> Result<()>;
}

/// Read-only project lookups, used only for `project.system_prompt`
/// resolution (§4.3).
#[async_trait::async_trait]
pub trait ProjectStore: Send + Sync {
    async fn get_project_system_prompt(&self, project_id: uuid::Uuid) -> Result<Option<String>>;
}

/// Read-only document lookups, used both by `SystemPromptResolver` (to
/// fetch `.skills/<skill>/SKILL` documents) and by the example `doc_view`
/// tool (spec.md §1 "document/folder... surfaced through DocumentStore").
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document_by_path(&self, path: &str) -> Result<String>;

    async fn get_document(&self, document_id: &str) -> Result<String>;
}

/// Read-only skill name → document path resolution (§4.3 step 4).
#[async_trait::async_trait]
pub trait SkillStore: Send + Sync {
    /// The document path backing a named skill, conventionally
    /// `.skills/<skill>/SKILL`.
    fn skill_document_path(&self, skill: &str) -> String {
        format!(".skills/{skill}/SKILL")
    }
}
