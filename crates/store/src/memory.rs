//! Reference [`TurnWriter`]/[`TurnReader`]/[`TurnNavigator`]
//! implementation: turns and blocks held in memory, indexed by ID, with an
//! append-only JSONL log for durability across restarts.
//!
//! Grounded on the teacher's `RunStore`
//! (`crates/gateway/src/runtime/runs.rs`): a `parking_lot::RwLock`-guarded
//! index plus a JSONL append log, loaded back on startup. Unlike the
//! teacher's bounded ring (`MAX_RUNS_IN_MEMORY`, old runs evicted), turn
//! history here is never evicted — conversation replay (§4.4 catchup, §6
//! pagination) needs arbitrarily old turns to stay readable, not just the
//! most recent ones for a dashboard.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use turnengine_domain::block::TurnBlock;
use turnengine_domain::error::{Error, Result};
use turnengine_domain::turn::{Turn, TurnStatus};

use crate::traits::{
    PaginatedTurns, PaginationDirection, TurnMetadataUpdate, TurnNavigator, TurnReader, TurnWriter,
};

struct Inner {
    turns: HashMap<Uuid, Turn>,
    /// Blocks per turn, kept sorted by `sequence`.
    blocks: HashMap<Uuid, Vec<TurnBlock>>,
    /// Turn IDs per chat, in creation order — the basis for pagination.
    chat_turns: HashMap<Uuid, Vec<Uuid>>,
}

impl Inner {
    fn new() -> Self {
        Self {
            turns: HashMap::new(),
            blocks: HashMap::new(),
            chat_turns: HashMap::new(),
        }
    }

    fn insert_turn(&mut self, turn: Turn) {
        self.chat_turns.entry(turn.chat_id).or_default().push(turn.id);
        self.turns.insert(turn.id, turn);
    }

    fn insert_block(&mut self, block: TurnBlock) -> Result<()> {
        let entry = self.blocks.entry(block.turn_id).or_default();
        if entry.iter().any(|b| b.sequence == block.sequence) {
            return Err(Error::conflict(format!(
                "block already exists at turn {} sequence {}",
                block.turn_id, block.sequence
            )));
        }
        entry.push(block);
        entry.sort_by_key(|b| b.sequence);
        Ok(())
    }
}

/// In-process store for `Turn`/`TurnBlock` rows.
pub struct InMemoryTurnStore {
    inner: RwLock<Inner>,
    turns_log: PathBuf,
    blocks_log: PathBuf,
}

impl InMemoryTurnStore {
    /// Opens (creating if absent) the JSONL logs under `state_dir/turns`
    /// and replays them into memory.
    pub fn open(state_dir: &Path) -> Result<Self> {
        let dir = state_dir.join("turns");
        std::fs::create_dir_all(&dir)?;

        let turns_log = dir.join("turns.jsonl");
        let blocks_log = dir.join("turn_blocks.jsonl");

        let mut inner = Inner::new();
        for line in read_lines(&turns_log)? {
            if let Ok(turn) = serde_json::from_str::<Turn>(&line) {
                inner.insert_turn(turn);
            }
        }
        for line in read_lines(&blocks_log)? {
            if let Ok(block) = serde_json::from_str::<TurnBlock>(&line) {
                let _ = inner.insert_block(block);
            }
        }

        Ok(Self {
            inner: RwLock::new(inner),
            turns_log,
            blocks_log,
        })
    }

    /// An empty store backed by a throwaway temp directory — for tests.
    pub fn in_memory_only() -> Self {
        Self {
            inner: RwLock::new(Inner::new()),
            turns_log: PathBuf::new(),
            blocks_log: PathBuf::new(),
        }
    }

    fn append_turn(&self, turn: &Turn) {
        append_jsonl(&self.turns_log, turn);
    }

    fn append_block(&self, block: &TurnBlock) {
        append_jsonl(&self.blocks_log, block);
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content.lines().map(str::to_string).collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(Error::Io(e)),
    }
}

fn append_jsonl<T: serde::Serialize>(path: &Path, value: &T) {
    if path.as_os_str().is_empty() {
        return;
    }
    if let Ok(json) = serde_json::to_string(value) {
        if let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{json}");
        }
    }
}

#[async_trait::async_trait]
impl TurnWriter for InMemoryTurnStore {
    async fn create_turn(&self, turn: Turn) -> Result<()> {
        {
            let inner = self.inner.read();
            if let Some(prev_id) = turn.prev_turn_id {
                let prev = inner
                    .turns
                    .get(&prev_id)
                    .ok_or_else(|| Error::not_found(format!("prev_turn_id {prev_id} not found")))?;
                if prev.chat_id != turn.chat_id {
                    return Err(Error::validation(
                        "prev_turn_id must reference a turn in the same chat".into(),
                    ));
                }
            }
        }
        self.append_turn(&turn);
        self.inner.write().insert_turn(turn);
        Ok(())
    }

    async fn create_turn_block(&self, block: TurnBlock) -> Result<()> {
        self.inner.write().insert_block(block.clone())?;
        self.append_block(&block);
        Ok(())
    }

    async fn create_turn_blocks(&self, blocks: Vec<TurnBlock>) -> Result<()> {
        let mut inner = self.inner.write();
        for block in &blocks {
            inner.insert_block(block.clone())?;
        }
        drop(inner);
        for block in &blocks {
            self.append_block(block);
        }
        Ok(())
    }

    async fn upsert_partial_text_block(&self, block: TurnBlock) -> Result<()> {
        let mut inner = self.inner.write();
        let entry = inner.blocks.entry(block.turn_id).or_default();
        if let Some(existing) = entry.iter_mut().find(|b| b.sequence == block.sequence) {
            *existing = block.clone();
        } else {
            entry.push(block.clone());
            entry.sort_by_key(|b| b.sequence);
        }
        drop(inner);
        self.append_block(&block);
        Ok(())
    }

    async fn update_turn_status(
        &self,
        turn_id: Uuid,
        status: TurnStatus,
        completed_at: Option<chrono::DateTime<Utc>>,
    ) -> Result<()> {
        let turn = {
            let mut inner = self.inner.write();
            let turn = inner
                .turns
                .get_mut(&turn_id)
                .ok_or_else(|| Error::not_found(format!("turn {turn_id} not found")))?;
            turn.status = status;
            if completed_at.is_some() {
                turn.completed_at = completed_at;
            }
            turn.clone()
        };
        self.append_turn(&turn);
        Ok(())
    }

    async fn update_turn_error(&self, turn_id: Uuid, error_msg: String) -> Result<()> {
        let turn = {
            let mut inner = self.inner.write();
            let turn = inner
                .turns
                .get_mut(&turn_id)
                .ok_or_else(|| Error::not_found(format!("turn {turn_id} not found")))?;
            turn.status = TurnStatus::Error;
            turn.error = Some(error_msg);
            turn.completed_at = Some(Utc::now());
            turn.clone()
        };
        self.append_turn(&turn);
        Ok(())
    }

    async fn update_turn_metadata(&self, turn_id: Uuid, fields: TurnMetadataUpdate) -> Result<()> {
        let turn = {
            let mut inner = self.inner.write();
            let turn = inner
                .turns
                .get_mut(&turn_id)
                .ok_or_else(|| Error::not_found(format!("turn {turn_id} not found")))?;
            if fields.model.is_some() {
                turn.model = fields.model;
            }
            if fields.input_tokens.is_some() {
                turn.input_tokens = fields.input_tokens;
            }
            if fields.output_tokens.is_some() {
                turn.output_tokens = fields.output_tokens;
            }
            if fields.stop_reason.is_some() {
                turn.stop_reason = fields.stop_reason;
            }
            if fields.response_metadata.is_some() {
                turn.response_metadata = fields.response_metadata;
            }
            turn.clone()
        };
        self.append_turn(&turn);
        Ok(())
    }

    async fn create_initial_exchange(
        &self,
        user_turn: Turn,
        user_blocks: Vec<TurnBlock>,
        assistant_turn: Turn,
    ) -> Result<()> {
        // Held for the whole sequence: if any step fails, nothing written
        // under this lock is observable to readers on another task, and we
        // return before persisting anything to the JSONL log (§4.1 "If any
        // step fails, both turns roll back").
        let mut inner = self.inner.write();

        if let Some(prev_id) = user_turn.prev_turn_id {
            if !inner.turns.contains_key(&prev_id) {
                return Err(Error::not_found(format!("prev_turn_id {prev_id} not found")));
            }
        }
        if assistant_turn.prev_turn_id != Some(user_turn.id) {
            return Err(Error::validation(
                "assistant turn must chain from the user turn being created".into(),
            ));
        }

        for (i, block) in user_blocks.iter().enumerate() {
            if block.sequence as usize != i {
                return Err(Error::validation(
                    "user turn blocks must be sequenced 0..n-1 in submission order".into(),
                ));
            }
        }

        inner.insert_turn(user_turn.clone());
        for block in &user_blocks {
            inner.insert_block(block.clone())?;
        }
        inner.insert_turn(assistant_turn.clone());
        drop(inner);

        self.append_turn(&user_turn);
        for block in &user_blocks {
            self.append_block(block);
        }
        self.append_turn(&assistant_turn);
        Ok(())
    }
}

#[async_trait::async_trait]
impl TurnReader for InMemoryTurnStore {
    async fn get_turn(&self, id: Uuid) -> Result<Turn> {
        self.inner
            .read()
            .turns
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("turn {id} not found")))
    }

    async fn get_turn_blocks(&self, turn_id: Uuid) -> Result<Vec<TurnBlock>> {
        Ok(self.inner.read().blocks.get(&turn_id).cloned().unwrap_or_default())
    }

    async fn get_turn_blocks_for_turns(&self, turn_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<TurnBlock>>> {
        let inner = self.inner.read();
        Ok(turn_ids
            .iter()
            .map(|id| (*id, inner.blocks.get(id).cloned().unwrap_or_default()))
            .collect())
    }
}

#[async_trait::async_trait]
impl TurnNavigator for InMemoryTurnStore {
    async fn get_turn_path(&self, id: Uuid) -> Result<Vec<Turn>> {
        let inner = self.inner.read();
        let mut path = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let turn = inner
                .turns
                .get(&current)
                .ok_or_else(|| Error::not_found(format!("turn {current} not found")))?;
            path.push(turn.clone());
            cursor = turn.prev_turn_id;
        }
        path.reverse();
        Ok(path)
    }

    async fn get_paginated_turns(
        &self,
        chat_id: Uuid,
        _user_id: Uuid,
        from_turn_id: Option<Uuid>,
        limit: usize,
        direction: PaginationDirection,
    ) -> Result<PaginatedTurns> {
        // Ownership of the chat is the caller's responsibility, verified
        // up front via `ChatStore::validate_chat` (§4.7); this trait only
        // navigates the turn graph once that's established.
        let inner = self.inner.read();
        let ids = inner.chat_turns.get(&chat_id).cloned().unwrap_or_default();
        let all: Vec<Turn> = ids
            .iter()
            .filter_map(|id| inner.turns.get(id).cloned())
            .collect();
        drop(inner);

        let pivot = match from_turn_id {
            Some(id) => all
                .iter()
                .position(|t| t.id == id)
                .ok_or_else(|| Error::not_found(format!("turn {id} not found")))?,
            None => all.len(),
        };

        let (before_limit, after_limit) = match direction {
            PaginationDirection::Before => (limit, 0),
            PaginationDirection::After => (0, limit),
            // §4.7: "direction `both` splitting the limit asymmetrically
            // 25% before / 75% after (the product favours future context
            // over history)".
            PaginationDirection::Both => {
                let before = limit / 4;
                (before, limit - before)
            }
        };

        let before_slice = &all[..pivot];
        let after_slice = &all[pivot..];

        let total = match direction {
            PaginationDirection::Before => before_slice.len(),
            PaginationDirection::After => after_slice.len(),
            PaginationDirection::Both => all.len(),
        };

        let mut turns = Vec::with_capacity(before_limit + after_limit);
        if before_limit > 0 {
            let start = before_slice.len().saturating_sub(before_limit);
            turns.extend_from_slice(&before_slice[start..]);
        }
        if after_limit > 0 {
            turns.extend(after_slice.iter().take(after_limit).cloned());
        }

        Ok(PaginatedTurns { turns, total })
    }
}

/// Convenience alias for the shared handle the rest of the workspace passes
/// around (gateway `AppState`, `TurnService`, `StreamExecutor`).
pub type SharedTurnStore = Arc<InMemoryTurnStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use turnengine_domain::block::BlockStatus;
    use turnengine_domain::turn::RequestParams;

    fn user_turn(chat_id: Uuid, prev: Option<Uuid>) -> Turn {
        Turn::new_user(chat_id, prev)
    }

    #[tokio::test]
    async fn create_initial_exchange_is_atomic_on_success() {
        let store = InMemoryTurnStore::in_memory_only();
        let chat_id = Uuid::new_v4();
        let user = user_turn(chat_id, None);
        let block = TurnBlock::new_text(user.id, 0, "hi", BlockStatus::Complete);
        let assistant = Turn::new_assistant(chat_id, user.id, "mock-small".into(), RequestParams::default());

        store
            .create_initial_exchange(user.clone(), vec![block], assistant.clone())
            .await
            .unwrap();

        assert!(store.get_turn(user.id).await.is_ok());
        assert!(store.get_turn(assistant.id).await.is_ok());
        assert_eq!(store.get_turn_blocks(user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_initial_exchange_rejects_mismatched_chain() {
        let store = InMemoryTurnStore::in_memory_only();
        let chat_id = Uuid::new_v4();
        let user = user_turn(chat_id, None);
        let other_user = user_turn(chat_id, None);
        let assistant = Turn::new_assistant(chat_id, other_user.id, "mock-small".into(), RequestParams::default());

        let result = store.create_initial_exchange(user, vec![], assistant).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn duplicate_sequence_is_a_conflict() {
        let store = InMemoryTurnStore::in_memory_only();
        let turn = user_turn(Uuid::new_v4(), None);
        store.create_turn(turn.clone()).await.unwrap();
        let b1 = TurnBlock::new_text(turn.id, 0, "a", BlockStatus::Complete);
        let b2 = TurnBlock::new_text(turn.id, 0, "b", BlockStatus::Complete);
        store.create_turn_block(b1).await.unwrap();
        assert!(store.create_turn_block(b2).await.is_err());
    }

    #[tokio::test]
    async fn turn_path_follows_prev_turn_chain() {
        let store = InMemoryTurnStore::in_memory_only();
        let chat_id = Uuid::new_v4();
        let root = user_turn(chat_id, None);
        store.create_turn(root.clone()).await.unwrap();
        let child = user_turn(chat_id, Some(root.id));
        store.create_turn(child.clone()).await.unwrap();

        let path = store.get_turn_path(child.id).await.unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path[0].id, root.id);
        assert_eq!(path[1].id, child.id);
    }

    #[tokio::test]
    async fn paginated_both_splits_25_75() {
        let store = InMemoryTurnStore::in_memory_only();
        let chat_id = Uuid::new_v4();
        let mut ids = Vec::new();
        let mut prev = None;
        for _ in 0..10 {
            let t = user_turn(chat_id, prev);
            store.create_turn(t.clone()).await.unwrap();
            prev = Some(t.id);
            ids.push(t.id);
        }

        let pivot = ids[4];
        let page = store
            .get_paginated_turns(chat_id, Uuid::new_v4(), Some(pivot), 8, PaginationDirection::Both)
            .await
            .unwrap();

        // limit 8 -> 2 before, 6 after.
        assert!(page.turns.len() <= 8);
        assert_eq!(page.total, 10);
    }
}
