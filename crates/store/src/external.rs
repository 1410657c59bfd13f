//! In-process stand-ins for the read-only external collaborators named in
//! spec.md §1 (`ChatStore`, `ProjectStore`, `DocumentStore`, `SkillStore`)
//! — the relational document/folder/chat subsystem is explicitly out of
//! scope; these exist so the engine is exercisable standalone.
//!
//! Grounded on the `parking_lot::RwLock<HashMap<..>>` idiom the teacher
//! uses throughout its store layer (e.g. `crates/sessions/src/store.rs`),
//! here simplified to plain maps with no persistence — these are reference
//! data the owning product would actually serve, not state this engine
//! writes.

use std::collections::HashMap;

use parking_lot::RwLock;
use uuid::Uuid;

use turnengine_domain::chat::Chat;
use turnengine_domain::error::{Error, Result};

use crate::traits::{ChatStore, DocumentStore, ProjectStore, SkillStore};

#[derive(Default)]
pub struct InMemoryChatStore {
    chats: RwLock<HashMap<Uuid, Chat>>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, chat: Chat) {
        self.chats.write().insert(chat.id, chat);
    }
}

#[async_trait::async_trait]
impl ChatStore for InMemoryChatStore {
    async fn get_chat(&self, chat_id: Uuid, user_id: Uuid) -> Result<Chat> {
        let chat = self
            .chats
            .read()
            .get(&chat_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("chat {chat_id} not found")))?;
        if chat.user_id != user_id {
            return Err(Error::not_found(format!("chat {chat_id} not found")));
        }
        Ok(chat)
    }

    async fn validate_chat(&self, chat_id: Uuid, user_id: Uuid) -> Result<()> {
        let chat = self.get_chat(chat_id, user_id).await?;
        if chat.is_deleted() {
            return Err(Error::not_found(format!("chat {chat_id} not found")));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryProjectStore {
    system_prompts: RwLock<HashMap<Uuid, String>>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, project_id: Uuid, system_prompt: impl Into<String>) {
        self.system_prompts.write().insert(project_id, system_prompt.into());
    }
}

#[async_trait::async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn get_project_system_prompt(&self, project_id: Uuid) -> Result<Option<String>> {
        Ok(self.system_prompts.read().get(&project_id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryDocumentStore {
    by_id: RwLock<HashMap<String, String>>,
    by_path: RwLock<HashMap<String, String>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document addressable by id (used by the `doc_view` tool).
    pub fn seed(&self, document_id: impl Into<String>, content: impl Into<String>) {
        self.by_id.write().insert(document_id.into(), content.into());
    }

    /// Seed a document addressable by path (used for `.skills/<skill>/SKILL`
    /// lookups in §4.3).
    pub fn seed_path(&self, path: impl Into<String>, content: impl Into<String>) {
        self.by_path.write().insert(path.into(), content.into());
    }
}

#[async_trait::async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_document_by_path(&self, path: &str) -> Result<String> {
        self.by_path
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("document at path '{path}' not found")))
    }

    async fn get_document(&self, document_id: &str) -> Result<String> {
        self.by_id
            .read()
            .get(document_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("document '{document_id}' not found")))
    }
}

/// The default `skill_document_path` mapping is sufficient here; there is
/// no additional state to track.
#[derive(Default)]
pub struct InMemorySkillStore;

impl InMemorySkillStore {
    pub fn new() -> Self {
        Self
    }
}

impl SkillStore for InMemorySkillStore {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn chat(user_id: Uuid) -> Chat {
        Chat {
            id: Uuid::new_v4(),
            project_id: None,
            user_id,
            title: "test chat".into(),
            last_viewed_turn_id: None,
            system_prompt: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn validate_chat_rejects_other_users() {
        let store = InMemoryChatStore::new();
        let owner = Uuid::new_v4();
        let c = chat(owner);
        let chat_id = c.id;
        store.seed(c);

        assert!(store.validate_chat(chat_id, owner).await.is_ok());
        assert!(store.validate_chat(chat_id, Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn validate_chat_rejects_soft_deleted() {
        let store = InMemoryChatStore::new();
        let owner = Uuid::new_v4();
        let mut c = chat(owner);
        c.deleted_at = Some(Utc::now());
        let chat_id = c.id;
        store.seed(c);

        assert!(store.validate_chat(chat_id, owner).await.is_err());
    }

    #[tokio::test]
    async fn document_lookup_by_path_and_id() {
        let store = InMemoryDocumentStore::new();
        store.seed("doc-1", "hello");
        store.seed_path(".skills/research/SKILL", "# research skill");

        assert_eq!(store.get_document("doc-1").await.unwrap(), "hello");
        assert_eq!(
            store.get_document_by_path(".skills/research/SKILL").await.unwrap(),
            "# research skill"
        );
        assert!(store.get_document("missing").await.is_err());
    }
}
