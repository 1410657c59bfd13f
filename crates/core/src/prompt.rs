//! `SystemPromptResolver` (spec.md §4.3) — hierarchical system-prompt
//! concatenation across user input, project, chat, and selected skills.
//!
//! Pure composition over the read-only external collaborators
//! (`ChatStore`, `ProjectStore`, `DocumentStore`, `SkillStore`); grounded
//! on the config-layering pattern in the teacher's
//! `crates/domain/src/config/mod.rs` (several optional sources merged in a
//! fixed precedence order), here applied to prompt text instead of config
//! values.

use std::sync::Arc;

use turnengine_store::{ChatStore, DocumentStore, ProjectStore, SkillStore};

pub struct SystemPromptResolver {
    chats: Arc<dyn ChatStore>,
    projects: Arc<dyn ProjectStore>,
    documents: Arc<dyn DocumentStore>,
    skills: Arc<dyn SkillStore>,
}

impl SystemPromptResolver {
    pub fn new(
        chats: Arc<dyn ChatStore>,
        projects: Arc<dyn ProjectStore>,
        documents: Arc<dyn DocumentStore>,
        skills: Arc<dyn SkillStore>,
    ) -> Self {
        Self {
            chats,
            projects,
            documents,
            skills,
        }
    }

    /// Resolve the effective system prompt for a turn. `chat_id` absent
    /// means a cold-start new chat (§4.3: "return the user-provided string
    /// or nothing").
    pub async fn resolve(
        &self,
        chat_id: Option<uuid::Uuid>,
        user_id: uuid::Uuid,
        user_provided: Option<&str>,
        selected_skills: &[String],
    ) -> Option<String> {
        let Some(chat_id) = chat_id else {
            return user_provided
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
        };

        let mut parts = Vec::new();

        if let Some(s) = user_provided.map(str::trim).filter(|s| !s.is_empty()) {
            parts.push(s.to_string());
        }

        if let Ok(chat) = self.chats.get_chat(chat_id, user_id).await {
            if let Some(project_id) = chat.project_id {
                if let Ok(Some(project_prompt)) = self.projects.get_project_system_prompt(project_id).await {
                    if !project_prompt.trim().is_empty() {
                        parts.push(project_prompt);
                    }
                }
            }
            if let Some(chat_prompt) = chat.system_prompt.filter(|s| !s.trim().is_empty()) {
                parts.push(chat_prompt);
            }
        }

        let mut skill_blocks = Vec::new();
        for skill in selected_skills {
            let path = self.skills.skill_document_path(skill);
            match self.documents.get_document_by_path(&path).await {
                Ok(content) => skill_blocks.push(format!("```{path}\n{content}\n```")),
                Err(e) => {
                    tracing::warn!(skill = %skill, path = %path, error = %e, "skipping skill: document fetch failed");
                }
            }
        }

        let any_skill_content = !skill_blocks.is_empty();
        parts.extend(skill_blocks);

        if any_skill_content {
            parts.insert(
                0,
                "Further skill-scoped files can be traversed using your tools.".to_string(),
            );
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use turnengine_domain::chat::Chat;
    use turnengine_store::{InMemoryChatStore, InMemoryDocumentStore, InMemoryProjectStore, InMemorySkillStore};

    fn resolver() -> (
        SystemPromptResolver,
        Arc<InMemoryChatStore>,
        Arc<InMemoryProjectStore>,
        Arc<InMemoryDocumentStore>,
    ) {
        let chats = Arc::new(InMemoryChatStore::new());
        let projects = Arc::new(InMemoryProjectStore::new());
        let documents = Arc::new(InMemoryDocumentStore::new());
        let skills = Arc::new(InMemorySkillStore::new());
        let resolver = SystemPromptResolver::new(chats.clone(), projects.clone(), documents.clone(), skills);
        (resolver, chats, projects, documents)
    }

    #[tokio::test]
    async fn cold_start_returns_user_provided_only() {
        let (resolver, _chats, _projects, _documents) = resolver();
        let result = resolver.resolve(None, uuid::Uuid::new_v4(), Some("be terse"), &[]).await;
        assert_eq!(result.as_deref(), Some("be terse"));
    }

    #[tokio::test]
    async fn cold_start_with_no_input_returns_none() {
        let (resolver, _chats, _projects, _documents) = resolver();
        let result = resolver.resolve(None, uuid::Uuid::new_v4(), None, &[]).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn assembles_project_and_chat_prompts_in_order() {
        let (resolver, chats, projects, _documents) = resolver();
        let user_id = uuid::Uuid::new_v4();
        let project_id = uuid::Uuid::new_v4();
        projects.seed(project_id, "project rules");

        let chat = Chat {
            id: uuid::Uuid::new_v4(),
            project_id: Some(project_id),
            user_id,
            title: "t".into(),
            last_viewed_turn_id: None,
            system_prompt: Some("chat rules".into()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };
        let chat_id = chat.id;
        chats.seed(chat);

        let result = resolver.resolve(Some(chat_id), user_id, Some("user rules"), &[]).await.unwrap();
        assert_eq!(result, "user rules\n\nproject rules\n\nchat rules");
    }

    #[tokio::test]
    async fn failed_skill_lookup_is_skipped_not_fatal() {
        let (resolver, chats, _projects, documents) = resolver();
        let user_id = uuid::Uuid::new_v4();
        let chat = Chat {
            id: uuid::Uuid::new_v4(),
            project_id: None,
            user_id,
            title: "t".into(),
            last_viewed_turn_id: None,
            system_prompt: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };
        let chat_id = chat.id;
        chats.seed(chat);
        documents.seed_path(".skills/research/SKILL", "# research");

        let result = resolver
            .resolve(Some(chat_id), user_id, None, &["research".to_string(), "missing".to_string()])
            .await
            .unwrap();

        assert!(result.to_lowercase().contains("further skill-scoped files"));
        assert!(result.contains("# research"));
        assert!(!result.contains("missing"));
    }
}
