//! `TurnService` (spec.md §4.1) — validates and atomically records a new
//! user/assistant turn pair, then hands the assistant turn off to a
//! background [`StreamExecutor`].
//!
//! Grounded on the pre-flight/resolve-then-commit shape of the teacher's
//! `crates/gateway/src/api/chat.rs` (`resolve_session`) and the task-spawn
//! handoff in `crates/gateway/src/runtime/turn.rs::prepare_turn_context`,
//! reshaped around spec.md §4.1's atomic two-turn create and immediate
//! `streamUrl` response.

use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;

use turnengine_domain::block::TurnBlock;
use turnengine_domain::config::TurnsConfig;
use turnengine_domain::error::{Error, Result};
use turnengine_domain::provider_event::GenerateRequest;
use turnengine_domain::turn::{RequestParams, Turn, TurnStatus};

use turnengine_providers::ProviderRegistry;
use turnengine_store::{ChatStore, DocumentStore, ProjectStore, SkillStore, TurnNavigator, TurnReader, TurnWriter};
use turnengine_stream::{Stream, StreamRegistry};
use turnengine_tools::ToolRegistry;

use crate::executor::StreamExecutor;
use crate::messages::MessageBuilder;
use crate::prompt::SystemPromptResolver;

/// Result of [`TurnService::create_turn`] (§4.1: "returns the user turn,
/// the assistant turn placeholder, and the stream URL").
pub struct CreateTurnResult {
    pub user_turn: Turn,
    pub assistant_turn: Turn,
    pub stream_url: String,
}

/// One incoming turn request (§4.1 `CreateTurn` parameters).
pub struct CreateTurnRequest {
    pub chat_id: Option<uuid::Uuid>,
    pub user_id: uuid::Uuid,
    pub prev_turn_id: Option<uuid::Uuid>,
    pub role: String,
    pub blocks: Vec<TurnBlock>,
    pub request_params: RequestParams,
    pub selected_skills: Vec<String>,
}

pub struct TurnService {
    writer: Arc<dyn TurnWriter>,
    reader: Arc<dyn TurnReader>,
    navigator: Arc<dyn TurnNavigator>,
    chats: Arc<dyn ChatStore>,
    prompt_resolver: Arc<SystemPromptResolver>,
    providers: Arc<ProviderRegistry>,
    tool_registry: Option<Arc<dyn ToolRegistry>>,
    stream_registry: Arc<StreamRegistry>,
    turns_config: TurnsConfig,
}

impl TurnService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        writer: Arc<dyn TurnWriter>,
        reader: Arc<dyn TurnReader>,
        navigator: Arc<dyn TurnNavigator>,
        chats: Arc<dyn ChatStore>,
        projects: Arc<dyn ProjectStore>,
        documents: Arc<dyn DocumentStore>,
        skills: Arc<dyn SkillStore>,
        providers: Arc<ProviderRegistry>,
        tool_registry: Option<Arc<dyn ToolRegistry>>,
        stream_registry: Arc<StreamRegistry>,
        turns_config: TurnsConfig,
    ) -> Self {
        Self {
            writer,
            reader,
            navigator,
            chats,
            prompt_resolver: Arc::new(SystemPromptResolver::new(chats, projects, documents, skills)),
            providers,
            tool_registry,
            stream_registry,
            turns_config,
        }
    }

    /// §4.1 `CreateTurn`. Validates the request, writes the user/assistant
    /// turn pair atomically, registers the assistant turn's stream, spawns
    /// the executor, and returns immediately — the caller does not wait
    /// for the turn to finish streaming.
    pub async fn create_turn(&self, req: CreateTurnRequest) -> Result<CreateTurnResult> {
        if req.role != "user" {
            return Err(Error::validation("only role=\"user\" may be submitted as a new turn"));
        }
        if req.blocks.is_empty() {
            return Err(Error::validation("a turn requires at least one block"));
        }
        for block in &req.blocks {
            block.validate()?;
        }
        if !req.request_params.tools.is_empty() && !self.turns_config.environment.allows_request_tools() {
            return Err(Error::validation(
                "request_params.tools is only accepted in dev/test environments",
            ));
        }

        let prev_turn_id = req.prev_turn_id.filter(|id| !id.is_nil());

        let chat_id = match req.chat_id {
            Some(chat_id) => {
                self.chats.validate_chat(chat_id, req.user_id).await?;
                chat_id
            }
            None => uuid::Uuid::new_v4(),
        };

        let (provider, model) = self.providers.resolve(
            req.request_params.provider.as_deref(),
            req.request_params.model.as_deref(),
        )?;

        let user_turn = Turn::new_user(chat_id, prev_turn_id);
        let user_blocks: Vec<TurnBlock> = req
            .blocks
            .into_iter()
            .enumerate()
            .map(|(i, mut block)| {
                block.turn_id = user_turn.id;
                block.sequence = i as u32;
                block
            })
            .collect();

        let system_prompt = self
            .prompt_resolver
            .resolve(
                req.chat_id,
                req.user_id,
                req.request_params.system.as_deref(),
                &req.selected_skills,
            )
            .await;

        let mut assistant_params = req.request_params;
        assistant_params.provider = Some(provider.provider_id().to_string());
        assistant_params.model = Some(model.clone());
        assistant_params.system = system_prompt.clone();

        let assistant_turn = Turn::new_assistant(chat_id, user_turn.id, model.clone(), assistant_params.clone());

        if let Err(e) = self
            .writer
            .create_initial_exchange(user_turn.clone(), user_blocks.clone(), assistant_turn.clone())
            .await
        {
            tracing::error!(chat_id = %chat_id, error = %e, "failed to persist initial turn exchange");
            return Err(e);
        }

        let stream = Arc::new(Stream::new(assistant_turn.id, self.turns_config.debug));
        self.stream_registry.register(stream.clone());

        let executor = Arc::new(StreamExecutor::new(
            assistant_turn.id,
            self.writer.clone(),
            self.reader.clone(),
            self.navigator.clone(),
            provider,
            self.tool_registry.clone(),
            stream,
            self.turns_config.max_tool_rounds,
        ));

        // §4.1 step 4: the initial request is built from the *full*
        // conversation path, not just the turn that was just submitted —
        // mirrors what `StreamExecutor::build_continuation_messages` does
        // for later tool-continuation rounds.
        let path = self.navigator.get_turn_path(user_turn.id).await?;
        let turn_ids: Vec<uuid::Uuid> = path.iter().map(|t| t.id).collect();
        let blocks_by_turn = self.reader.get_turn_blocks_for_turns(&turn_ids).await?;
        let initial_messages = MessageBuilder::build_messages(&path, &blocks_by_turn);
        let initial_request = GenerateRequest {
            model,
            messages: initial_messages,
            params: assistant_params,
        };

        let stream_registry = self.stream_registry.clone();
        let assistant_turn_id = assistant_turn.id;
        tokio::spawn(
            async move {
                executor.run(initial_request).await;
                stream_registry.mark_finished(assistant_turn_id);
            }
            .instrument(tracing::info_span!("turn_stream", turn_id = %assistant_turn_id)),
        );

        Ok(CreateTurnResult {
            stream_url: format!("/api/turns/{}/stream", assistant_turn.id),
            user_turn,
            assistant_turn,
        })
    }

    /// Background sweep of expired finished streams (§4.4). Intended to
    /// be run on an interval by the gateway's bootstrap code, not called
    /// per-request.
    pub fn sweep_expired_streams(&self) -> usize {
        self.stream_registry.sweep_expired()
    }

    pub fn stream_retention(&self) -> Duration {
        Duration::from_secs(self.turns_config.stream_retention_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnengine_domain::block::BlockStatus;
    use turnengine_providers::MockProvider;
    use turnengine_store::{InMemoryChatStore, InMemoryDocumentStore, InMemoryProjectStore, InMemorySkillStore, InMemoryTurnStore};

    fn new_service(provider_id: &str, model: &str) -> (Arc<TurnService>, Arc<InMemoryTurnStore>) {
        let store = Arc::new(InMemoryTurnStore::in_memory_only());
        let chats = Arc::new(InMemoryChatStore::new());
        let projects = Arc::new(InMemoryProjectStore::new());
        let documents = Arc::new(InMemoryDocumentStore::new());
        let skills = Arc::new(InMemorySkillStore::new());

        let mut registry = ProviderRegistry::new(provider_id, model);
        registry.register(Arc::new(MockProvider::new(provider_id, vec![model])));

        let stream_registry = Arc::new(StreamRegistry::new(Duration::from_secs(600)));

        let service = TurnService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            chats,
            projects,
            documents,
            skills,
            Arc::new(registry),
            None,
            stream_registry,
            TurnsConfig::default(),
        );
        (Arc::new(service), store)
    }

    #[tokio::test]
    async fn rejects_non_user_role() {
        let (service, _store) = new_service("mock", "mock-small");
        let result = service
            .create_turn(CreateTurnRequest {
                chat_id: None,
                user_id: uuid::Uuid::new_v4(),
                prev_turn_id: None,
                role: "assistant".into(),
                blocks: vec![TurnBlock::new_text(uuid::Uuid::nil(), 0, "hi", BlockStatus::Complete)],
                request_params: RequestParams::default(),
                selected_skills: vec![],
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn rejects_request_tools_outside_dev_test() {
        let mut params = RequestParams::default();
        params.tools = vec![serde_json::json!({"name": "x"})];

        let mut cfg = TurnsConfig::default();
        cfg.environment = turnengine_domain::config::Environment::Production;

        let store = Arc::new(InMemoryTurnStore::in_memory_only());
        let chats = Arc::new(InMemoryChatStore::new());
        let projects = Arc::new(InMemoryProjectStore::new());
        let documents = Arc::new(InMemoryDocumentStore::new());
        let skills = Arc::new(InMemorySkillStore::new());
        let mut registry = ProviderRegistry::new("mock", "mock-small");
        registry.register(Arc::new(MockProvider::new("mock", vec!["mock-small"])));
        let prod_service = TurnService::new(
            store.clone(), store.clone(), store, chats, projects, documents, skills,
            Arc::new(registry), None, Arc::new(StreamRegistry::new(Duration::from_secs(600))), cfg,
        );

        let result = prod_service
            .create_turn(CreateTurnRequest {
                chat_id: None,
                user_id: uuid::Uuid::new_v4(),
                prev_turn_id: None,
                role: "user".into(),
                blocks: vec![TurnBlock::new_text(uuid::Uuid::nil(), 0, "hi", BlockStatus::Complete)],
                request_params: params,
                selected_skills: vec![],
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn creates_turn_pair_and_returns_stream_url() {
        let (service, store) = new_service("mock", "mock-small");
        let result = service
            .create_turn(CreateTurnRequest {
                chat_id: None,
                user_id: uuid::Uuid::new_v4(),
                prev_turn_id: None,
                role: "user".into(),
                blocks: vec![TurnBlock::new_text(uuid::Uuid::nil(), 0, "Say hi.", BlockStatus::Complete)],
                request_params: RequestParams::default(),
                selected_skills: vec![],
            })
            .await
            .unwrap();

        assert_eq!(result.stream_url, format!("/api/turns/{}/stream", result.assistant_turn.id));
        assert_eq!(result.user_turn.chat_id, result.assistant_turn.chat_id);

        // Allow the spawned executor task to run to completion.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let turn = store.get_turn(result.assistant_turn.id).await.unwrap();
        assert_eq!(turn.status, TurnStatus::Complete);
    }
}
