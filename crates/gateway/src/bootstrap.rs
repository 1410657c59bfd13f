//! Wires `AppState` together from `Config` and spawns the one background
//! maintenance task this gateway needs.
//!
//! Grounded on the `build_app_state`/`spawn_background_tasks` split in the
//! teacher's `crates/gateway/src/bootstrap.rs`, narrowed to the
//! collaborators `TurnService` actually needs: a turn store, the four
//! read-only external stores `SystemPromptResolver` consults, a provider
//! registry seeded with `MockProvider` (real adapters are out of scope),
//! one example tool, and the stream registry.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use turnengine_core::TurnService;
use turnengine_domain::config::Config;
use turnengine_providers::{MockProvider, ProviderRegistry};
use turnengine_store::{InMemoryChatStore, InMemoryDocumentStore, InMemoryProjectStore, InMemorySkillStore, InMemoryTurnStore};
use turnengine_stream::StreamRegistry;
use turnengine_tools::{DocViewTool, InMemoryToolRegistry, ToolRegistry};

use crate::state::AppState;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    let store = Arc::new(InMemoryTurnStore::open(Path::new(&config.store.state_dir)).context("opening turn store")?);

    let chats = Arc::new(InMemoryChatStore::new());
    let projects = Arc::new(InMemoryProjectStore::new());
    let documents = Arc::new(InMemoryDocumentStore::new());
    let skills = Arc::new(InMemorySkillStore::new());

    let mut provider_registry = ProviderRegistry::new(config.turns.default_provider.clone(), config.turns.default_model.clone());
    provider_registry.register(Arc::new(MockProvider::new(config.turns.default_provider.clone(), vec![config.turns.default_model.clone()])));
    let provider_registry = Arc::new(provider_registry);

    let mut tools = InMemoryToolRegistry::new();
    tools.register(Arc::new(DocViewTool::new(documents.clone())));
    let tool_registry: Option<Arc<dyn ToolRegistry>> = Some(Arc::new(tools));

    let stream_registry = Arc::new(StreamRegistry::new(Duration::from_secs(config.turns.stream_retention_secs)));

    let turns = Arc::new(TurnService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        chats,
        projects,
        documents,
        skills,
        provider_registry,
        tool_registry,
        stream_registry.clone(),
        config.turns.clone(),
    ));

    Ok(AppState {
        config,
        turns,
        streams: stream_registry,
        reader: store.clone(),
        navigator: store,
    })
}

/// Reclaim streams past retention on a fixed interval (§4.4 "After
/// retention expires, the stream is removed"). Runs for the life of the
/// process; `main.rs`'s `shutdown_signal` cancels the registry's live
/// streams directly on ctrl_c/SIGTERM rather than through this task.
pub fn spawn_background_tasks(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let evicted = state.turns.sweep_expired_streams();
            if evicted > 0 {
                tracing::debug!(evicted, "swept expired turn streams past retention");
            }
        }
    });
}
