//! Shared application state passed to all API handlers.
//!
//! Grounded on the teacher's grouped `AppState`
//! (`crates/gateway/src/state.rs`), narrowed down to the collaborators
//! `TurnService` actually needs.

use std::sync::Arc;

use turnengine_core::TurnService;
use turnengine_domain::config::Config;
use turnengine_store::{TurnNavigator, TurnReader};
use turnengine_stream::StreamRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub turns: Arc<TurnService>,
    pub streams: Arc<StreamRegistry>,
    pub reader: Arc<dyn TurnReader>,
    pub navigator: Arc<dyn TurnNavigator>,
}
