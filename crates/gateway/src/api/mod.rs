//! HTTP routing (spec.md §6).
//!
//! Grounded on the shape of the teacher's `pub fn router(state: AppState)
//! -> Router<AppState>` (`crates/gateway/src/api/mod.rs`), narrowed to the
//! three turn-engine endpoints spec.md §6 names. No auth/CORS/rate-limit
//! middleware is applied — none of it is named in scope and the teacher's
//! bearer-token/governor layers have no counterpart here.

pub mod stream;
pub mod turns;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/chats/:chatId/turns", post(turns::create_turn).get(turns::list_turns))
        .route("/api/turns/:id", get(turns::get_turn))
        .route("/api/turns/:id/stream", get(stream::stream_turn))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
