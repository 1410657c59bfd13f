//! Turn creation, lookup, and pagination endpoints (spec.md §6).
//!
//! Grounded on the request-shape/error-mapping pattern of the teacher's
//! `crates/gateway/src/api/chat.rs` (`resolve_session`'s `Result<_, String>`
//! → HTTP 400 translation), reshaped around spec.md §7's validation/
//! not-found/conflict → 400/404/409 mapping instead of the teacher's
//! single freeform-string error body.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use turnengine_core::CreateTurnRequest;
use turnengine_domain::block::{BlockContent, BlockStatus, BlockType, TurnBlock};
use turnengine_domain::error::Error;
use turnengine_domain::turn::RequestParams;
use turnengine_store::PaginationDirection;

use crate::state::AppState;

/// One client-submitted block, stripped of the server-assigned
/// `turn_id`/`sequence`/`created_at` (§6 `Block[]`).
#[derive(Debug, Deserialize)]
struct BlockInput {
    block_type: BlockType,
    #[serde(default)]
    text_content: Option<String>,
    #[serde(default)]
    content: Option<BlockContent>,
    #[serde(default = "complete_status")]
    status: BlockStatus,
}

fn complete_status() -> BlockStatus {
    BlockStatus::Complete
}

impl From<BlockInput> for TurnBlock {
    fn from(input: BlockInput) -> Self {
        // turn_id and sequence are overwritten by TurnService once the
        // user turn's id is known; placeholders here are never persisted.
        TurnBlock {
            turn_id: uuid::Uuid::nil(),
            sequence: 0,
            block_type: input.block_type,
            text_content: input.text_content,
            content: input.content,
            status: input.status,
            created_at: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTurnBody {
    /// No auth layer fronts this gateway (§1 scope), so the caller
    /// identifies itself directly; a real deployment would derive this
    /// from session/auth middleware instead.
    #[serde(default)]
    pub user_id: uuid::Uuid,
    #[serde(default)]
    pub prev_turn_id: Option<uuid::Uuid>,
    pub role: String,
    #[serde(default)]
    pub selected_skills: Vec<String>,
    pub turn_blocks: Vec<BlockInput>,
    #[serde(default)]
    pub request_params: RequestParams,
}

pub async fn create_turn(State(state): State<AppState>, Path(chat_id): Path<uuid::Uuid>, Json(body): Json<CreateTurnBody>) -> impl IntoResponse {
    let req = CreateTurnRequest {
        chat_id: Some(chat_id),
        user_id: body.user_id,
        prev_turn_id: body.prev_turn_id,
        role: body.role,
        blocks: body.turn_blocks.into_iter().map(TurnBlock::from).collect(),
        request_params: body.request_params,
        selected_skills: body.selected_skills,
    };

    match state.turns.create_turn(req).await {
        Ok(result) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "user_turn": result.user_turn,
                "assistant_turn": result.assistant_turn,
                "stream_url": result.stream_url,
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn get_turn(State(state): State<AppState>, Path(turn_id): Path<uuid::Uuid>) -> impl IntoResponse {
    match state.reader.get_turn(turn_id).await {
        Ok(turn) => Json(turn).into_response(),
        Err(e) => error_response(e),
    }
}

const MAX_PAGE_LIMIT: usize = 200;
const DEFAULT_PAGE_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct ListTurnsQuery {
    #[serde(default)]
    pub user_id: uuid::Uuid,
    #[serde(default)]
    pub from_turn_id: Option<uuid::Uuid>,
    #[serde(default = "default_page_limit")]
    pub limit: usize,
    #[serde(default)]
    pub direction: Option<String>,
}

fn default_page_limit() -> usize {
    DEFAULT_PAGE_LIMIT
}

pub async fn list_turns(State(state): State<AppState>, Path(chat_id): Path<uuid::Uuid>, Query(q): Query<ListTurnsQuery>) -> impl IntoResponse {
    let direction = match q.direction.as_deref() {
        Some("before") => PaginationDirection::Before,
        Some("after") => PaginationDirection::After,
        Some("both") | None => PaginationDirection::Both,
        Some(other) => {
            return error_response(Error::validation(format!("unknown pagination direction \"{other}\"")));
        }
    };
    let limit = q.limit.min(MAX_PAGE_LIMIT);

    match state.navigator.get_paginated_turns(chat_id, q.user_id, q.from_turn_id, limit, direction).await {
        Ok(page) => Json(serde_json::json!({
            "items": page.turns,
            "total": page.total,
            "limit": limit,
            // Cursor-based pagination has no numeric offset; echo the
            // cursor the caller paged from so the response shape still
            // carries a "where am I" field the way the teacher's
            // numeric-offset `list_runs` response does with `offset`.
            "offset": q.from_turn_id,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

fn error_response(err: Error) -> axum::response::Response {
    let status = match &err {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Conflict(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}
