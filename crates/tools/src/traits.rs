//! The `ToolRegistry` seam (spec.md §1 `ToolRegistry.ExecuteParallel`,
//! §4.5 "tool execution fan-out").
//!
//! Grounded on the teacher's tool-dispatch shape in
//! `crates/gateway/src/runtime/turn.rs` (collect pending calls, run them
//! concurrently with `join_all`, map back to one result per call) — here
//! split into a registry seam plus a single-tool `Tool` trait, since this
//! engine treats tool implementations themselves as out of scope
//! (spec.md Non-goals: "tool implementations").

use turnengine_domain::tool::{ToolCall, ToolCallResult};

/// One backend tool implementation.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Execute with the given input, returning the tool's result payload.
    /// `Err` becomes an `is_error=true` `ToolCallResult` with the message
    /// as `error`; tools never need to build a `ToolCallResult` themselves.
    async fn execute(&self, input: serde_json::Value) -> Result<serde_json::Value, String>;
}

/// Runs a batch of backend tool calls concurrently (spec.md §4.5
/// `executeToolsAndContinue` step 1: "runs all pending tool calls
/// concurrently and returns one result per call").
///
/// Always returns exactly one [`ToolCallResult`] per input [`ToolCall`], in
/// the same order — a call naming an unregistered tool still gets an
/// `is_error=true` result rather than being silently dropped, since every
/// `tool_use` requires a matching `tool_result` for the conversation to
/// remain well-formed (spec.md §4.5).
#[async_trait::async_trait]
pub trait ToolRegistry: Send + Sync {
    async fn execute_parallel(&self, calls: Vec<ToolCall>) -> Vec<ToolCallResult>;
}
