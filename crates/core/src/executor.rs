//! `StreamExecutor` (spec.md §4.2) — the turn state machine. One
//! instance drives exactly one assistant turn from its first provider
//! stream through any number of tool-continuation rounds to a terminal
//! `turn_complete`/`turn_error`.
//!
//! Grounded on the tool-dispatch loop in the teacher's
//! `crates/gateway/src/runtime/turn.rs::run_turn_inner` (accumulate
//! deltas, assemble tool calls, fan out with `join_all`, loop until no
//! tool calls remain), reshaped in two ways the teacher's single-content-
//! type loop didn't need: the block-indexed sequence remapping across
//! provider streams (§4.2 "Sequence remapping"), and the soft/hard
//! tool-round limits (§4.2 `handleCompletion`). Where the teacher
//! recurses implicitly via a `for loop_idx in 0..MAX_TOOL_LOOPS`, this
//! reshapes the described recursive `processProviderStream` into the same
//! kind of loop rather than true async recursion, since Rust async calls
//! can't recurse without heap-boxing each frame.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures_util::StreamExt;

use turnengine_domain::block::{BlockContent, BlockStatus, BlockType, ContentBlock, TurnBlock};
use turnengine_domain::error::{Error, Result};
use turnengine_domain::provider_event::{BoxStream, Delta, GenerateRequest, Message, ProviderEvent, StreamMetadata};
use turnengine_domain::sse_event::SseEvent;
use turnengine_domain::tool::{ToolCall, ToolCallResult};
use turnengine_domain::turn::{Role, TurnStatus};

use turnengine_providers::Provider;
use turnengine_store::{TurnMetadataUpdate, TurnNavigator, TurnReader, TurnWriter};
use turnengine_stream::Stream;
use turnengine_tools::ToolRegistry;

use crate::messages::MessageBuilder;

const TOOL_BUDGET_NUDGE: &str = "The recommended tool-call budget for this turn has been exceeded. \
Please finalize your answer now without making further tool calls.";

const NO_MORE_TOOLS_INSTRUCTION: &str = "The tool-call budget for this turn is exhausted. \
Do not call any tools; answer using only the information already gathered.";

/// Mutable state threaded through one turn's provider-stream rounds.
/// Owned entirely by the one task running [`StreamExecutor::run`]; no
/// other task ever touches it (spec.md §5 "one goroutine-equivalent per
/// live turn").
struct ExecState {
    collected_tools: Vec<ToolCall>,
    tool_iteration: u32,
    /// Highest turn-level sequence persisted so far; -1 before any block
    /// has landed (§4.2 "initially -1").
    max_block_sequence: i64,
    /// `streamStartSequence` for the provider stream currently being
    /// consumed — recomputed at the top of every [`StreamExecutor::process_provider_stream`]
    /// call and retained afterward so [`StreamExecutor::handle_error`] can
    /// still remap whatever text accumulated in that round.
    stream_start_sequence: u32,
    text_acc: HashMap<u32, String>,
    json_acc: HashMap<u32, String>,
    block_type_acc: HashMap<u32, BlockType>,
}

impl ExecState {
    fn new() -> Self {
        Self {
            collected_tools: Vec::new(),
            tool_iteration: 0,
            max_block_sequence: -1,
            stream_start_sequence: 0,
            text_acc: HashMap::new(),
            json_acc: HashMap::new(),
            block_type_acc: HashMap::new(),
        }
    }
}

/// What happens after one provider stream ends.
enum Outcome {
    Finalized,
    /// Continue with another provider stream under normal rules (tool
    /// routing still active).
    Continue(GenerateRequest),
    /// Continue with one final, constrained provider stream: the
    /// executor will not route any `tool_use` blocks it emits, no matter
    /// what the model does (§4.2 `executeToolsAndContinueWithLimit`:
    /// "the executor does not route to the registry in this phase").
    ContinueFinal(GenerateRequest),
}

pub struct StreamExecutor {
    turn_id: uuid::Uuid,
    writer: Arc<dyn TurnWriter>,
    reader: Arc<dyn TurnReader>,
    navigator: Arc<dyn TurnNavigator>,
    provider: Arc<dyn Provider>,
    tool_registry: Option<Arc<dyn ToolRegistry>>,
    stream: Arc<Stream>,
    /// Soft limit `S` (§4.2, default 5). The hard limit `H` is always `2*S`.
    max_tool_rounds: u32,
}

impl StreamExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        turn_id: uuid::Uuid,
        writer: Arc<dyn TurnWriter>,
        reader: Arc<dyn TurnReader>,
        navigator: Arc<dyn TurnNavigator>,
        provider: Arc<dyn Provider>,
        tool_registry: Option<Arc<dyn ToolRegistry>>,
        stream: Arc<Stream>,
        max_tool_rounds: u32,
    ) -> Self {
        Self {
            turn_id,
            writer,
            reader,
            navigator,
            provider,
            tool_registry,
            stream,
            max_tool_rounds,
        }
    }

    /// Drive this turn to completion. Intended to be the body of the
    /// one background task TurnService spawns per turn (§4.1 "Executor
    /// handoff"); returns only once the turn has reached a terminal
    /// state, successful or not.
    pub async fn run(&self, initial_req: GenerateRequest) {
        if let Err(e) = self.writer.update_turn_status(self.turn_id, TurnStatus::Streaming, None).await {
            tracing::error!(turn_id = %self.turn_id, error = %e, "failed to mark turn streaming at start");
        }

        let mut state = ExecState::new();
        let mut req = initial_req;
        let mut final_round = false;

        loop {
            let events = match self.provider.stream_response(req.clone()).await {
                Ok(events) => events,
                Err(e) => {
                    let cancelled = self.stream.cancel_token().is_cancelled();
                    self.handle_error(&state, &e, cancelled).await;
                    return;
                }
            };

            match self.process_provider_stream(&req, events, &mut state, final_round).await {
                Ok(Outcome::Finalized) => return,
                Ok(Outcome::Continue(next_req)) => req = next_req,
                Ok(Outcome::ContinueFinal(next_req)) => {
                    req = next_req;
                    final_round = true;
                }
                Err(e) => {
                    let cancelled = self.stream.cancel_token().is_cancelled();
                    self.handle_error(&state, &e, cancelled).await;
                    return;
                }
            }
        }
    }

    /// Consume one provider stream end to end (§4.2 `processProviderStream`).
    async fn process_provider_stream(
        &self,
        req: &GenerateRequest,
        mut events: BoxStream<'static, Result<ProviderEvent>>,
        state: &mut ExecState,
        final_round: bool,
    ) -> Result<Outcome> {
        state.stream_start_sequence = (state.max_block_sequence + 1) as u32;
        let mut current_provider_index: Option<u32> = None;

        while let Some(event) = events.next().await {
            if self.stream.cancel_token().is_cancelled() {
                return Err(Error::Other("turn execution was cancelled".into()));
            }

            match event? {
                ProviderEvent::Delta { provider_block_index, block_type, delta } => {
                    if current_provider_index != Some(provider_block_index) {
                        current_provider_index = Some(provider_block_index);
                        if let Some(bt) = block_type {
                            state.block_type_acc.insert(provider_block_index, bt);
                        }
                        let turn_seq = state.stream_start_sequence + provider_block_index;
                        let wire_type = state.block_type_acc.get(&provider_block_index).map(|b| b.as_str().to_string());
                        self.stream.publish(SseEvent::BlockStart { block_index: turn_seq, block_type: wire_type }).await;
                    }

                    let turn_seq = state.stream_start_sequence + provider_block_index;
                    match delta {
                        Delta::Text { text_delta } => {
                            state.text_acc.entry(provider_block_index).or_default().push_str(&text_delta);
                            self.stream
                                .publish(SseEvent::BlockDelta {
                                    block_index: turn_seq,
                                    delta_type: "text".into(),
                                    text_delta: Some(text_delta),
                                    signature_delta: None,
                                    json_delta: None,
                                })
                                .await;
                        }
                        Delta::Signature { signature_delta } => {
                            self.stream
                                .publish(SseEvent::BlockDelta {
                                    block_index: turn_seq,
                                    delta_type: "signature".into(),
                                    text_delta: None,
                                    signature_delta: Some(signature_delta),
                                    json_delta: None,
                                })
                                .await;
                        }
                        Delta::Json { json_delta } => {
                            // Never forwarded live; unparseable until complete (§4.2).
                            state.json_acc.entry(provider_block_index).or_default().push_str(&json_delta);
                        }
                    }
                }

                ProviderEvent::CompleteBlock(provider_block) => {
                    current_provider_index = None;
                    let turn_seq = state.stream_start_sequence + provider_block.index;
                    state.max_block_sequence = state.max_block_sequence.max(turn_seq as i64);

                    let turn_block = TurnBlock {
                        turn_id: self.turn_id,
                        sequence: turn_seq,
                        block_type: provider_block.block.block_type,
                        text_content: provider_block.block.text_content,
                        content: provider_block.block.content,
                        status: BlockStatus::Complete,
                        created_at: Utc::now(),
                    };

                    let is_backend_tool_use = turn_block.content.as_ref().map(BlockContent::is_backend_tool_use).unwrap_or(false);
                    if !final_round && is_backend_tool_use && self.tool_registry.is_some() {
                        if let Some(BlockContent::ToolUse { tool_use_id, tool_name, input, .. }) = &turn_block.content {
                            state.collected_tools.push(ToolCall {
                                tool_use_id: tool_use_id.clone(),
                                tool_name: tool_name.clone(),
                                input: input.clone(),
                            });
                        }
                    }

                    let writer = self.writer.clone();
                    let persisted = turn_block.clone();
                    self.stream.persist_and_clear(|| async move { writer.create_turn_block(persisted).await }).await?;

                    if let Some(json_str) = state.json_acc.remove(&provider_block.index) {
                        if !json_str.is_empty() {
                            let json_value = serde_json::from_str(&json_str).unwrap_or(serde_json::Value::String(json_str));
                            self.stream
                                .publish(SseEvent::BlockDelta {
                                    block_index: turn_seq,
                                    delta_type: "json".into(),
                                    text_delta: None,
                                    signature_delta: None,
                                    json_delta: Some(json_value),
                                })
                                .await;
                        }
                    }
                    state.text_acc.remove(&provider_block.index);
                    state.block_type_acc.remove(&provider_block.index);

                    self.stream.publish(SseEvent::BlockStop { block_index: turn_seq }).await;
                }

                ProviderEvent::Metadata(meta) => {
                    return self.handle_completion(req, meta, state, final_round).await;
                }

                ProviderEvent::Error { message } => {
                    return Err(Error::Provider { provider: self.provider.provider_id().to_string(), message });
                }
            }
        }

        Err(Error::Other("provider stream ended without a terminal event".into()))
    }

    /// §4.2 `handleCompletion` — tool-continuation decision.
    async fn handle_completion(
        &self,
        req: &GenerateRequest,
        meta: StreamMetadata,
        state: &mut ExecState,
        final_round: bool,
    ) -> Result<Outcome> {
        let model = meta.model.clone().filter(|m| !m.is_empty()).unwrap_or_else(|| req.model.clone());

        self.writer
            .update_turn_metadata(
                self.turn_id,
                TurnMetadataUpdate {
                    model: Some(model),
                    input_tokens: Some(meta.input_tokens),
                    output_tokens: Some(meta.output_tokens),
                    stop_reason: Some(meta.stop_reason.clone()),
                    response_metadata: meta.response_metadata.clone(),
                },
            )
            .await?;

        if final_round || state.collected_tools.is_empty() || self.tool_registry.is_none() {
            self.finalize(&meta).await?;
            return Ok(Outcome::Finalized);
        }

        let hard_limit = self.max_tool_rounds.saturating_mul(2);
        if state.tool_iteration >= hard_limit {
            let synthetic: Vec<ToolCallResult> = std::mem::take(&mut state.collected_tools)
                .into_iter()
                .map(|call| {
                    ToolCallResult::failure(
                        call.tool_use_id,
                        call.tool_name,
                        "Tool execution limit reached; unable to execute further tool calls for this turn.",
                    )
                })
                .collect();
            self.persist_tool_results(&synthetic, state).await?;
            return self.finish_with_limit(req).await.map(Outcome::ContinueFinal);
        }

        self.execute_tools_and_continue(req, state).await
    }

    /// §4.2 `executeToolsAndContinue`.
    async fn execute_tools_and_continue(&self, req: &GenerateRequest, state: &mut ExecState) -> Result<Outcome> {
        let calls = std::mem::take(&mut state.collected_tools);
        let results = self
            .tool_registry
            .as_ref()
            .expect("checked by handle_completion before calling this")
            .execute_parallel(calls)
            .await;
        self.persist_tool_results(&results, state).await?;

        state.tool_iteration += 1;
        let soft_limit = self.max_tool_rounds;
        let hard_limit = soft_limit.saturating_mul(2);

        if state.tool_iteration >= hard_limit {
            return self.finish_with_limit(req).await.map(Outcome::ContinueFinal);
        }

        let messages = self.build_continuation_messages(state.tool_iteration >= soft_limit).await?;
        Ok(Outcome::Continue(GenerateRequest {
            model: req.model.clone(),
            messages,
            params: req.params.clone(),
        }))
    }

    /// §4.2 `executeToolsAndContinueWithLimit` — builds the one final,
    /// constrained request. Does not itself call the provider; the
    /// caller's `run` loop does that uniformly for every round.
    async fn finish_with_limit(&self, req: &GenerateRequest) -> Result<GenerateRequest> {
        let mut messages = self.build_continuation_messages(false).await?;
        append_exhaustion_note(&mut messages);

        let mut params = req.params.clone();
        params.system = Some(match params.system.take() {
            Some(existing) => format!("{existing}\n\n{NO_MORE_TOOLS_INSTRUCTION}"),
            None => NO_MORE_TOOLS_INSTRUCTION.to_string(),
        });

        Ok(GenerateRequest { model: req.model.clone(), messages, params })
    }

    /// Persist one result batch as `tool_result` blocks, broadcasting
    /// `block_start` → `block_delta(json)` → `block_stop` for each
    /// (§4.2 step 2).
    async fn persist_tool_results(&self, results: &[ToolCallResult], state: &mut ExecState) -> Result<()> {
        let base = state.max_block_sequence + 1;
        for (i, result) in results.iter().enumerate() {
            let turn_seq = (base + i as i64) as u32;
            let content = BlockContent::ToolResult {
                tool_use_id: result.tool_use_id.clone(),
                tool_name: result.tool_name.clone(),
                is_error: result.is_error,
                result: result.result.clone(),
                error: result.error.clone(),
            };
            let block = TurnBlock::new_structured(self.turn_id, turn_seq, content);

            self.stream
                .publish(SseEvent::BlockStart { block_index: turn_seq, block_type: Some(BlockType::ToolResult.as_str().to_string()) })
                .await;

            let writer = self.writer.clone();
            let persisted = block.clone();
            self.stream.persist_and_clear(|| async move { writer.create_turn_block(persisted).await }).await?;

            if let Ok(json) = serde_json::to_value(&block.content) {
                self.stream
                    .publish(SseEvent::BlockDelta {
                        block_index: turn_seq,
                        delta_type: "json".into(),
                        text_delta: None,
                        signature_delta: None,
                        json_delta: Some(json),
                    })
                    .await;
            }
            self.stream.publish(SseEvent::BlockStop { block_index: turn_seq }).await;
        }
        state.max_block_sequence = base + results.len() as i64 - 1;
        Ok(())
    }

    async fn build_continuation_messages(&self, nudge: bool) -> Result<Vec<Message>> {
        let path = self.navigator.get_turn_path(self.turn_id).await?;
        let turn_ids: Vec<uuid::Uuid> = path.iter().map(|t| t.id).collect();
        let blocks_by_turn = self.reader.get_turn_blocks_for_turns(&turn_ids).await?;
        let mut messages = MessageBuilder::build_messages(&path, &blocks_by_turn);

        if nudge {
            messages.insert(
                0,
                Message {
                    role: Role::User,
                    blocks: vec![ContentBlock {
                        block_type: BlockType::Text,
                        text_content: Some(TOOL_BUDGET_NUDGE.to_string()),
                        content: None,
                    }],
                },
            );
        }

        Ok(messages)
    }

    async fn finalize(&self, meta: &StreamMetadata) -> Result<()> {
        self.writer.update_turn_status(self.turn_id, TurnStatus::Complete, Some(Utc::now())).await?;
        self.stream
            .publish(SseEvent::TurnComplete {
                turn_id: self.turn_id,
                stop_reason: meta.stop_reason.clone(),
                input_tokens: Some(meta.input_tokens),
                output_tokens: Some(meta.output_tokens),
                response_metadata: meta.response_metadata.clone(),
            })
            .await;
        Ok(())
    }

    /// §4.2 `handleError`. Persistence here is best-effort and always
    /// attempted regardless of why the round failed — the caller has
    /// already observed the cancellation token if relevant, so there is
    /// no separate cancellable context to race against (unlike the
    /// teacher's Go-shaped `ctx`, there is nothing left here to cancel).
    async fn handle_error(&self, state: &ExecState, err: &Error, is_cancelled: bool) {
        for (provider_index, text) in &state.text_acc {
            if text.is_empty() {
                continue;
            }
            let is_text_block = state.block_type_acc.get(provider_index).copied().unwrap_or(BlockType::Text) == BlockType::Text;
            if !is_text_block {
                continue;
            }
            let seq = state.stream_start_sequence + provider_index;
            let block = TurnBlock::new_text(self.turn_id, seq, text.clone(), BlockStatus::Partial);
            if let Err(persist_err) = self.writer.upsert_partial_text_block(block).await {
                tracing::error!(turn_id = %self.turn_id, error = %persist_err, "failed to persist partial text on error path");
            }
        }

        if let Err(update_err) = self.writer.update_turn_error(self.turn_id, err.to_string()).await {
            tracing::error!(turn_id = %self.turn_id, error = %update_err, "failed to mark turn errored");
        }

        self.stream
            .publish(SseEvent::TurnError {
                turn_id: self.turn_id,
                error: err.to_string(),
                last_block_index: (state.max_block_sequence >= 0).then_some(state.max_block_sequence as u32),
                is_cancelled: Some(is_cancelled),
            })
            .await;
    }
}

/// Appends an exhaustion note to the last `tool_result` block found,
/// scanning from the end of the message list (§4.2
/// `executeToolsAndContinueWithLimit`: "modify the last tool_result
/// message in-memory by appending a natural-language note").
fn append_exhaustion_note(messages: &mut [Message]) {
    let note = serde_json::json!({
        "note": "Tool execution budget for this turn has been exhausted; finalize your answer without further tool calls."
    });

    for message in messages.iter_mut().rev() {
        let Some(block) = message.blocks.iter_mut().rev().find(|b| b.block_type == BlockType::ToolResult) else {
            continue;
        };
        if let Some(BlockContent::ToolResult { result, .. }) = &mut block.content {
            *result = Some(match result.take() {
                Some(serde_json::Value::Object(mut map)) => {
                    if let serde_json::Value::Object(note_map) = note {
                        map.extend(note_map);
                    }
                    serde_json::Value::Object(map)
                }
                Some(other) => serde_json::json!({ "original": other, "note": note["note"] }),
                None => note,
            });
        }
        return;
    }
}
