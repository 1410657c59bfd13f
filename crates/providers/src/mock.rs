//! A scripted, in-memory [`Provider`] for tests and local development
//! (spec.md §8 uses a stand-in provider throughout; no real adapter is in
//! scope per spec.md Non-goals).
//!
//! Grounded on the streaming shape of the teacher's `crates/providers/src/sse.rs`
//! (an event-at-a-time async generator), reworked from real SSE parsing into
//! a queue of pre-built [`ProviderEvent`] scripts so tests can dictate exact
//! provider behavior, including multi-round tool-use sequences.

use std::collections::VecDeque;

use parking_lot::Mutex;
use turnengine_domain::error::Result;
use turnengine_domain::provider_event::{BoxStream, GenerateRequest, ProviderEvent, StreamMetadata};

use crate::traits::Provider;

/// One scripted provider round: the full list of events it emits, in order,
/// before the stream ends.
pub type ScriptedRound = Vec<ProviderEvent>;

/// A provider whose responses are dictated ahead of time by the caller.
///
/// Each call to [`Provider::stream_response`] pops the next queued round. If
/// the queue is empty, it falls back to [`Self::default_round`]: a single
/// short text block followed by an `end_turn` metadata event, so tests that
/// don't care about exact output still get a well-formed completion.
pub struct MockProvider {
    provider_id: String,
    models: Vec<String>,
    rounds: Mutex<VecDeque<ScriptedRound>>,
}

impl MockProvider {
    pub fn new(provider_id: impl Into<String>, models: Vec<impl Into<String>>) -> Self {
        Self {
            provider_id: provider_id.into(),
            models: models.into_iter().map(Into::into).collect(),
            rounds: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue a round to be returned by the next `stream_response` call.
    pub fn push_round(&self, round: ScriptedRound) {
        self.rounds.lock().push_back(round);
    }

    fn default_round() -> ScriptedRound {
        vec![
            ProviderEvent::Delta {
                provider_block_index: 0,
                block_type: Some(turnengine_domain::block::BlockType::Text),
                delta: turnengine_domain::provider_event::Delta::Text {
                    text_delta: "Hello from the mock provider.".into(),
                },
            },
            ProviderEvent::Metadata(StreamMetadata {
                model: None,
                stop_reason: "end_turn".into(),
                input_tokens: 10,
                output_tokens: 6,
                response_metadata: None,
            }),
        ]
    }
}

#[async_trait::async_trait]
impl Provider for MockProvider {
    async fn stream_response(
        &self,
        req: GenerateRequest,
    ) -> Result<BoxStream<'static, Result<ProviderEvent>>> {
        let round = self
            .rounds
            .lock()
            .pop_front()
            .unwrap_or_else(Self::default_round);
        let model = req.model;

        let stream = async_stream::stream! {
            for mut event in round {
                if let ProviderEvent::Metadata(ref mut meta) = event {
                    if meta.model.is_none() {
                        meta.model = Some(model.clone());
                    }
                }
                yield Ok(event);
            }
        };

        Ok(Box::pin(stream))
    }

    fn supports_model(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }

    fn provider_id(&self) -> &str {
        &self.provider_id
    }
}
