//! Provider-facing wire types (spec.md §4.2 "Event kinds emitted by
//! providers", §1 `Provider.StreamResponse`).
//!
//! Grounded on `sa_domain::stream::StreamEvent` from the teacher, but
//! reshaped: the teacher's `StreamEvent` is token/tool-call shaped for
//! a single content type, while this engine's providers must speak in
//! terms of the full §3 block-type table (text, thinking, tool_use,
//! images, references, web search...).

use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::block::{BlockType, ContentBlock};
use crate::turn::{RequestParams, Role};

pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// One piece of incremental content within a block, keyed by the
/// provider's own 0-based block index for this stream (§4.2 "delta
/// accumulators").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "delta_type", rename_all = "snake_case")]
pub enum Delta {
    Text { text_delta: String },
    Signature { signature_delta: String },
    Json { json_delta: String },
}

/// A provider-reported block, fully formed, indexed 0-based within
/// *this* provider stream. The executor remaps `index` to the turn's
/// monotonic sequence before persisting (§4.2 "Sequence remapping").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderBlock {
    pub index: u32,
    pub block: ContentBlock,
}

/// End-of-stream metadata (§4.2). Terminal for one provider stream —
/// does not necessarily mean the turn is done (tool continuation may
/// follow).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMetadata {
    #[serde(default)]
    pub model: Option<String>,
    pub stop_reason: String,
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default)]
    pub response_metadata: Option<serde_json::Value>,
}

/// Events emitted by a provider adapter for one `StreamResponse` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderEvent {
    Delta {
        provider_block_index: u32,
        #[serde(default)]
        block_type: Option<BlockType>,
        delta: Delta,
    },
    CompleteBlock(ProviderBlock),
    Metadata(StreamMetadata),
    Error { message: String },
}

/// One provider-ready message (§4.6 `MessageBuilder` output / request
/// input): a role plus an ordered list of content blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub blocks: Vec<ContentBlock>,
}

/// A request to generate the next assistant round.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub params: RequestParams,
}
