//! The `Provider` trait (spec.md §1 `Provider.StreamResponse`, §4.2).
//!
//! Grounded on the teacher's `LlmProvider` (`crates/providers/src/traits.rs`),
//! narrowed to the single streaming entry point this engine needs: the
//! executor never waits for a full response, and embeddings/non-streaming
//! chat are out of scope (spec.md Non-goals).

use turnengine_domain::error::Result;
use turnengine_domain::provider_event::{BoxStream, GenerateRequest, ProviderEvent};

/// Adapter to one upstream model family. Implementations translate between
/// [`GenerateRequest`]/[`ProviderEvent`] and a provider's own wire format.
///
/// Real adapters (Anthropic, OpenAI-compatible, Bedrock...) are out of scope
/// here; this crate ships only [`crate::mock::MockProvider`], a scripted
/// stand-in for tests and local development.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Start a new generation. The returned stream yields [`ProviderEvent`]s
    /// in order and ends after a `Metadata` or `Error` event (§4.2 "every
    /// provider stream ends in exactly one of these").
    async fn stream_response(
        &self,
        req: GenerateRequest,
    ) -> Result<BoxStream<'static, Result<ProviderEvent>>>;

    /// Whether this provider can serve the given model name. Used by
    /// [`crate::registry::ProviderRegistry`] for model routing.
    fn supports_model(&self, model: &str) -> bool;

    /// A unique identifier for this provider instance, used in logs and
    /// error messages.
    fn provider_id(&self) -> &str;
}
