//! Language model provider trait

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use crate::error::Result;
use crate::types::TokenUsage;

/// A finished completion
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

/// One piece of a streamed completion
#[derive(Debug, Clone, Default)]
pub struct CompletionChunk {
    pub text: String,
    pub done: bool,
    /// Reported on the final chunk
    pub usage: Option<TokenUsage>,
}

/// Stream of completion chunks
pub type CompletionStream = BoxStream<'static, Result<CompletionChunk>>;

/// Text completion capability.
///
/// Failures are reported as `Error::Generation`; callers remap them when the
/// completion serves another purpose (e.g. evaluation).
#[async_trait]
pub trait Completer: Send + Sync {
    /// Complete a prompt at the given temperature
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<Completion>;

    /// Stream a completion
    ///
    /// Default implementation emits the full completion as one chunk.
    async fn stream(&self, prompt: &str, temperature: f32) -> Result<CompletionStream> {
        let completion = self.complete(prompt, temperature).await?;
        let chunk = CompletionChunk {
            text: completion.text,
            done: true,
            usage: Some(completion.usage),
        };
        Ok(stream::once(async move { Ok(chunk) }).boxed())
    }

    /// Check if the provider is reachable
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}
