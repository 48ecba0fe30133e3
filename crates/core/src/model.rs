//! Language-model trait: the client the orchestrator drives.
//!
//! The orchestrator only needs two calls: a blocking completion and a
//! token stream. Transport, model selection, and sampling parameters
//! belong to the implementation.

use async_trait::async_trait;

use crate::error::ModelError;
use crate::message::Message;

/// Incremental text tokens from a streaming completion.
pub type TokenStream = tokio::sync::mpsc::Receiver<Result<String, ModelError>>;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// A human-readable model name (e.g., "llama3.2").
    fn name(&self) -> &str;

    /// Generate a complete reply to `prompt`, given prior `history` and a
    /// system prompt.
    async fn generate(
        &self,
        prompt: &str,
        history: &[Message],
        system_prompt: &str,
    ) -> Result<String, ModelError>;

    /// Generate a reply as a stream of text tokens.
    ///
    /// `images` are opaque (usually base64) attachments for multimodal
    /// models. Default implementation ignores them, calls `generate()` and
    /// yields the whole reply as a single token.
    async fn generate_stream(
        &self,
        prompt: &str,
        history: &[Message],
        system_prompt: &str,
        images: &[String],
    ) -> Result<TokenStream, ModelError> {
        let _ = images;
        let text = self.generate(prompt, history, system_prompt).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx.send(Ok(text)).await;
        Ok(rx)
    }
}
