use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::ChatRequest;
use crate::core::errors::ApiError;

/// Embedding + chat-completion capability.
///
/// Model ids are part of provider construction, not the call: one deployment
/// pins one chat model and one embedding model, and the embedding model must
/// be the one every stored index was built with.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g. "openai_compat").
    fn name(&self) -> &str;

    /// Chat completion (whole response).
    async fn chat(&self, request: ChatRequest) -> Result<String, ApiError>;

    /// Chat completion (incremental fragments).
    async fn stream_chat(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError>;

    /// Embed each input text into a vector.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;
}
