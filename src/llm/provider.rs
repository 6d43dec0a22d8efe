use async_trait::async_trait;

use super::types::ChatRequest;
use crate::core::errors::PipelineError;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// return the provider name (e.g. "openai")
    fn name(&self) -> &str;

    /// chat completion (non-streaming); failures are `PipelineError::ModelCall`
    async fn complete(&self, request: ChatRequest) -> Result<String, PipelineError>;
}
