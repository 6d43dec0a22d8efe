pub mod openai;
pub mod provider;
pub mod types;

use std::sync::Arc;

pub use openai::OpenAiChatModel;
pub use provider::LanguageModel;
pub use types::{ChatMessage, ChatRequest};

use crate::core::config::LlmSettings;
use crate::core::errors::PipelineError;

pub fn from_settings(settings: &LlmSettings) -> Result<Arc<dyn LanguageModel>, PipelineError> {
    Ok(Arc::new(OpenAiChatModel::new(settings)?))
}
