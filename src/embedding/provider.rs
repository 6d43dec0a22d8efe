use async_trait::async_trait;

use crate::core::errors::PipelineError;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// identifier stamped into persisted stores (e.g. "hashing-v1")
    fn model_id(&self) -> &str;

    /// length of every vector this embedder returns
    fn dimension(&self) -> usize;

    /// embed each input, preserving order
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, PipelineError>;
}
