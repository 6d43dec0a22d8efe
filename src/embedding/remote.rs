use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::provider::Embedder;
use crate::core::config::EmbeddingSettings;
use crate::core::errors::PipelineError;

/// Embedder backed by an OpenAI-compatible `/v1/embeddings` endpoint
/// (llama.cpp server, LM Studio, OpenAI).
#[derive(Clone)]
pub struct RemoteEmbedder {
    base_url: String,
    model: String,
    api_key: Option<String>,
    dimension: usize,
    client: Client,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl RemoteEmbedder {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|err| PipelineError::EmbeddingFailure(err.to_string()))?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            dimension: settings.dimension,
            client,
        })
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let mut request = self.client.post(&url).json(&json!({
            "model": self.model,
            "input": inputs,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let res = request
            .send()
            .await
            .map_err(|err| PipelineError::EmbeddingFailure(err.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(PipelineError::EmbeddingFailure(format!(
                "embedding endpoint returned {}: {}",
                status, text
            )));
        }

        let payload: EmbeddingsResponse = res
            .json()
            .await
            .map_err(|err| PipelineError::EmbeddingFailure(err.to_string()))?;

        order_embeddings(payload.data, inputs.len(), self.dimension)
    }
}

/// Put response rows back in input order and check their shape.
fn order_embeddings(
    mut items: Vec<EmbeddingItem>,
    expected: usize,
    dimension: usize,
) -> Result<Vec<Vec<f32>>, PipelineError> {
    if items.len() != expected {
        return Err(PipelineError::EmbeddingFailure(format!(
            "expected {} embeddings, got {}",
            expected,
            items.len()
        )));
    }

    if items.iter().all(|item| item.index.is_some()) {
        items.sort_by_key(|item| item.index);
    }

    items
        .into_iter()
        .map(|item| {
            if item.embedding.len() == dimension {
                Ok(item.embedding)
            } else {
                Err(PipelineError::EmbeddingFailure(format!(
                    "embedding dimension mismatch: expected {}, got {}",
                    dimension,
                    item.embedding.len()
                )))
            }
        })
        .collect()
}
