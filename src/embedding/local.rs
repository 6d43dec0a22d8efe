//! Sentence-embedding model run in-process through `fastembed` (ONNX).
//!
//! The model files are downloaded into the cache directory on first use.
//! Inference is CPU-bound, so both loading and embedding run on the
//! blocking pool.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, ModelTrait, TextEmbedding, TextInitOptions};

use super::provider::Embedder;
use crate::core::config::EmbeddingSettings;
use crate::core::errors::PipelineError;

pub struct FastEmbedEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    model_id: String,
    dimension: usize,
}

impl FastEmbedEmbedder {
    /// Load (downloading if needed) the model named in `settings.model`.
    pub async fn load(
        settings: &EmbeddingSettings,
        cache_dir: PathBuf,
    ) -> Result<Self, PipelineError> {
        let model_name = resolve_model(&settings.model)?;
        let dimension = EmbeddingModel::get_model_info(&model_name)
            .map(|info| info.dim)
            .ok_or_else(|| {
                PipelineError::EmbeddingFailure(format!(
                    "no metadata for fastembed model '{}'",
                    settings.model
                ))
            })?;
        if dimension != settings.dimension {
            tracing::warn!(
                "embedding.dimension is {} but {} produces {}-dim vectors; using {}",
                settings.dimension,
                settings.model,
                dimension,
                dimension
            );
        }

        tracing::info!(
            "Loading embedding model {} (cache {})",
            settings.model,
            cache_dir.display()
        );
        let options = TextInitOptions::new(model_name)
            .with_cache_dir(cache_dir)
            .with_show_download_progress(false);
        let model = tokio::task::spawn_blocking(move || TextEmbedding::try_new(options))
            .await
            .map_err(|err| {
                PipelineError::EmbeddingFailure(format!("embedding model init task failed: {}", err))
            })?
            .map_err(|err| {
                PipelineError::EmbeddingFailure(format!(
                    "cannot load embedding model '{}': {}",
                    settings.model, err
                ))
            })?;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            model_id: settings.model.trim().to_string(),
            dimension,
        })
    }
}

/// Map a configured model name to a fastembed model.
///
/// Hugging Face ids are accepted with or without their organisation prefix,
/// so `sentence-transformers/all-MiniLM-L6-v2` selects the bundled ONNX
/// export of the same model.
fn resolve_model(name: &str) -> Result<EmbeddingModel, PipelineError> {
    let trimmed = name.trim();
    let short = trimmed.rsplit('/').next().unwrap_or(trimmed).to_ascii_lowercase();
    match short.as_str() {
        "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "all-minilm-l12-v2" => Ok(EmbeddingModel::AllMiniLML12V2),
        "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        _ => EmbeddingModel::from_str(trimmed).map_err(|err| {
            PipelineError::EmbeddingFailure(format!("unknown fastembed model '{}': {}", trimmed, err))
        }),
    }
}

#[async_trait]
impl Embedder for FastEmbedEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.model.clone();
        let batch = inputs.to_vec();
        let vectors = tokio::task::spawn_blocking(move || {
            let mut guard = model
                .lock()
                .map_err(|_| "embedding model lock poisoned".to_string())?;
            guard.embed(batch, None).map_err(|err| err.to_string())
        })
        .await
        .map_err(|err| PipelineError::EmbeddingFailure(format!("embedding task failed: {}", err)))?
        .map_err(PipelineError::EmbeddingFailure)?;

        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(PipelineError::EmbeddingFailure(format!(
                "model returned a {}-dim vector, expected {}",
                bad.len(),
                self.dimension
            )));
        }
        Ok(vectors)
    }
}
