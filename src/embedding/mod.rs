//! Embedding model collaborators.
//!
//! A store must be written and queried through the same [`Embedder`]; the
//! model id is stamped into the persisted index so a store built with one
//! model is never searched with another.

mod hashing;
mod local;
mod provider;
mod remote;

use std::path::Path;
use std::sync::Arc;

pub use hashing::HashingEmbedder;
pub use local::FastEmbedEmbedder;
pub use provider::Embedder;
pub use remote::RemoteEmbedder;

use crate::core::config::{EmbeddingProvider, EmbeddingSettings};
use crate::core::errors::PipelineError;

/// Build the embedder selected in config.
///
/// A local model that cannot be loaded is an error rather than a silent
/// switch to hashing: a different model id would discard the existing store.
pub async fn from_settings(
    settings: &EmbeddingSettings,
    model_cache_dir: &Path,
) -> Result<Arc<dyn Embedder>, PipelineError> {
    match settings.provider {
        EmbeddingProvider::FastEmbed => Ok(Arc::new(
            FastEmbedEmbedder::load(settings, model_cache_dir.to_path_buf()).await?,
        )),
        EmbeddingProvider::Hashing => Ok(Arc::new(HashingEmbedder::new(settings.dimension))),
        EmbeddingProvider::Remote => Ok(Arc::new(RemoteEmbedder::new(settings)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashing_provider_needs_no_model_files() {
        let dir = tempfile::tempdir().unwrap();
        let settings = EmbeddingSettings {
            provider: EmbeddingProvider::Hashing,
            ..EmbeddingSettings::default()
        };

        let embedder = from_settings(&settings, dir.path()).await.unwrap();

        assert_eq!(embedder.dimension(), 384);
        assert_eq!(embedder.model_id(), "hashing-v1-384");
        assert!(!dir.path().join("models").exists());
    }
}
