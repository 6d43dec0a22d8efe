use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use super::flat_index::FlatL2Index;
use super::persistence::StoreFiles;
use crate::core::errors::PipelineError;
use crate::embedding::Embedder;

/// A chunk returned by [`VectorStore::retrieve`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub text: String,
    /// squared L2 distance; lower is more similar
    pub distance: f32,
    pub ordinal: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStats {
    pub total_documents: usize,
    pub index_size: usize,
    pub embedding_dimension: usize,
    pub embedding_model: String,
    pub location: PathBuf,
}

/// Why persisted state was discarded on open.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadDiagnostic {
    pub location: PathBuf,
    pub reason: String,
}

/// Chunk texts plus their embeddings, persisted under one directory.
///
/// Chunk ordinal `i` is always row `i` of the index; the two only grow
/// together or are cleared together.
pub struct VectorStore {
    files: StoreFiles,
    embedder: Arc<dyn Embedder>,
    index: FlatL2Index,
    chunks: Vec<String>,
    load_diagnostic: Option<LoadDiagnostic>,
}

impl VectorStore {
    /// Load the store at `dir`, or start an empty one.
    ///
    /// Unreadable, inconsistent, or foreign-model state never fails the
    /// open: the store starts empty and the reason is returned alongside.
    pub fn open_or_create(
        dir: impl Into<PathBuf>,
        embedder: Arc<dyn Embedder>,
    ) -> (Self, Option<LoadDiagnostic>) {
        let files = StoreFiles::new(dir);
        let mut store = Self {
            index: FlatL2Index::new(embedder.dimension()),
            chunks: Vec::new(),
            load_diagnostic: None,
            files,
            embedder,
        };

        if !store.files.exists() {
            tracing::info!(
                "Creating new vector store at {}",
                store.files.dir().display()
            );
            if let Err(err) = std::fs::create_dir_all(store.files.dir()) {
                tracing::warn!(
                    "Could not create store directory {}: {}",
                    store.files.dir().display(),
                    err
                );
            }
            return (store, None);
        }

        match store.load_existing() {
            Ok(()) => {
                tracing::info!(
                    "Loaded vector store with {} chunks from {}",
                    store.chunks.len(),
                    store.files.dir().display()
                );
                (store, None)
            }
            Err(reason) => {
                tracing::warn!(
                    "Discarding vector store at {}: {}",
                    store.files.dir().display(),
                    reason
                );
                let diagnostic = LoadDiagnostic {
                    location: store.files.dir().to_path_buf(),
                    reason,
                };
                store.load_diagnostic = Some(diagnostic.clone());
                (store, Some(diagnostic))
            }
        }
    }

    fn load_existing(&mut self) -> Result<(), String> {
        let persisted = self.files.load().map_err(|err| err.to_string())?;

        if persisted.model_id != self.embedder.model_id() {
            return Err(format!(
                "built with embedding model '{}', expected '{}'",
                persisted.model_id,
                self.embedder.model_id()
            ));
        }
        if persisted.index.dimension() != self.embedder.dimension() {
            return Err(format!(
                "index dimension {} does not match embedder dimension {}",
                persisted.index.dimension(),
                self.embedder.dimension()
            ));
        }
        if persisted.index.len() != persisted.chunks.len() {
            return Err(format!(
                "index holds {} vectors but {} chunks were stored",
                persisted.index.len(),
                persisted.chunks.len()
            ));
        }

        self.index = persisted.index;
        self.chunks = persisted.chunks;
        Ok(())
    }

    /// Embed and append the non-blank `chunks`, then persist.
    ///
    /// Returns the number of chunks appended. When persisting fails the
    /// in-memory store keeps the new chunks and the error is returned.
    pub async fn add(&mut self, chunks: &[String]) -> Result<usize, PipelineError> {
        let accepted: Vec<String> = chunks
            .iter()
            .filter(|chunk| !chunk.trim().is_empty())
            .cloned()
            .collect();
        if accepted.is_empty() {
            return Ok(0);
        }

        let embeddings = self.embedder.embed(&accepted).await?;
        if embeddings.len() != accepted.len() {
            return Err(PipelineError::EmbeddingFailure(format!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                accepted.len()
            )));
        }
        self.index
            .add(&embeddings)
            .map_err(|err| PipelineError::EmbeddingFailure(err.to_string()))?;

        let added = accepted.len();
        self.chunks.extend(accepted);
        tracing::debug!("Added {} chunks, store now holds {}", added, self.chunks.len());

        self.persist()?;
        Ok(added)
    }

    /// The `min(top_k, len)` nearest chunks to `query`, nearest first.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, PipelineError> {
        if self.chunks.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let embedded = self
            .embedder
            .embed(&[query.to_string()])
            .await
            .map_err(|err| PipelineError::RetrievalFailure(err.to_string()))?;
        let query_vector = embedded.into_iter().next().ok_or_else(|| {
            PipelineError::RetrievalFailure("embedder returned no query vector".to_string())
        })?;

        let k = top_k.min(self.chunks.len());
        let neighbors = self
            .index
            .search(&query_vector, k)
            .map_err(|err| PipelineError::RetrievalFailure(err.to_string()))?;

        Ok(neighbors
            .into_iter()
            .filter_map(|hit| {
                self.chunks.get(hit.ordinal).map(|text| RetrievedChunk {
                    text: text.clone(),
                    distance: hit.distance,
                    ordinal: hit.ordinal,
                })
            })
            .collect())
    }

    /// Drop every chunk and delete the persisted files. Safe to repeat.
    pub fn clear(&mut self) -> Result<(), PipelineError> {
        self.index = FlatL2Index::new(self.embedder.dimension());
        self.chunks.clear();
        self.files
            .remove()
            .map_err(|err| PipelineError::IndexWrite(err.to_string()))?;
        self.load_diagnostic = None;
        tracing::info!("Cleared vector store at {}", self.files.dir().display());
        Ok(())
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            total_documents: self.chunks.len(),
            index_size: self.index.len(),
            embedding_dimension: self.index.dimension(),
            embedding_model: self.embedder.model_id().to_string(),
            location: self.files.dir().to_path_buf(),
        }
    }

    /// Why state was discarded on open. Cleared once the directory has been
    /// rewritten by a successful add or removed by a clear.
    pub fn load_diagnostic(&self) -> Option<&LoadDiagnostic> {
        self.load_diagnostic.as_ref()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn location(&self) -> &Path {
        self.files.dir()
    }

    fn persist(&mut self) -> Result<(), PipelineError> {
        self.files
            .save(self.embedder.model_id(), &self.index, &self.chunks)
            .map_err(|err| {
                tracing::error!(
                    "Failed to persist vector store at {}: {}",
                    self.files.dir().display(),
                    err
                );
                PipelineError::IndexWrite(err.to_string())
            })?;
        self.load_diagnostic = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::embedding::HashingEmbedder;

    fn hashing() -> Arc<dyn Embedder> {
        Arc::new(HashingEmbedder::default())
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// Counts calls and returns a fixed-size vector per input.
    struct CountingEmbedder {
        calls: AtomicUsize,
        dimension: usize,
        emitted: usize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_id(&self) -> &str {
            "counting"
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(inputs.iter().map(|_| vec![0.0; self.emitted]).collect())
        }
    }

    #[tokio::test]
    async fn add_counts_only_non_blank_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, diagnostic) = VectorStore::open_or_create(dir.path(), hashing());
        assert!(diagnostic.is_none());

        let added = store
            .add(&texts(&["one", "   ", "two", "", "three"]))
            .await
            .unwrap();

        assert_eq!(added, 3);
        assert_eq!(store.stats().total_documents, 3);
        assert_eq!(store.stats().index_size, 3);
    }

    #[tokio::test]
    async fn blank_batch_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, _) = VectorStore::open_or_create(dir.path(), hashing());

        assert_eq!(store.add(&texts(&["", "\n\t"])).await.unwrap(), 0);
        assert!(store.is_empty());
        assert!(!dir.path().join("vectors.idx").exists());
    }

    #[tokio::test]
    async fn reopened_store_returns_same_results() {
        let dir = tempfile::tempdir().unwrap();
        let docs = texts(&["cats are mammals", "dogs are mammals", "rockets use fuel"]);

        let before = {
            let (mut store, _) = VectorStore::open_or_create(dir.path(), hashing());
            store.add(&docs).await.unwrap();
            store.retrieve("mammal pets", 3).await.unwrap()
        };

        let (reopened, diagnostic) = VectorStore::open_or_create(dir.path(), hashing());
        assert!(diagnostic.is_none());
        assert_eq!(reopened.stats().total_documents, 3);
        assert_eq!(reopened.retrieve("mammal pets", 3).await.unwrap(), before);
    }

    #[tokio::test]
    async fn empty_store_retrieves_nothing_without_embedding() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
            dimension: 4,
            emitted: 4,
        });
        let (store, _) = VectorStore::open_or_create(dir.path(), embedder.clone());

        assert!(store.retrieve("anything", 3).await.unwrap().is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn results_are_clamped_and_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, _) = VectorStore::open_or_create(dir.path(), hashing());
        store
            .add(&texts(&["alpha", "beta", "gamma", "delta", "epsilon"]))
            .await
            .unwrap();

        let hits = store.retrieve("alpha", 10).await.unwrap();
        assert_eq!(hits.len(), 5);
        assert_eq!(hits[0].text, "alpha");
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));

        assert_eq!(store.retrieve("alpha", 2).await.unwrap().len(), 2);
        assert!(store.retrieve("alpha", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mammal_query_prefers_mammal_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, _) = VectorStore::open_or_create(dir.path(), hashing());
        store
            .add(&texts(&["cats are mammals", "dogs are mammals", "rockets use fuel"]))
            .await
            .unwrap();

        let hits = store.retrieve("mammal pets", 2).await.unwrap();
        let mut found: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        found.sort();

        assert_eq!(found, vec!["cats are mammals", "dogs are mammals"]);
    }

    #[tokio::test]
    async fn identical_chunks_tie_break_by_ordinal() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, _) = VectorStore::open_or_create(dir.path(), hashing());
        store
            .add(&texts(&["same text", "other words", "same text"]))
            .await
            .unwrap();

        let hits = store.retrieve("same text", 2).await.unwrap();
        assert_eq!(hits[0].ordinal, 0);
        assert_eq!(hits[1].ordinal, 2);
        assert_eq!(hits[0].distance, hits[1].distance);
    }

    #[tokio::test]
    async fn clear_empties_store_and_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let store_dir = dir.path().join("vector_store");
        let (mut store, _) = VectorStore::open_or_create(&store_dir, hashing());
        store
            .add(&texts(&["one", "two", "three", "four", "five"]))
            .await
            .unwrap();

        store.clear().unwrap();

        let stats = store.stats();
        assert_eq!(stats.total_documents, 0);
        assert_eq!(stats.index_size, 0);
        assert!(store.retrieve("one", 3).await.unwrap().is_empty());
        assert!(!store_dir.exists());

        store.clear().unwrap();

        store.add(&texts(&["again"])).await.unwrap();
        assert_eq!(store.len(), 1);
        assert!(store_dir.join("vectors.idx").exists());
    }

    #[tokio::test]
    async fn corrupt_index_starts_empty_with_diagnostic() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (mut store, _) = VectorStore::open_or_create(dir.path(), hashing());
            store.add(&texts(&["one", "two"])).await.unwrap();
        }
        std::fs::write(dir.path().join("vectors.idx"), b"garbage").unwrap();

        let (store, diagnostic) = VectorStore::open_or_create(dir.path(), hashing());
        let diagnostic = diagnostic.expect("corruption is reported");

        assert!(store.is_empty());
        assert_eq!(diagnostic.location, dir.path());
        assert!(diagnostic.reason.contains("corrupt"));
        assert_eq!(store.load_diagnostic(), Some(&diagnostic));
    }

    #[tokio::test]
    async fn diagnostic_is_dropped_once_the_store_is_rewritten_or_cleared() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vectors.idx"), b"garbage").unwrap();

        let (mut store, _) = VectorStore::open_or_create(dir.path(), hashing());
        assert!(store.load_diagnostic().is_some());
        store.add(&texts(&["fresh"])).await.unwrap();
        assert!(store.load_diagnostic().is_none());

        std::fs::write(dir.path().join("vectors.idx"), b"garbage").unwrap();
        let (mut store, _) = VectorStore::open_or_create(dir.path(), hashing());
        assert!(store.load_diagnostic().is_some());
        store.clear().unwrap();
        assert!(store.load_diagnostic().is_none());
    }

    #[tokio::test]
    async fn mismatched_chunk_count_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (mut store, _) = VectorStore::open_or_create(dir.path(), hashing());
            store.add(&texts(&["one", "two"])).await.unwrap();
        }
        std::fs::write(dir.path().join("chunks.json"), r#"["one","two","three"]"#).unwrap();

        let (store, diagnostic) = VectorStore::open_or_create(dir.path(), hashing());
        assert!(store.is_empty());
        assert!(diagnostic.unwrap().reason.contains("3 chunks"));
    }

    #[tokio::test]
    async fn store_from_another_model_is_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (mut store, _) = VectorStore::open_or_create(dir.path(), hashing());
            store.add(&texts(&["one"])).await.unwrap();
        }

        let other: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(64));
        let (store, diagnostic) = VectorStore::open_or_create(dir.path(), other);

        assert!(store.is_empty());
        assert_eq!(store.stats().embedding_dimension, 64);
        assert!(diagnostic.unwrap().reason.contains("hashing-v1-384"));
    }

    #[tokio::test]
    async fn wrong_embedding_dimension_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
            dimension: 4,
            emitted: 3,
        });
        let (mut store, _) = VectorStore::open_or_create(dir.path(), embedder);

        let err = store.add(&texts(&["one"])).await.unwrap_err();
        assert_eq!(err.error_type(), "EmbeddingFailure");
        assert!(store.is_empty());
        assert_eq!(store.stats().index_size, 0);
    }

    #[tokio::test]
    async fn failed_persist_keeps_memory_state() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file in the way").unwrap();

        let (mut store, _) = VectorStore::open_or_create(&blocker, hashing());
        let err = store.add(&texts(&["kept in memory"])).await.unwrap_err();

        assert_eq!(err.error_type(), "IndexWriteError");
        assert_eq!(store.len(), 1);
        let hits = store.retrieve("kept in memory", 1).await.unwrap();
        assert_eq!(hits[0].text, "kept in memory");
    }
}
