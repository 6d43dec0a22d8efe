use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use super::extractors::{default_extractor, TextExtractor};
use super::format::DocumentFormat;
use super::splitter::RecursiveSplitter;
use crate::core::errors::PipelineError;
use crate::store::VectorStore;

/// Chunks produced from one uploaded document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extraction {
    pub format: DocumentFormat,
    pub chunks: Vec<String>,
    /// set when extraction failed or produced no text
    pub diagnostic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub document: String,
    pub format: DocumentFormat,
    pub chunks_added: usize,
    pub diagnostic: Option<String>,
}

/// Turns uploaded bytes into chunks and appends them to the store.
pub struct IngestionStage {
    store: Arc<RwLock<VectorStore>>,
    splitter: RecursiveSplitter,
    extractors: HashMap<DocumentFormat, Arc<dyn TextExtractor>>,
}

impl IngestionStage {
    pub fn new(store: Arc<RwLock<VectorStore>>, splitter: RecursiveSplitter) -> Self {
        let extractors = [
            DocumentFormat::Pdf,
            DocumentFormat::Docx,
            DocumentFormat::PlainText,
            DocumentFormat::Image,
        ]
        .into_iter()
        .map(|format| (format, Arc::from(default_extractor(format))))
        .collect();

        Self {
            store,
            splitter,
            extractors,
        }
    }

    /// Replace the extractor used for one format.
    pub fn with_extractor(mut self, format: DocumentFormat, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractors.insert(format, extractor);
        self
    }

    /// Extract and split a document without touching the store.
    ///
    /// Only an unsupported extension is an error; extraction faults yield
    /// zero chunks and a diagnostic.
    pub async fn process_document(
        &self,
        name: &str,
        bytes: &[u8],
    ) -> Result<Extraction, PipelineError> {
        let format = DocumentFormat::from_name(name)?;
        let extractor = self
            .extractors
            .get(&format)
            .cloned()
            .ok_or_else(|| PipelineError::UnsupportedFormat(format.to_string()))?;

        let owned = bytes.to_vec();
        let extracted = tokio::task::spawn_blocking(move || extractor.extract(&owned))
            .await
            .map_err(|err| PipelineError::ExtractionFailure(err.to_string()))
            .and_then(|result| result);

        let text = match extracted {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!("Extraction failed for {} ({}): {}", name, format, err);
                return Ok(Extraction {
                    format,
                    chunks: Vec::new(),
                    diagnostic: Some(err.to_string()),
                });
            }
        };

        let chunks = self.splitter.split(&text);
        let diagnostic = if chunks.is_empty() {
            tracing::warn!("No text extracted from {}", name);
            Some(format!("no text could be extracted from {}", name))
        } else {
            None
        };
        tracing::debug!("Split {} into {} chunks", name, chunks.len());

        Ok(Extraction {
            format,
            chunks,
            diagnostic,
        })
    }

    /// Extract, split and store a document.
    pub async fn ingest(&self, name: &str, bytes: &[u8]) -> Result<IngestReport, PipelineError> {
        let extraction = self.process_document(name, bytes).await?;

        let chunks_added = if extraction.chunks.is_empty() {
            0
        } else {
            self.store.write().await.add(&extraction.chunks).await?
        };
        tracing::info!("Ingested {}: {} chunks added", name, chunks_added);

        Ok(IngestReport {
            document: name.to_string(),
            format: extraction.format,
            chunks_added,
            diagnostic: extraction.diagnostic,
        })
    }
}
