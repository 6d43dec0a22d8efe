//! Retrieval stage: turns a `QUERY` envelope into a `RETRIEVAL_RESULT`.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::core::errors::PipelineError;
use crate::envelope::{
    agents, Envelope, Payload, PayloadError, QueryPayload, RetrievalErrorPayload,
    RetrievalResultPayload, TransportMessage,
};
use crate::store::VectorStore;

pub struct RetrievalStage {
    store: Arc<RwLock<VectorStore>>,
    top_k: usize,
}

impl RetrievalStage {
    pub fn new(store: Arc<RwLock<VectorStore>>, top_k: usize) -> Self {
        Self { store, top_k }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Answer a query message. Never fails: every fault becomes an `ERROR`
    /// envelope addressed to the response stage with the same trace id.
    pub async fn handle_query(&self, message: &TransportMessage) -> Envelope {
        let trace_id = message.trace();
        let original_query = message
            .payload
            .get("query")
            .and_then(|q| q.as_str())
            .unwrap_or_default()
            .to_string();

        let parsed = match message.payload_fields() {
            Some(fields) => QueryPayload::from_fields(fields),
            None => Err(PayloadError::NotAnObject),
        };
        // search with the trimmed text, echo the query as it was sent
        let query = match parsed {
            Ok(payload) => payload.query,
            Err(err) => {
                tracing::warn!("Rejected query message: {}", err);
                return failure(original_query, err.to_string(), err.error_type(), trace_id);
            }
        };

        let search_text = query.trim();
        tracing::info!("Retrieving context for query ({} chars)", search_text.chars().count());
        let result = self.store.read().await.retrieve(search_text, self.top_k).await;

        match result {
            Ok(hits) => {
                let distances: Option<Vec<f32>> = (!hits.is_empty())
                    .then(|| hits.iter().map(|hit| hit.distance).collect());
                let retrieved_context: Vec<String> =
                    hits.into_iter().map(|hit| hit.text).collect();
                tracing::debug!("Retrieved {} chunks", retrieved_context.len());

                Envelope::create(
                    agents::RETRIEVAL,
                    agents::RESPONSE,
                    Payload::RetrievalResult(RetrievalResultPayload {
                        num_results: retrieved_context.len(),
                        retrieved_context,
                        query,
                        distances,
                    }),
                    trace_id,
                )
            }
            Err(err) => {
                tracing::error!("Retrieval failed: {}", err);
                failure(query, err.to_string(), err.error_type(), trace_id)
            }
        }
    }

    /// Check that the store is readable and consistent. An empty store is
    /// only worth a warning.
    pub async fn validate_store(&self) -> Result<(), PipelineError> {
        let stats = self.store.read().await.stats();

        if stats.embedding_dimension == 0 {
            return Err(PipelineError::RetrievalFailure(
                "vector store has no embedding dimension".to_string(),
            ));
        }
        if stats.index_size != stats.total_documents {
            return Err(PipelineError::RetrievalFailure(format!(
                "index holds {} vectors for {} chunks",
                stats.index_size, stats.total_documents
            )));
        }
        if stats.total_documents == 0 {
            tracing::warn!("Vector store at {} is empty", stats.location.display());
        }
        Ok(())
    }

    /// [`RetrievalStage::handle_query`] preceded by [`RetrievalStage::validate_store`].
    pub async fn process_query_with_validation(&self, message: &TransportMessage) -> Envelope {
        if let Err(err) = self.validate_store().await {
            let query = message
                .payload
                .get("query")
                .and_then(|q| q.as_str())
                .unwrap_or_default()
                .to_string();
            return failure(
                query,
                format!("Vector store validation failed: {}", err),
                "ValidationError",
                message.trace(),
            );
        }
        self.handle_query(message).await
    }
}

fn failure(query: String, error: String, error_type: &str, trace_id: Option<&str>) -> Envelope {
    Envelope::create(
        agents::RETRIEVAL,
        agents::RESPONSE,
        Payload::RetrievalError(RetrievalErrorPayload {
            retrieved_context: Vec::new(),
            query,
            error,
            error_type: error_type.to_string(),
        }),
        trace_id,
    )
}
