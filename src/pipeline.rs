//! Wires the stages together: upload → chunks → store, and
//! query → retrieval → response.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::core::config::Settings;
use crate::core::errors::PipelineError;
use crate::envelope::{
    agents, AnswerPayload, Envelope, Payload, QueryPayload, TransportMessage, SYSTEM_SENDER,
};
use crate::ingestion::{IngestReport, IngestionStage, RecursiveSplitter};
use crate::llm::LanguageModel;
use crate::response::ResponseStage;
use crate::retrieval::RetrievalStage;
use crate::store::{StoreStats, VectorStore};

const EMPTY_STORE_ANSWER: &str =
    "No documents have been indexed yet. Please upload documents first.";

/// Both envelopes produced for one question.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub retrieval: Envelope,
    pub response: Envelope,
}

impl QueryOutcome {
    /// The answer text, also set when the response is an error.
    pub fn answer(&self) -> Option<&str> {
        match self.response.payload() {
            Payload::FinalResponse(answer) | Payload::ResponseError(answer) => {
                Some(answer.answer.as_str())
            }
            _ => None,
        }
    }
}

pub struct Pipeline {
    store: Arc<RwLock<VectorStore>>,
    ingestion: IngestionStage,
    retrieval: RetrievalStage,
    response: ResponseStage,
}

impl Pipeline {
    pub fn new(store: Arc<RwLock<VectorStore>>, llm: Arc<dyn LanguageModel>, settings: &Settings) -> Self {
        Self {
            ingestion: IngestionStage::new(
                store.clone(),
                RecursiveSplitter::from_settings(&settings.chunking),
            ),
            retrieval: RetrievalStage::new(store.clone(), settings.retrieval.top_k),
            response: ResponseStage::new(llm, settings.llm.clone()),
            store,
        }
    }

    pub fn ingestion(&self) -> &IngestionStage {
        &self.ingestion
    }

    pub fn retrieval(&self) -> &RetrievalStage {
        &self.retrieval
    }

    pub fn response(&self) -> &ResponseStage {
        &self.response
    }

    /// Run a question through retrieval and response synthesis.
    ///
    /// Each stage receives the previous envelope in transport form. When
    /// retrieval found nothing the model is not called and the response is
    /// an error.
    pub async fn ask(&self, query: &str) -> QueryOutcome {
        let question = Envelope::create(
            agents::UI,
            agents::RETRIEVAL,
            Payload::Query(QueryPayload {
                query: query.to_string(),
            }),
            None,
        );
        tracing::info!("{}", question.summary());

        let retrieval = self
            .retrieval
            .process_query_with_validation(&question.to_transport_form())
            .await;
        tracing::info!("{}", retrieval.summary());

        let response = self.respond(&retrieval).await;
        tracing::info!("{}", response.summary());

        QueryOutcome {
            retrieval,
            response,
        }
    }

    /// Answer a retrieval envelope. A result with no context means the store
    /// was empty when retrieval ran, so the model is not called.
    async fn respond(&self, retrieval: &Envelope) -> Envelope {
        match retrieval.payload() {
            Payload::RetrievalResult(result) if result.num_results == 0 => Envelope::create(
                agents::RESPONSE,
                agents::UI,
                Payload::ResponseError(AnswerPayload {
                    answer: EMPTY_STORE_ANSWER.to_string(),
                    source_context: String::new(),
                }),
                Some(retrieval.trace_id()),
            ),
            _ => {
                self.response
                    .generate_response(&retrieval.to_transport_form())
                    .await
            }
        }
    }

    pub async fn ingest(&self, name: &str, bytes: &[u8]) -> Result<IngestReport, PipelineError> {
        self.ingestion.ingest(name, bytes).await
    }

    pub async fn stats(&self) -> StoreStats {
        self.store.read().await.stats()
    }

    pub async fn clear(&self) -> Result<(), PipelineError> {
        self.store.write().await.clear()
    }

    /// Route a raw transport message to the stage named as its receiver.
    pub async fn dispatch(&self, message: &TransportMessage) -> Envelope {
        match message.receiver.trim() {
            agents::RETRIEVAL => self.retrieval.handle_query(message).await,
            agents::RESPONSE => self.response.generate_response(message).await,
            other => Envelope::error_message(
                &PipelineError::InvalidEnvelope(format!("unknown receiver '{}'", other)),
                SYSTEM_SENDER,
                agents::UI,
                message.trace(),
            ),
        }
    }
}
