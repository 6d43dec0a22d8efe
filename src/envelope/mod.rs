//! Inter-stage message protocol.
//!
//! Every hop of the pipeline (UI → retrieval → response → UI) exchanges an
//! [`Envelope`], serialized on the wire as a [`TransportMessage`] with the
//! fields `sender`, `receiver`, `type`, `trace_id`, `payload`, `timestamp`.
//! The `trace_id` is the correlation id of one originating request and is
//! copied unchanged into every envelope produced while serving it.

mod message;
mod payload;
mod transport;

pub use message::Envelope;
pub use payload::{
    AnswerPayload, ConversionErrorPayload, CreationErrorPayload, ErrorPayload, MessageKind,
    Payload, PayloadError, QueryPayload, RetrievalErrorPayload, RetrievalResultPayload,
    SuccessPayload,
};
pub use transport::{new_trace_id, now_timestamp, TransportMessage, ERROR_HANDLER, SYSTEM_SENDER};

/// Stage identities used as sender/receiver names.
pub mod agents {
    pub const UI: &str = "UI";
    pub const RETRIEVAL: &str = "RetrievalAgent";
    pub const RESPONSE: &str = "LLMResponseAgent";
    pub const INGESTION: &str = "IngestionAgent";
}
