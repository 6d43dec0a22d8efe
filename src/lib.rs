//! Document question-answering backend.
//!
//! Uploaded documents are split into chunks and embedded into a persistent
//! vector store. A question travels as envelopes from the UI to the
//! retrieval stage, which attaches the nearest chunks, and on to the
//! response stage, which asks a language model for a grounded answer.

pub mod core;
pub mod embedding;
pub mod envelope;
pub mod ingestion;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod response;
pub mod retrieval;
pub mod security;
pub mod server;
pub mod state;
pub mod store;
