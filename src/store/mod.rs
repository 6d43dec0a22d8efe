//! Persistent chunk store with exact L2 nearest-neighbour search.

mod flat_index;
mod persistence;
mod vector_store;

pub use flat_index::{FlatL2Index, IndexError, Neighbor};
pub use persistence::{LoadError, StoreFiles};
pub use vector_store::{LoadDiagnostic, RetrievedChunk, StoreStats, VectorStore};
