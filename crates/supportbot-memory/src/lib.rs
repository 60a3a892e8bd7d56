//! Persistent embedding index: corpus loading, chunking, `SQLite` storage and
//! nearest-neighbour queries.

pub mod document;
pub mod embedding_store;
pub mod error;
pub mod index;
pub mod sqlite;

pub use embedding_store::{BuildOutcome, EmbeddingStore, StalenessPolicy, StoreConfig};
pub use error::StoreError;
pub use index::{Distance, ScoredChunk, VectorIndex};
