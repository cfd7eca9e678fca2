//! Memory Store (spec §4.2): conversational item persistence with optional
//! embedding vectors and Qdrant-backed semantic search.

pub mod error;
pub mod store;
pub mod vector_store;

pub use error::MemoryError;
pub use store::MemoryStore;
pub use vector_store::{VectorSearchResult, VectorStore, VectorStoreConfig};
