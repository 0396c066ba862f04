//! Repo-QA: retrieval-augmented question answering over a markdown corpus
//!
//! ## Architecture
//!
//! - **Ingest**: loads `.md` files from the allowed corpus subdirectories,
//!   decoding with a primary/fallback encoding and deduplicating by content
//! - **Chunker**: paragraph-preferring, bounded, overlapping chunks
//! - **Index**: embedding vectors with top-k similarity search, persisted
//!   atomically as one compressed file
//! - **Query**: embed question -> retrieve -> prompt -> generate
//! - **Lifecycle**: load vs. rebuild of the single active knowledge base
//! - **Assistant / API**: the caller-facing surface (CLI and HTTP)

pub mod api;
pub mod assistant;
pub mod chunker;
pub mod config;
pub mod error;
pub mod index;
pub mod ingest;
pub mod lifecycle;
pub mod provider;
pub mod query;
pub mod storage;
pub mod types;

pub use assistant::{Assistant, Reply, Status, Transcript};
pub use chunker::Chunker;
pub use config::AppConfig;
pub use error::{BuildError, ChunkError, IndexError, IngestionError, LifecycleError, ProviderError, QueryError};
pub use index::{SearchHit, SimilarityMetric, VectorIndex};
pub use ingest::DocumentIngestor;
pub use lifecycle::{KnowledgeBaseHandle, KnowledgeBaseManager};
pub use provider::{EmbeddingProvider, GenerationProvider, Providers};
pub use query::{Answer, QueryEngine};
pub use types::{Chunk, Document, LifecycleState, Role, Turn};
