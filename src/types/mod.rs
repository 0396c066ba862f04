//! Shared data structures for the retrieval pipeline
//!
//! - `Document`: one decoded corpus file (immutable once loaded)
//! - `Chunk`: a contiguous span of a document, the atomic retrieval unit
//! - `LifecycleState`: where the knowledge base currently is
//! - `Turn`: a tagged conversation turn for the caller-facing surface

mod chunk;
mod conversation;
mod document;
mod knowledge_base;

pub use chunk::*;
pub use conversation::*;
pub use document::*;
pub use knowledge_base::*;
