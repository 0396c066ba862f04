//! Error taxonomy for the retrieval pipeline
//!
//! File-level and single-chunk failures are recovered where they happen
//! (skipped and recorded); whole-corpus, whole-index and provider
//! reachability failures are surfaced to the caller.

use std::path::PathBuf;
use std::time::Duration;

/// Errors raised while ingesting the corpus
#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
    /// No document could be loaded from any allowed subdirectory. Fatal.
    #[error("no .{extension} documents found under {root} (searched: {})", searched.join(", "))]
    EmptyCorpus {
        root: PathBuf,
        extension: String,
        searched: Vec<String>,
    },

    /// Neither the primary nor the fallback encoding could decode the file.
    /// Recovered by skipping the file.
    #[error("cannot decode {path} as {primary} or {fallback}")]
    FileDecode {
        path: PathBuf,
        primary: String,
        fallback: String,
    },

    /// The file could not be read at all. Recovered by skipping the file.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An encoding label in the configuration is not recognised.
    #[error("unknown text encoding label: {0}")]
    UnknownEncoding(String),
}

/// Errors raised by the chunker
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("max_chunk_size must be greater than zero")]
    ZeroChunkSize,
    #[error("overlap_size ({overlap}) must be smaller than max_chunk_size ({max})")]
    OverlapTooLarge { overlap: usize, max: usize },
}

/// Errors raised by embedding and generation providers
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("model server unreachable at {endpoint}: {reason}")]
    Unreachable { endpoint: String, reason: String },

    #[error("request to {endpoint} timed out after {}s", after.as_secs())]
    Timeout { endpoint: String, after: Duration },

    #[error("model '{model}' not found at {endpoint}")]
    ModelNotFound { model: String, endpoint: String },

    #[error("model server at {endpoint} returned HTTP {status}")]
    Http { endpoint: String, status: u16 },

    #[error("malformed response from {endpoint}: {reason}")]
    MalformedResponse { endpoint: String, reason: String },
}

impl ProviderError {
    /// Whether this failure means the provider cannot serve *any* request,
    /// as opposed to a failure isolated to one input.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProviderError::Unreachable { .. } | ProviderError::ModelNotFound { .. }
        )
    }
}

/// Errors raised while building a vector index
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    #[error(transparent)]
    Chunking(#[from] ChunkError),

    /// Every chunk failed to embed (or there were no chunks). Fatal.
    #[error("index is empty: 0 of {attempted} chunks embedded ({failed} failed)")]
    EmptyIndex { attempted: usize, failed: usize },

    #[error("embedding provider failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("failed to persist index: {0}")]
    Persist(#[from] IndexError),
}

/// Errors raised by the vector index and its persistence
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("no persisted index at {0}")]
    IndexNotFound(PathBuf),

    #[error("persisted index at {path} is corrupt: {reason}")]
    IndexCorrupt { path: PathBuf, reason: String },

    #[error("persisted index was built with {found}, active provider is {expected}")]
    ModelMismatch { expected: String, found: String },

    #[error("vector dimension mismatch: expected {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("index I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IndexError {
    /// Load failures that the lifecycle recovers from by rebuilding.
    pub fn is_recoverable_by_rebuild(&self) -> bool {
        matches!(
            self,
            IndexError::IndexNotFound(_)
                | IndexError::IndexCorrupt { .. }
                | IndexError::ModelMismatch { .. }
        )
    }
}

/// Errors surfaced by the query path
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The knowledge base is not Ready. Retryable.
    #[error("knowledge base is not ready (state: {0})")]
    IndexNotReady(String),

    /// The knowledge base is in the terminal Failed state until reset.
    #[error("knowledge base failed to initialize: {0}")]
    KnowledgeBaseFailed(String),

    #[error("embedding provider failed: {0}")]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

impl QueryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueryError::IndexNotReady(_))
    }
}

/// Errors raised by knowledge base lifecycle commands
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// Another load or rebuild is in progress.
    #[error("knowledge base is busy ({0})")]
    Busy(String),

    /// Failed is terminal until reinitialize or update.
    #[error("knowledge base is in the Failed state: {0}")]
    Failed(String),

    #[error("knowledge base build failed: {0}")]
    Build(#[from] BuildError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

impl From<LifecycleError> for QueryError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Busy(state) => QueryError::IndexNotReady(state),
            LifecycleError::Failed(reason) => QueryError::KnowledgeBaseFailed(reason),
            LifecycleError::Build(e) => QueryError::KnowledgeBaseFailed(e.to_string()),
            LifecycleError::Index(e) => QueryError::Index(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_fatality() {
        let unreachable = ProviderError::Unreachable {
            endpoint: "http://127.0.0.1:11434".to_string(),
            reason: "connection refused".to_string(),
        };
        let timeout = ProviderError::Timeout {
            endpoint: "http://127.0.0.1:11434".to_string(),
            after: Duration::from_secs(5),
        };
        assert!(unreachable.is_fatal());
        assert!(!timeout.is_fatal());
        assert!(timeout.to_string().contains("5s"));
    }

    #[test]
    fn test_index_error_recovery_classification() {
        assert!(IndexError::IndexNotFound(PathBuf::from("vector_store")).is_recoverable_by_rebuild());
        assert!(IndexError::ModelMismatch {
            expected: "llama2/4096".to_string(),
            found: "nomic/768".to_string(),
        }
        .is_recoverable_by_rebuild());
        assert!(!IndexError::DimensionMismatch { expected: 3, found: 4 }.is_recoverable_by_rebuild());
    }

    #[test]
    fn test_empty_corpus_message_lists_subdirs() {
        let err = IngestionError::EmptyCorpus {
            root: PathBuf::from("assets"),
            extension: "md".to_string(),
            searched: vec!["guide".to_string(), "api".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains(".md"));
        assert!(msg.contains("guide, api"));
    }

    #[test]
    fn test_only_not_ready_is_retryable() {
        assert!(QueryError::IndexNotReady("Rebuilding".to_string()).is_retryable());
        assert!(!QueryError::KnowledgeBaseFailed("EmptyCorpus".to_string()).is_retryable());
    }

    #[test]
    fn test_lifecycle_errors_surface_as_query_errors() {
        let busy: QueryError = LifecycleError::Busy("Loading".to_string()).into();
        assert!(busy.is_retryable());

        let build: QueryError = LifecycleError::Build(BuildError::EmptyIndex {
            attempted: 4,
            failed: 4,
        })
        .into();
        match build {
            QueryError::KnowledgeBaseFailed(reason) => assert!(reason.contains("0 of 4")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
