//! System-wide default constants.
//!
//! Grouped by subsystem. Every value here is also the `Default` of the
//! matching `AppConfig` field.

// ============================================================================
// Corpus
// ============================================================================

/// Corpus root directory.
pub const CORPUS_ROOT: &str = "assets";

/// Subdirectories of the corpus root that are ingested, in order.
pub const CORPUS_SUBDIRS: [&str; 3] = ["guide", "api", "faq"];

/// Extension (without the dot) of files that are ingested.
pub const CORPUS_EXTENSION: &str = "md";

/// Encoding tried first when decoding a corpus file.
pub const PRIMARY_ENCODING: &str = "utf-8";

/// Encoding tried when the primary one fails.
pub const FALLBACK_ENCODING: &str = "gbk";

// ============================================================================
// Chunking
// ============================================================================

/// Maximum chunk core size in characters.
pub const MAX_CHUNK_SIZE: usize = 500;

/// Characters shared between adjacent chunks of one document.
pub const OVERLAP_SIZE: usize = 50;

/// Documents chunked per batch (progress logging granularity only).
pub const CHUNK_BATCH_SIZE: usize = 50;

// ============================================================================
// Model server
// ============================================================================

/// Candidate model-server addresses, probed in order once per session.
pub const PROVIDER_ENDPOINTS: [&str; 3] = [
    "http://127.0.0.1:11434",
    "http://localhost:11434",
    "http://[::1]:11434",
];

/// Model used for embeddings.
pub const EMBEDDING_MODEL: &str = "llama2";

/// Model used for answer generation.
pub const GENERATION_MODEL: &str = "llama2";

/// Timeout for the availability probe (seconds).
pub const PROBE_TIMEOUT_SECS: u64 = 5;

/// Timeout for production embed/generate calls (seconds).
pub const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Chunks sent per embedding batch.
pub const EMBED_BATCH_SIZE: usize = 16;

// ============================================================================
// Index & query
// ============================================================================

/// Directory holding the persisted knowledge base.
pub const INDEX_PATH: &str = "vector_store";

/// Chunks retrieved per question.
///
/// 1 favours precision: each document yields only a handful of chunks.
pub const TOP_K: usize = 1;

/// Dimension of the offline hashing embedder.
pub const OFFLINE_DIMENSION: usize = 256;

// ============================================================================
// Server
// ============================================================================

/// HTTP API bind address.
pub const SERVER_ADDR: &str = "127.0.0.1:8501";
