//! Vector Index
//!
//! Holds `(chunk text, embedding)` entries for one knowledge base and
//! answers top-k similarity queries. The index is built wholesale from a
//! chunk sequence and replaced wholesale on rebuild; entries are never
//! patched in place.
//!
//! ## Build failure policy
//!
//! - A batch that fails with a non-fatal provider error is retried one chunk
//!   at a time, so one bad chunk costs only itself.
//! - A chunk whose embedding fails (or has the wrong dimension) is recorded
//!   and skipped.
//! - A fatal provider error (unreachable server, unknown model) aborts the
//!   build; nothing is persisted.
//! - Zero embedded chunks is `BuildError::EmptyIndex`.

mod similarity;
pub mod store;

pub use similarity::SimilarityMetric;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{BuildError, IndexError, ProviderError};
use crate::provider::EmbeddingProvider;
use crate::types::Chunk;

/// One stored vector and the chunk it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_text: String,
    pub embedding: Vec<f32>,
}

/// One ranked search result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub chunk_text: String,
    pub score: f32,
}

/// Chunks that could not be embedded during a build
#[derive(Debug, Clone, Default)]
pub struct BuildFailures {
    /// `(chunk_id, reason)`
    pub chunks: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    embedding_model: String,
    dimension: usize,
    metric: SimilarityMetric,
    created_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
    /// Distinct `document_id`s among `entries`
    document_ids: HashSet<String>,
}

impl VectorIndex {
    pub fn new(embedding_model: &str, dimension: usize, metric: SimilarityMetric) -> Self {
        Self {
            embedding_model: embedding_model.to_string(),
            dimension,
            metric,
            created_at: Utc::now(),
            entries: Vec::new(),
            document_ids: HashSet::new(),
        }
    }

    /// Reassemble a persisted index. Entry dimensions are checked by the caller.
    pub(crate) fn from_parts(
        embedding_model: String,
        dimension: usize,
        metric: SimilarityMetric,
        created_at: DateTime<Utc>,
        entries: Vec<IndexEntry>,
    ) -> Self {
        let document_ids = entries.iter().map(|e| e.document_id.clone()).collect();
        Self {
            embedding_model,
            dimension,
            metric,
            created_at,
            entries,
            document_ids,
        }
    }

    /// Append an entry. Insertion order is the tie-break order for search.
    pub fn insert(&mut self, entry: IndexEntry) -> Result<(), IndexError> {
        if entry.embedding.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                found: entry.embedding.len(),
            });
        }
        self.push(entry);
        Ok(())
    }

    fn push(&mut self, entry: IndexEntry) {
        if !self.document_ids.contains(&entry.document_id) {
            self.document_ids.insert(entry.document_id.clone());
        }
        self.entries.push(entry);
    }

    /// Embed every chunk with `provider` and collect the results.
    pub async fn build(
        chunks: &[Chunk],
        provider: &dyn EmbeddingProvider,
        metric: SimilarityMetric,
        batch_size: usize,
    ) -> Result<(Self, BuildFailures), BuildError> {
        let mut index = Self::new(provider.model_id(), provider.dimension(), metric);
        let mut failures = BuildFailures::default();
        let batch_size = batch_size.max(1);
        let total_batches = chunks.len().div_ceil(batch_size);

        info!(
            chunks = chunks.len(),
            model = provider.model_id(),
            dimension = provider.dimension(),
            batch_size,
            "Embedding chunks"
        );

        for (batch_no, batch) in chunks.chunks(batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();

            let vectors: Vec<Result<Vec<f32>, ProviderError>> =
                match provider.embed_batch(&texts).await {
                    Ok(vectors) if vectors.len() == batch.len() => vectors.into_iter().map(Ok).collect(),
                    Ok(vectors) => {
                        warn!(
                            expected = batch.len(),
                            got = vectors.len(),
                            "Embedding batch returned wrong count, retrying per chunk"
                        );
                        embed_each(batch, provider).await?
                    }
                    Err(e) if e.is_fatal() => return Err(BuildError::Provider(e)),
                    Err(e) => {
                        warn!(error = %e, batch = batch_no, "Embedding batch failed, retrying per chunk");
                        embed_each(batch, provider).await?
                    }
                };

            for (chunk, vector) in batch.iter().zip(vectors) {
                let outcome = vector
                    .map_err(|e| e.to_string())
                    .and_then(|v| validate_vector(v, index.dimension));

                match outcome {
                    Ok(embedding) => index.push(IndexEntry {
                        chunk_id: chunk.id(),
                        document_id: chunk.document_id.clone(),
                        chunk_text: chunk.text.clone(),
                        embedding,
                    }),
                    Err(reason) => {
                        warn!(chunk = %chunk.id(), reason = %reason, "Chunk embedding failed, skipping");
                        failures.chunks.push((chunk.id(), reason));
                    }
                }
            }

            debug!(batch = batch_no + 1, total_batches, "Embedded batch");
        }

        if index.entries.is_empty() {
            return Err(BuildError::EmptyIndex {
                attempted: chunks.len(),
                failed: failures.chunks.len(),
            });
        }

        index.created_at = Utc::now();

        info!(
            entries = index.entries.len(),
            documents = index.document_count(),
            failed = failures.chunks.len(),
            "Vector index built"
        );

        Ok((index, failures))
    }

    /// Top-`k` entries by descending similarity to `query`.
    ///
    /// Equal scores keep insertion order. A NaN score ranks below every
    /// real score.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                found: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .par_iter()
            .enumerate()
            .map(|(i, entry)| {
                let score = self.metric.score(query, &entry.embedding);
                (i, if score.is_nan() { f32::NEG_INFINITY } else { score })
            })
            .collect();

        // Stable: ties stay in insertion order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| SearchHit {
                chunk_id: self.entries[i].chunk_id.clone(),
                chunk_text: self.entries[i].chunk_text.clone(),
                score,
            })
            .collect())
    }

    /// Atomically write the index under `dir`.
    pub fn persist(&self, dir: &Path) -> Result<PathBuf, IndexError> {
        store::save(self, dir)
    }

    /// Load the index persisted under `dir`.
    pub fn load(dir: &Path) -> Result<Self, IndexError> {
        store::load(dir)
    }

    /// `ModelMismatch` unless this index was built by `model` at `dimension`.
    pub fn ensure_compatible(&self, model: &str, dimension: usize) -> Result<(), IndexError> {
        if self.embedding_model == model && self.dimension == dimension {
            Ok(())
        } else {
            Err(IndexError::ModelMismatch {
                expected: format!("{model}/{dimension}"),
                found: format!("{}/{}", self.embedding_model, self.dimension),
            })
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Distinct documents with at least one entry
    pub fn document_count(&self) -> usize {
        self.document_ids.len()
    }
}

/// Embed a batch one chunk at a time. Only a fatal error aborts.
async fn embed_each(
    batch: &[Chunk],
    provider: &dyn EmbeddingProvider,
) -> Result<Vec<Result<Vec<f32>, ProviderError>>, BuildError> {
    let mut results = Vec::with_capacity(batch.len());
    for chunk in batch {
        match provider.embed(&chunk.text).await {
            Err(e) if e.is_fatal() => return Err(BuildError::Provider(e)),
            other => results.push(other),
        }
    }
    Ok(results)
}

fn validate_vector(vector: Vec<f32>, dimension: usize) -> Result<Vec<f32>, String> {
    if vector.len() != dimension {
        return Err(format!(
            "embedding has {} dimensions, provider declared {dimension}",
            vector.len()
        ));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err("embedding contains non-finite values".to_string());
    }
    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn entry(id: &str, embedding: Vec<f32>) -> IndexEntry {
        IndexEntry {
            chunk_id: id.to_string(),
            document_id: id.split('#').next().unwrap_or(id).to_string(),
            chunk_text: format!("text of {id}"),
            embedding,
        }
    }

    fn chunk(doc: &str, seq: usize, text: &str) -> Chunk {
        Chunk {
            document_id: doc.to_string(),
            text: text.to_string(),
            sequence_index: seq,
            start_offset: 0,
        }
    }

    /// Maps known texts to fixed vectors; anything containing "bad" fails.
    struct TableEmbedder {
        fatal_after: Option<usize>,
        calls: AtomicUsize,
    }

    impl TableEmbedder {
        fn new() -> Self {
            Self {
                fatal_after: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for TableEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fatal_after.is_some_and(|limit| n >= limit) {
                return Err(ProviderError::Unreachable {
                    endpoint: "stub".to_string(),
                    reason: "connection refused".to_string(),
                });
            }
            if text.contains("bad") {
                return Err(ProviderError::Timeout {
                    endpoint: "stub".to_string(),
                    after: std::time::Duration::from_secs(1),
                });
            }
            if text.contains("short") {
                return Ok(vec![1.0]);
            }
            Ok(vec![text.len() as f32, 1.0])
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_id(&self) -> &str {
            "table"
        }

        fn endpoint(&self) -> &str {
            "stub"
        }
    }

    #[test]
    fn test_top_k_ordering() {
        let mut index = VectorIndex::new("m", 2, SimilarityMetric::InnerProduct);
        index.insert(entry("low#0", vec![0.1, 0.0])).unwrap();
        index.insert(entry("high#0", vec![0.9, 0.0])).unwrap();
        index.insert(entry("mid#0", vec![0.5, 0.0])).unwrap();

        let hits = index.search(&[1.0, 0.0], 2).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["high#0", "mid#0"]);
        assert!((hits[0].score - 0.9).abs() < 1e-6);
        assert!((hits[1].score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let mut index = VectorIndex::new("m", 2, SimilarityMetric::Cosine);
        for id in ["first#0", "second#0", "third#0"] {
            index.insert(entry(id, vec![1.0, 1.0])).unwrap();
        }
        let hits = index.search(&[1.0, 1.0], 3).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["first#0", "second#0", "third#0"]);
    }

    #[test]
    fn test_search_bounds() {
        let mut index = VectorIndex::new("m", 2, SimilarityMetric::Cosine);
        index.insert(entry("a#0", vec![1.0, 0.0])).unwrap();
        assert_eq!(index.search(&[1.0, 0.0], 5).unwrap().len(), 1);
        assert!(index.search(&[1.0, 0.0], 0).unwrap().is_empty());
        assert!(matches!(
            index.search(&[1.0], 1),
            Err(IndexError::DimensionMismatch { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn test_insert_tracks_distinct_documents() {
        let mut index = VectorIndex::new("m", 1, SimilarityMetric::Cosine);
        for i in 0..100_000 {
            index.insert(entry(&format!("doc{}#{i}", i % 250), vec![1.0])).unwrap();
        }
        assert_eq!(index.len(), 100_000);
        assert_eq!(index.document_count(), 250);
    }

    #[test]
    fn test_insert_rejects_wrong_dimension() {
        let mut index = VectorIndex::new("m", 3, SimilarityMetric::Cosine);
        assert!(index.insert(entry("a#0", vec![1.0])).is_err());
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_build_skips_failed_chunks() {
        let chunks = vec![
            chunk("guide/a.md", 0, "good one"),
            chunk("guide/a.md", 1, "bad one"),
            chunk("faq/b.md", 0, "short"),
            chunk("faq/b.md", 1, "another good"),
        ];
        let provider = TableEmbedder::new();
        let (index, failures) = VectorIndex::build(&chunks, &provider, SimilarityMetric::Cosine, 2)
            .await
            .unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.document_count(), 2);
        let failed: Vec<_> = failures.chunks.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(failed, vec!["guide/a.md#1", "faq/b.md#0"]);
    }

    #[tokio::test]
    async fn test_build_all_failed_is_empty_index() {
        let chunks = vec![chunk("a", 0, "bad"), chunk("a", 1, "also bad")];
        let err = VectorIndex::build(&chunks, &TableEmbedder::new(), SimilarityMetric::Cosine, 8)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::EmptyIndex { attempted: 2, failed: 2 }));
    }

    #[tokio::test]
    async fn test_build_aborts_on_unreachable() {
        let chunks: Vec<_> = (0..6).map(|i| chunk("a", i, "fine")).collect();
        let provider = TableEmbedder {
            fatal_after: Some(3),
            calls: AtomicUsize::new(0),
        };
        let err = VectorIndex::build(&chunks, &provider, SimilarityMetric::Cosine, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Provider(ProviderError::Unreachable { .. })));
    }

    #[test]
    fn test_ensure_compatible() {
        let index = VectorIndex::new("llama2", 4096, SimilarityMetric::Cosine);
        assert!(index.ensure_compatible("llama2", 4096).is_ok());
        assert!(matches!(
            index.ensure_compatible("nomic-embed-text", 768),
            Err(IndexError::ModelMismatch { .. })
        ));
    }
}
