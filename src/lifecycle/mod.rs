//! Knowledge-Base Lifecycle Manager
//!
//! Owns the single active knowledge base of the process and decides between
//! loading the persisted index and rebuilding it from the corpus.
//!
//! ```text
//! Absent --initialize--> Loading --ok--> Ready
//!                           |
//!                  not found / corrupt / model changed
//!                           v
//!                       Rebuilding --ok--> Ready
//!                           |
//!                    fatal stage failure
//!                           v
//!                         Failed  (until reinitialize / update)
//! ```
//!
//! Loads and rebuilds are exclusive. While one runs, readers observe a
//! non-Ready state and fail fast; nothing blocks on the rebuild.
//! The active index is swapped in whole once it has been persisted.

use arc_swap::{ArcSwap, ArcSwapOption};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::chunker::Chunker;
use crate::config::{AppConfig, ChunkingConfig, CorpusConfig};
use crate::error::{BuildError, IndexError, LifecycleError, QueryError};
use crate::index::{self, SimilarityMetric, VectorIndex};
use crate::ingest::DocumentIngestor;
use crate::provider::EmbeddingProvider;
use crate::storage::{LockError, ProcessLock};
use crate::types::{BuildSummary, LifecycleState};

#[derive(Debug)]
struct Shared {
    state: ArcSwap<LifecycleState>,
    index: ArcSwapOption<VectorIndex>,
    last_build: ArcSwapOption<BuildSummary>,
}

/// Read-only view of the knowledge base, handed to the query path.
#[derive(Debug, Clone)]
pub struct KnowledgeBaseHandle {
    shared: Arc<Shared>,
}

impl KnowledgeBaseHandle {
    pub fn state(&self) -> LifecycleState {
        LifecycleState::clone(&self.shared.state.load())
    }

    /// The active index, if one is published
    pub fn index(&self) -> Option<Arc<VectorIndex>> {
        self.shared.index.load_full()
    }

    /// The active index, only when the knowledge base is Ready.
    pub fn ready_index(&self) -> Result<Arc<VectorIndex>, QueryError> {
        match self.state() {
            LifecycleState::Ready => self
                .index()
                .ok_or_else(|| QueryError::IndexNotReady(LifecycleState::Ready.name().to_string())),
            LifecycleState::Failed(reason) => Err(QueryError::KnowledgeBaseFailed(reason)),
            other => Err(QueryError::IndexNotReady(other.name().to_string())),
        }
    }

    /// Summary of the last rebuild run by this process
    pub fn last_build(&self) -> Option<Arc<BuildSummary>> {
        self.shared.last_build.load_full()
    }
}

pub struct KnowledgeBaseManager {
    shared: Arc<Shared>,
    corpus: CorpusConfig,
    chunking: ChunkingConfig,
    index_dir: PathBuf,
    metric: SimilarityMetric,
    invalidate_on_model_change: bool,
    embed_batch_size: usize,
    embedder: Arc<dyn EmbeddingProvider>,
    rebuild_lock: Mutex<()>,
    _process_lock: ProcessLock,
}

impl KnowledgeBaseManager {
    /// Take ownership of the index directory. Starts Absent.
    pub fn open(config: &AppConfig, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self, LockError> {
        let process_lock = ProcessLock::acquire(&config.index.path)?;

        Ok(Self {
            shared: Arc::new(Shared {
                state: ArcSwap::from_pointee(LifecycleState::Absent),
                index: ArcSwapOption::empty(),
                last_build: ArcSwapOption::empty(),
            }),
            corpus: config.corpus.clone(),
            chunking: config.chunking.clone(),
            index_dir: config.index.path.clone(),
            metric: config.index.metric,
            invalidate_on_model_change: config.index.invalidate_on_model_change,
            embed_batch_size: config.provider.embed_batch_size,
            embedder,
            rebuild_lock: Mutex::new(()),
            _process_lock: process_lock,
        })
    }

    pub fn handle(&self) -> KnowledgeBaseHandle {
        KnowledgeBaseHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.handle().state()
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Bring the knowledge base to Ready: load the persisted index, or
    /// rebuild it when the load fails recoverably.
    ///
    /// A no-op when already Ready.
    ///
    /// # Errors
    ///
    /// - `Busy` when another load or rebuild holds the knowledge base
    /// - `Failed` when the knowledge base is in the terminal Failed state
    /// - `Build` / `Index` when this attempt fails (the state becomes Failed)
    pub async fn initialize(&self) -> Result<(), LifecycleError> {
        let Ok(_guard) = self.rebuild_lock.try_lock() else {
            return Err(LifecycleError::Busy(self.state().name().to_string()));
        };

        match self.state() {
            LifecycleState::Ready => return Ok(()),
            LifecycleState::Failed(reason) => return Err(LifecycleError::Failed(reason)),
            _ => {}
        }

        self.transition(LifecycleState::Loading);
        match self.load_persisted() {
            Ok(index) => {
                info!(
                    entries = index.len(),
                    documents = index.document_count(),
                    model = index.embedding_model(),
                    "Loaded persisted knowledge base"
                );
                self.publish(index);
                Ok(())
            }
            Err(e) if e.is_recoverable_by_rebuild() => {
                info!(reason = %e, "Persisted knowledge base unusable, rebuilding");
                self.rebuild_locked().await.map(|_| ())
            }
            Err(e) => {
                error!(error = %e, "Failed to load persisted knowledge base");
                self.transition(LifecycleState::Failed(e.to_string()));
                Err(LifecycleError::Index(e))
            }
        }
    }

    /// `initialize` only when Absent, so a reset knowledge base is rebuilt
    /// lazily on first use.
    pub async fn ensure_initialized(&self) -> Result<(), LifecycleError> {
        if self.state() == LifecycleState::Absent {
            self.initialize().await
        } else {
            Ok(())
        }
    }

    /// Drop the persisted index and the in-memory knowledge base; back to
    /// Absent. The next `initialize` rebuilds.
    pub async fn reinitialize(&self) -> Result<(), LifecycleError> {
        let Ok(_guard) = self.rebuild_lock.try_lock() else {
            return Err(LifecycleError::Busy(self.state().name().to_string()));
        };
        self.reset()?;
        info!("Knowledge base reinitialized, will rebuild on next use");
        Ok(())
    }

    /// Discard the persisted index unconditionally (even from Ready) and
    /// rebuild from the corpus right away.
    pub async fn update_knowledge_base(&self) -> Result<Arc<BuildSummary>, LifecycleError> {
        let Ok(_guard) = self.rebuild_lock.try_lock() else {
            return Err(LifecycleError::Busy(self.state().name().to_string()));
        };
        self.reset()?;
        info!("Knowledge base update requested, rebuilding from corpus");
        self.rebuild_locked().await
    }

    fn reset(&self) -> Result<(), LifecycleError> {
        self.shared.index.store(None);
        self.transition(LifecycleState::Absent);
        index::store::discard(&self.index_dir)?;
        Ok(())
    }

    fn load_persisted(&self) -> Result<VectorIndex, IndexError> {
        let index = VectorIndex::load(&self.index_dir)?;

        let model_changed = index.embedding_model() != self.embedder.model_id();
        if (self.invalidate_on_model_change && model_changed)
            || index.dimension() != self.embedder.dimension()
        {
            index.ensure_compatible(self.embedder.model_id(), self.embedder.dimension())?;
        }
        Ok(index)
    }

    /// Caller must hold `rebuild_lock`.
    async fn rebuild_locked(&self) -> Result<Arc<BuildSummary>, LifecycleError> {
        self.transition(LifecycleState::Rebuilding);

        match self.build().await {
            Ok((index, summary)) => {
                let summary = Arc::new(summary);
                self.shared.last_build.store(Some(Arc::clone(&summary)));
                self.publish(index);
                Ok(summary)
            }
            Err(e) => {
                error!(error = %e, "Knowledge base rebuild failed");
                self.shared.index.store(None);
                self.transition(LifecycleState::Failed(e.to_string()));
                Err(LifecycleError::Build(e))
            }
        }
    }

    /// ingest -> chunk -> embed -> persist
    async fn build(&self) -> Result<(VectorIndex, BuildSummary), BuildError> {
        let report = DocumentIngestor::new(&self.corpus)?.ingest()?;
        let chunks = Chunker::from_config(&self.chunking)?.chunk_documents(&report.documents);

        let (index, failures) = VectorIndex::build(
            &chunks,
            self.embedder.as_ref(),
            self.metric,
            self.embed_batch_size,
        )
        .await?;

        // Persist before publishing: a failed save leaves nothing Ready
        index.persist(&self.index_dir)?;

        let summary = BuildSummary {
            documents: report.documents.len(),
            chunks: chunks.len(),
            embedded: index.len(),
            skipped_files: report.skipped.iter().map(ToString::to_string).collect(),
            failed_chunks: failures.chunks,
        };

        if !summary.failed_chunks.is_empty() || !summary.skipped_files.is_empty() {
            warn!(
                skipped_files = summary.skipped_files.len(),
                failed_chunks = summary.failed_chunks.len(),
                "Knowledge base built with omissions"
            );
        }
        info!(
            documents = summary.documents,
            chunks = summary.chunks,
            embedded = summary.embedded,
            "Knowledge base rebuilt"
        );

        Ok((index, summary))
    }

    fn publish(&self, index: VectorIndex) {
        self.shared.index.store(Some(Arc::new(index)));
        self.transition(LifecycleState::Ready);
    }

    fn transition(&self, next: LifecycleState) {
        let previous = self.shared.state.swap(Arc::new(next.clone()));
        if *previous != next {
            info!(from = %previous, to = %next, "Knowledge base state change");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::HashingEmbedder;

    fn config(root: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.corpus.root = root.join("assets");
        config.index.path = root.join("vector_store");
        config
    }

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join("assets").join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    fn manager(config: &AppConfig, dimension: usize) -> KnowledgeBaseManager {
        KnowledgeBaseManager::open(config, Arc::new(HashingEmbedder::new(dimension))).unwrap()
    }

    #[tokio::test]
    async fn test_fresh_start_builds_and_persists() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "guide/a.md", "# Setup\n\nRun the installer.");
        let config = config(tmp.path());

        let kb = manager(&config, 32);
        assert_eq!(kb.state(), LifecycleState::Absent);
        kb.initialize().await.unwrap();

        assert_eq!(kb.state(), LifecycleState::Ready);
        assert_eq!(kb.handle().last_build().unwrap().documents, 1);
        assert!(index::store::exists(&config.index.path));
    }

    #[tokio::test]
    async fn test_second_session_loads_without_rebuild() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "guide/a.md", "alpha");
        let config = config(tmp.path());

        {
            let kb = manager(&config, 32);
            kb.initialize().await.unwrap();
        }

        let kb = manager(&config, 32);
        kb.initialize().await.unwrap();
        assert_eq!(kb.state(), LifecycleState::Ready);
        // Loaded, not rebuilt
        assert!(kb.handle().last_build().is_none());
    }

    #[tokio::test]
    async fn test_dimension_change_forces_rebuild() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "guide/a.md", "alpha");
        let config = config(tmp.path());

        {
            let kb = manager(&config, 32);
            kb.initialize().await.unwrap();
        }

        let kb = manager(&config, 64);
        kb.initialize().await.unwrap();
        assert!(kb.handle().last_build().is_some());
        assert_eq!(kb.handle().index().unwrap().dimension(), 64);
    }

    #[tokio::test]
    async fn test_empty_corpus_fails_and_stays_failed() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path());
        let kb = manager(&config, 16);

        let err = kb.initialize().await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Build(BuildError::Ingestion(crate::error::IngestionError::EmptyCorpus { .. }))
        ));
        assert!(matches!(kb.state(), LifecycleState::Failed(_)));
        assert!(!index::store::exists(&config.index.path));

        // Adding documents alone does not leave Failed
        write(tmp.path(), "faq/q.md", "now there is content");
        assert!(matches!(kb.initialize().await, Err(LifecycleError::Failed(_))));

        kb.update_knowledge_base().await.unwrap();
        assert_eq!(kb.state(), LifecycleState::Ready);
    }

    #[tokio::test]
    async fn test_reinitialize_discards_and_rebuilds_lazily() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "guide/a.md", "alpha");
        let config = config(tmp.path());
        let kb = manager(&config, 16);
        kb.initialize().await.unwrap();

        kb.reinitialize().await.unwrap();
        assert_eq!(kb.state(), LifecycleState::Absent);
        assert!(kb.handle().index().is_none());
        assert!(!index::store::exists(&config.index.path));
        assert!(matches!(
            kb.handle().ready_index(),
            Err(QueryError::IndexNotReady(_))
        ));

        kb.ensure_initialized().await.unwrap();
        assert_eq!(kb.state(), LifecycleState::Ready);
    }
}
