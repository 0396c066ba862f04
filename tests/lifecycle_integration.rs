//! Knowledge base lifecycle, end to end against in-process providers.

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use repo_qa::chunker::Chunker;
use repo_qa::index::store;
use repo_qa::provider::HashingEmbedder;
use repo_qa::{
    AppConfig, BuildError, DocumentIngestor, EmbeddingProvider, KnowledgeBaseManager, LifecycleError,
    LifecycleState, ProviderError, QueryError, VectorIndex,
};

fn write(root: &Path, rel: &str, text: &str) {
    let path = root.join("assets").join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, text).unwrap();
}

fn config(root: &Path, index_dir: &str) -> AppConfig {
    let mut config = AppConfig::default();
    config.corpus.root = root.join("assets");
    config.index.path = root.join(index_dir);
    config.chunking.max_chunk_size = 80;
    config.chunking.overlap_size = 10;
    config
}

fn sample_corpus(root: &Path) {
    write(
        root,
        "guide/setup.md",
        "# Setup\n\nInstall the binary and run it once.\n\nThe first run builds the knowledge base from the assets directory.",
    );
    write(root, "api/ask.md", "POST /api/v1/ask takes a JSON body with a question field.");
    write(root, "faq/ports.md", "The server listens on port 8501 by default.");
    // Same content as api/ask.md: collapses into one document
    write(root, "faq/ask-copy.md", "POST /api/v1/ask takes a JSON body with a question field.");
}

/// Blocks inside the first `embed` call until released.
struct GatedEmbedder {
    inner: HashingEmbedder,
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl GatedEmbedder {
    fn new() -> Self {
        Self {
            inner: HashingEmbedder::new(32),
            armed: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GatedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.embed(text).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn endpoint(&self) -> &str {
        "gated"
    }
}

/// Goes unreachable after `healthy_calls` successful embeddings.
struct FlakyEmbedder {
    inner: HashingEmbedder,
    healthy_calls: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.healthy_calls {
            return Err(ProviderError::Unreachable {
                endpoint: "http://127.0.0.1:11434".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        self.inner.embed(text).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn endpoint(&self) -> &str {
        "flaky"
    }
}

#[tokio::test]
async fn test_single_document_corpus_reaches_ready() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "guide/a.md", "Only one document here.");
    let config = config(tmp.path(), "vector_store");

    let kb = KnowledgeBaseManager::open(&config, Arc::new(HashingEmbedder::new(32))).unwrap();
    assert_eq!(kb.state(), LifecycleState::Absent);

    kb.initialize().await.unwrap();
    assert_eq!(kb.state(), LifecycleState::Ready);

    let summary = kb.handle().last_build().unwrap();
    assert_eq!(summary.documents, 1);
    assert_eq!(kb.handle().index().unwrap().document_count(), 1);
}

#[tokio::test]
async fn test_reingest_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    sample_corpus(tmp.path());

    let config_a = config(tmp.path(), "store_a");
    let config_b = config(tmp.path(), "store_b");

    // Chunk sequences
    let chunker = Chunker::from_config(&config_a.chunking).unwrap();
    let docs_a = DocumentIngestor::new(&config_a.corpus).unwrap().ingest().unwrap().documents;
    let docs_b = DocumentIngestor::new(&config_b.corpus).unwrap().ingest().unwrap().documents;
    assert_eq!(docs_a.len(), 3);
    assert_eq!(chunker.chunk_documents(&docs_a), chunker.chunk_documents(&docs_b));

    // Persisted indexes
    for config in [&config_a, &config_b] {
        let kb = KnowledgeBaseManager::open(config, Arc::new(HashingEmbedder::new(32))).unwrap();
        kb.initialize().await.unwrap();
    }
    let a = VectorIndex::load(&config_a.index.path).unwrap();
    let b = VectorIndex::load(&config_b.index.path).unwrap();
    assert_eq!(a.entries(), b.entries());
    assert!(a.len() > 3, "corpus should span several chunks");
}

#[tokio::test]
async fn test_round_trip_search_matches_after_reload() {
    let tmp = tempfile::tempdir().unwrap();
    sample_corpus(tmp.path());
    let config = config(tmp.path(), "vector_store");
    let embedder = HashingEmbedder::new(32);
    let query = embedder.embed_text("which port does the server use");

    let before = {
        let kb = KnowledgeBaseManager::open(&config, Arc::new(embedder.clone())).unwrap();
        kb.initialize().await.unwrap();
        kb.handle().index().unwrap().search(&query, 3).unwrap()
    };

    let kb = KnowledgeBaseManager::open(&config, Arc::new(embedder)).unwrap();
    kb.initialize().await.unwrap();
    assert!(kb.handle().last_build().is_none(), "second session must load, not rebuild");
    assert_eq!(kb.handle().index().unwrap().search(&query, 3).unwrap(), before);
}

#[tokio::test]
async fn test_update_rebuilds_from_ready_and_blocks_queries() {
    let tmp = tempfile::tempdir().unwrap();
    sample_corpus(tmp.path());
    let config = config(tmp.path(), "vector_store");

    let embedder = Arc::new(GatedEmbedder::new());
    let kb = Arc::new(KnowledgeBaseManager::open(&config, embedder.clone()).unwrap());
    kb.initialize().await.unwrap();
    assert_eq!(kb.state(), LifecycleState::Ready);

    std::fs::remove_file(store::index_file(&config.index.path)).unwrap();
    embedder.armed.store(true, Ordering::SeqCst);

    let updater = {
        let kb = Arc::clone(&kb);
        tokio::spawn(async move { kb.update_knowledge_base().await })
    };
    embedder.entered.notified().await;

    assert_eq!(kb.state(), LifecycleState::Rebuilding);
    match kb.handle().ready_index() {
        Err(QueryError::IndexNotReady(state)) => assert_eq!(state, "Rebuilding"),
        other => panic!("expected IndexNotReady, got {other:?}"),
    }
    assert!(matches!(kb.initialize().await, Err(LifecycleError::Busy(_))));
    assert!(matches!(kb.reinitialize().await, Err(LifecycleError::Busy(_))));

    embedder.release.notify_one();
    let summary = updater.await.unwrap().unwrap();

    assert_eq!(summary.documents, 3);
    assert_eq!(kb.state(), LifecycleState::Ready);
    assert!(store::exists(&config.index.path));
}

#[tokio::test]
async fn test_empty_corpus_never_reaches_ready() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "guide/readme.txt", "wrong extension");
    let config = config(tmp.path(), "vector_store");

    let kb = KnowledgeBaseManager::open(&config, Arc::new(HashingEmbedder::new(16))).unwrap();
    let err = kb.initialize().await.unwrap_err();

    assert!(err.to_string().contains("no .md documents"), "{err}");
    match kb.state() {
        LifecycleState::Failed(reason) => assert!(reason.contains("no .md documents")),
        other => panic!("expected Failed, got {other}"),
    }
    assert!(kb.handle().index().is_none());
    assert!(!store::exists(&config.index.path));
}

#[tokio::test]
async fn test_unreachable_provider_mid_build_persists_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    sample_corpus(tmp.path());
    let mut config = config(tmp.path(), "vector_store");
    config.provider.embed_batch_size = 1;

    let embedder = FlakyEmbedder {
        inner: HashingEmbedder::new(16),
        healthy_calls: 2,
        calls: AtomicUsize::new(0),
    };
    let kb = KnowledgeBaseManager::open(&config, Arc::new(embedder)).unwrap();

    let err = kb.initialize().await.unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::Build(BuildError::Provider(ProviderError::Unreachable { .. }))
    ));
    assert!(matches!(kb.state(), LifecycleState::Failed(_)));
    assert!(!store::exists(&config.index.path));
}

#[tokio::test]
async fn test_corrupt_index_is_rebuilt() {
    let tmp = tempfile::tempdir().unwrap();
    sample_corpus(tmp.path());
    let config = config(tmp.path(), "vector_store");

    std::fs::create_dir_all(&config.index.path).unwrap();
    std::fs::write(store::index_file(&config.index.path), b"\x28\xb5\x2f\xfd garbage").unwrap();

    let kb = KnowledgeBaseManager::open(&config, Arc::new(HashingEmbedder::new(16))).unwrap();
    kb.initialize().await.unwrap();

    assert_eq!(kb.state(), LifecycleState::Ready);
    assert!(kb.handle().last_build().is_some());
    assert!(VectorIndex::load(&config.index.path).is_ok());
}

#[tokio::test]
async fn test_model_change_invalidates_only_when_enabled() {
    let tmp = tempfile::tempdir().unwrap();
    sample_corpus(tmp.path());
    let mut config = config(tmp.path(), "vector_store");

    {
        let kb = KnowledgeBaseManager::open(&config, Arc::new(HashingEmbedder::new(16))).unwrap();
        kb.initialize().await.unwrap();
    }

    /// Same vectors as the hashing embedder, different model name.
    struct Renamed(HashingEmbedder);

    #[async_trait]
    impl EmbeddingProvider for Renamed {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            self.0.embed(text).await
        }
        fn dimension(&self) -> usize {
            self.0.dimension()
        }
        fn model_id(&self) -> &str {
            "renamed-model"
        }
        fn endpoint(&self) -> &str {
            "offline"
        }
    }

    config.index.invalidate_on_model_change = false;
    {
        let kb = KnowledgeBaseManager::open(&config, Arc::new(Renamed(HashingEmbedder::new(16)))).unwrap();
        kb.initialize().await.unwrap();
        assert!(kb.handle().last_build().is_none(), "model change ignored when disabled");
    }

    config.index.invalidate_on_model_change = true;
    let kb = KnowledgeBaseManager::open(&config, Arc::new(Renamed(HashingEmbedder::new(16)))).unwrap();
    kb.initialize().await.unwrap();
    assert!(kb.handle().last_build().is_some(), "model change forces a rebuild");
    assert_eq!(kb.handle().index().unwrap().embedding_model(), "renamed-model");
}
