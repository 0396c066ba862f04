//! Embedding and Generation Providers
//!
//! The retrieval core only sees the two traits below. Concrete providers:
//!
//! - **Ollama** (`ollama`): HTTP model server, located once per session by
//!   `discovery::discover` over an ordered list of candidate endpoints.
//! - **Offline** (`offline`): deterministic hashing embedder and extractive
//!   generator, for tests and runs without a model server.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::config::ProviderConfig;
use crate::error::ProviderError;

pub mod discovery;
pub mod offline;
pub mod ollama;

pub use discovery::{discover, Discovered};
pub use offline::{ExtractiveGenerator, HashingEmbedder};
pub use ollama::{OllamaClient, OllamaEmbedder, OllamaGenerator};

/// Maps text to fixed-dimension vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Embed several texts, returning vectors in input order.
    ///
    /// Fails as a whole if any single text fails; callers that need
    /// per-text isolation fall back to `embed`.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    /// Length of every vector this provider returns
    fn dimension(&self) -> usize;

    /// Model identifier, recorded alongside a persisted index
    fn model_id(&self) -> &str;

    /// Where requests go (`offline` for in-process providers)
    fn endpoint(&self) -> &str;
}

/// Maps a prompt to answer text
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;

    fn model_id(&self) -> &str;
}

/// The provider pair a session runs with
#[derive(Clone)]
pub struct Providers {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub generator: Arc<dyn GenerationProvider>,
}

impl Providers {
    /// Discover a model server and build HTTP providers against it.
    pub async fn connect(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let found = discover(
            &config.endpoints,
            &config.embedding_model,
            config.probe_timeout(),
        )
        .await?;

        let client = OllamaClient::new(&found.endpoint, config.request_timeout())?;
        let embedder = OllamaEmbedder::new(client.clone(), &config.embedding_model, found.dimension);
        let generator = OllamaGenerator::new(client, &config.generation_model);

        info!(
            endpoint = %found.endpoint,
            embedding_model = %config.embedding_model,
            generation_model = %config.generation_model,
            dimension = found.dimension,
            "Model server providers ready"
        );

        Ok(Self {
            embedder: Arc::new(embedder),
            generator: Arc::new(generator),
        })
    }

    /// In-process providers that need no model server.
    pub fn offline(dimension: usize) -> Self {
        info!(dimension, "Using offline hashing embedder and extractive generator");
        Self {
            embedder: Arc::new(HashingEmbedder::new(dimension)),
            generator: Arc::new(ExtractiveGenerator),
        }
    }
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers")
            .field("embedding_model", &self.embedder.model_id())
            .field("endpoint", &self.embedder.endpoint())
            .field("generation_model", &self.generator.model_id())
            .finish()
    }
}
