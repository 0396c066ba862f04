//! Retrieval-Augmented Query Engine
//!
//! question -> embed -> top-k search -> prompt -> generate -> answer

pub mod prompt;

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::QueryError;
use crate::index::SearchHit;
use crate::lifecycle::KnowledgeBaseHandle;
use crate::provider::{EmbeddingProvider, GenerationProvider};

/// Prefix of every answer that reports a failure instead of an answer
pub const ERROR_PREFIX: &str = "Error: ";

#[derive(Debug, Clone)]
pub struct Answer {
    /// Generated answer, or a labeled error string when generation failed
    pub text: String,
    /// Retrieved chunks, best first
    pub sources: Vec<SearchHit>,
    /// Whether `text` is a labeled error rather than generated output
    pub is_error: bool,
}

pub struct QueryEngine {
    knowledge_base: KnowledgeBaseHandle,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    top_k: usize,
}

impl QueryEngine {
    pub fn new(
        knowledge_base: KnowledgeBaseHandle,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
        top_k: usize,
    ) -> Self {
        Self {
            knowledge_base,
            embedder,
            generator,
            top_k: top_k.max(1),
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Answer `question` from the top `top_k` chunks.
    pub async fn query(&self, question: &str) -> Result<Answer, QueryError> {
        self.query_with_k(question, self.top_k).await
    }

    /// Answer with an explicit `k`.
    ///
    /// # Errors
    ///
    /// - `IndexNotReady` / `KnowledgeBaseFailed` when the knowledge base is
    ///   not Ready (checked before any provider call)
    /// - `Provider` when the question cannot be embedded
    ///
    /// A generation failure is not an error: it comes back as an `Answer`
    /// whose text is labeled with `ERROR_PREFIX`.
    pub async fn query_with_k(&self, question: &str, k: usize) -> Result<Answer, QueryError> {
        let index = self.knowledge_base.ready_index()?;

        let query_vector = self.embedder.embed(question).await?;
        let sources = index.search(&query_vector, k)?;

        debug!(
            k,
            hits = sources.len(),
            top_score = sources.first().map(|h| h.score),
            "Retrieved context"
        );

        let contexts: Vec<&str> = sources.iter().map(|h| h.chunk_text.as_str()).collect();
        let prompt = prompt::compose(&contexts, question);

        match self.generator.generate(&prompt).await {
            Ok(text) => {
                info!(sources = sources.len(), answer_chars = text.len(), "Answered question");
                Ok(Answer {
                    text,
                    sources,
                    is_error: false,
                })
            }
            Err(e) => {
                warn!(error = %e, "Answer generation failed");
                Ok(Answer {
                    text: format!("{ERROR_PREFIX}{e}"),
                    sources,
                    is_error: true,
                })
            }
        }
    }
}
