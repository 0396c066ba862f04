//! Offline providers
//!
//! Deterministic stand-ins for the model server: a feature-hashing
//! bag-of-words embedder and a generator that answers with the retrieved
//! context itself.

use async_trait::async_trait;

use super::{EmbeddingProvider, GenerationProvider};
use crate::error::ProviderError;
use crate::query::prompt;

pub const OFFLINE_ENDPOINT: &str = "offline";

/// Feature-hashing bag-of-words embedder.
///
/// Each lowercased word (and, for non-ASCII words, each character) is hashed
/// into one of `dimension` buckets with a hash-derived sign. The result is
/// L2-normalized, so cosine and inner product rank identically. Text with no
/// tokens embeds to the zero vector.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model_id: format!("offline-hashing-{dimension}"),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in tokens(text) {
            let digest = md5::compute(token.as_bytes()).0;
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

fn tokens(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let word = word.to_lowercase();
        if !word.is_ascii() {
            out.extend(word.chars().filter(|c| !c.is_ascii()).map(String::from));
        }
        out.push(word);
    }
    out
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.embed_text(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn endpoint(&self) -> &str {
        OFFLINE_ENDPOINT
    }
}

/// Answers with the context section of the prompt, unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveGenerator;

#[async_trait]
impl GenerationProvider for ExtractiveGenerator {
    async fn generate(&self, prompt_text: &str) -> Result<String, ProviderError> {
        let context = prompt::extract_context(prompt_text)
            .map(str::trim)
            .filter(|c| !c.is_empty());

        Ok(context.map_or_else(|| "I don't know.".to_string(), ToString::to_string))
    }

    fn model_id(&self) -> &str {
        "offline-extractive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed_text("How do I install the CLI?");
        let b = embedder.embed_text("How do I install the CLI?");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_words_score_higher() {
        let embedder = HashingEmbedder::new(256);
        let query = embedder.embed_text("install guide");
        let related = embedder.embed_text("This guide explains how to install the tool");
        let unrelated = embedder.embed_text("Billing invoices are sent monthly");
        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        assert!(embedder.embed_text("  \n ").iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_non_ascii_tokens_split_by_char() {
        assert!(tokens("安装指南").contains(&"装".to_string()));
        assert_eq!(tokens("Hello, World"), vec!["hello", "world"]);
    }

    #[tokio::test]
    async fn test_extractive_answer_is_context() {
        let prompt_text = prompt::compose(&["Run `make install`."], "How do I install?");
        let answer = ExtractiveGenerator.generate(&prompt_text).await.unwrap();
        assert_eq!(answer, "Run `make install`.");
    }

    #[tokio::test]
    async fn test_extractive_without_context() {
        let answer = ExtractiveGenerator.generate("free-form prompt").await.unwrap();
        assert_eq!(answer, "I don't know.");
    }
}
