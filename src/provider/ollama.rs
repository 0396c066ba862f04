//! Ollama HTTP providers
//!
//! `POST /api/embeddings {model, prompt}` -> `{embedding: [f32]}`
//! `POST /api/generate {model, prompt, stream: false}` -> `{response}`

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{EmbeddingProvider, GenerationProvider};
use crate::error::ProviderError;

/// Shared HTTP client bound to one model-server base URL
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaClient {
    /// Every request made through this client is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unreachable {
                endpoint: base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Liveness check: `GET /` must answer with a success status.
    pub async fn ping(&self) -> Result<(), ProviderError> {
        let resp = self
            .http
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .map_err(|e| self.classify(&e))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ProviderError::Http {
                endpoint: self.base_url.clone(),
                status: resp.status().as_u16(),
            })
        }
    }

    pub async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, ProviderError> {
        let resp: EmbeddingResponse = self
            .post_json(model, "/api/embeddings", &EmbeddingRequest { model, prompt: text })
            .await?;

        if resp.embedding.is_empty() {
            return Err(self.malformed("empty embedding vector"));
        }
        Ok(resp.embedding)
    }

    pub async fn generate(&self, model: &str, prompt: &str) -> Result<String, ProviderError> {
        let resp: GenerateResponse = self
            .post_json(
                model,
                "/api/generate",
                &GenerateRequest {
                    model,
                    prompt,
                    stream: false,
                },
            )
            .await?;
        Ok(resp.response)
    }

    async fn post_json<B, T>(&self, model: &str, path: &str, body: &B) -> Result<T, ProviderError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, model, "Model server request");

        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.classify(&e))?;

        match resp.status() {
            status if status.is_success() => {}
            reqwest::StatusCode::NOT_FOUND => {
                return Err(ProviderError::ModelNotFound {
                    model: model.to_string(),
                    endpoint: self.base_url.clone(),
                })
            }
            status => {
                return Err(ProviderError::Http {
                    endpoint: self.base_url.clone(),
                    status: status.as_u16(),
                })
            }
        }

        let bytes = resp.bytes().await.map_err(|e| self.classify(&e))?;
        serde_json::from_slice(&bytes).map_err(|e| self.malformed(&e.to_string()))
    }

    fn classify(&self, err: &reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout {
                endpoint: self.base_url.clone(),
                after: self.timeout,
            }
        } else if err.is_decode() || err.is_body() {
            self.malformed(&err.to_string())
        } else {
            ProviderError::Unreachable {
                endpoint: self.base_url.clone(),
                reason: err.to_string(),
            }
        }
    }

    fn malformed(&self, reason: &str) -> ProviderError {
        ProviderError::MalformedResponse {
            endpoint: self.base_url.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Embeddings from an Ollama-compatible server
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: OllamaClient,
    model: String,
    dimension: usize,
}

impl OllamaEmbedder {
    /// `dimension` is the length of the vector returned by the discovery probe.
    pub fn new(client: OllamaClient, model: &str, dimension: usize) -> Self {
        Self {
            client,
            model: model.to_string(),
            dimension,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.client.embed(&self.model, text).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> &str {
        self.client.base_url()
    }
}

/// Completions from an Ollama-compatible server
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: OllamaClient,
    model: String,
}

impl OllamaGenerator {
    pub fn new(client: OllamaClient, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        self.client.generate(&self.model, prompt).await
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = OllamaClient::new("http://127.0.0.1:11434/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:11434");
    }

    #[test]
    fn test_request_bodies() {
        let embed = serde_json::to_value(EmbeddingRequest {
            model: "llama2",
            prompt: "test",
        })
        .unwrap();
        assert_eq!(embed, serde_json::json!({"model": "llama2", "prompt": "test"}));

        let generate = serde_json::to_value(GenerateRequest {
            model: "llama2",
            prompt: "hi",
            stream: false,
        })
        .unwrap();
        assert_eq!(generate["stream"], false);
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        // Port 9 (discard) on loopback is essentially never listening
        let client = OllamaClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = client.embed("llama2", "hello").await.unwrap_err();
        assert!(err.is_fatal(), "{err:?}");
    }
}
