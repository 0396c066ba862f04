//! Model server discovery
//!
//! Candidates are probed once, in order, at session start. A candidate is
//! adopted when it answers `GET /` and returns a non-empty vector for a
//! probe embedding; the vector's length becomes the declared dimension.

use std::time::Duration;
use tracing::{info, warn};

use super::OllamaClient;
use crate::error::ProviderError;

/// Probe text sent to each candidate
const PROBE_PROMPT: &str = "test";

/// The adopted endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovered {
    pub endpoint: String,
    pub dimension: usize,
}

/// Try every candidate in order and adopt the first that serves `model`.
///
/// # Errors
///
/// `ModelNotFound` if any candidate answered 404 for the model,
/// otherwise `Unreachable` naming every candidate tried.
pub async fn discover(
    endpoints: &[String],
    model: &str,
    probe_timeout: Duration,
) -> Result<Discovered, ProviderError> {
    let mut failures: Vec<ProviderError> = Vec::new();

    for endpoint in endpoints {
        info!(endpoint = %endpoint, model, "Probing model server");
        match probe(endpoint, model, probe_timeout).await {
            Ok(dimension) => {
                info!(endpoint = %endpoint, dimension, "Model server adopted");
                return Ok(Discovered {
                    endpoint: endpoint.trim_end_matches('/').to_string(),
                    dimension,
                });
            }
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "Model server probe failed");
                failures.push(e);
            }
        }
    }

    if let Some(not_found) = failures
        .iter()
        .find(|e| matches!(e, ProviderError::ModelNotFound { .. }))
    {
        return Err(not_found.clone());
    }

    Err(ProviderError::Unreachable {
        endpoint: endpoints.join(", "),
        reason: failures
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; "),
    })
}

async fn probe(endpoint: &str, model: &str, timeout: Duration) -> Result<usize, ProviderError> {
    let client = OllamaClient::new(endpoint, timeout)?;
    client.ping().await?;
    let vector = client.embed(model, PROBE_PROMPT).await?;
    Ok(vector.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_candidates_is_unreachable() {
        let err = discover(&[], "llama2", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn test_all_refused_is_unreachable() {
        let endpoints = vec!["http://127.0.0.1:9".to_string()];
        let err = discover(&endpoints, "llama2", Duration::from_secs(2)).await.unwrap_err();
        match err {
            ProviderError::Unreachable { endpoint, .. } => assert_eq!(endpoint, "http://127.0.0.1:9"),
            other => panic!("expected Unreachable, got {other:?}"),
        }
    }
}
