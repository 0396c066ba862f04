//! Similarity metrics

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a query vector is scored against stored vectors. Higher is closer.
///
/// `Cosine` suits providers whose vectors are not normalized; for
/// L2-normalized providers both metrics rank identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    #[default]
    Cosine,
    InnerProduct,
}

impl SimilarityMetric {
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            SimilarityMetric::Cosine => cosine(a, b),
            SimilarityMetric::InnerProduct => dot(a, b),
        }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimilarityMetric::Cosine => f.write_str("cosine"),
            SimilarityMetric::InnerProduct => f.write_str("inner_product"),
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Cosine similarity; 0.0 when either vector has zero norm.
fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = dot(a, a).sqrt();
    let norm_b = dot(b, b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_ignores_magnitude() {
        let a = [1.0, 2.0, 3.0];
        let b = [2.0, 4.0, 6.0];
        assert!((SimilarityMetric::Cosine.score(&a, &b) - 1.0).abs() < 1e-6);
        assert!((SimilarityMetric::InnerProduct.score(&a, &b) - 28.0).abs() < 1e-6);
    }

    #[test]
    fn test_orthogonal_and_zero() {
        assert_eq!(SimilarityMetric::Cosine.score(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(SimilarityMetric::Cosine.score(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&SimilarityMetric::InnerProduct).unwrap(),
            "\"inner_product\""
        );
        let parsed: SimilarityMetric = serde_json::from_str("\"cosine\"").unwrap();
        assert_eq!(parsed, SimilarityMetric::Cosine);
    }
}
