//! Knowledge base lifecycle types

use serde::Serialize;
use std::fmt;

/// Lifecycle of the single active knowledge base.
///
/// ```text
/// Absent -> Loading -> Ready
///              |
///              v
///          Rebuilding -> Ready
///              |
///              v
///            Failed   (terminal until reinitialize / update)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason")]
pub enum LifecycleState {
    Absent,
    Loading,
    Ready,
    Rebuilding,
    Failed(String),
}

impl LifecycleState {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleState::Absent => "Absent",
            LifecycleState::Loading => "Loading",
            LifecycleState::Ready => "Ready",
            LifecycleState::Rebuilding => "Rebuilding",
            LifecycleState::Failed(_) => "Failed",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, LifecycleState::Ready)
    }

    /// Loading or Rebuilding
    pub fn is_busy(&self) -> bool {
        matches!(self, LifecycleState::Loading | LifecycleState::Rebuilding)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Failed(reason) => write!(f, "Failed ({reason})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Outcome of a completed ingest -> chunk -> embed -> persist run
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildSummary {
    pub documents: usize,
    pub chunks: usize,
    pub embedded: usize,
    /// Files skipped during ingestion (decode/read failures)
    pub skipped_files: Vec<String>,
    /// Chunks whose embedding failed, with the reason
    pub failed_chunks: Vec<(String, String)>,
}
