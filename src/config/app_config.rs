//! Application Configuration - every tunable as a TOML value
//!
//! Each section implements `Default` with the values in `defaults`, so an
//! empty or partial file behaves exactly like the built-in configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;
use crate::index::SimilarityMetric;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration.
///
/// Load with `AppConfig::load()` which searches:
/// 1. `$REPO_QA_CONFIG` env var
/// 2. `./repo_qa.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where documents come from
    #[serde(default)]
    pub corpus: CorpusConfig,

    /// Chunk sizing
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Model server discovery and models
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Persisted knowledge base
    #[serde(default)]
    pub index: IndexConfig,

    /// Retrieval
    #[serde(default)]
    pub query: QueryConfig,

    /// HTTP API
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Environment variable naming an explicit config file
    pub const CONFIG_ENV: &'static str = "REPO_QA_CONFIG";

    /// Config file looked up in the working directory
    pub const LOCAL_FILE: &'static str = "repo_qa.toml";

    /// Load configuration using the standard search order, then apply
    /// environment overrides.
    pub fn load() -> Self {
        let mut config = Self::load_file_or_default();
        config.apply_env_overrides();
        config
    }

    fn load_file_or_default() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var(Self::CONFIG_ENV) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded config from {}", Self::CONFIG_ENV);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config, falling back");
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", Self::CONFIG_ENV);
            }
        }

        // 2. Check ./repo_qa.toml
        let local = PathBuf::from(Self::LOCAL_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded config from ./{}", Self::LOCAL_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", Self::LOCAL_FILE);
                }
            }
        }

        // 3. Defaults
        info!("No {} found, using built-in defaults", Self::LOCAL_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    /// `REPO_QA_CORPUS`, `REPO_QA_INDEX_PATH` and `REPO_QA_SERVER_ADDR`
    /// take precedence over file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var("REPO_QA_CORPUS") {
            self.corpus.root = PathBuf::from(root);
        }
        if let Ok(path) = std::env::var("REPO_QA_INDEX_PATH") {
            self.index.path = PathBuf::from(path);
        }
        if let Ok(addr) = std::env::var("REPO_QA_SERVER_ADDR") {
            self.server.addr = addr;
        }
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Save config to a file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Validate all settings for internal consistency, collecting every
    /// violation rather than stopping at the first.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.corpus.subdirs.is_empty() {
            errors.push("corpus.subdirs must name at least one directory".to_string());
        }
        if self.corpus.extension.trim().is_empty() {
            errors.push("corpus.extension must not be empty".to_string());
        }
        if self.corpus.extension.starts_with('.') {
            errors.push(format!(
                "corpus.extension ({}) must not start with a dot",
                self.corpus.extension
            ));
        }
        for (key, label) in [
            ("corpus.primary_encoding", &self.corpus.primary_encoding),
            ("corpus.fallback_encoding", &self.corpus.fallback_encoding),
        ] {
            if encoding_rs::Encoding::for_label(label.as_bytes()).is_none() {
                errors.push(format!("{key} ({label}) is not a known encoding label"));
            }
        }

        if self.chunking.max_chunk_size == 0 {
            errors.push("chunking.max_chunk_size must be > 0".to_string());
        }
        if self.chunking.overlap_size >= self.chunking.max_chunk_size {
            errors.push(format!(
                "chunking.overlap_size ({}) must be less than max_chunk_size ({})",
                self.chunking.overlap_size, self.chunking.max_chunk_size
            ));
        }
        if self.chunking.batch_size == 0 {
            errors.push("chunking.batch_size must be > 0".to_string());
        }

        if self.provider.endpoints.is_empty() {
            errors.push("provider.endpoints must list at least one candidate".to_string());
        }
        if self.provider.embedding_model.trim().is_empty() {
            errors.push("provider.embedding_model must not be empty".to_string());
        }
        if self.provider.generation_model.trim().is_empty() {
            errors.push("provider.generation_model must not be empty".to_string());
        }
        if self.provider.probe_timeout_secs == 0 {
            errors.push("provider.probe_timeout_secs must be > 0".to_string());
        }
        if self.provider.request_timeout_secs == 0 {
            errors.push("provider.request_timeout_secs must be > 0".to_string());
        }
        if self.provider.embed_batch_size == 0 {
            errors.push("provider.embed_batch_size must be > 0".to_string());
        }

        if self.query.top_k == 0 {
            errors.push("query.top_k must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),
    #[error("Config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, #[source] toml::de::Error),
    #[error("Config serialization error: {0}")]
    Serialize(#[source] toml::ser::Error),
    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Corpus root; only `subdirs` beneath it are walked
    pub root: PathBuf,
    pub subdirs: Vec<String>,
    /// File extension without the dot
    pub extension: String,
    pub primary_encoding: String,
    pub fallback_encoding: String,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(defaults::CORPUS_ROOT),
            subdirs: defaults::CORPUS_SUBDIRS.iter().map(ToString::to_string).collect(),
            extension: defaults::CORPUS_EXTENSION.to_string(),
            primary_encoding: defaults::PRIMARY_ENCODING.to_string(),
            fallback_encoding: defaults::FALLBACK_ENCODING.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_chunk_size: usize,
    pub overlap_size: usize,
    pub batch_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: defaults::MAX_CHUNK_SIZE,
            overlap_size: defaults::OVERLAP_SIZE,
            batch_size: defaults::CHUNK_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Candidate base URLs, probed in order once at startup
    pub endpoints: Vec<String>,
    pub embedding_model: String,
    pub generation_model: String,
    pub probe_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub embed_batch_size: usize,
}

impl ProviderConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoints: defaults::PROVIDER_ENDPOINTS.iter().map(ToString::to_string).collect(),
            embedding_model: defaults::EMBEDDING_MODEL.to_string(),
            generation_model: defaults::GENERATION_MODEL.to_string(),
            probe_timeout_secs: defaults::PROBE_TIMEOUT_SECS,
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
            embed_batch_size: defaults::EMBED_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory holding the persisted knowledge base
    pub path: PathBuf,
    pub metric: SimilarityMetric,
    /// Treat an index built by a different embedding model as stale
    pub invalidate_on_model_change: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(defaults::INDEX_PATH),
            metric: SimilarityMetric::Cosine,
            invalidate_on_model_change: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub top_k: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: defaults::TOP_K,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: defaults::SERVER_ADDR.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of human-readable ones
    pub json: bool,
}
