//! Knowledge base persistence
//!
//! One file per knowledge base: `{dir}/knowledge_base.json.zst`, zstd
//! compressed JSON. Saves go through a sibling temp file that is synced and
//! renamed into place, so a reader only ever sees a complete file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{IndexEntry, SimilarityMetric, VectorIndex};
use crate::error::IndexError;

/// File name of the persisted knowledge base inside the index directory
pub const INDEX_FILE: &str = "knowledge_base.json.zst";

/// Bumped whenever the persisted layout changes
pub const FORMAT_VERSION: u32 = 1;

/// Zstd compression level
const ZSTD_LEVEL: i32 = 3;

#[derive(Serialize)]
struct PersistedRef<'a> {
    format_version: u32,
    embedding_model: &'a str,
    dimension: usize,
    metric: SimilarityMetric,
    created_at: DateTime<Utc>,
    document_count: usize,
    entries: &'a [IndexEntry],
}

#[derive(Deserialize)]
struct Persisted {
    format_version: u32,
    embedding_model: String,
    dimension: usize,
    metric: SimilarityMetric,
    created_at: DateTime<Utc>,
    document_count: usize,
    entries: Vec<IndexEntry>,
}

pub fn index_file(dir: &Path) -> PathBuf {
    dir.join(INDEX_FILE)
}

pub fn exists(dir: &Path) -> bool {
    index_file(dir).is_file()
}

/// Atomically write `index` under `dir`, creating the directory if needed.
pub fn save(index: &VectorIndex, dir: &Path) -> Result<PathBuf, IndexError> {
    let path = index_file(dir);
    let io_err = |source| IndexError::Io {
        path: path.clone(),
        source,
    };

    let json = serde_json::to_vec(&PersistedRef {
        format_version: FORMAT_VERSION,
        embedding_model: &index.embedding_model,
        dimension: index.dimension,
        metric: index.metric,
        created_at: index.created_at,
        document_count: index.document_count(),
        entries: &index.entries,
    })
    .map_err(|e| io_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

    let compressed = zstd::encode_all(json.as_slice(), ZSTD_LEVEL).map_err(io_err)?;

    std::fs::create_dir_all(dir).map_err(io_err)?;
    let tmp_path = path.with_extension("zst.tmp");
    {
        let mut file = File::create(&tmp_path).map_err(io_err)?;
        file.write_all(&compressed).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
    }
    std::fs::rename(&tmp_path, &path).map_err(io_err)?;

    info!(
        path = %path.display(),
        entries = index.entries.len(),
        bytes = compressed.len(),
        "Knowledge base persisted"
    );
    Ok(path)
}

/// Load the knowledge base under `dir`.
///
/// # Errors
///
/// - `IndexNotFound` when no file exists
/// - `IndexCorrupt` when it cannot be decoded, has an unknown format
///   version, holds no entries, or any entry's dimension disagrees with the
///   header
pub fn load(dir: &Path) -> Result<VectorIndex, IndexError> {
    let path = index_file(dir);
    let compressed = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(IndexError::IndexNotFound(path))
        }
        Err(source) => return Err(IndexError::Io { path, source }),
    };

    let corrupt = |reason: String| IndexError::IndexCorrupt {
        path: path.clone(),
        reason,
    };

    let json = zstd::decode_all(compressed.as_slice()).map_err(|e| corrupt(format!("zstd: {e}")))?;
    let persisted: Persisted =
        serde_json::from_slice(&json).map_err(|e| corrupt(format!("json: {e}")))?;

    if persisted.format_version != FORMAT_VERSION {
        return Err(corrupt(format!(
            "format version {} (expected {FORMAT_VERSION})",
            persisted.format_version
        )));
    }
    if persisted.entries.is_empty() {
        return Err(corrupt("no entries".to_string()));
    }
    if let Some(bad) = persisted
        .entries
        .iter()
        .find(|e| e.embedding.len() != persisted.dimension)
    {
        return Err(corrupt(format!(
            "entry {} has {} dimensions, header says {}",
            bad.chunk_id,
            bad.embedding.len(),
            persisted.dimension
        )));
    }

    debug!(
        path = %path.display(),
        entries = persisted.entries.len(),
        model = %persisted.embedding_model,
        "Knowledge base loaded"
    );

    let index = VectorIndex::from_parts(
        persisted.embedding_model,
        persisted.dimension,
        persisted.metric,
        persisted.created_at,
        persisted.entries,
    );
    if index.document_count() != persisted.document_count {
        return Err(corrupt(format!(
            "header lists {} documents, entries cover {}",
            persisted.document_count,
            index.document_count()
        )));
    }
    Ok(index)
}

/// Remove the persisted knowledge base (and any stray temp file).
///
/// Returns whether a knowledge base file was present.
pub fn discard(dir: &Path) -> Result<bool, IndexError> {
    let path = index_file(dir);
    let _ = std::fs::remove_file(path.with_extension("zst.tmp"));

    match std::fs::remove_file(&path) {
        Ok(()) => {
            info!(path = %path.display(), "Persisted knowledge base removed");
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(IndexError::Io { path, source }),
    }
}
