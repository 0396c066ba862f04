//! Document Ingestor
//!
//! Loads text documents from the allowed subdirectories of the corpus root.
//!
//! ## Rules
//!
//! - Only files with the configured extension beneath an allowed
//!   subdirectory are considered; walk order is sorted so a run is
//!   reproducible.
//! - Each file is decoded with the primary encoding, then exactly one
//!   fallback. A file neither can decode is skipped and recorded.
//! - A path is never loaded twice per run, and two paths whose decoded text
//!   is identical collapse into the first one seen.
//! - A missing subdirectory is a warning; zero documents overall is fatal.

mod decode;

pub use decode::TextDecoder;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::CorpusConfig;
use crate::error::IngestionError;
use crate::types::{ContentDigest, Document};

/// Result of one ingestion run
#[derive(Debug, Default)]
pub struct IngestReport {
    pub documents: Vec<Document>,
    /// Non-fatal per-file failures (decode or read errors)
    pub skipped: Vec<IngestionError>,
    /// Allowed subdirectories that do not exist
    pub missing_subdirs: Vec<PathBuf>,
    /// Files dropped because their content matched an earlier document
    pub duplicate_content: Vec<PathBuf>,
}

/// Loads and deduplicates corpus documents
#[derive(Debug, Clone)]
pub struct DocumentIngestor {
    root: PathBuf,
    subdirs: Vec<String>,
    extension: String,
    decoder: TextDecoder,
}

impl DocumentIngestor {
    pub fn new(config: &CorpusConfig) -> Result<Self, IngestionError> {
        Ok(Self {
            root: config.root.clone(),
            subdirs: config.subdirs.clone(),
            extension: config.extension.trim_start_matches('.').to_string(),
            decoder: TextDecoder::from_labels(&config.primary_encoding, &config.fallback_encoding)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk every allowed subdirectory and load its documents.
    ///
    /// # Errors
    ///
    /// `IngestionError::EmptyCorpus` when no document was loaded at all.
    pub fn ingest(&self) -> Result<IngestReport, IngestionError> {
        let mut report = IngestReport::default();
        let mut seen_paths: HashSet<PathBuf> = HashSet::new();
        let mut seen_contents: HashSet<ContentDigest> = HashSet::new();

        info!(root = %self.root.display(), subdirs = ?self.subdirs, "Scanning corpus");

        for subdir in &self.subdirs {
            let dir = self.root.join(subdir);
            if !dir.is_dir() {
                warn!(dir = %dir.display(), "Corpus subdirectory does not exist");
                report.missing_subdirs.push(dir);
                continue;
            }

            let mut files = Vec::new();
            if let Err(source) = collect_files(&dir, &self.extension, &mut files) {
                warn!(dir = %dir.display(), error = %source, "Failed to walk corpus subdirectory");
                report.skipped.push(IngestionError::Io { path: dir, source });
                continue;
            }

            for path in files {
                let identity = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
                if !seen_paths.insert(identity) {
                    debug!(path = %path.display(), "Skipping already loaded path");
                    continue;
                }

                let document = match self.load_document(&path) {
                    Ok(document) => document,
                    Err(e) => {
                        warn!(error = %e, "Skipping file");
                        report.skipped.push(e);
                        continue;
                    }
                };

                if !seen_contents.insert(document.digest()) {
                    debug!(path = %path.display(), digest = %document.digest(), "Skipping duplicate content");
                    report.duplicate_content.push(path);
                    continue;
                }

                debug!(
                    id = document.id(),
                    encoding = document.encoding_used(),
                    "Loaded document"
                );
                report.documents.push(document);
            }
        }

        if report.documents.is_empty() {
            return Err(IngestionError::EmptyCorpus {
                root: self.root.clone(),
                extension: self.extension.clone(),
                searched: self.subdirs.clone(),
            });
        }

        info!(
            documents = report.documents.len(),
            skipped = report.skipped.len(),
            duplicates = report.duplicate_content.len(),
            missing_subdirs = report.missing_subdirs.len(),
            "Corpus ingested"
        );

        Ok(report)
    }

    fn load_document(&self, path: &Path) -> Result<Document, IngestionError> {
        let bytes = std::fs::read(path).map_err(|source| IngestionError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let (text, encoding) =
            self.decoder
                .decode(&bytes)
                .ok_or_else(|| IngestionError::FileDecode {
                    path: path.to_path_buf(),
                    primary: self.decoder.primary_name().to_string(),
                    fallback: self.decoder.fallback_name().to_string(),
                })?;

        Ok(Document::new(
            path.to_path_buf(),
            self.document_id(path),
            text,
            encoding,
        ))
    }

    /// Corpus-relative, `/`-separated id (`guide/setup/a.md`)
    fn document_id(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Recursively collect files with `extension`, sorted by path.
///
/// Symlinked files are followed; symlinked directories are not, so a link
/// cycle cannot recurse forever.
fn collect_files(dir: &Path, extension: &str, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for path in entries {
        let Ok(meta) = std::fs::symlink_metadata(&path) else {
            continue;
        };
        if meta.is_dir() {
            collect_files(&path, extension, out)?;
        } else if meta.file_type().is_symlink() && path.is_dir() {
            debug!(path = %path.display(), "Skipping symlinked directory");
        } else if path.extension().and_then(|e| e.to_str()) == Some(extension) {
            out.push(path);
        }
    }
    Ok(())
}
