//! Ingested documents

use std::fmt;
use std::path::{Path, PathBuf};

/// MD5 digest of a document's decoded text, used for content dedup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; 16]);

impl ContentDigest {
    pub fn of(text: &str) -> Self {
        Self(md5::compute(text.as_bytes()).0)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// A decoded corpus file.
///
/// Identity is the source path; two documents whose decoded text is
/// byte-identical are collapsed into one during ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    source_path: PathBuf,
    id: String,
    raw_text: String,
    encoding_used: &'static str,
    digest: ContentDigest,
}

impl Document {
    /// `id` is the corpus-relative, `/`-separated path (e.g. `guide/a.md`).
    pub fn new(
        source_path: PathBuf,
        id: String,
        raw_text: String,
        encoding_used: &'static str,
    ) -> Self {
        let digest = ContentDigest::of(&raw_text);
        Self {
            source_path,
            id,
            raw_text,
            encoding_used,
            digest,
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn encoding_used(&self) -> &'static str {
        self.encoding_used
    }

    pub fn digest(&self) -> ContentDigest {
        self.digest
    }
}
