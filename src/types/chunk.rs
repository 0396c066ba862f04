//! Chunks derived from documents

use serde::{Deserialize, Serialize};

/// A bounded contiguous span of a document's text.
///
/// Chunks are regenerated on every rebuild and never persisted on their own;
/// the index stores their text alongside the embedding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Corpus-relative id of the owning document
    pub document_id: String,
    pub text: String,
    /// Position of this chunk within its document (0-based)
    pub sequence_index: usize,
    /// Offset of the first character of `text` in the document, in chars
    pub start_offset: usize,
}

impl Chunk {
    /// Stable id used for index entries: `{document_id}#{sequence_index}`
    pub fn id(&self) -> String {
        format!("{}#{}", self.document_id, self.sequence_index)
    }

    /// Length of the chunk in characters
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Offset one past the last character, in chars
    pub fn end_offset(&self) -> usize {
        self.start_offset + self.char_len()
    }
}
