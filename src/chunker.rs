//! Chunker - splits documents into bounded, overlapping passages
//!
//! Documents are first cut at blank lines (the separator stays attached to
//! the paragraph before it), paragraphs longer than `max_chunk_size` are
//! hard-split at the size boundary, and consecutive pieces are packed
//! greedily into chunk cores of at most `max_chunk_size` characters.
//!
//! Cores tile the document exactly. Each chunk after the first is extended
//! backwards by up to `overlap_size` characters of the previous core, so a
//! chunk is at most `max_chunk_size + overlap_size` characters and
//! dropping each chunk's overlap prefix reconstructs the source text.
//!
//! All sizes and offsets are in characters, not bytes.

use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::config::ChunkingConfig;
use crate::error::ChunkError;
use crate::types::{Chunk, Document};

/// A line ending followed by one or more blank (whitespace-only) lines.
/// Accepts both LF and CRLF line endings.
fn paragraph_break() -> &'static Regex {
    static PARAGRAPH_BREAK: OnceLock<Regex> = OnceLock::new();
    PARAGRAPH_BREAK.get_or_init(|| Regex::new(r"\r?\n(?:[ \t]*\r?\n)+").expect("static regex"))
}

#[derive(Debug, Clone)]
pub struct Chunker {
    max_chunk_size: usize,
    overlap_size: usize,
    batch_size: usize,
}

impl Chunker {
    pub fn new(max_chunk_size: usize, overlap_size: usize) -> Result<Self, ChunkError> {
        if max_chunk_size == 0 {
            return Err(ChunkError::ZeroChunkSize);
        }
        if overlap_size >= max_chunk_size {
            return Err(ChunkError::OverlapTooLarge {
                overlap: overlap_size,
                max: max_chunk_size,
            });
        }
        Ok(Self {
            max_chunk_size,
            overlap_size,
            batch_size: crate::config::defaults::CHUNK_BATCH_SIZE,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self, ChunkError> {
        Ok(Self::new(config.max_chunk_size, config.overlap_size)?.with_batch_size(config.batch_size))
    }

    /// Documents per progress batch. Has no effect on the output.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    pub fn overlap_size(&self) -> usize {
        self.overlap_size
    }

    /// Chunk every document, in document order.
    pub fn chunk_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut processed = 0;

        for batch in documents.chunks(self.batch_size) {
            for document in batch {
                chunks.extend(self.chunk_document(document));
            }
            processed += batch.len();
            debug!(processed, total = documents.len(), "Chunked document batch");
        }

        info!(
            documents = documents.len(),
            chunks = chunks.len(),
            max_chunk_size = self.max_chunk_size,
            overlap_size = self.overlap_size,
            "Documents split into chunks"
        );
        chunks
    }

    /// Chunk a single document. An empty document yields no chunks.
    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        let text = document.raw_text();
        if text.is_empty() {
            return Vec::new();
        }

        // Byte offset of every char, plus the end of the text
        let byte_at: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_at = |byte: usize| byte_at.partition_point(|&b| b < byte);

        let cores = self.pack(&self.pieces(text, char_at));

        cores
            .iter()
            .enumerate()
            .map(|(sequence_index, &(start, end))| {
                let overlap = if sequence_index == 0 {
                    0
                } else {
                    let (prev_start, _) = cores[sequence_index - 1];
                    self.overlap_size.min(start - prev_start)
                };
                let start = start - overlap;
                Chunk {
                    document_id: document.id().to_string(),
                    text: text[byte_at[start]..byte_at[end]].to_string(),
                    sequence_index,
                    start_offset: start,
                }
            })
            .collect()
    }

    /// Paragraph pieces as char ranges, hard-split to `max_chunk_size`.
    fn pieces(&self, text: &str, char_at: impl Fn(usize) -> usize) -> Vec<(usize, usize)> {
        let mut paragraphs = Vec::new();
        let mut start = 0;
        for separator in paragraph_break().find_iter(text) {
            paragraphs.push((char_at(start), char_at(separator.end())));
            start = separator.end();
        }
        if start < text.len() {
            paragraphs.push((char_at(start), char_at(text.len())));
        }

        let mut pieces = Vec::with_capacity(paragraphs.len());
        for (mut start, end) in paragraphs {
            while end - start > self.max_chunk_size {
                pieces.push((start, start + self.max_chunk_size));
                start += self.max_chunk_size;
            }
            pieces.push((start, end));
        }
        pieces
    }

    /// Greedily merge contiguous pieces into cores of at most `max_chunk_size`.
    fn pack(&self, pieces: &[(usize, usize)]) -> Vec<(usize, usize)> {
        let Some(&(first_start, _)) = pieces.first() else {
            return Vec::new();
        };

        let mut cores = Vec::new();
        let (mut core_start, mut core_end) = (first_start, first_start);
        for &(start, end) in pieces {
            if end - core_start > self.max_chunk_size && core_end > core_start {
                cores.push((core_start, core_end));
                core_start = start;
            }
            core_end = end;
        }
        cores.push((core_start, core_end));
        cores
    }
}

/// Rebuild a document's text from its chunks by dropping each overlap.
pub fn reconstruct(chunks: &[Chunk]) -> String {
    let mut text = String::new();
    let mut covered: usize = 0;
    for chunk in chunks {
        let skip = covered.saturating_sub(chunk.start_offset);
        text.extend(chunk.text.chars().skip(skip));
        covered = covered.max(chunk.end_offset());
    }
    text
}
