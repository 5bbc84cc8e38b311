//! Deterministic character-window segmentation.
//!
//! Chunks are fixed-size character windows with a fixed overlap between
//! consecutive windows. The same input always yields the same ordered chunk
//! sequence (and therefore the same content-addressed chunk ids), which is
//! what makes store upserts idempotent across re-runs.

use anyhow::{bail, Result};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use crate::{chunk_id_for, Chunk, ChunkMetadata, Document};

/// Marker the page extractor writes between pages.
pub const PAGE_MARKER_PREFIX: &str = "--- Page ";

fn page_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"--- Page (\d+) ---").unwrap())
}

/// Byte offsets of every `--- Page N ---` marker, ascending.
pub fn find_page_boundaries(text: &str) -> Vec<(usize, u32)> {
    page_marker_re()
        .captures_iter(text)
        .filter_map(|caps| {
            let m = caps.get(0)?;
            let page = caps.get(1)?.as_str().parse::<u32>().ok()?;
            Some((m.start(), page))
        })
        .collect()
}

/// Splits a document into overlapping chunks of at most `chunk_size`
/// characters, consecutive chunks sharing `chunk_overlap` characters.
#[derive(Debug, Clone)]
pub struct Segmenter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
        }
    }
}

impl Segmenter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            bail!("chunk_size must be positive");
        }
        if chunk_overlap >= chunk_size {
            bail!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            );
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Segment a document into ordered chunks covering its full text.
    ///
    /// Window arithmetic is in characters (never splitting a UTF-8 code
    /// point); the page for each chunk is the nearest marker preceding the
    /// chunk's starting offset.
    pub fn segment(&self, doc: &Document) -> Vec<Chunk> {
        // Byte offset of every char boundary, plus the end of the text.
        let mut boundaries: Vec<usize> = doc.full_text.char_indices().map(|(i, _)| i).collect();
        boundaries.push(doc.full_text.len());

        let n_chars = boundaries.len() - 1;
        let step = self.chunk_size - self.chunk_overlap;

        let mut chunks = Vec::new();
        let mut start_char = 0usize;
        while start_char < n_chars {
            let end_char = (start_char + self.chunk_size).min(n_chars);
            let start_byte = boundaries[start_char];
            let end_byte = boundaries[end_char];
            let text = &doc.full_text[start_byte..end_byte];

            if !text.trim().is_empty() {
                let metadata = ChunkMetadata {
                    page: doc.page_at(start_byte),
                    ..ChunkMetadata::default()
                };
                chunks.push(Chunk {
                    chunk_id: chunk_id_for(&doc.source_path, text),
                    text: text.to_string(),
                    source_path: doc.source_path.clone(),
                    metadata,
                });
            }

            if end_char == n_chars {
                break;
            }
            start_char += step;
        }

        chunks
    }

    /// Segment a raw text blob (convenience for callers that have not built
    /// a [`Document`]).
    pub fn segment_text(&self, source_path: &Path, brand: &str, text: &str) -> Vec<Chunk> {
        let doc = Document::new(source_path, brand, text.to_string());
        self.segment(&doc)
    }
}
