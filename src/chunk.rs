//! Fixed-size overlapping text chunker.
//!
//! Splits page text into windows of at most `chunk_size` characters, each
//! sharing `chunk_overlap` characters with its predecessor. Boundaries are
//! length-based, not semantic: a window ends at the last whitespace in its
//! back half when there is one, otherwise exactly at `chunk_size`, so a chunk
//! may end mid-word or mid-sentence. The overlap carries that context into
//! the next chunk.
//!
//! Each chunk records its character `offset` within the page, so the page
//! can be rebuilt exactly with [`reassemble`].
//!
//! # Example
//!
//! ```rust
//! use eduguide::chunk::{chunk_page, reassemble};
//!
//! let text = "The mitochondria is the powerhouse of the cell. ".repeat(40);
//! let chunks = chunk_page("bio.pdf", 1, &text, 200, 40);
//! assert!(chunks.len() > 1);
//! assert!(chunks.iter().all(|c| c.text.chars().count() <= 200));
//! assert_eq!(reassemble(&chunks), text);
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::DocumentChunk;

/// Split one page of text into overlapping chunks.
///
/// Returns an empty vector for empty text. `chunk_overlap` must be smaller
/// than `chunk_size` (enforced by config validation); it is clamped here so
/// the window always advances.
pub fn chunk_page(
    source_file: &str,
    page: u32,
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<DocumentChunk> {
    let chunk_size = chunk_size.max(1);
    let overlap = chunk_overlap.min(chunk_size - 1);

    // Byte offset of every char, plus the end of the string.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total = bounds.len() - 1;
    let chars: Vec<char> = text.chars().collect();

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut chunk_index = 0u32;

    while start < total {
        let mut end = (start + chunk_size).min(total);
        if end < total {
            // Prefer breaking after whitespace, but never inside the overlap
            // region (the window must advance) nor before the window's midpoint.
            let floor = (start + overlap + 1).max(start + chunk_size / 2);
            if let Some(k) = (floor..=end).rev().find(|&k| chars[k - 1].is_whitespace()) {
                end = k;
            }
        }

        let piece = &text[bounds[start]..bounds[end]];
        chunks.push(make_chunk(source_file, page, chunk_index, start, piece));
        chunk_index += 1;

        if end == total {
            break;
        }
        start = end - overlap;
    }

    chunks
}

/// Rebuild page text from its chunks by dropping each chunk's overlap with the
/// previous one. Chunks must be from a single page, in order.
pub fn reassemble(chunks: &[DocumentChunk]) -> String {
    let mut out = String::new();
    let mut covered = 0usize;
    for chunk in chunks {
        let skip = covered.saturating_sub(chunk.offset);
        out.extend(chunk.text.chars().skip(skip));
        covered = covered.max(chunk.offset + chunk.text.chars().count());
    }
    out
}

/// SHA-256 of `text`, hex encoded.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn make_chunk(
    source_file: &str,
    page: u32,
    index: u32,
    offset: usize,
    text: &str,
) -> DocumentChunk {
    DocumentChunk {
        id: Uuid::new_v4().to_string(),
        source_file: source_file.to_string(),
        page,
        chunk_index: index,
        offset,
        text: text.to_string(),
        hash: content_hash(text),
    }
}
