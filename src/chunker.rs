//! Recursive text chunker with overlap.
//!
//! Splits document content into chunks of at most `chunk_size` characters,
//! trying the largest separator first (paragraph, line, word) and falling
//! back to a hard character split only when a single piece is still too big.
//! Separators stay attached to the piece that precedes them, so concatenating
//! the produced pieces reconstructs the original text exactly.
//!
//! Each chunk after the first is seeded with the trailing `chunk_overlap`
//! characters of its predecessor to preserve cross-boundary context.

use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::models::{Chunk, Document};

/// Separator priority: paragraph, line, word, then single characters.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Splits documents into bounded, overlapping chunks.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// Sizes are in characters. `chunk_overlap` must be smaller than
    /// `chunk_size` (enforced by config validation).
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        debug_assert!(chunk_overlap < chunk_size);
        Chunker {
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Chunker::new(config.chunk_size, config.chunk_overlap)
    }

    /// Split documents in order, preserving each document's metadata on every
    /// chunk derived from it. Chunk indices are contiguous per document.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for doc in documents {
            for (i, text) in self.split_text(&doc.content).into_iter().enumerate() {
                chunks.push(Chunk {
                    id: Uuid::new_v4().to_string(),
                    source: doc.source().to_string(),
                    chunk_index: i as i64,
                    text,
                    metadata: doc.metadata.clone(),
                });
            }
        }
        chunks
    }

    /// Split raw text into overlapping pieces of at most `chunk_size` chars.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        if char_len(text) <= self.chunk_size {
            return vec![text.to_string()];
        }

        let pieces = split_pieces(text, &SEPARATORS, self.chunk_size);
        self.merge_pieces(&pieces)
    }

    /// Accumulate pieces into chunks, seeding each new chunk with the
    /// previous chunk's tail. The overlap is exactly `chunk_overlap` except
    /// when the incoming piece would overflow `chunk_size`, in which case the
    /// seed is trimmed to fit.
    fn merge_pieces(&self, pieces: &[String]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_len = 0usize;

        for piece in pieces {
            let piece_len = char_len(piece);

            if current_len + piece_len > self.chunk_size && !current.is_empty() {
                let overlap = self
                    .chunk_overlap
                    .min(self.chunk_size.saturating_sub(piece_len));
                let seed = tail_chars(&current, overlap).to_string();
                chunks.push(std::mem::replace(&mut current, seed));
                current_len = char_len(&current);
            }

            current.push_str(piece);
            current_len += piece_len;
        }

        if !current.is_empty() {
            chunks.push(current);
        }

        chunks
    }
}

/// Recursively split text into pieces of at most `max_len` characters,
/// retaining separators so no content is lost.
fn split_pieces(text: &str, separators: &[&str], max_len: usize) -> Vec<String> {
    let (sep, rest) = separators
        .split_first()
        .expect("separator list is never empty");

    if sep.is_empty() {
        return hard_split(text, max_len);
    }

    let mut out = Vec::new();
    for piece in text.split_inclusive(*sep) {
        if char_len(piece) <= max_len {
            out.push(piece.to_string());
        } else {
            out.extend(split_pieces(piece, rest, max_len));
        }
    }
    out
}

/// Last-resort split into fixed-size character windows.
fn hard_split(text: &str, max_len: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut n = 0usize;
    for ch in text.chars() {
        current.push(ch);
        n += 1;
        if n == max_len {
            out.push(std::mem::take(&mut current));
            n = 0;
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// The last `n` characters of `s` (the whole string if shorter).
fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    let total = char_len(s);
    if total <= n {
        return s;
    }
    let start = s
        .char_indices()
        .nth(total - n)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &s[start..]
}
