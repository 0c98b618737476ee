//! Fixed-window character chunker.
//!
//! The window is `size` characters wide and advances by `size - overlap`, so every
//! chunk after the first begins with the last `overlap` characters of its
//! predecessor. Lengths are counted in `char`s, never bytes, so multi-byte text is
//! never cut inside a code point.

use serde::Serialize;

use crate::config::ChunkingConfig;
use crate::error::IngestError;

/// Validated window parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    size: usize,
    overlap: usize,
}

impl ChunkParams {
    /// # Errors
    /// [`IngestError::InvalidChunking`] when `size` is zero or `overlap >= size`.
    pub fn new(size: usize, overlap: usize) -> Result<Self, IngestError> {
        if size == 0 {
            return Err(IngestError::InvalidChunking(
                "chunk size must be positive".into(),
            ));
        }
        if overlap >= size {
            return Err(IngestError::InvalidChunking(format!(
                "overlap {overlap} must be smaller than chunk size {size}"
            )));
        }
        Ok(Self { size, overlap })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    fn step(&self) -> usize {
        self.size - self.overlap
    }
}

impl TryFrom<&ChunkingConfig> for ChunkParams {
    type Error = IngestError;

    fn try_from(config: &ChunkingConfig) -> Result<Self, Self::Error> {
        ChunkParams::new(config.size, config.overlap)
    }
}

/// A window of the extracted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Position in the chunk sequence, starting at 0.
    pub index: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

impl Chunk {
    fn new(index: usize, text: &str) -> Self {
        Self {
            index,
            text: text.to_string(),
            hash: sha256::digest(text),
        }
    }
}

/// Split `text` into overlapping windows.
///
/// Empty input yields no chunks. Any non-empty input yields at least one.
pub fn split_text(text: &str, params: ChunkParams) -> Vec<Chunk> {
    // Byte offset of every char, plus the end of the string.
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = offsets.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < char_count {
        let end = (start + params.size).min(char_count);
        chunks.push(Chunk::new(chunks.len(), &text[offsets[start]..offsets[end]]));
        if end == char_count {
            break;
        }
        start += params.step();
    }
    chunks
}
