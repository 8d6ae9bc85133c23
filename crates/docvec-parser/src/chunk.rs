//! Sliding-window chunking
//!
//! Splits extracted text into overlapping fragments. A window of
//! `chunk_size` characters starts at offset 0 and advances by
//! `chunk_size - overlap` while its start is inside the text. Each window
//! is trimmed and kept only if something is left.
//!
//! Sizes count Unicode scalar values, never bytes, so multi-byte text is
//! never split inside a character.

use crate::{ParserError, Result};

/// Configuration for document chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Window length in characters
    pub chunk_size: usize,

    /// Characters shared by consecutive windows
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
        }
    }

    /// Distance between consecutive window starts
    pub fn stride(&self) -> usize {
        self.chunk_size.saturating_sub(self.overlap)
    }

    /// Reject configurations that cannot make progress
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ParserError::InvalidChunkConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(ParserError::InvalidChunkConfig(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// A kept window of the source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Position among the kept chunks
    pub index: u32,

    /// Trimmed window content
    pub content: String,

    /// First character of the window (before trimming)
    pub start_offset: usize,

    /// One past the last character of the window (before trimming)
    pub end_offset: usize,
}

/// Lazy iterator over the chunks of a text.
///
/// Cloning it before consumption gives an independent pass over the same
/// sequence.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    // byte offset of every char boundary, plus text.len()
    boundaries: Vec<usize>,
    chunk_size: usize,
    stride: usize,
    start: usize,
    next_index: u32,
}

impl<'a> Chunks<'a> {
    fn char_count(&self) -> usize {
        self.boundaries.len() - 1
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = TextChunk;

    fn next(&mut self) -> Option<TextChunk> {
        let char_count = self.char_count();

        while self.start < char_count {
            let start = self.start;
            let end = (start + self.chunk_size).min(char_count);
            self.start += self.stride;

            let window = &self.text[self.boundaries[start]..self.boundaries[end]];
            let trimmed = window.trim();
            if trimmed.is_empty() {
                continue;
            }

            let chunk = TextChunk {
                index: self.next_index,
                content: trimmed.to_string(),
                start_offset: start,
                end_offset: end,
            };
            self.next_index += 1;
            return Some(chunk);
        }

        None
    }
}

/// Iterate over the chunks of `text`.
///
/// Fails if the configuration is invalid or the text is empty after trimming.
pub fn chunks<'a>(text: &'a str, config: &ChunkConfig) -> Result<Chunks<'a>> {
    config.validate()?;

    if text.trim().is_empty() {
        return Err(ParserError::EmptyDocument(
            "no text to chunk".to_string(),
        ));
    }

    let boundaries = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();

    Ok(Chunks {
        text,
        boundaries,
        chunk_size: config.chunk_size,
        stride: config.stride(),
        start: 0,
        next_index: 0,
    })
}

/// Split `text` into trimmed, non-empty, overlapping fragments
pub fn chunk_text(text: &str, config: &ChunkConfig) -> Result<Vec<String>> {
    Ok(chunks(text, config)?.map(|c| c.content).collect())
}

// ============================================================================
// Tests
// ============================================================================
