#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Characters that end a sentence when followed by whitespace
const SENTENCE_TERMINATORS: [char; 5] = ['.', '!', '?', '\u{061F}', '\u{06D4}'];

/// A bounded slice of a source document, embedded independently
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chunk {
    text: String,
    source_document_id: String,
    chunk_index: usize,
    total_chunks: usize,
}

/// Configuration for content chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters shared between adjacent chunks
    pub chunk_overlap: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    #[error("Invalid chunk size: {0} (must be at least 1)")]
    InvalidChunkSize(usize),
    #[error("Invalid chunk overlap: {overlap} (must be smaller than chunk size {chunk_size})")]
    InvalidOverlap { overlap: usize, chunk_size: usize },
    #[error("Invalid chunk: {0}")]
    InvalidChunk(String),
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub const fn validate(&self) -> Result<(), ChunkingError> {
        if self.chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize(self.chunk_size));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ChunkingError::InvalidOverlap {
                overlap: self.chunk_overlap,
                chunk_size: self.chunk_size,
            });
        }
        Ok(())
    }
}

impl Chunk {
    #[inline]
    pub fn new(
        text: impl Into<String>,
        source_document_id: impl Into<String>,
        chunk_index: usize,
        total_chunks: usize,
    ) -> Result<Self, ChunkingError> {
        let chunk = Self {
            text: text.into(),
            source_document_id: source_document_id.into(),
            chunk_index,
            total_chunks,
        };
        chunk.validate()?;
        Ok(chunk)
    }

    /// Check the invariants a chunk must satisfy, also used after deserialization
    #[inline]
    pub fn validate(&self) -> Result<(), ChunkingError> {
        if self.source_document_id.is_empty() {
            return Err(ChunkingError::InvalidChunk(
                "source document id is empty".to_string(),
            ));
        }
        if self.text.is_empty() {
            return Err(ChunkingError::InvalidChunk(format!(
                "chunk {} of '{}' has no text",
                self.chunk_index, self.source_document_id
            )));
        }
        if self.chunk_index >= self.total_chunks {
            return Err(ChunkingError::InvalidChunk(format!(
                "chunk index {} out of range for {} chunks",
                self.chunk_index, self.total_chunks
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn source_document_id(&self) -> &str {
        &self.source_document_id
    }

    #[inline]
    pub const fn chunk_index(&self) -> usize {
        self.chunk_index
    }

    #[inline]
    pub const fn total_chunks(&self) -> usize {
        self.total_chunks
    }
}

/// Lazy iterator over overlapping windows of a text.
///
/// Cloning the iterator before consuming it gives an independent restart
/// from the same position.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    chunk_size: usize,
    overlap: usize,
    cursor: Option<usize>,
}

/// Split text into windows of at most `chunk_size` characters.
///
/// Each window after the first starts `overlap` characters before the end
/// of the previous one. Windows end on the last paragraph, line, sentence or
/// word boundary in their second half, or are cut hard at `chunk_size`.
#[inline]
pub fn split(text: &str, chunk_size: usize, overlap: usize) -> Result<Chunks<'_>, ChunkingError> {
    ChunkingConfig {
        chunk_size,
        chunk_overlap: overlap,
    }
    .validate()?;

    let cursor = if text.trim().is_empty() { None } else { Some(0) };
    Ok(Chunks {
        text,
        chunk_size,
        overlap,
        cursor,
    })
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let start = self.cursor?;
        let text = self.text;
        let rest = &text[start..];

        let Some(hard_end) = advance(rest, self.chunk_size) else {
            self.cursor = None;
            return Some(rest);
        };

        let window = &rest[..hard_end];
        let min_break = advance(rest, (self.overlap + 1).max(self.chunk_size / 2))
            .unwrap_or(hard_end);
        let end = preferred_break(window, min_break).unwrap_or(hard_end);

        self.cursor = Some(start + retreat(window, end, self.overlap));
        Some(&window[..end])
    }
}

/// Byte offset after the first `n` chars, or None if the text has no char beyond them
fn advance(text: &str, n: usize) -> Option<usize> {
    text.char_indices().nth(n).map(|(i, _)| i)
}

/// Byte offset `n` chars before `end`
fn retreat(text: &str, end: usize, n: usize) -> usize {
    if n == 0 {
        return end;
    }
    text[..end]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map_or(0, |(i, _)| i)
}

/// Find the best boundary in the window that is at or after `min_break`
fn preferred_break(window: &str, min_break: usize) -> Option<usize> {
    let paragraph_or_line = ["\n\n", "\n"]
        .into_iter()
        .filter_map(|sep| window.rfind(sep).map(|pos| pos + sep.len()));

    paragraph_or_line
        .chain(last_sentence_end(window))
        .chain(window.rfind(' ').map(|pos| pos + 1))
        .find(|&end| end >= min_break)
}

fn last_sentence_end(window: &str) -> Option<usize> {
    let mut following: Option<(usize, char)> = None;
    for (i, c) in window.char_indices().rev() {
        if let Some((j, next)) = following {
            if SENTENCE_TERMINATORS.contains(&c) && next.is_whitespace() {
                return Some(j + next.len_utf8());
            }
        }
        following = Some((i, c));
    }
    None
}

/// Chunk one document and attach positional metadata to every piece
#[inline]
pub fn chunk_document(
    document_id: &str,
    text: &str,
    config: &ChunkingConfig,
) -> Result<Vec<Chunk>, ChunkingError> {
    let pieces: Vec<&str> = split(text, config.chunk_size, config.chunk_overlap)?.collect();
    let total_chunks = pieces.len();

    let chunks = pieces
        .into_iter()
        .enumerate()
        .map(|(chunk_index, piece)| Chunk::new(piece, document_id, chunk_index, total_chunks))
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        "Chunked document '{}' into {} chunks (avg {} chars)",
        document_id,
        chunks.len(),
        chunks.iter().map(|c| c.text().chars().count()).sum::<usize>() / chunks.len().max(1)
    );

    Ok(chunks)
}
