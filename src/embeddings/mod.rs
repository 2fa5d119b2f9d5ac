// Embeddings module
// Content chunking plus the embedding and generation collaborators

pub mod chunking;
pub mod ollama;

use anyhow::Result;

use crate::chat::Turn;

pub use chunking::{Chunk, ChunkingConfig, ChunkingError, Chunks, chunk_document, split};
pub use ollama::OllamaClient;

/// Turns text into a fixed-length embedding vector.
///
/// Every vector returned by one implementation must have the same length.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, preserving order
    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Produces an answer for a prompt given the prior turns of a conversation
pub trait Generator: Send + Sync {
    fn generate(&self, prompt: &str, history: &[Turn]) -> Result<String>;
}
