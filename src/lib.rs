use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Index error: {0}")]
    Index(#[from] index::IndexError),

    #[error("Chunking error: {0}")]
    Chunking(#[from] embeddings::chunking::ChunkingError),

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod chat;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod index;
pub mod ingest;

/// Run blocking work (snapshot I/O, HTTP collaborators) on the blocking pool
pub(crate) async fn run_blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| RagError::Other(anyhow::anyhow!("Blocking task failed: {e}")))?
}
