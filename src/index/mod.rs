// Vector index module
// Flat in-memory index, on-disk snapshots and portable archives


pub mod archive;
pub mod flat;
pub mod snapshot;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::embeddings::chunking::Chunk;

pub use flat::VectorIndex;
pub use snapshot::{Manifest, SnapshotLock};

pub type Result<T, E = IndexError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Dimension mismatch: index holds {expected}-dimensional vectors, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Invalid vector: {0}")]
    InvalidVector(String),
    #[error("Index is empty")]
    EmptyIndex,
    #[error("Invalid result count: {0} (must be at least 1)")]
    InvalidTopK(usize),
    #[error("Snapshot not found at {}", .0.display())]
    SnapshotNotFound(PathBuf),
    #[error("Corrupt snapshot at {}: {reason}", path.display())]
    CorruptSnapshot { path: PathBuf, reason: String },
    #[error("Snapshot at {} is locked by another writer", .0.display())]
    SnapshotLocked(PathBuf),
    #[error("Failed to {operation} {}: {source}", path.display())]
    Persistence {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Archive error at {}: {reason}", path.display())]
    Archive { path: PathBuf, reason: String },
}

/// One embedded chunk owned by the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

/// Search result from vector similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub entry: IndexEntry,
    /// Cosine similarity between the query and the entry vector
    pub score: f32,
}

/// A vector index bound to the directory its snapshots are written to
#[derive(Debug)]
pub struct VectorStore {
    index: VectorIndex,
    path: PathBuf,
}

impl VectorStore {
    /// Open the store at `path`, starting empty when no snapshot exists yet
    #[inline]
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        match snapshot::read_snapshot(&path) {
            Ok(index) => {
                info!(
                    "Loaded vector store from {} ({} entries)",
                    path.display(),
                    index.len()
                );
                Ok(Self { index, path })
            }
            Err(IndexError::SnapshotNotFound(_)) => {
                info!(
                    "No snapshot at {}, starting with an empty vector store",
                    path.display()
                );
                Ok(Self {
                    index: VectorIndex::new(),
                    path,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Open the store at `path` for a full rebuild.
    ///
    /// The existing contents are about to be dropped, so a corrupt snapshot
    /// is treated like a missing one.
    #[inline]
    pub fn open_for_rebuild(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        match Self::open(&path) {
            Err(IndexError::CorruptSnapshot { reason, .. }) => {
                warn!(
                    "Discarding corrupt snapshot at {} ({}), starting empty",
                    path.display(),
                    reason
                );
                Ok(Self {
                    index: VectorIndex::new(),
                    path,
                })
            }
            other => other,
        }
    }

    /// Replace whatever is at `path`, even a corrupt snapshot, with the
    /// contents of an archive and open the result
    #[inline]
    pub fn from_archive(path: impl Into<PathBuf>, source: &Path) -> Result<Self> {
        let path = path.into();
        archive::import_archive(source, &path)?;
        Self::load(path)
    }

    /// Load the store at `path`, failing if no snapshot exists
    #[inline]
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let index = snapshot::read_snapshot(&path)?;
        Ok(Self { index, path })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub const fn index(&self) -> &VectorIndex {
        &self.index
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[inline]
    pub fn add(&mut self, batch: Vec<(Vec<f32>, Chunk)>) -> Result<Vec<Uuid>> {
        self.index.add(batch)
    }

    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        self.index.search(query, k)
    }

    /// Drop every entry; the next persist writes an empty snapshot
    #[inline]
    pub fn clear(&mut self) {
        debug!("Clearing vector store at {}", self.path.display());
        self.index.clear();
    }

    /// Atomically replace the on-disk snapshot with the current state
    #[inline]
    pub fn persist(&self) -> Result<()> {
        snapshot::write_snapshot(&self.index, &self.path)
    }

    /// Pack the last persisted snapshot into a zip archive
    #[inline]
    pub fn export(&self, destination: Option<&Path>) -> Result<PathBuf> {
        archive::export_archive(&self.path, destination)
    }

    /// Replace the snapshot and the in-memory index with an archive's contents
    #[inline]
    pub fn import(&mut self, source: &Path) -> Result<()> {
        archive::import_archive(source, &self.path)?;
        self.index = snapshot::read_snapshot(&self.path)?;
        info!(
            "Imported {} entries from {}",
            self.index.len(),
            source.display()
        );
        Ok(())
    }
}
