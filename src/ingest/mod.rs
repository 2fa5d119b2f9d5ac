// Ingest module
// Turns a corpus of documents into embedded, persisted index entries

pub mod documents;
pub mod normalize;


use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::embeddings::chunking::{Chunk, ChunkingConfig, chunk_document};
use crate::embeddings::Embedder;
use crate::index::VectorStore;
use crate::{RagError, Result, run_blocking};

pub use documents::{Document, read_documents};

pub const DEFAULT_BATCH_SIZE: usize = 50;

/// How an ingestion run treats what is already in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestMode {
    /// Drop every existing entry before indexing
    #[default]
    Rebuild,
    /// Keep existing entries and skip chunks that are already indexed
    Resume,
}

/// Outcome of one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub documents_seen: usize,
    pub documents_indexed: usize,
    pub chunks_created: usize,
    pub chunks_skipped: usize,
    pub chunks_embedded: usize,
    pub batches_persisted: usize,
}

/// Chunks, embeds and stores documents in bounded batches
pub struct Ingestor {
    store: Arc<RwLock<VectorStore>>,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    batch_size: usize,
}

impl Ingestor {
    #[inline]
    pub fn new(
        store: Arc<RwLock<VectorStore>>,
        embedder: Arc<dyn Embedder>,
        chunking: ChunkingConfig,
        batch_size: usize,
    ) -> Result<Self> {
        chunking.validate()?;
        if batch_size == 0 {
            return Err(RagError::Config(
                "Ingest batch size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            store,
            embedder,
            chunking,
            batch_size,
        })
    }

    /// Index `documents` into the store.
    ///
    /// Each batch is embedded without holding the store lock, then added and
    /// persisted under a single write guard, so an interrupted run keeps
    /// every batch that completed.
    #[inline]
    pub async fn run(&self, documents: &[Document], mode: IngestMode) -> Result<IngestReport> {
        let mut report = IngestReport {
            documents_seen: documents.len(),
            ..IngestReport::default()
        };

        if mode == IngestMode::Rebuild {
            let mut store = Arc::clone(&self.store).write_owned().await;
            run_blocking(move || {
                info!("Clearing vector store at {}", store.path().display());
                store.clear();
                store.persist().map_err(RagError::from)
            })
            .await?;
        }

        let mut pending = Vec::new();
        for document in documents {
            let chunks = chunk_document(&document.id, &document.text, &self.chunking)?;
            report.chunks_created += chunks.len();
            pending.extend(chunks);
        }

        if mode == IngestMode::Resume {
            let existing: HashSet<Chunk> = {
                let store = self.store.read().await;
                store.index().chunks().cloned().collect()
            };
            let before = pending.len();
            pending.retain(|chunk| !existing.contains(chunk));
            report.chunks_skipped = before - pending.len();
            if report.chunks_skipped > 0 {
                info!("Skipping {} chunks already in the index", report.chunks_skipped);
            }
        }

        report.documents_indexed = pending
            .iter()
            .map(Chunk::source_document_id)
            .unique()
            .count();

        if pending.is_empty() {
            warn!("No new chunks to embed");
            return Ok(report);
        }

        let batch_count = pending.len().div_ceil(self.batch_size);
        let bar = progress_bar(batch_count);
        info!(
            "Embedding {} chunks from {} documents in {} batches",
            pending.len(),
            report.documents_indexed,
            batch_count
        );

        for batch in pending.chunks(self.batch_size) {
            let embedded = self.embed_batch(batch.to_vec()).await?;
            report.chunks_embedded += embedded.len();

            let mut store = Arc::clone(&self.store).write_owned().await;
            run_blocking(move || {
                store.add(embedded)?;
                store.persist().map_err(RagError::from)
            })
            .await?;

            report.batches_persisted += 1;
            bar.inc(1);
            debug!(
                "Persisted batch {}/{}",
                report.batches_persisted,
                batch_count
            );
        }
        bar.finish_and_clear();

        info!(
            "Ingestion complete: {} chunks embedded in {} batches",
            report.chunks_embedded, report.batches_persisted
        );
        Ok(report)
    }

    async fn embed_batch(&self, batch: Vec<Chunk>) -> Result<Vec<(Vec<f32>, Chunk)>> {
        let embedder = Arc::clone(&self.embedder);
        run_blocking(move || {
            let texts: Vec<String> = batch.iter().map(|c| c.text().to_string()).collect();
            let vectors = embedder
                .embed_batch(&texts)
                .map_err(|e| RagError::Collaborator(format!("Embedding failed: {e:#}")))?;
            if vectors.len() != batch.len() {
                return Err(RagError::Collaborator(format!(
                    "Embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )));
            }
            Ok(vectors.into_iter().zip(batch).collect())
        })
        .await
    }
}

fn progress_bar(len: usize) -> ProgressBar {
    if console::user_attended_stderr() {
        ProgressBar::new(len as u64).with_style(
            ProgressStyle::with_template("{bar:40} [{pos}/{len}] Embedding batches {msg}")
                .expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    }
}
