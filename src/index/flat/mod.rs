#[cfg(test)]
mod tests;

use itertools::Itertools;
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

use super::{IndexEntry, IndexError, Result, SearchHit};
use crate::embeddings::chunking::Chunk;

/// Exact nearest-neighbour index over cosine similarity.
///
/// Entries keep insertion order; vector norms are cached alongside so a query
/// costs one dot product per entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    norms: Vec<f64>,
    dimension: Option<usize>,
}

impl VectorIndex {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an index from previously stored entries, revalidating them
    #[inline]
    pub fn restore(mut dimension: Option<usize>, entries: Vec<IndexEntry>) -> Result<Self> {
        if let Some(first) = entries.first() {
            let expected = *dimension.get_or_insert(first.vector.len());
            let mut ids = HashSet::with_capacity(entries.len());
            for entry in &entries {
                validate_vector(&entry.vector, expected)?;
                if !ids.insert(entry.id) {
                    return Err(IndexError::InvalidVector(format!(
                        "duplicate entry id {}",
                        entry.id
                    )));
                }
            }
        }

        let norms = entries.iter().map(|e| norm(&e.vector)).collect();
        Ok(Self {
            entries,
            norms,
            dimension,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector length fixed by the first successful add
    #[inline]
    pub const fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    #[inline]
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    #[inline]
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }

    /// Number of distinct source documents with at least one entry
    #[inline]
    pub fn document_count(&self) -> usize {
        self.chunks().map(Chunk::source_document_id).unique().count()
    }

    /// Append a batch of embedded chunks.
    ///
    /// The whole batch is validated before anything is inserted, so a
    /// rejected batch leaves the index untouched.
    #[inline]
    pub fn add(&mut self, batch: Vec<(Vec<f32>, Chunk)>) -> Result<Vec<Uuid>> {
        let Some((first, _)) = batch.first() else {
            return Ok(Vec::new());
        };

        let dimension = self.dimension.unwrap_or(first.len());
        for (vector, _) in &batch {
            validate_vector(vector, dimension)?;
        }

        self.dimension = Some(dimension);
        self.entries.reserve(batch.len());
        self.norms.reserve(batch.len());

        let ids = batch
            .into_iter()
            .map(|(vector, chunk)| {
                let id = Uuid::new_v4();
                self.norms.push(norm(&vector));
                self.entries.push(IndexEntry { id, vector, chunk });
                id
            })
            .collect::<Vec<_>>();

        debug!(
            "Added {} entries ({} total, {} dimensions)",
            ids.len(),
            self.entries.len(),
            dimension
        );
        Ok(ids)
    }

    /// Return the `k` entries most similar to `query`, best first.
    ///
    /// Equal scores keep insertion order. Searching an empty index is an
    /// error rather than an empty result.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(IndexError::InvalidTopK(k));
        }
        let dimension = match self.dimension {
            Some(dimension) if !self.entries.is_empty() => dimension,
            _ => return Err(IndexError::EmptyIndex),
        };
        validate_vector(query, dimension)?;

        let query_norm = norm(query);
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .zip(&self.norms)
            .map(|(entry, &entry_norm)| cosine(query, query_norm, &entry.vector, entry_norm))
            .enumerate()
            .collect();

        let k = k.min(scored.len());
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, rank);
            scored.truncate(k);
        }
        scored.sort_unstable_by(rank);

        debug!(
            "Searched {} entries, returning top {}",
            self.entries.len(),
            scored.len()
        );

        Ok(scored
            .into_iter()
            .map(|(position, score)| SearchHit {
                entry: self.entries[position].clone(),
                score,
            })
            .collect())
    }

    /// Remove every entry and release the fixed dimension
    #[inline]
    pub fn clear(&mut self) {
        self.entries.clear();
        self.norms.clear();
        self.dimension = None;
    }
}

/// Descending score, then ascending insertion position
fn rank(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
}

fn validate_vector(vector: &[f32], dimension: usize) -> Result<()> {
    if vector.len() != dimension {
        return Err(IndexError::DimensionMismatch {
            expected: dimension,
            actual: vector.len(),
        });
    }
    if vector.is_empty() {
        return Err(IndexError::InvalidVector("vector is empty".to_string()));
    }
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(IndexError::InvalidVector(
            "vector contains non-finite values".to_string(),
        ));
    }
    Ok(())
}

// Accumulated in f64: squares of large finite f32 components overflow f32
fn norm(vector: &[f32]) -> f64 {
    vector
        .iter()
        .map(|&x| f64::from(x) * f64::from(x))
        .sum::<f64>()
        .sqrt()
}

fn cosine(a: &[f32], a_norm: f64, b: &[f32], b_norm: f64) -> f32 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let dot: f64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| f64::from(x) * f64::from(y))
        .sum();
    let score = (dot / (a_norm * b_norm)) as f32;
    // -0.0 would sort below 0.0 under total_cmp
    if score == 0.0 { 0.0 } else { score }
}
