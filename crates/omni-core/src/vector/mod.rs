//! Flat vector index with disk persistence.
//!
//! Holds every embedding in memory as a dense table and scores queries by
//! brute-force cosine similarity. This trades asymptotic query cost for
//! simplicity and auditability at the scale a single-repository collection
//! actually reaches; nothing here wires an approximate-nearest-neighbor
//! library, since none of the candidate crates were ever integrated beyond
//! a doc comment.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{OmniError, OmniResult};

/// On-disk representation of the vector table, written atomically on save.
#[derive(Debug, Serialize, Deserialize, Default)]
struct VectorTable {
    dimensions: usize,
    entries: Vec<(u64, Vec<f32>)>,
}

struct Inner {
    dimensions: usize,
    vectors: HashMap<u64, Vec<f32>>,
    /// Set when a write-ahead write failed partway through; refuses further
    /// writes until `recreate` clears it.
    corrupted: bool,
}

/// Flat, brute-force-scanned vector index.
///
/// Reads never block writes against different keys thanks to the coarse
/// `RwLock`, matching the single-writer-many-readers shape SQLite's WAL
/// mode already assumes elsewhere in this crate.
pub struct VectorIndex {
    path: PathBuf,
    inner: RwLock<Inner>,
}

impl VectorIndex {
    /// Create or open a vector index at the given path, loading any
    /// previously persisted table. A dimension mismatch between the
    /// persisted table and the configured embedder is treated as
    /// corruption: the table is discarded and indexing starts fresh.
    pub fn open(index_path: &Path, dimensions: usize) -> OmniResult<Self> {
        let vectors = if index_path.exists() {
            match Self::load(index_path) {
                Ok(table) if table.dimensions == dimensions => {
                    table.entries.into_iter().collect()
                }
                Ok(table) => {
                    tracing::warn!(
                        expected = dimensions,
                        found = table.dimensions,
                        "vector index dimension mismatch, starting fresh"
                    );
                    HashMap::new()
                }
                Err(err) => {
                    tracing::warn!(%err, "failed to load persisted vector index, starting fresh");
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        Ok(Self {
            path: index_path.to_path_buf(),
            inner: RwLock::new(Inner {
                dimensions,
                vectors,
                corrupted: false,
            }),
        })
    }

    fn load(path: &Path) -> OmniResult<VectorTable> {
        let mut file = std::fs::File::open(path)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        bincode::deserialize(&buf).map_err(|err| OmniError::VectorStoreCorrupted {
            collection: path.display().to_string(),
            details: format!("corrupted vector table: {err}"),
        })
    }

    /// Add or replace a vector by ID.
    pub fn add(&mut self, id: u64, vector: &[f32]) -> OmniResult<()> {
        let mut inner = self.inner.write();
        if inner.corrupted {
            return Err(OmniError::VectorUnavailable {
                reason: "index marked unhealthy, call recreate() first".into(),
            });
        }
        if vector.len() != inner.dimensions {
            return Err(OmniError::VectorUnavailable {
                reason: format!(
                    "vector has {} dimensions, expected {}",
                    vector.len(),
                    inner.dimensions
                ),
            });
        }
        inner.vectors.insert(id, vector.to_vec());
        Ok(())
    }

    /// Search for the K nearest neighbors to the query vector, ranked by
    /// descending cosine similarity.
    pub fn search(&self, query: &[f32], k: usize) -> OmniResult<Vec<(u64, f32)>> {
        let inner = self.inner.read();
        if inner.corrupted {
            return Err(OmniError::VectorUnavailable {
                reason: "index marked unhealthy, call recreate() first".into(),
            });
        }
        if query.len() != inner.dimensions {
            return Err(OmniError::VectorUnavailable {
                reason: format!(
                    "query has {} dimensions, expected {}",
                    query.len(),
                    inner.dimensions
                ),
            });
        }

        let mut scored: Vec<(u64, f32)> = inner
            .vectors
            .iter()
            .map(|(id, vec)| (*id, cosine_similarity(query, vec)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        Ok(scored)
    }

    /// Remove a vector by ID. Removing an ID that doesn't exist is a no-op.
    pub fn remove(&mut self, id: u64) -> OmniResult<()> {
        self.inner.write().vectors.remove(&id);
        Ok(())
    }

    /// Returns the number of vectors in the index.
    pub fn len(&self) -> usize {
        self.inner.read().vectors.len()
    }

    /// Returns true if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the configured dimensions.
    pub fn dimensions(&self) -> usize {
        self.inner.read().dimensions
    }

    /// Returns whether the index has been marked unhealthy by a detected
    /// write-log failure.
    pub fn is_healthy(&self) -> bool {
        !self.inner.read().corrupted
    }

    /// Persist the vector table to disk via a write-to-temp-then-rename
    /// sequence, so a crash mid-write never leaves a half-written file
    /// behind for the next `open` to trip over.
    pub fn save(&self) -> OmniResult<()> {
        let inner = self.inner.read();
        let table = VectorTable {
            dimensions: inner.dimensions,
            entries: inner.vectors.iter().map(|(k, v)| (*k, v.clone())).collect(),
        };
        drop(inner);

        let bytes = bincode::serialize(&table)
            .map_err(|err| OmniError::Internal(format!("failed to serialize vector table: {err}")))?;

        let tmp_path = self.path.with_extension("bin.tmp");
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let write_result = (|| -> std::io::Result<()> {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            std::fs::rename(&tmp_path, &self.path)?;
            Ok(())
        })();

        if let Err(err) = write_result {
            self.inner.write().corrupted = true;
            return Err(OmniError::VectorStoreCorrupted {
                collection: self.path.display().to_string(),
                details: format!("write-log failure persisting vector index: {err}"),
            });
        }
        Ok(())
    }

    /// Drop and rebuild the index from scratch, clearing the unhealthy
    /// flag. Called after a detected corruption, per the store's
    /// recreate-with-reduced-threshold recovery contract; this in-memory
    /// adapter has no indexing threshold to reduce, so recreate here only
    /// clears state.
    pub fn recreate(&mut self) -> OmniResult<()> {
        let mut inner = self.inner.write();
        inner.vectors.clear();
        inner.corrupted = false;
        drop(inner);
        let _ = std::fs::remove_file(&self.path);
        Ok(())
    }

    /// Health check the indexer is required to call before each batch.
    pub fn health(&self) -> bool {
        self.is_healthy()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_index_creation() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let index = VectorIndex::open(&dir.path().join("vectors.bin"), 384).expect("create index");
        assert_eq!(index.dimensions(), 384);
        assert!(index.is_empty());
    }

    #[test]
    fn test_add_and_search_returns_nearest() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut index = VectorIndex::open(&dir.path().join("vectors.bin"), 3).expect("create index");
        index.add(1, &[1.0, 0.0, 0.0]).unwrap();
        index.add(2, &[0.0, 1.0, 0.0]).unwrap();
        index.add(3, &[0.9, 0.1, 0.0]).unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, 1);
    }

    #[test]
    fn test_remove_drops_vector() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut index = VectorIndex::open(&dir.path().join("vectors.bin"), 2).expect("create index");
        index.add(1, &[1.0, 0.0]).unwrap();
        assert_eq!(index.len(), 1);
        index.remove(1).unwrap();
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn test_save_and_reopen_round_trips() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("vectors.bin");
        {
            let mut index = VectorIndex::open(&path, 2).expect("create index");
            index.add(1, &[1.0, 2.0]).unwrap();
            index.save().expect("save");
        }
        let reopened = VectorIndex::open(&path, 2).expect("reopen index");
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn test_recreate_clears_state() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut index = VectorIndex::open(&dir.path().join("vectors.bin"), 2).expect("create index");
        index.add(1, &[1.0, 0.0]).unwrap();
        index.recreate().unwrap();
        assert_eq!(index.len(), 0);
        assert!(index.is_healthy());
    }
}
