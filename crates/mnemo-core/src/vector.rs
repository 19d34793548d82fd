//! Vector Semantic Index
//!
//! Flat exact inner-product index over normalized embeddings. Slots are
//! append-only: a slot is never reused or rewritten, and re-adding an id
//! appends a new slot and points the id at it. Slots whose record has since
//! been swept from the store stay in the index and are skipped when resolved.
//!
//! Persisted as two sidecar files, `vectors.json` (the matrix) and
//! `vector_mappings.json` (slot → id), both written atomically.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::graph::write_atomic;
use crate::{MemoryError, MemoryResult};

const INDEX_VERSION: u32 = 1;

/// One nearest-neighbour hit
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub slot: usize,
    pub id: String,
    pub score: f32,
}

#[derive(Serialize, Deserialize)]
struct VectorFile {
    version: u32,
    backend: String,
    dimensions: usize,
    count: usize,
    data: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct MappingFile {
    version: u32,
    slot_to_id: Vec<String>,
}

/// Append-only flat vector index
#[derive(Debug, Clone)]
pub struct VectorIndex {
    backend: String,
    dimensions: usize,
    data: Vec<f32>,
    slot_to_id: Vec<String>,
    id_to_slot: HashMap<String, usize>,
}

impl VectorIndex {
    pub fn new(backend: impl Into<String>, dimensions: usize) -> Self {
        Self {
            backend: backend.into(),
            dimensions,
            data: Vec::new(),
            slot_to_id: Vec::new(),
            id_to_slot: HashMap::new(),
        }
    }

    /// Append a vector for `id`; returns its slot
    pub fn add(&mut self, id: &str, vector: &[f32]) -> MemoryResult<usize> {
        if vector.len() != self.dimensions {
            return Err(MemoryError::embedding(format!(
                "vector has {} dimensions, index expects {}",
                vector.len(),
                self.dimensions
            )));
        }
        let slot = self.slot_to_id.len();
        self.data.extend_from_slice(vector);
        self.slot_to_id.push(id.to_string());
        self.id_to_slot.insert(id.to_string(), slot);
        Ok(slot)
    }

    /// The `k` best slots by inner product, best first (ties by slot)
    pub fn search(&self, query: &[f32], k: usize) -> Vec<VectorHit> {
        if query.len() != self.dimensions || k == 0 {
            return Vec::new();
        }

        let mut hits: Vec<VectorHit> = self
            .slot_to_id
            .iter()
            .enumerate()
            // an id re-added later only answers from its newest slot
            .filter(|(slot, id)| self.id_to_slot.get(id.as_str()) == Some(slot))
            .map(|(slot, id)| VectorHit {
                slot,
                id: id.clone(),
                score: self.dot(slot, query),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.slot.cmp(&b.slot)));
        hits.truncate(k);
        hits
    }

    fn dot(&self, slot: usize, query: &[f32]) -> f32 {
        let start = slot * self.dimensions;
        self.data[start..start + self.dimensions]
            .iter()
            .zip(query)
            .map(|(a, b)| a * b)
            .sum()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.id_to_slot.contains_key(id)
    }

    pub fn slot_of(&self, id: &str) -> Option<usize> {
        self.id_to_slot.get(id).copied()
    }

    pub fn id_at(&self, slot: usize) -> Option<&str> {
        self.slot_to_id.get(slot).map(String::as_str)
    }

    /// Number of slots ever allocated
    pub fn len(&self) -> usize {
        self.slot_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slot_to_id.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────────

    pub fn save(&self, vectors_path: &Path, mappings_path: &Path) -> MemoryResult<()> {
        let vectors = VectorFile {
            version: INDEX_VERSION,
            backend: self.backend.clone(),
            dimensions: self.dimensions,
            count: self.slot_to_id.len(),
            data: self.data.clone(),
        };
        let mappings = MappingFile {
            version: INDEX_VERSION,
            slot_to_id: self.slot_to_id.clone(),
        };
        write_atomic(vectors_path, &serde_json::to_vec(&vectors)?)?;
        write_atomic(mappings_path, &serde_json::to_vec(&mappings)?)?;
        debug!(slots = self.slot_to_id.len(), "Saved vector index");
        Ok(())
    }

    /// Load a persisted index built by `backend` with `dimensions`.
    ///
    /// `Ok(None)` when neither file exists. Any unreadable, inconsistent or
    /// foreign-backend pair is `IndexCorrupt`.
    pub fn load(
        vectors_path: &Path,
        mappings_path: &Path,
        backend: &str,
        dimensions: usize,
    ) -> MemoryResult<Option<Self>> {
        match (vectors_path.exists(), mappings_path.exists()) {
            (false, false) => return Ok(None),
            (true, true) => {}
            _ => {
                return Err(MemoryError::index_corrupt(
                    "vector index and mapping files must exist together",
                ));
            }
        }

        let corrupt = |what: &Path, e: &dyn std::fmt::Display| {
            MemoryError::index_corrupt(format!("{}: {}", what.display(), e))
        };
        let read = |what: &Path| std::fs::read(what).map_err(|e| corrupt(what, &e));
        let vectors: VectorFile =
            serde_json::from_slice(&read(vectors_path)?).map_err(|e| corrupt(vectors_path, &e))?;
        let mappings: MappingFile =
            serde_json::from_slice(&read(mappings_path)?).map_err(|e| corrupt(mappings_path, &e))?;

        if vectors.version != INDEX_VERSION || mappings.version != INDEX_VERSION {
            return Err(MemoryError::index_corrupt("unsupported vector index version"));
        }
        if vectors.backend != backend || vectors.dimensions != dimensions {
            return Err(MemoryError::index_corrupt(format!(
                "vector index built by {} ({}d), current backend is {} ({}d)",
                vectors.backend, vectors.dimensions, backend, dimensions
            )));
        }
        if vectors.data.len() != vectors.count * vectors.dimensions
            || mappings.slot_to_id.len() != vectors.count
        {
            return Err(MemoryError::index_corrupt(format!(
                "vector index holds {} floats and {} mappings for {} slots",
                vectors.data.len(),
                mappings.slot_to_id.len(),
                vectors.count
            )));
        }

        let id_to_slot = mappings
            .slot_to_id
            .iter()
            .enumerate()
            .map(|(slot, id)| (id.clone(), slot))
            .collect();

        Ok(Some(Self {
            backend: vectors.backend,
            dimensions: vectors.dimensions,
            data: vectors.data,
            slot_to_id: mappings.slot_to_id,
            id_to_slot,
        }))
    }
}
