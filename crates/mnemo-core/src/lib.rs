//! mnemo-core - Personal knowledge-retention memory engine
//!
//! Remembers what a user says, learns and works on across sessions and
//! surfaces it again when relevant:
//!
//! - **store**: Durable SQLite record store (source of truth)
//! - **tiers**: In-memory working/episodic/procedural/project/semantic tiers
//! - **scoring**: Relevance scorer for recall
//! - **graph**: Tag co-occurrence knowledge graph
//! - **vector**: Optional embedding index for semantic search
//! - **hybrid**: Fusion of semantic and keyword results
//! - **engine**: The [`MemoryEngine`] tying it all together
//! - **shared**: Async handle for sharing an engine between tasks

pub mod analysis;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod graph;
pub mod hybrid;
pub mod preferences;
pub mod scoring;
pub mod session;
pub mod shared;
pub mod store;
pub mod tiers;
pub mod types;
pub mod vector;

// Re-export commonly used types
pub use config::{EmbeddingBackend, MemoryConfig, RetentionConfig};
pub use engine::MemoryEngine;
pub use error::{MemoryError, MemoryResult};
pub use preferences::UserPreferences;
pub use shared::SharedMemory;
pub use store::{RecordStore, SqliteRecordStore};
pub use types::{
    ContextSnapshot, HybridWeights, MemoryKind, MemoryRecord, MemoryStats, NewMemory,
    ProjectContext, RecallOptions, ScoredRecord, SweepReport,
};
