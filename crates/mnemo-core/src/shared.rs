//! Async handle to a shared memory engine.
//!
//! The engine does blocking SQLite and file I/O, so every call runs on the
//! blocking pool while holding the engine lock. Operations are serialized:
//! an insert is fully indexed before the next query observes the engine.

use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::engine::MemoryEngine;
use crate::types::{
    ContextSnapshot, HybridWeights, MemoryRecord, MemoryStats, NewMemory, ProjectContext,
    RecallOptions, ScoredRecord, SweepReport,
};
use crate::{MemoryError, MemoryResult};

/// Cloneable, task-safe handle to a [`MemoryEngine`]
#[derive(Clone)]
pub struct SharedMemory {
    inner: Arc<Mutex<MemoryEngine>>,
}

impl SharedMemory {
    pub fn new(engine: MemoryEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// Run `f` against the engine on the blocking pool
    pub async fn with_engine<T, F>(&self, f: F) -> MemoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut MemoryEngine) -> MemoryResult<T> + Send + 'static,
    {
        let mut engine = self.inner.clone().lock_owned().await;
        tokio::task::spawn_blocking(move || f(&mut engine))
            .await
            .map_err(|e| MemoryError::invalid_operation(format!("memory task failed: {}", e)))?
    }

    pub async fn insert(&self, memory: NewMemory) -> MemoryResult<String> {
        self.with_engine(move |engine| engine.insert(memory)).await
    }

    pub async fn recall(&self, query: &str, options: RecallOptions) -> MemoryResult<Vec<MemoryRecord>> {
        let query = query.to_string();
        self.with_engine(move |engine| engine.recall(&query, &options))
            .await
    }

    pub async fn semantic_search(
        &self,
        query: &str,
        k: usize,
        threshold: Option<f32>,
    ) -> MemoryResult<Vec<ScoredRecord>> {
        let query = query.to_string();
        self.with_engine(move |engine| engine.semantic_search(&query, k, threshold))
            .await
    }

    pub async fn hybrid_search(
        &self,
        query: &str,
        k: usize,
        weights: Option<HybridWeights>,
    ) -> MemoryResult<Vec<ScoredRecord>> {
        let query = query.to_string();
        self.with_engine(move |engine| engine.hybrid_search(&query, k, weights))
            .await
    }

    pub async fn update_project_context(
        &self,
        project_name: &str,
        tech_stack: Option<&str>,
        context_data: Map<String, Value>,
    ) -> MemoryResult<ProjectContext> {
        let project_name = project_name.to_string();
        let tech_stack = tech_stack.map(str::to_string);
        self.with_engine(move |engine| {
            engine.update_project_context(&project_name, tech_stack.as_deref(), context_data)
        })
        .await
    }

    pub async fn context_snapshot(&self, query: Option<&str>) -> MemoryResult<ContextSnapshot> {
        let query = query.map(str::to_string);
        self.with_engine(move |engine| engine.context_snapshot(query.as_deref()))
            .await
    }

    pub async fn sweep(&self) -> MemoryResult<SweepReport> {
        self.with_engine(|engine| engine.sweep()).await
    }

    pub async fn stats(&self) -> MemoryResult<MemoryStats> {
        self.with_engine(|engine| engine.stats()).await
    }

    pub async fn close(&self) -> MemoryResult<()> {
        self.with_engine(|engine| engine.close()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmbeddingBackend, MemoryConfig};
    use crate::types::MemoryKind;

    fn open(dir: &tempfile::TempDir) -> SharedMemory {
        let config = MemoryConfig::new(dir.path()).with_backend(EmbeddingBackend::Disabled);
        SharedMemory::new(MemoryEngine::open(config).unwrap())
    }

    #[tokio::test]
    async fn test_concurrent_inserts_are_all_visible() {
        let dir = tempfile::tempdir().unwrap();
        let memory = open(&dir);

        let mut handles = Vec::new();
        for i in 0..16 {
            let memory = memory.clone();
            handles.push(tokio::spawn(async move {
                memory
                    .insert(NewMemory::new(format!("tokio worker {} finished", i), MemoryKind::Episodic))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let results = memory
            .recall("tokio worker", RecallOptions::new().max_results(100))
            .await
            .unwrap();
        assert_eq!(results.len(), 16);
        assert_eq!(memory.stats().await.unwrap().total_stored(), 16);
    }

    #[tokio::test]
    async fn test_insert_then_recall_is_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let memory = open(&dir);

        let id = memory
            .insert(NewMemory::new("remember the deploy key rotation", MemoryKind::Semantic))
            .await
            .unwrap();
        let results = memory.recall("deploy key", RecallOptions::new()).await.unwrap();
        assert_eq!(results[0].id, id);

        let snapshot = memory.context_snapshot(Some("deploy")).await.unwrap();
        assert_eq!(snapshot.recent_memories.len(), 1);
    }

    #[tokio::test]
    async fn test_close_rejects_later_calls() {
        let dir = tempfile::tempdir().unwrap();
        let memory = open(&dir);
        memory
            .update_project_context("mnemo", Some("Rust"), Map::new())
            .await
            .unwrap();
        memory.close().await.unwrap();
        memory.close().await.unwrap();

        let err = memory.recall("mnemo", RecallOptions::new()).await.unwrap_err();
        assert!(matches!(err, MemoryError::InvalidOperation { .. }));
    }
}
