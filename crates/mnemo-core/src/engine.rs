//! Memory Engine
//!
//! The single owner of every component. Insert path:
//!
//! ```text
//! classify → build record → persist → tiers → knowledge graph → vector index
//! ```
//!
//! Query path: tier scan (or durable scan) → relevance scoring → importance
//! post-filter → truncate; semantic and hybrid search add the vector index
//! and fuse with the lexical results.
//!
//! Mutations take `&mut self`; use [`crate::SharedMemory`] to share an engine
//! between tasks.

use chrono::{Duration, Utc};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::analysis::ContentAnalyzer;
use crate::config::{MemoryConfig, RetentionConfig};
use crate::embedding::{Embedder, select_embedder};
use crate::graph::KnowledgeGraph;
use crate::hybrid::HybridRanker;
use crate::preferences::UserPreferences;
use crate::scoring::{Ranker, RelevanceScorer};
use crate::session::{MemoryPatterns, SESSION_ID_KEY, SessionSummary, SessionTracker};
use crate::store::{RecordStore, SqliteRecordStore};
use crate::tiers::{TieredIndex, matches_query};
use crate::types::{
    ConceptInsight, ContextSnapshot, DEFAULT_IMPORTANCE, HybridWeights, MemoryKind, MemoryRecord,
    MemoryStats, NewMemory, ProjectContext, RecallOptions, RecallSource, RecordAttributes,
    ScoredRecord, SweepReport, normalize_text, truncate_to_micros,
};
use crate::vector::VectorIndex;
use crate::{MemoryError, MemoryResult};

/// Vector index plus the embedder that fills it
struct SemanticLayer {
    embedder: Arc<dyn Embedder>,
    index: VectorIndex,
    pending: usize,
}

/// Tiered memory store and recall engine
pub struct MemoryEngine {
    config: MemoryConfig,
    store: Box<dyn RecordStore>,
    tiers: TieredIndex,
    ranker: Box<dyn Ranker>,
    graph: KnowledgeGraph,
    graph_pending: usize,
    semantic: Option<SemanticLayer>,
    analyzer: ContentAnalyzer,
    session: SessionTracker,
    preferences: UserPreferences,
    current_project: Option<ProjectContext>,
    closed: bool,
}

impl MemoryEngine {
    /// Open the engine on the SQLite database under `config.data_dir`
    pub fn open(config: MemoryConfig) -> MemoryResult<Self> {
        config.validate()?;
        let store = SqliteRecordStore::open(config.database_path())?;
        let embedder = select_embedder(&config.semantic);
        Self::with_store(config, Box::new(store), embedder)
    }

    /// Build the engine on an explicit store and (optional) embedder.
    ///
    /// Rebuilds the tiers from the store, restores the knowledge graph and
    /// vector index from their snapshots and replays whatever they missed.
    pub fn with_store(
        config: MemoryConfig,
        store: Box<dyn RecordStore>,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> MemoryResult<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir)?;

        let records = store.load_all()?;

        let mut tiers = TieredIndex::new(config.working_capacity);
        tiers.rebuild(records.iter());

        let graph = Self::restore_graph(&config, &records)?;
        let semantic = match embedder {
            Some(embedder) => Self::restore_vectors(&config, embedder, &records)?,
            None => {
                info!("No embedding backend; semantic search falls back to recall");
                None
            }
        };

        let preferences = UserPreferences::load_or_init(&config.preferences_path())?;
        let current_project = store.latest_project_context()?;

        info!(
            records = records.len(),
            concepts = graph.len(),
            semantic = semantic.is_some(),
            "Memory engine ready"
        );

        Ok(Self {
            ranker: Box::new(RelevanceScorer::new(config.scoring.clone())),
            config,
            store,
            tiers,
            graph,
            graph_pending: 0,
            semantic,
            analyzer: ContentAnalyzer::new(),
            session: SessionTracker::start(Utc::now()),
            preferences,
            current_project,
            closed: false,
        })
    }

    fn restore_graph(config: &MemoryConfig, records: &[MemoryRecord]) -> MemoryResult<KnowledgeGraph> {
        let path = config.graph_path();
        let mut graph = match KnowledgeGraph::load(&path, &config.graph) {
            Ok(Some(graph)) => graph,
            Ok(None) => KnowledgeGraph::new(&config.graph),
            Err(e) if e.is_index_corrupt() => {
                warn!(error = %e, "Discarding knowledge graph snapshot; rebuilding from records");
                set_aside(&path);
                KnowledgeGraph::new(&config.graph)
            }
            Err(e) => return Err(e),
        };
        let replayed = graph.catch_up(records.iter());
        if replayed > 0 {
            debug!(replayed, "Replayed records into knowledge graph");
        }
        Ok(graph)
    }

    fn restore_vectors(
        config: &MemoryConfig,
        embedder: Arc<dyn Embedder>,
        records: &[MemoryRecord],
    ) -> MemoryResult<Option<SemanticLayer>> {
        let vectors_path = config.vectors_path();
        let mappings_path = config.mappings_path();

        let index = match VectorIndex::load(
            &vectors_path,
            &mappings_path,
            embedder.name(),
            embedder.dimensions(),
        ) {
            Ok(Some(index)) => index,
            Ok(None) => VectorIndex::new(embedder.name(), embedder.dimensions()),
            Err(e) if e.is_index_corrupt() => {
                warn!(error = %e, "Vector index unreadable; running lexical-only");
                set_aside(&vectors_path);
                set_aside(&mappings_path);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let mut layer = SemanticLayer {
            embedder,
            index,
            pending: 0,
        };
        let missing: Vec<&MemoryRecord> = records
            .iter()
            .filter(|r| !layer.index.contains(&r.id))
            .collect();
        for record in missing {
            match layer.embedder.embed(&record.content) {
                Ok(vector) => {
                    layer.index.add(&record.id, &vector)?;
                    layer.pending += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Stopped embedding missing records");
                    break;
                }
            }
        }
        if layer.pending > 0 {
            debug!(added = layer.pending, "Embedded records missing from vector index");
        }
        Ok(Some(layer))
    }

    fn ensure_open(&self) -> MemoryResult<()> {
        if self.closed {
            Err(MemoryError::invalid_operation("memory engine is closed"))
        } else {
            Ok(())
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Insert
    // ─────────────────────────────────────────────────────────────────────────

    /// Classify, persist and index a new memory; returns its id.
    ///
    /// If the store rejects the write the record is still indexed in memory
    /// and the error is `StorageUnavailable` carrying the record id.
    pub fn insert(&mut self, memory: NewMemory) -> MemoryResult<String> {
        self.ensure_open()?;

        let NewMemory {
            content,
            kind,
            mut importance,
            mut tags,
            mut attributes,
            created_at,
            analyze,
        } = memory;

        if analyze && self.config.analysis.enabled {
            let analysis = self.analyzer.analyze(&content);
            tags.extend(analysis.tags);
            importance.get_or_insert(analysis.importance);
            attributes
                .entry("sentiment".into())
                .or_insert_with(|| Value::from(analysis.sentiment.as_str()));
            if let Some(action) = analysis.action {
                attributes
                    .entry("action_type".into())
                    .or_insert_with(|| Value::from(action.as_str()));
            }
        }
        attributes
            .entry(SESSION_ID_KEY.into())
            .or_insert_with(|| Value::from(self.session.session_id()));

        let record = MemoryRecord::new(
            content,
            kind,
            created_at.unwrap_or_else(Utc::now),
            importance.unwrap_or(DEFAULT_IMPORTANCE),
            tags,
            RecordAttributes::for_kind(kind, attributes),
        );

        let persisted = self.store.persist(&record);
        if let Err(e) = &persisted {
            warn!(id = %record.id, error = %e, "Persist failed; record kept in memory only");
        }

        let id = record.id.clone();
        self.index(record);

        match persisted {
            Ok(()) => Ok(id),
            Err(e) => Err(e.with_record_id(id)),
        }
    }

    fn index(&mut self, record: MemoryRecord) {
        let first_seen = self.graph.observe_record(&record);
        if first_seen {
            self.graph_pending += 1;
            if self.graph_pending >= self.config.graph.snapshot_interval {
                if let Err(e) = self.flush_graph() {
                    warn!(error = %e, "Knowledge graph snapshot failed");
                }
            }
        }

        if let Some(layer) = self.semantic.as_mut().filter(|l| !l.index.contains(&record.id)) {
            match layer.embedder.embed(&record.content) {
                Ok(vector) => match layer.index.add(&record.id, &vector) {
                    Ok(_) => layer.pending += 1,
                    Err(e) => warn!(id = %record.id, error = %e, "Vector not indexed"),
                },
                Err(e) => warn!(id = %record.id, error = %e, "Embedding failed"),
            }
        }
        let vectors_due = self
            .semantic
            .as_ref()
            .is_some_and(|l| l.pending >= self.config.semantic.flush_interval);
        if vectors_due {
            if let Err(e) = self.flush_vectors() {
                warn!(error = %e, "Vector index save failed");
            }
        }

        if first_seen {
            self.session.record(&record);
        }
        debug!(id = %record.id, kind = %record.kind, first_seen, "Indexed record");
        self.tiers.insert(record);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Recall
    // ─────────────────────────────────────────────────────────────────────────

    /// Ranked records matching `query`
    pub fn recall(&self, query: &str, options: &RecallOptions) -> MemoryResult<Vec<MemoryRecord>> {
        Ok(self
            .recall_scored(query, options)?
            .into_iter()
            .map(|s| s.record)
            .collect())
    }

    /// Ranked records with their relevance scores
    pub fn recall_scored(&self, query: &str, options: &RecallOptions) -> MemoryResult<Vec<ScoredRecord>> {
        self.ensure_open()?;

        let query = normalize_text(query);
        let kinds = options.effective_kinds();
        let candidates: Vec<MemoryRecord> = match options.source {
            RecallSource::Tiers => self
                .tiers
                .candidates(&query, &kinds)
                .into_iter()
                .cloned()
                .collect(),
            RecallSource::Durable => self
                .store
                .load_all()?
                .into_iter()
                .filter(|r| kinds.contains(&r.kind) && matches_query(r, &query))
                .collect(),
        };

        let max_results = options
            .max_results
            .unwrap_or(self.config.recall.default_max_results);
        let mut ranked = self.ranker.rank(&query, candidates, Utc::now());
        ranked.retain(|s| s.record.importance >= options.min_importance);
        ranked.truncate(max_results);
        Ok(ranked)
    }

    /// Nearest records by embedding similarity.
    ///
    /// Without a usable embedder this degrades to [`recall`](Self::recall)
    /// with every hit scored 1.0.
    pub fn semantic_search(
        &self,
        query: &str,
        k: usize,
        threshold: Option<f32>,
    ) -> MemoryResult<Vec<ScoredRecord>> {
        self.ensure_open()?;

        let Some(layer) = self.semantic.as_ref() else {
            return self.degraded_search(query, k);
        };
        let query_vector = match layer.embedder.embed(query) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Query embedding failed; falling back to recall");
                return self.degraded_search(query, k);
            }
        };

        let threshold = threshold.unwrap_or(self.config.semantic.similarity_threshold);
        let mut results = Vec::new();
        for hit in layer.index.search(&query_vector, k) {
            if hit.score < threshold {
                continue;
            }
            match self.store.get(&hit.id) {
                Ok(Some(record)) => results.push(ScoredRecord {
                    record,
                    score: f64::from(hit.score),
                }),
                Ok(None) => debug!(slot = hit.slot, id = %hit.id, "Skipping stale vector slot"),
                Err(e) => warn!(slot = hit.slot, error = %e, "Could not resolve vector slot"),
            }
        }
        Ok(results)
    }

    fn degraded_search(&self, query: &str, k: usize) -> MemoryResult<Vec<ScoredRecord>> {
        Ok(self
            .recall(query, &RecallOptions::new().max_results(k))?
            .into_iter()
            .map(|record| ScoredRecord { record, score: 1.0 })
            .collect())
    }

    /// Semantic and keyword results fused by weight
    pub fn hybrid_search(
        &self,
        query: &str,
        k: usize,
        weights: Option<HybridWeights>,
    ) -> MemoryResult<Vec<ScoredRecord>> {
        let weights = weights.unwrap_or(HybridWeights {
            semantic: self.config.semantic.semantic_weight,
            keyword: self.config.semantic.keyword_weight,
        });
        let pool = k.saturating_mul(2);
        let semantic = self.semantic_search(query, pool, None)?;
        let keyword = self.recall(query, &RecallOptions::new().max_results(pool))?;
        Ok(HybridRanker::new(weights).fuse(semantic, keyword, k))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Projects & context
    // ─────────────────────────────────────────────────────────────────────────

    /// Replace the current context of a project and log the change as a
    /// low-priority project memory.
    pub fn update_project_context(
        &mut self,
        project_name: &str,
        tech_stack: Option<&str>,
        context_data: Map<String, Value>,
    ) -> MemoryResult<ProjectContext> {
        self.ensure_open()?;

        let now = truncate_to_micros(Utc::now());
        let created_at = self
            .store
            .project_context(project_name)?
            .map_or(now, |existing| existing.created_at);
        let context = ProjectContext {
            project_name: project_name.to_string(),
            tech_stack: tech_stack.map(str::to_string),
            context_data,
            created_at,
            updated_at: now,
        };
        self.store.upsert_project_context(&context)?;
        self.current_project = Some(context.clone());
        info!(project = project_name, "Updated project context");

        let summary = format!(
            "Project {} updated: {}",
            project_name,
            tech_stack.unwrap_or("no tech stack")
        );
        self.insert(
            NewMemory::new(summary, MemoryKind::Project)
                .with_project(project_name)
                .with_importance(self.config.project_update_importance)
                .with_attribute("action", "context_update")
                .without_analysis(),
        )?;

        Ok(context)
    }

    pub fn current_project(&self) -> Option<&ProjectContext> {
        self.current_project.as_ref()
    }

    pub fn project_context(&self, project_name: &str) -> MemoryResult<Option<ProjectContext>> {
        self.ensure_open()?;
        self.store.project_context(project_name)
    }

    /// Everything the conversational front-end needs for its next turn
    pub fn context_snapshot(&self, query: Option<&str>) -> MemoryResult<ContextSnapshot> {
        self.ensure_open()?;

        let query = query.filter(|q| !q.trim().is_empty());
        let (recent_memories, relevant_skills, concepts, suggested_tags) = match query {
            Some(q) => {
                let limit = self.config.recall.context_recall_limit;
                (
                    self.recall(q, &RecallOptions::new().max_results(limit))?,
                    self.recall(
                        q,
                        &RecallOptions::new()
                            .kinds([MemoryKind::Procedural])
                            .max_results(limit),
                    )?,
                    self.graph.lookup(q),
                    self.graph.suggest_tags(q),
                )
            }
            None => (Vec::new(), Vec::new(), Vec::new(), Vec::new()),
        };

        Ok(ContextSnapshot {
            session_id: self.session.session_id().to_string(),
            preferences: self.preferences.clone(),
            current_project: self.current_project.clone(),
            recent_memories,
            relevant_skills,
            recent_conversation: self
                .tiers
                .recent_working(self.config.recall.conversation_limit)
                .into_iter()
                .cloned()
                .collect(),
            concepts,
            suggested_tags,
        })
    }

    pub fn preferences(&self) -> &UserPreferences {
        &self.preferences
    }

    /// Knowledge graph concepts named in the query
    pub fn concepts(&self, query: &str) -> Vec<ConceptInsight> {
        self.graph.lookup(query)
    }

    pub fn suggest_tags(&self, query: &str) -> Vec<String> {
        self.graph.suggest_tags(query)
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    pub fn get(&self, id: &str) -> MemoryResult<Option<MemoryRecord>> {
        self.ensure_open()?;
        self.store.get(id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Retention & reporting
    // ─────────────────────────────────────────────────────────────────────────

    /// Retention sweep with the configured policy
    pub fn sweep(&mut self) -> MemoryResult<SweepReport> {
        let policy = self.config.retention.clone();
        self.sweep_with(&policy, false)
    }

    /// Delete records older than the policy age with importance below its
    /// floor. Knowledge nodes and vector slots are left in place.
    pub fn sweep_with(&mut self, policy: &RetentionConfig, dry_run: bool) -> MemoryResult<SweepReport> {
        self.ensure_open()?;

        let cutoff = Utc::now() - Duration::days(policy.max_age_days);
        let removed_ids = self.store.sweep(cutoff, policy.importance_floor, dry_run)?;
        if !dry_run {
            let ids: HashSet<String> = removed_ids.iter().cloned().collect();
            self.tiers.remove(&ids);
        }

        info!(
            removed = removed_ids.len(),
            dry_run,
            max_age_days = policy.max_age_days,
            "Retention sweep finished"
        );
        Ok(SweepReport {
            cutoff: Some(cutoff),
            removed_ids,
            dry_run,
        })
    }

    pub fn stats(&self) -> MemoryResult<MemoryStats> {
        self.ensure_open()?;
        Ok(MemoryStats {
            stored: self.store.count_by_kind()?,
            in_memory: self.tiers.counts(),
            concepts: self.graph.len(),
            vector_slots: self.semantic.as_ref().map_or(0, |l| l.index.len()),
            semantic_enabled: self.semantic.is_some(),
            embedder: self.semantic.as_ref().map(|l| l.embedder.name().to_string()),
            session_id: self.session.session_id().to_string(),
            session_inserts: self.session.len(),
        })
    }

    pub fn is_semantic_enabled(&self) -> bool {
        self.semantic.is_some()
    }

    pub fn memory_patterns(&self) -> MemoryPatterns {
        self.session.patterns(Utc::now())
    }

    pub fn session_summary(&self) -> SessionSummary {
        self.session.summary(Utc::now())
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Flush & shutdown
    // ─────────────────────────────────────────────────────────────────────────

    /// Write the knowledge graph snapshot, then the vector index
    pub fn flush(&mut self) -> MemoryResult<()> {
        self.flush_graph()?;
        self.flush_vectors()
    }

    fn flush_graph(&mut self) -> MemoryResult<()> {
        self.graph.save(&self.config.graph_path())?;
        self.graph_pending = 0;
        Ok(())
    }

    fn flush_vectors(&mut self) -> MemoryResult<()> {
        let vectors_path = self.config.vectors_path();
        let mappings_path = self.config.mappings_path();
        if let Some(layer) = self.semantic.as_mut() {
            layer.index.save(&vectors_path, &mappings_path)?;
            layer.pending = 0;
        }
        Ok(())
    }

    fn write_session_summary(&self) -> MemoryResult<()> {
        let path = self
            .config
            .data_dir
            .join(format!("session_summary_{}.md", self.session.session_id()));
        std::fs::write(&path, self.session.summary(Utc::now()).to_markdown())?;
        Ok(())
    }

    /// Flush the graph, then the vectors, then release the store.
    ///
    /// Every step runs even if an earlier one failed; the first error is
    /// returned. Calling `close` again is a no-op.
    pub fn close(&mut self) -> MemoryResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut first_error = None;
        if let Err(e) = self.flush_graph() {
            warn!(error = %e, "Knowledge graph snapshot failed on close");
            first_error.get_or_insert(e);
        }
        if let Err(e) = self.flush_vectors() {
            warn!(error = %e, "Vector index save failed on close");
            first_error.get_or_insert(e);
        }
        if self.config.analysis.write_session_summary && !self.session.is_empty() {
            if let Err(e) = self.write_session_summary() {
                warn!(error = %e, "Session summary not written");
            }
        }
        if let Err(e) = self.store.close() {
            first_error.get_or_insert(e);
        }

        info!(session = self.session.session_id(), inserts = self.session.len(), "Memory engine closed");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for MemoryEngine {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                warn!(error = %e, "Memory engine did not close cleanly");
            }
        }
    }
}

/// Move an unreadable derived file to `<path>.corrupt`
fn set_aside(path: &Path) {
    if !path.exists() {
        return;
    }
    let mut target = path.as_os_str().to_owned();
    target.push(".corrupt");
    let target = PathBuf::from(target);
    match std::fs::rename(path, &target) {
        Ok(()) => warn!(from = %path.display(), to = %target.display(), "Moved corrupt file aside"),
        Err(e) => warn!(path = %path.display(), error = %e, "Could not move corrupt file aside"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingBackend;
    use crate::embedding::HashingEmbedder;
    use chrono::DateTime;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> MemoryConfig {
        MemoryConfig::new(dir.path()).with_backend(EmbeddingBackend::Disabled)
    }

    fn in_memory(config: MemoryConfig) -> MemoryEngine {
        MemoryEngine::with_store(config, Box::new(SqliteRecordStore::in_memory().unwrap()), None)
            .unwrap()
    }

    fn ids(records: &[MemoryRecord]) -> Vec<String> {
        records.iter().map(|r| r.id.clone()).collect()
    }

    fn scored_ids(records: &[ScoredRecord]) -> HashSet<String> {
        records.iter().map(|s| s.record.id.clone()).collect()
    }

    /// Store whose writes always fail
    struct ReadOnlyStore(SqliteRecordStore);

    impl RecordStore for ReadOnlyStore {
        fn persist(&self, _record: &MemoryRecord) -> MemoryResult<()> {
            Err(MemoryError::storage("disk is read-only"))
        }
        fn get(&self, id: &str) -> MemoryResult<Option<MemoryRecord>> {
            self.0.get(id)
        }
        fn load_recent(&self, kind: MemoryKind, limit: usize) -> MemoryResult<Vec<MemoryRecord>> {
            self.0.load_recent(kind, limit)
        }
        fn load_all(&self) -> MemoryResult<Vec<MemoryRecord>> {
            self.0.load_all()
        }
        fn upsert_project_context(&self, context: &ProjectContext) -> MemoryResult<()> {
            self.0.upsert_project_context(context)
        }
        fn project_context(&self, name: &str) -> MemoryResult<Option<ProjectContext>> {
            self.0.project_context(name)
        }
        fn latest_project_context(&self) -> MemoryResult<Option<ProjectContext>> {
            self.0.latest_project_context()
        }
        fn sweep(&self, cutoff: DateTime<Utc>, floor: f64, dry_run: bool) -> MemoryResult<Vec<String>> {
            self.0.sweep(cutoff, floor, dry_run)
        }
        fn count_by_kind(&self) -> MemoryResult<BTreeMap<MemoryKind, u64>> {
            self.0.count_by_kind()
        }
        fn close(&self) -> MemoryResult<()> {
            self.0.close()
        }
    }

    #[test]
    fn test_importance_floor_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = in_memory(config(&dir));

        let a = engine
            .insert(
                NewMemory::new("Python uses indentation for blocks", MemoryKind::Semantic)
                    .with_importance(0.9)
                    .with_tag("python"),
            )
            .unwrap();
        engine
            .insert(
                NewMemory::new("Hit a bug in the python script", MemoryKind::Episodic)
                    .with_importance(0.3)
                    .with_tags(["python", "bug"]),
            )
            .unwrap();

        let results = engine
            .recall("python", &RecallOptions::new().min_importance(0.5))
            .unwrap();
        assert_eq!(ids(&results), vec![a]);

        let all = engine.recall("python", &RecallOptions::new()).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_min_importance_never_violated() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = in_memory(config(&dir));
        for i in 0..20 {
            engine
                .insert(
                    NewMemory::new(format!("rust note {}", i), MemoryKind::Episodic)
                        .with_importance(i as f64 / 20.0),
                )
                .unwrap();
        }

        for floor in [0.0, 0.25, 0.5, 0.95] {
            let results = engine
                .recall("rust", &RecallOptions::new().min_importance(floor).max_results(50))
                .unwrap();
            assert!(results.iter().all(|r| r.importance >= floor));
        }
        let top = engine
            .recall("rust", &RecallOptions::new().min_importance(0.5).max_results(3))
            .unwrap();
        assert_eq!(top.len(), 3);
    }

    #[test]
    fn test_recall_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = in_memory(config(&dir));
        let base = Utc::now() - Duration::hours(1);
        for i in 0..8 {
            engine
                .insert(
                    NewMemory::new("tokio task notes", MemoryKind::Episodic)
                        .with_importance(0.5)
                        .with_timestamp(base + Duration::seconds(i)),
                )
                .unwrap();
        }
        let first = engine.recall("tokio", &RecallOptions::new()).unwrap();
        let second = engine.recall("tokio", &RecallOptions::new()).unwrap();
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.len(), 8);
    }

    #[test]
    fn test_working_overflow_still_recallable_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = in_memory(config(&dir).with_working_capacity(3));
        let base = Utc::now() - Duration::minutes(10);
        let mut inserted = Vec::new();
        for i in 0..5 {
            inserted.push(
                engine
                    .insert(
                        NewMemory::new(format!("chat turn {}", i), MemoryKind::Working)
                            .with_timestamp(base + Duration::seconds(i)),
                    )
                    .unwrap(),
            );
        }

        let snapshot = engine.context_snapshot(None).unwrap();
        let conversation = ids(&snapshot.recent_conversation);
        assert_eq!(conversation, inserted[2..].to_vec());
        assert!(!conversation.contains(&inserted[0]));

        let tiers = engine.recall("chat turn 0", &RecallOptions::new()).unwrap();
        assert!(tiers.is_empty());
        let durable = engine
            .recall("chat turn 0", &RecallOptions::new().durable())
            .unwrap();
        assert_eq!(ids(&durable), vec![inserted[0].clone()]);
    }

    #[test]
    fn test_analysis_merges_tags_and_keeps_explicit_importance() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = in_memory(config(&dir));

        let id = engine
            .insert(NewMemory::new("Critical bug in the LangChain agent", MemoryKind::Episodic).with_tag("oncall"))
            .unwrap();
        let record = engine.get(&id).unwrap().unwrap();
        assert!(record.tags.contains("langchain"));
        assert!(record.tags.contains("agent"));
        assert!(record.tags.contains("oncall"));
        assert_eq!(record.importance, 1.0);
        assert_eq!(record.attributes.get("sentiment"), Some(&Value::from("negative")));
        assert_eq!(
            record.attributes.get(SESSION_ID_KEY),
            Some(&Value::from(engine.session_summary().session_id))
        );

        let id = engine
            .insert(NewMemory::new("Critical bug again", MemoryKind::Episodic).with_importance(0.2))
            .unwrap();
        assert_eq!(engine.get(&id).unwrap().unwrap().importance, 0.2);

        let id = engine
            .insert(NewMemory::new("python python", MemoryKind::Episodic).without_analysis())
            .unwrap();
        let record = engine.get(&id).unwrap().unwrap();
        assert!(record.tags.is_empty());
        assert_eq!(record.importance, DEFAULT_IMPORTANCE);
    }

    #[test]
    fn test_graph_stays_symmetric() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = in_memory(config(&dir).with_analysis(false));
        let tag_sets: [&[&str]; 4] = [&["a", "b"], &["b", "c", "d"], &["a"], &["d", "a"]];
        for tags in tag_sets {
            engine
                .insert(NewMemory::new("x", MemoryKind::Semantic).with_tags(tags.iter().copied()))
                .unwrap();
            assert!(engine.graph().is_symmetric());
        }
        assert_eq!(engine.graph().node("a").unwrap().occurrence_count, 3);
        assert_eq!(engine.concepts("a and d")[0].concept, "a");
    }

    #[test]
    fn test_degraded_semantic_search_matches_recall() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = in_memory(config(&dir));
        assert!(!engine.is_semantic_enabled());

        engine
            .insert(NewMemory::new("python generators", MemoryKind::Semantic).with_importance(0.8))
            .unwrap();
        engine
            .insert(NewMemory::new("fixing python imports", MemoryKind::Episodic))
            .unwrap();
        engine
            .insert(NewMemory::new("rust lifetimes", MemoryKind::Semantic))
            .unwrap();

        let semantic = engine.semantic_search("python", 10, None).unwrap();
        let recall = engine.recall("python", &RecallOptions::new()).unwrap();
        assert_eq!(scored_ids(&semantic), ids(&recall).into_iter().collect());
        assert!(semantic.iter().all(|s| s.score == 1.0));
    }

    #[test]
    fn test_semantic_and_hybrid_search_with_hashing_backend() {
        let dir = tempfile::tempdir().unwrap();
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(256));
        let mut engine = MemoryEngine::with_store(
            config(&dir).with_analysis(false),
            Box::new(SqliteRecordStore::in_memory().unwrap()),
            Some(embedder),
        )
        .unwrap();
        assert!(engine.is_semantic_enabled());

        let exact = engine
            .insert(NewMemory::new("sqlite write ahead logging", MemoryKind::Semantic))
            .unwrap();
        let other = engine
            .insert(NewMemory::new("gardening in spring", MemoryKind::Episodic))
            .unwrap();

        let hits = engine
            .semantic_search("sqlite write ahead logging", 5, Some(0.9))
            .unwrap();
        assert_eq!(scored_ids(&hits), [exact.clone()].into_iter().collect());
        assert!(hits[0].score > 0.99);

        let hybrid = engine
            .hybrid_search("sqlite write ahead logging", 5, None)
            .unwrap();
        assert_eq!(hybrid[0].record.id, exact);
        assert!((hybrid[0].score - (0.7 * hits[0].score + 0.3)).abs() < 1e-6);
        assert!(hybrid.iter().all(|s| s.record.id != other || s.score < 0.7));
    }

    #[test]
    fn test_failed_persist_keeps_record_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReadOnlyStore(SqliteRecordStore::in_memory().unwrap());
        let mut engine = MemoryEngine::with_store(config(&dir), Box::new(store), None).unwrap();

        let err = engine
            .insert(NewMemory::new("ephemeral thought", MemoryKind::Episodic))
            .unwrap_err();
        assert!(err.is_storage_unavailable());
        let id = err.record_id().unwrap().to_string();

        let results = engine.recall("ephemeral", &RecallOptions::new()).unwrap();
        assert_eq!(ids(&results), vec![id.clone()]);
        assert!(engine.get(&id).unwrap().is_none());
    }

    #[test]
    fn test_project_context_update() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = in_memory(config(&dir));

        let mut data = Map::new();
        data.insert("milestone".into(), Value::from("v0.1"));
        let ctx = engine
            .update_project_context("mnemo", Some("Rust, SQLite"), data)
            .unwrap();
        assert_eq!(ctx.tech_stack.as_deref(), Some("Rust, SQLite"));
        assert_eq!(engine.current_project().unwrap().project_name, "mnemo");

        let again = engine
            .update_project_context("mnemo", Some("Rust, SQLite, tokio"), Map::new())
            .unwrap();
        assert_eq!(again.created_at, ctx.created_at);
        assert_eq!(engine.project_context("mnemo").unwrap(), Some(again.clone()));
        assert_eq!(engine.current_project(), Some(&again));

        let records = engine
            .recall("mnemo", &RecallOptions::new().kinds([MemoryKind::Project]))
            .unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.importance == 0.3));
        assert!(records.iter().all(|r| r.attributes.project_name() == Some("mnemo")));
        assert_eq!(records[0].content, "Project mnemo updated: Rust, SQLite, tokio");
    }

    #[test]
    fn test_context_snapshot_with_query() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = in_memory(config(&dir));
        engine
            .insert(NewMemory::new("Run cargo fmt before committing", MemoryKind::Procedural).with_skill("cargo"))
            .unwrap();
        engine
            .insert(NewMemory::new("cargo workspaces share a lockfile", MemoryKind::Semantic).with_tags(["cargo", "rust"]))
            .unwrap();
        engine
            .insert(NewMemory::new("hello there", MemoryKind::Working))
            .unwrap();

        let snapshot = engine.context_snapshot(Some("cargo")).unwrap();
        assert_eq!(snapshot.recent_memories.len(), 2);
        assert_eq!(snapshot.relevant_skills.len(), 1);
        assert_eq!(snapshot.recent_conversation.len(), 1);
        assert_eq!(snapshot.concepts[0].concept, "cargo");
        assert_eq!(snapshot.suggested_tags, vec!["rust"]);
        assert!(snapshot.session_id.starts_with("session_"));
    }

    #[test]
    fn test_sweep_removes_old_unimportant_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = in_memory(config(&dir));
        let old = Utc::now() - Duration::days(45);
        let stale = engine
            .insert(NewMemory::new("old trivia", MemoryKind::Episodic).with_importance(0.2).with_timestamp(old))
            .unwrap();
        let keep = engine
            .insert(NewMemory::new("old but vital", MemoryKind::Episodic).with_importance(0.9).with_timestamp(old))
            .unwrap();
        engine
            .insert(NewMemory::new("fresh trivia", MemoryKind::Episodic).with_importance(0.1))
            .unwrap();

        let dry = engine.sweep_with(&RetentionConfig::default(), true).unwrap();
        assert_eq!(dry.removed_ids, vec![stale.clone()]);
        assert!(engine.get(&stale).unwrap().is_some());

        let report = engine.sweep().unwrap();
        assert_eq!(report.removed(), 1);
        assert!(engine.get(&stale).unwrap().is_none());
        assert!(engine.get(&keep).unwrap().is_some());
        let remaining = engine.recall("trivia", &RecallOptions::new()).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(engine.stats().unwrap().total_stored(), 2);
    }

    #[test]
    fn test_close_reopen_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir).with_backend(EmbeddingBackend::Hashing);
        let before;
        {
            let mut engine = MemoryEngine::open(cfg.clone()).unwrap();
            for (content, kind) in [
                ("python asyncio tips", MemoryKind::Semantic),
                ("debugged python segfault", MemoryKind::Episodic),
                ("python packaging steps", MemoryKind::Procedural),
                ("talked about python", MemoryKind::Working),
            ] {
                engine.insert(NewMemory::new(content, kind)).unwrap();
            }
            before = ids(&engine.recall("python", &RecallOptions::new()).unwrap());
            engine.close().unwrap();
            engine.close().unwrap();
            assert!(engine.recall("python", &RecallOptions::new()).is_err());
        }
        assert!(cfg.graph_path().exists());
        assert!(cfg.vectors_path().exists());

        let engine = MemoryEngine::open(cfg).unwrap();
        let after = ids(&engine.recall("python", &RecallOptions::new()).unwrap());
        assert_eq!(before, after);
        assert!(engine.graph().node("python").is_some());
        assert_eq!(engine.stats().unwrap().vector_slots, 4);
    }

    #[test]
    fn test_graph_catches_up_on_unflushed_records() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir).with_analysis(false);
        {
            let mut engine = MemoryEngine::open(cfg.clone()).unwrap();
            engine
                .insert(NewMemory::new("first", MemoryKind::Semantic).with_tag("alpha"))
                .unwrap();
            engine.close().unwrap();
        }
        {
            // a write that never reached the graph snapshot
            let store = SqliteRecordStore::open(cfg.database_path()).unwrap();
            let late = MemoryRecord::new(
                "second",
                MemoryKind::Semantic,
                Utc::now() + Duration::seconds(1),
                0.5,
                ["beta", "alpha"],
                RecordAttributes::for_kind(MemoryKind::Semantic, BTreeMap::new()),
            );
            store.persist(&late).unwrap();
            store.close().unwrap();
        }

        let engine = MemoryEngine::open(cfg).unwrap();
        assert_eq!(engine.graph().node("alpha").unwrap().occurrence_count, 2);
        assert_eq!(engine.graph().node("beta").unwrap().related_tags.get("alpha"), Some(&1));
    }

    #[test]
    fn test_graph_catches_up_on_backdated_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(&dir).with_analysis(false);
        cfg.graph.snapshot_interval = 2;
        {
            let mut engine = MemoryEngine::open(cfg.clone()).unwrap();
            for content in ["one", "two"] {
                engine
                    .insert(NewMemory::new(content, MemoryKind::Semantic).with_tag("alpha"))
                    .unwrap();
            }
            assert!(cfg.graph_path().exists());
            engine
                .insert(
                    NewMemory::new("imported note", MemoryKind::Semantic)
                        .with_tag("beta")
                        .with_timestamp(Utc::now() - Duration::days(30)),
                )
                .unwrap();
            // skip the closing snapshot
            std::mem::forget(engine);
        }

        let engine = MemoryEngine::open(cfg).unwrap();
        assert_eq!(engine.graph().node("alpha").unwrap().occurrence_count, 2);
        assert_eq!(engine.graph().node("beta").unwrap().occurrence_count, 1);
        assert_eq!(engine.graph().observed_count(), 3);
    }

    #[test]
    fn test_reinserted_record_counted_once() {
        let dir = tempfile::tempdir().unwrap();
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(64));
        let mut engine = MemoryEngine::with_store(
            config(&dir).with_analysis(false),
            Box::new(SqliteRecordStore::in_memory().unwrap()),
            Some(embedder),
        )
        .unwrap();
        let at = Utc::now() - Duration::minutes(5);
        let note = || {
            NewMemory::new("rust lifetimes explained", MemoryKind::Semantic)
                .with_tags(["rust", "lifetimes"])
                .with_timestamp(at)
        };

        let first = engine.insert(note()).unwrap();
        let second = engine.insert(note()).unwrap();
        assert_eq!(first, second);

        let node = engine.graph().node("rust").unwrap();
        assert_eq!(node.occurrence_count, 1);
        assert_eq!(node.related_tags.get("lifetimes"), Some(&1));
        assert_eq!(engine.graph_pending, 1);
        assert_eq!(engine.session.len(), 1);
        assert_eq!(engine.stats().unwrap().vector_slots, 1);
        assert_eq!(engine.recall("lifetimes", &RecallOptions::new()).unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_kinds_do_not_duplicate_results() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = in_memory(config(&dir));
        engine
            .insert(NewMemory::new("deployed the staging cluster", MemoryKind::Episodic))
            .unwrap();

        let options = RecallOptions::new().kinds([MemoryKind::Episodic, MemoryKind::Episodic]);
        let records = engine.recall("staging", &options).unwrap();
        assert_eq!(records.len(), 1);
        let durable = engine.recall("staging", &options.clone().durable()).unwrap();
        assert_eq!(durable.len(), 1);
    }

    #[test]
    fn test_hybrid_search_with_unbounded_k() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = in_memory(config(&dir));
        engine
            .insert(NewMemory::new("tokio runtime tuning", MemoryKind::Semantic))
            .unwrap();

        let hits = engine.hybrid_search("tokio", usize::MAX, None).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_unreadable_sidecar_files_do_not_block_open() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir).with_backend(EmbeddingBackend::Hashing);
        {
            let mut engine = MemoryEngine::open(cfg.clone()).unwrap();
            engine
                .insert(NewMemory::new("python decorators", MemoryKind::Semantic).with_tag("python"))
                .unwrap();
            engine.close().unwrap();
        }
        for path in [cfg.vectors_path(), cfg.graph_path()] {
            std::fs::remove_file(&path).unwrap();
            std::fs::create_dir(&path).unwrap();
        }

        let engine = MemoryEngine::open(cfg).unwrap();
        assert!(!engine.is_semantic_enabled());
        assert!(engine.graph().node("python").is_some());
        assert!(dir.path().join("vectors.json.corrupt").exists());
        assert!(dir.path().join("knowledge_graph.json.corrupt").exists());

        let hits = engine.semantic_search("python", 5, None).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_corrupt_vector_index_runs_lexical_only() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir).with_backend(EmbeddingBackend::Hashing);
        {
            let mut engine = MemoryEngine::open(cfg.clone()).unwrap();
            engine
                .insert(NewMemory::new("python decorators", MemoryKind::Semantic))
                .unwrap();
            engine.close().unwrap();
        }
        std::fs::write(cfg.vectors_path(), b"\0\0garbage").unwrap();

        let engine = MemoryEngine::open(cfg.clone()).unwrap();
        assert!(!engine.is_semantic_enabled());
        assert!(!cfg.vectors_path().exists());
        assert!(dir.path().join("vectors.json.corrupt").exists());

        let hits = engine.semantic_search("python", 5, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, 1.0);
    }

    #[test]
    fn test_corrupt_graph_snapshot_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir).with_analysis(false);
        {
            let mut engine = MemoryEngine::open(cfg.clone()).unwrap();
            engine
                .insert(NewMemory::new("x", MemoryKind::Semantic).with_tags(["p", "q"]))
                .unwrap();
        }
        std::fs::write(cfg.graph_path(), b"[1, 2").unwrap();

        let engine = MemoryEngine::open(cfg).unwrap();
        assert_eq!(engine.graph().node("p").unwrap().related_tags.get("q"), Some(&1));
    }

    #[test]
    fn test_stats_and_session_summary_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(&dir);
        cfg.analysis.write_session_summary = true;
        let mut engine = MemoryEngine::open(cfg).unwrap();
        engine
            .insert(NewMemory::new("important milestone reached", MemoryKind::Episodic))
            .unwrap();
        engine
            .insert(NewMemory::new("hi", MemoryKind::Working))
            .unwrap();

        let stats = engine.stats().unwrap();
        assert_eq!(stats.total_stored(), 2);
        assert_eq!(stats.in_memory[&MemoryKind::Working], 1);
        assert!(!stats.semantic_enabled);
        assert_eq!(stats.session_inserts, 2);

        let summary_file = dir
            .path()
            .join(format!("session_summary_{}.md", stats.session_id));
        engine.close().unwrap();
        assert!(summary_file.exists());
    }
}
