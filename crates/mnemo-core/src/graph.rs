//! Knowledge Graph
//!
//! Tag co-occurrence graph. Every tagged insert bumps each tag's node and the
//! symmetric co-occurrence counts between all pairs of its tags. Nodes are
//! created lazily and never deleted.
//!
//! Each record is folded in at most once, keyed by id. The JSON snapshot
//! carries the ids already observed; on startup every stored record missing
//! from that set is replayed, whatever its timestamp, so inserts made after
//! the last flush are not lost.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

use crate::config::GraphConfig;
use crate::types::{ConceptInsight, MemoryRecord};
use crate::{MemoryError, MemoryResult};

const SNAPSHOT_VERSION: u32 = 2;

/// One node per distinct tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeNode {
    pub occurrence_count: u64,
    /// Co-occurring tag -> number of records carrying both
    pub related_tags: BTreeMap<String, u64>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Grows with every occurrence, saturating at 1.0
    pub salience: f64,
}

impl KnowledgeNode {
    fn new(seen_at: DateTime<Utc>) -> Self {
        Self {
            occurrence_count: 0,
            related_tags: BTreeMap::new(),
            first_seen: seen_at,
            last_seen: seen_at,
            salience: 0.0,
        }
    }

    /// Related tags by co-occurrence count desc, then name
    pub fn top_related(&self, limit: usize) -> Vec<String> {
        let mut related: Vec<(&String, &u64)> = self.related_tags.iter().collect();
        related.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        related
            .into_iter()
            .take(limit)
            .map(|(tag, _)| tag.clone())
            .collect()
    }
}

#[derive(Serialize, Deserialize)]
struct GraphSnapshot {
    version: u32,
    observed: BTreeSet<String>,
    nodes: BTreeMap<String, KnowledgeNode>,
}

/// Tag co-occurrence graph
#[derive(Debug, Clone)]
pub struct KnowledgeGraph {
    nodes: BTreeMap<String, KnowledgeNode>,
    /// Ids of records already folded in
    observed: BTreeSet<String>,
    salience_increment: f64,
    related_limit: usize,
}

impl KnowledgeGraph {
    pub fn new(config: &GraphConfig) -> Self {
        Self {
            nodes: BTreeMap::new(),
            observed: BTreeSet::new(),
            salience_increment: config.salience_increment,
            related_limit: config.related_limit,
        }
    }

    /// Fold one record's tags into the graph
    pub fn observe(&mut self, tags: &BTreeSet<String>, seen_at: DateTime<Utc>) {
        for tag in tags {
            let node = self
                .nodes
                .entry(tag.clone())
                .or_insert_with(|| KnowledgeNode::new(seen_at));
            node.occurrence_count += 1;
            node.first_seen = node.first_seen.min(seen_at);
            node.last_seen = node.last_seen.max(seen_at);
            node.salience = (node.salience + self.salience_increment).min(1.0);

            for other in tags.iter().filter(|t| *t != tag) {
                *node.related_tags.entry(other.clone()).or_insert(0) += 1;
            }
        }
    }

    /// Fold a record in unless its id was already observed; returns whether it was
    pub fn observe_record(&mut self, record: &MemoryRecord) -> bool {
        if !self.observed.insert(record.id.clone()) {
            return false;
        }
        self.observe(&record.tags, record.created_at);
        true
    }

    /// Replay every record not yet observed; returns how many were folded in
    pub fn catch_up<'a>(&mut self, records: impl IntoIterator<Item = &'a MemoryRecord>) -> usize {
        records
            .into_iter()
            .filter(|record| self.observe_record(record))
            .count()
    }

    /// Concepts whose tag appears in the query
    pub fn lookup(&self, query: &str) -> Vec<ConceptInsight> {
        let query = query.to_lowercase();
        let mut insights: Vec<ConceptInsight> = self
            .nodes
            .iter()
            .filter(|(tag, _)| query.contains(tag.as_str()))
            .map(|(tag, node)| ConceptInsight {
                concept: tag.clone(),
                occurrence_count: node.occurrence_count,
                salience: node.salience,
                related_concepts: node.top_related(self.related_limit),
                first_seen: node.first_seen,
                last_seen: node.last_seen,
            })
            .collect();
        insights.sort_by(|a, b| {
            b.occurrence_count
                .cmp(&a.occurrence_count)
                .then_with(|| a.concept.cmp(&b.concept))
        });
        insights
    }

    /// Union of the top related tags of every concept in the query
    pub fn suggest_tags(&self, query: &str) -> Vec<String> {
        let suggestions: BTreeSet<String> = self
            .lookup(query)
            .into_iter()
            .flat_map(|insight| insight.related_concepts)
            .collect();
        suggestions.into_iter().collect()
    }

    pub fn node(&self, tag: &str) -> Option<&KnowledgeNode> {
        self.nodes.get(tag)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn has_observed(&self, id: &str) -> bool {
        self.observed.contains(id)
    }

    /// Number of records folded in
    pub fn observed_count(&self) -> usize {
        self.observed.len()
    }

    /// Every co-occurrence count is mirrored on the other node
    pub fn is_symmetric(&self) -> bool {
        self.nodes.iter().all(|(tag, node)| {
            node.related_tags.iter().all(|(other, count)| {
                self.nodes
                    .get(other)
                    .and_then(|n| n.related_tags.get(tag))
                    == Some(count)
            })
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────────

    /// Write the snapshot atomically (temp file + rename)
    pub fn save(&self, path: &Path) -> MemoryResult<()> {
        let snapshot = GraphSnapshot {
            version: SNAPSHOT_VERSION,
            observed: self.observed.clone(),
            nodes: self.nodes.clone(),
        };
        let json = serde_json::to_string_pretty(&snapshot)?;
        write_atomic(path, json.as_bytes())?;
        debug!(nodes = self.nodes.len(), path = %path.display(), "Saved knowledge graph");
        Ok(())
    }

    /// Load a snapshot; `Ok(None)` when the file does not exist
    pub fn load(path: &Path, config: &GraphConfig) -> MemoryResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let corrupt = |e: &dyn std::fmt::Display| {
            MemoryError::index_corrupt(format!("knowledge graph {}: {}", path.display(), e))
        };
        let bytes = std::fs::read(path).map_err(|e| corrupt(&e))?;
        let snapshot: GraphSnapshot = serde_json::from_slice(&bytes).map_err(|e| corrupt(&e))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(MemoryError::index_corrupt(format!(
                "knowledge graph {}: unsupported version {}",
                path.display(),
                snapshot.version
            )));
        }

        let mut graph = Self::new(config);
        graph.nodes = snapshot.nodes;
        graph.observed = snapshot.observed;
        Ok(Some(graph))
    }
}

/// Write to `<path>.tmp` then rename over `path`
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MemoryKind, RecordAttributes};
    use chrono::{Duration, TimeZone};

    fn tags(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_observe_builds_symmetric_counts() {
        let mut graph = KnowledgeGraph::new(&GraphConfig::default());
        graph.observe(&tags(&["python", "bug"]), t0());
        graph.observe(&tags(&["python", "ai", "bug"]), t0() + Duration::minutes(1));
        graph.observe(&tags(&["ai"]), t0() + Duration::minutes(2));

        let python = graph.node("python").unwrap();
        assert_eq!(python.occurrence_count, 2);
        assert_eq!(python.related_tags.get("bug"), Some(&2));
        assert_eq!(python.related_tags.get("ai"), Some(&1));
        assert_eq!(graph.node("bug").unwrap().related_tags.get("python"), Some(&2));
        assert_eq!(graph.node("ai").unwrap().occurrence_count, 2);
        assert!(graph.is_symmetric());
    }

    #[test]
    fn test_salience_saturates() {
        let mut graph = KnowledgeGraph::new(&GraphConfig::default());
        for i in 0..15 {
            graph.observe(&tags(&["rust"]), t0() + Duration::seconds(i));
        }
        let node = graph.node("rust").unwrap();
        assert_eq!(node.salience, 1.0);
        assert_eq!(node.first_seen, t0());
        assert_eq!(node.last_seen, t0() + Duration::seconds(14));
    }

    #[test]
    fn test_lookup_and_suggestions() {
        let mut graph = KnowledgeGraph::new(&GraphConfig::default());
        graph.observe(&tags(&["python", "bug", "ai", "agent", "memory"]), t0());
        graph.observe(&tags(&["python", "bug"]), t0());
        graph.observe(&tags(&["python", "ai"]), t0());

        let insights = graph.lookup("Tips for Python");
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].concept, "python");
        // bug=2, ai=2 tie broken by name, then agent before memory
        assert_eq!(insights[0].related_concepts, vec!["ai", "bug", "agent"]);

        assert_eq!(graph.suggest_tags("python"), vec!["agent", "ai", "bug"]);
        assert!(graph.lookup("golang").is_empty());
    }

    fn record(content: &str, tags: &[&str], at: DateTime<Utc>) -> MemoryRecord {
        MemoryRecord::new(
            content,
            MemoryKind::Semantic,
            at,
            0.5,
            tags.iter().copied(),
            RecordAttributes::for_kind(MemoryKind::Semantic, BTreeMap::new()),
        )
    }

    #[test]
    fn test_record_observed_once() {
        let mut graph = KnowledgeGraph::new(&GraphConfig::default());
        let r = record("x", &["rust", "db"], t0());
        assert!(graph.observe_record(&r));
        assert!(!graph.observe_record(&r));
        assert_eq!(graph.node("rust").unwrap().occurrence_count, 1);
        assert_eq!(graph.node("rust").unwrap().related_tags.get("db"), Some(&1));

        let untagged = record("y", &[], t0());
        assert!(graph.observe_record(&untagged));
        assert!(graph.has_observed(&untagged.id));
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.observed_count(), 2);
    }

    #[test]
    fn test_catch_up_replays_backdated_records() {
        let mut graph = KnowledgeGraph::new(&GraphConfig::default());
        let newer = record("newer", &["alpha"], t0());
        graph.observe_record(&newer);

        let older = record("older", &["beta"], t0() - Duration::days(3));
        assert_eq!(graph.catch_up([&newer, &older]), 1);
        assert_eq!(graph.node("beta").unwrap().occurrence_count, 1);
        assert_eq!(graph.node("alpha").unwrap().occurrence_count, 1);
    }

    #[test]
    fn test_snapshot_round_trip_and_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge_graph.json");
        let config = GraphConfig::default();

        assert!(KnowledgeGraph::load(&path, &config).unwrap().is_none());

        let mut graph = KnowledgeGraph::new(&config);
        let r = record("x", &["a", "b"], t0());
        graph.observe_record(&r);
        graph.save(&path).unwrap();

        let mut loaded = KnowledgeGraph::load(&path, &config).unwrap().unwrap();
        assert_eq!(loaded.node("a"), graph.node("a"));
        assert!(loaded.has_observed(&r.id));
        assert_eq!(loaded.catch_up([&r]), 0);

        std::fs::write(&path, b"{ not json").unwrap();
        let err = KnowledgeGraph::load(&path, &config).unwrap_err();
        assert!(err.is_index_corrupt());
    }

    #[test]
    fn test_unreadable_snapshot_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge_graph.json");
        std::fs::create_dir(&path).unwrap();

        let err = KnowledgeGraph::load(&path, &GraphConfig::default()).unwrap_err();
        assert!(err.is_index_corrupt());
    }
}
