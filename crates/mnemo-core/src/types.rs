//! Memory Type Definitions
//!
//! Records, tier attributes, project contexts and the request/response
//! shapes of the public API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Attribute key holding the skill a procedural record belongs to
pub const SKILL_NAME_KEY: &str = "skill_name";
/// Attribute key holding the project a project record belongs to
pub const PROJECT_NAME_KEY: &str = "project_name";

pub const DEFAULT_SKILL_NAME: &str = "unknown";
pub const DEFAULT_PROJECT_NAME: &str = "default";
pub const DEFAULT_IMPORTANCE: f64 = 0.5;

// ─────────────────────────────────────────────────────────────────────────────
// Memory Kind
// ─────────────────────────────────────────────────────────────────────────────

/// Memory kind; determines the owning tier partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Working,
    Episodic,
    Procedural,
    Project,
    Semantic,
}

impl MemoryKind {
    /// Every kind, in tier scan order
    pub const ALL: [MemoryKind; 5] = [
        Self::Working,
        Self::Episodic,
        Self::Procedural,
        Self::Project,
        Self::Semantic,
    ];

    /// Convert from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "working" => Some(Self::Working),
            "episodic" => Some(Self::Episodic),
            "procedural" => Some(Self::Procedural),
            "project" => Some(Self::Project),
            "semantic" => Some(Self::Semantic),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Working => "working",
            Self::Episodic => "episodic",
            Self::Procedural => "procedural",
            Self::Project => "project",
            Self::Semantic => "semantic",
        }
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Attributes
// ─────────────────────────────────────────────────────────────────────────────

/// Tier-specific attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TierAttributes {
    None,
    Procedural { skill_name: String },
    Project { project_name: String },
}

/// Record attributes: the tier-specific part plus an open extension bag.
///
/// Persisted as one flat JSON object; the tier keys (`skill_name`,
/// `project_name`) sit next to the extension keys.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordAttributes {
    pub tier: TierAttributes,
    pub extra: BTreeMap<String, Value>,
}

impl RecordAttributes {
    /// Split a flat attribute map into tier attributes and extensions
    pub fn for_kind(kind: MemoryKind, mut extra: BTreeMap<String, Value>) -> Self {
        let tier = match kind {
            MemoryKind::Procedural => TierAttributes::Procedural {
                skill_name: take_name(&mut extra, SKILL_NAME_KEY, DEFAULT_SKILL_NAME),
            },
            MemoryKind::Project => TierAttributes::Project {
                project_name: take_name(&mut extra, PROJECT_NAME_KEY, DEFAULT_PROJECT_NAME),
            },
            _ => TierAttributes::None,
        };
        Self { tier, extra }
    }

    /// Parse the persisted JSON form
    pub fn from_json(kind: MemoryKind, json: &str) -> serde_json::Result<Self> {
        let map: BTreeMap<String, Value> = serde_json::from_str(json)?;
        Ok(Self::for_kind(kind, map))
    }

    /// Flatten back into a single JSON object
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map: Map<String, Value> = self
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        match &self.tier {
            TierAttributes::Procedural { skill_name } => {
                map.insert(SKILL_NAME_KEY.into(), Value::String(skill_name.clone()));
            }
            TierAttributes::Project { project_name } => {
                map.insert(PROJECT_NAME_KEY.into(), Value::String(project_name.clone()));
            }
            TierAttributes::None => {}
        }
        map
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.to_map())
    }

    pub fn skill_name(&self) -> Option<&str> {
        match &self.tier {
            TierAttributes::Procedural { skill_name } => Some(skill_name),
            _ => None,
        }
    }

    pub fn project_name(&self) -> Option<&str> {
        match &self.tier {
            TierAttributes::Project { project_name } => Some(project_name),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

impl Serialize for RecordAttributes {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_map().serialize(serializer)
    }
}

fn take_name(map: &mut BTreeMap<String, Value>, key: &str, default: &str) -> String {
    match map.remove(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        Some(Value::String(_)) | None => default.to_string(),
        Some(other) => other.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

/// A single stored memory. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryRecord {
    pub id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub kind: MemoryKind,
    pub importance: f64,
    pub tags: BTreeSet<String>,
    pub attributes: RecordAttributes,
}

impl MemoryRecord {
    /// Build a record, deriving its id from content and timestamp
    pub fn new(
        content: impl Into<String>,
        kind: MemoryKind,
        created_at: DateTime<Utc>,
        importance: f64,
        tags: impl IntoIterator<Item = impl AsRef<str>>,
        attributes: RecordAttributes,
    ) -> Self {
        let content = content.into();
        let created_at = truncate_to_micros(created_at);
        Self {
            id: record_id(&content, created_at),
            content,
            created_at,
            kind,
            importance: clamp_importance(importance),
            tags: normalize_tags(tags),
            attributes,
        }
    }

    /// Rebuild a persisted record without re-deriving its id
    pub fn from_parts(
        id: String,
        content: String,
        created_at: DateTime<Utc>,
        kind: MemoryKind,
        importance: f64,
        tags: BTreeSet<String>,
        attributes: RecordAttributes,
    ) -> Self {
        Self {
            id,
            content,
            created_at,
            kind,
            importance: clamp_importance(importance),
            tags,
            attributes,
        }
    }

    /// Creation time as fractional seconds since the epoch
    pub fn timestamp(&self) -> f64 {
        self.created_at.timestamp_micros() as f64 / 1_000_000.0
    }

    pub fn has_tag_containing(&self, needle: &str) -> bool {
        self.tags.iter().any(|t| t.contains(needle))
    }
}

/// Content-derived id: first 12 hex chars of md5(content ++ micros)
pub fn record_id(content: &str, created_at: DateTime<Utc>) -> String {
    let digest = md5::compute(format!("{}{}", content, created_at.timestamp_micros()));
    format!("{:x}", digest)[..12].to_string()
}

pub fn clamp_importance(value: f64) -> f64 {
    if value.is_nan() {
        DEFAULT_IMPORTANCE
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Trim and lowercase a tag; empty tags are dropped
pub fn normalize_tag(tag: &str) -> Option<String> {
    let tag = tag.trim().to_lowercase();
    if tag.is_empty() { None } else { Some(tag) }
}

pub fn normalize_tags(tags: impl IntoIterator<Item = impl AsRef<str>>) -> BTreeSet<String> {
    tags.into_iter()
        .filter_map(|t| normalize_tag(t.as_ref()))
        .collect()
}

/// Normalize free text for substring matching
pub fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}

pub(crate) fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(ts.timestamp_micros()).unwrap_or(ts)
}

/// Input for inserting a memory
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub content: String,
    pub kind: MemoryKind,
    /// `None` lets the content analyzer estimate importance (falls back to 0.5)
    pub importance: Option<f64>,
    pub tags: Vec<String>,
    pub attributes: BTreeMap<String, Value>,
    /// Override the creation time (backfills, tests)
    pub created_at: Option<DateTime<Utc>>,
    /// Run the content analyzer on this record
    pub analyze: bool,
}

impl NewMemory {
    pub fn new(content: impl Into<String>, kind: MemoryKind) -> Self {
        Self {
            content: content.into(),
            kind,
            importance: None,
            tags: Vec::new(),
            attributes: BTreeMap::new(),
            created_at: None,
            analyze: true,
        }
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Set the skill name (procedural records)
    pub fn with_skill(self, skill_name: impl Into<String>) -> Self {
        self.with_attribute(SKILL_NAME_KEY, skill_name.into())
    }

    /// Set the project name (project records)
    pub fn with_project(self, project_name: impl Into<String>) -> Self {
        self.with_attribute(PROJECT_NAME_KEY, project_name.into())
    }

    pub fn with_timestamp(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Skip content analysis for this insert
    pub fn without_analysis(mut self) -> Self {
        self.analyze = false;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Project Context
// ─────────────────────────────────────────────────────────────────────────────

/// Current snapshot of a project; superseded on every update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub project_name: String,
    pub tech_stack: Option<String>,
    pub context_data: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Queries & Results
// ─────────────────────────────────────────────────────────────────────────────

/// Where recall reads candidates from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecallSource {
    /// The in-memory tiers (working ring only holds the most recent records)
    #[default]
    Tiers,
    /// Every record in the durable store
    Durable,
}

/// Recall options
#[derive(Debug, Clone)]
pub struct RecallOptions {
    /// Kinds to search; empty means all
    pub kinds: Vec<MemoryKind>,
    /// Maximum results; `None` uses the configured default
    pub max_results: Option<usize>,
    /// Records below this importance are dropped after ranking
    pub min_importance: f64,
    pub source: RecallSource,
}

impl Default for RecallOptions {
    fn default() -> Self {
        Self {
            kinds: Vec::new(),
            max_results: None,
            min_importance: 0.0,
            source: RecallSource::Tiers,
        }
    }
}

impl RecallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kinds(mut self, kinds: impl IntoIterator<Item = MemoryKind>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    pub fn max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn min_importance(mut self, min_importance: f64) -> Self {
        self.min_importance = min_importance;
        self
    }

    pub fn durable(mut self) -> Self {
        self.source = RecallSource::Durable;
        self
    }

    /// Kinds to scan, deduplicated, with the empty set expanded to all kinds
    pub fn effective_kinds(&self) -> Vec<MemoryKind> {
        if self.kinds.is_empty() {
            return MemoryKind::ALL.to_vec();
        }
        let mut kinds = Vec::with_capacity(self.kinds.len());
        for kind in &self.kinds {
            if !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }
        kinds
    }
}

/// A record with the score that ranked it
#[derive(Debug, Clone, Serialize)]
pub struct ScoredRecord {
    pub record: MemoryRecord,
    pub score: f64,
}

/// Hybrid search weights
#[derive(Debug, Clone, Copy)]
pub struct HybridWeights {
    pub semantic: f64,
    pub keyword: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            semantic: 0.7,
            keyword: 0.3,
        }
    }
}

/// A concept from the knowledge graph that matched a query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConceptInsight {
    pub concept: String,
    pub occurrence_count: u64,
    pub salience: f64,
    pub related_concepts: Vec<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Context handed to the conversational front-end
#[derive(Debug, Clone, Serialize)]
pub struct ContextSnapshot {
    pub session_id: String,
    pub preferences: crate::preferences::UserPreferences,
    pub current_project: Option<ProjectContext>,
    pub recent_memories: Vec<MemoryRecord>,
    pub relevant_skills: Vec<MemoryRecord>,
    pub recent_conversation: Vec<MemoryRecord>,
    pub concepts: Vec<ConceptInsight>,
    pub suggested_tags: Vec<String>,
}

/// Result of a retention sweep
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub cutoff: Option<DateTime<Utc>>,
    pub removed_ids: Vec<String>,
    pub dry_run: bool,
}

impl SweepReport {
    pub fn removed(&self) -> usize {
        self.removed_ids.len()
    }
}

/// Engine status report
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    /// Durable record counts per kind
    pub stored: BTreeMap<MemoryKind, u64>,
    /// Records currently held by each in-memory tier
    pub in_memory: BTreeMap<MemoryKind, usize>,
    pub concepts: usize,
    pub vector_slots: usize,
    pub semantic_enabled: bool,
    pub embedder: Option<String>,
    pub session_id: String,
    pub session_inserts: usize,
}

impl MemoryStats {
    pub fn total_stored(&self) -> u64 {
        self.stored.values().sum()
    }
}
