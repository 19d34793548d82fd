//! Engine Configuration
//!
//! Every tunable of the memory engine lives here. All sections default, so a
//! partial TOML/JSON document deserializes into a complete configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Directory holding the database and every sidecar file
    pub data_dir: PathBuf,

    /// SQLite file name inside `data_dir` (default: memory.db)
    pub database_file: String,

    /// Capacity of the working-memory ring buffer (default: 50)
    pub working_capacity: usize,

    /// Importance given to the synthetic record emitted by a project update (default: 0.3)
    pub project_update_importance: f64,

    /// Recall defaults
    pub recall: RecallConfig,

    /// Relevance scorer weights
    pub scoring: ScoringConfig,

    /// Knowledge graph settings
    pub graph: GraphConfig,

    /// Vector index settings
    pub semantic: SemanticConfig,

    /// Retention sweep policy
    pub retention: RetentionConfig,

    /// Content analysis settings
    pub analysis: AnalysisConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".mnemo"),
            database_file: "memory.db".into(),
            working_capacity: 50,
            project_update_importance: 0.3,
            recall: RecallConfig::default(),
            scoring: ScoringConfig::default(),
            graph: GraphConfig::default(),
            semantic: SemanticConfig::default(),
            retention: RetentionConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}

/// Recall defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallConfig {
    /// Results returned when the caller does not ask for a count (default: 10)
    pub default_max_results: usize,

    /// Working records included in a context snapshot (default: 10)
    pub conversation_limit: usize,

    /// Records recalled for a context snapshot query (default: 5)
    pub context_recall_limit: usize,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            default_max_results: 10,
            conversation_limit: 10,
            context_recall_limit: 5,
        }
    }
}

/// Relevance scorer weights
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub lexical_weight: f64,
    pub importance_weight: f64,
    pub recency_weight: f64,

    /// Age in seconds at which recency reaches its floor (default: 604800 = 7 days)
    pub recency_window_secs: i64,

    /// Lower bound of the recency factor (default: 0.1)
    pub recency_floor: f64,

    /// Bonus when content starts with the query (default: 0.5)
    pub prefix_bonus: f64,

    /// Bonus per tag containing the query (default: 0.3)
    pub tag_bonus: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            lexical_weight: 0.6,
            importance_weight: 0.3,
            recency_weight: 0.1,
            recency_window_secs: 7 * 86_400, // 1 week
            recency_floor: 0.1,
            prefix_bonus: 0.5,
            tag_bonus: 0.3,
        }
    }
}

/// Knowledge graph settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Salience added per occurrence, saturating at 1.0 (default: 0.1)
    pub salience_increment: f64,

    /// Inserts between snapshot writes (default: 5)
    pub snapshot_interval: usize,

    /// Related tags reported per concept (default: 3)
    pub related_limit: usize,

    /// Snapshot file name inside `data_dir`
    pub snapshot_file: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            salience_increment: 0.1,
            snapshot_interval: 5,
            related_limit: 3,
            snapshot_file: "knowledge_graph.json".into(),
        }
    }
}

/// Which embedding backend the vector index uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// fastembed when compiled in, otherwise disabled
    Auto,
    /// No vector index; semantic search degrades to recall
    Disabled,
    /// Local feature-hashing embedder
    Hashing,
    /// fastembed all-MiniLM-L6-v2
    FastEmbed,
}

/// Vector index and hybrid ranker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    pub backend: EmbeddingBackend,

    /// Vector length for the hashing backend (default: 384)
    pub dimensions: usize,

    /// Minimum similarity kept by semantic search (default: 0.7)
    pub similarity_threshold: f32,

    /// Inserts between vector index writes (default: 10)
    pub flush_interval: usize,

    /// Hybrid weight of the semantic score (default: 0.7)
    pub semantic_weight: f64,

    /// Hybrid weight of the keyword hit (default: 0.3)
    pub keyword_weight: f64,

    pub vectors_file: String,
    pub mappings_file: String,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Auto,
            dimensions: 384,
            similarity_threshold: 0.7,
            flush_interval: 10,
            semantic_weight: 0.7,
            keyword_weight: 0.3,
            vectors_file: "vectors.json".into(),
            mappings_file: "vector_mappings.json".into(),
        }
    }
}

/// Retention sweep policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Records older than this are eligible (default: 30)
    pub max_age_days: i64,

    /// Records at or above this importance are kept regardless of age (default: 0.7)
    pub importance_floor: f64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_days: 30,
            importance_floor: 0.7,
        }
    }
}

/// Content analysis settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Run the analyzer on insert (default: true)
    pub enabled: bool,

    /// User preferences file name inside `data_dir`
    pub preferences_file: String,

    /// Write `session_summary_<id>.md` into `data_dir` on close (default: false)
    pub write_session_summary: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            preferences_file: "preferences.json".into(),
            write_session_summary: false,
        }
    }
}

impl MemoryConfig {
    /// Create a config rooted at the given data directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Set the working ring capacity
    pub fn with_working_capacity(mut self, capacity: usize) -> Self {
        self.working_capacity = capacity;
        self
    }

    /// Set the embedding backend
    pub fn with_backend(mut self, backend: EmbeddingBackend) -> Self {
        self.semantic.backend = backend;
        self
    }

    /// Set the retention policy
    pub fn with_retention(mut self, retention: RetentionConfig) -> Self {
        self.retention = retention;
        self
    }

    /// Enable or disable content analysis
    pub fn with_analysis(mut self, enabled: bool) -> Self {
        self.analysis.enabled = enabled;
        self
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    pub fn graph_path(&self) -> PathBuf {
        self.data_dir.join(&self.graph.snapshot_file)
    }

    pub fn vectors_path(&self) -> PathBuf {
        self.data_dir.join(&self.semantic.vectors_file)
    }

    pub fn mappings_path(&self) -> PathBuf {
        self.data_dir.join(&self.semantic.mappings_file)
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.data_dir.join(&self.analysis.preferences_file)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.working_capacity == 0 {
            return Err(invalid("working_capacity", "must be greater than 0"));
        }

        if self.database_file.trim().is_empty() {
            return Err(invalid("database_file", "must not be empty"));
        }

        check_unit("project_update_importance", self.project_update_importance)?;

        if self.recall.default_max_results == 0 {
            return Err(invalid("recall.default_max_results", "must be greater than 0"));
        }

        let s = &self.scoring;
        for (field, value) in [
            ("scoring.lexical_weight", s.lexical_weight),
            ("scoring.importance_weight", s.importance_weight),
            ("scoring.recency_weight", s.recency_weight),
            ("scoring.prefix_bonus", s.prefix_bonus),
            ("scoring.tag_bonus", s.tag_bonus),
        ] {
            if value < 0.0 || !value.is_finite() {
                return Err(invalid(field, "must be a non-negative number"));
            }
        }
        if s.recency_window_secs <= 0 {
            return Err(invalid("scoring.recency_window_secs", "must be greater than 0"));
        }
        if s.recency_floor <= 0.0 || s.recency_floor > 1.0 {
            return Err(invalid("scoring.recency_floor", "must be in (0, 1]"));
        }

        check_unit("graph.salience_increment", self.graph.salience_increment)?;
        if self.graph.snapshot_interval == 0 {
            return Err(invalid("graph.snapshot_interval", "must be greater than 0"));
        }

        if self.semantic.dimensions == 0 {
            return Err(invalid("semantic.dimensions", "must be greater than 0"));
        }
        if !(-1.0..=1.0).contains(&self.semantic.similarity_threshold) {
            return Err(invalid("semantic.similarity_threshold", "must be between -1 and 1"));
        }
        if self.semantic.flush_interval == 0 {
            return Err(invalid("semantic.flush_interval", "must be greater than 0"));
        }
        check_unit("semantic.semantic_weight", self.semantic.semantic_weight)?;
        check_unit("semantic.keyword_weight", self.semantic.keyword_weight)?;

        if self.retention.max_age_days < 0 {
            return Err(invalid("retention.max_age_days", "must not be negative"));
        }
        check_unit("retention.importance_floor", self.retention.importance_floor)?;

        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> ConfigValidationError {
    ConfigValidationError::InvalidValue {
        field: field.into(),
        message: message.into(),
    }
}

fn check_unit(field: &str, value: f64) -> Result<(), ConfigValidationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, "must be between 0 and 1"))
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
