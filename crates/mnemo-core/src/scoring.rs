//! Relevance Scorer
//!
//! Deterministic heuristic ranking of candidate records:
//!
//! ```text
//! lexical = 1.0 if query ⊂ content (+prefix bonus) + tag bonus per matching tag
//! recency = max(floor, 1 - age / window)
//! final   = w_lex * lexical + w_imp * importance + w_rec * recency
//! ```

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use crate::config::ScoringConfig;
use crate::types::{MemoryRecord, ScoredRecord, normalize_text};

/// Orders candidate records against a query
pub trait Ranker: Send + Sync {
    /// Score and sort candidates, best first
    fn rank(&self, query: &str, candidates: Vec<MemoryRecord>, now: DateTime<Utc>) -> Vec<ScoredRecord>;
}

/// Lexical + importance + recency scorer
#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    config: ScoringConfig,
}

impl Default for RelevanceScorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

impl RelevanceScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Content and tag match strength. `query` must be normalized.
    pub fn lexical_score(&self, record: &MemoryRecord, query: &str) -> f64 {
        let content = normalize_text(&record.content);
        let mut score = 0.0;
        if content.contains(query) {
            score += 1.0;
            if content.starts_with(query) {
                score += self.config.prefix_bonus;
            }
        }
        let tag_hits = record.tags.iter().filter(|t| t.contains(query)).count();
        score + self.config.tag_bonus * tag_hits as f64
    }

    /// Linear decay over the configured window, never below the floor
    pub fn recency_factor(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let age_secs = (now - created_at).num_milliseconds().max(0) as f64 / 1000.0;
        let window = self.config.recency_window_secs as f64;
        (1.0 - age_secs / window).max(self.config.recency_floor)
    }

    pub fn score(&self, record: &MemoryRecord, query: &str, now: DateTime<Utc>) -> f64 {
        self.config.lexical_weight * self.lexical_score(record, query)
            + self.config.importance_weight * record.importance
            + self.config.recency_weight * self.recency_factor(record.created_at, now)
    }
}

impl Ranker for RelevanceScorer {
    fn rank(&self, query: &str, candidates: Vec<MemoryRecord>, now: DateTime<Utc>) -> Vec<ScoredRecord> {
        let query = normalize_text(query);
        let mut scored: Vec<ScoredRecord> = candidates
            .into_iter()
            .map(|record| ScoredRecord {
                score: self.score(&record, &query, now),
                record,
            })
            .collect();
        sort_scored(&mut scored);
        scored
    }
}

/// Score descending, then newest first, then id
pub fn sort_scored(scored: &mut [ScoredRecord]) {
    scored.sort_by(compare_scored);
}

fn compare_scored(a: &ScoredRecord, b: &ScoredRecord) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.record.created_at.cmp(&a.record.created_at))
        .then_with(|| a.record.id.cmp(&b.record.id))
}
