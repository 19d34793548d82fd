//! Hybrid Ranker
//!
//! Fuses semantic similarity with a binary keyword hit:
//! `final = w_sem * similarity + w_kw * (1 if the keyword path returned it)`.

use std::collections::{BTreeMap, HashSet};

use crate::scoring::sort_scored;
use crate::types::{HybridWeights, MemoryRecord, ScoredRecord};

/// Weighted fusion of semantic and keyword results
#[derive(Debug, Clone, Copy)]
pub struct HybridRanker {
    weights: HybridWeights,
}

impl Default for HybridRanker {
    fn default() -> Self {
        Self::new(HybridWeights::default())
    }
}

impl HybridRanker {
    pub fn new(weights: HybridWeights) -> Self {
        Self { weights }
    }

    /// Union both result lists by id, score, sort and truncate to `limit`
    pub fn fuse(
        &self,
        semantic: Vec<ScoredRecord>,
        keyword: Vec<MemoryRecord>,
        limit: usize,
    ) -> Vec<ScoredRecord> {
        let keyword_ids: HashSet<String> = keyword.iter().map(|r| r.id.clone()).collect();
        let mut fused: BTreeMap<String, (MemoryRecord, f64)> = BTreeMap::new();

        for hit in semantic {
            let entry = fused
                .entry(hit.record.id.clone())
                .or_insert_with(|| (hit.record.clone(), f64::NEG_INFINITY));
            entry.1 = entry.1.max(hit.score);
        }
        for record in keyword {
            fused
                .entry(record.id.clone())
                .or_insert_with(|| (record, 0.0));
        }

        let mut results: Vec<ScoredRecord> = fused
            .into_values()
            .map(|(record, similarity)| {
                let keyword_hit = if keyword_ids.contains(&record.id) { 1.0 } else { 0.0 };
                ScoredRecord {
                    score: self.weights.semantic * similarity + self.weights.keyword * keyword_hit,
                    record,
                }
            })
            .collect();
        sort_scored(&mut results);
        results.truncate(limit);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MemoryKind, RecordAttributes};
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::BTreeMap;

    fn rec(content: &str, offset: i64) -> MemoryRecord {
        MemoryRecord::new(
            content,
            MemoryKind::Semantic,
            Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap() + Duration::seconds(offset),
            0.5,
            Vec::<String>::new(),
            RecordAttributes::for_kind(MemoryKind::Semantic, BTreeMap::new()),
        )
    }

    fn scored(record: &MemoryRecord, score: f64) -> ScoredRecord {
        ScoredRecord {
            record: record.clone(),
            score,
        }
    }

    #[test]
    fn test_fuse_weights() {
        let a = rec("a", 0);
        let b = rec("b", 1);
        let c = rec("c", 2);
        let ranker = HybridRanker::default();

        let fused = ranker.fuse(
            vec![scored(&a, 0.9), scored(&b, 0.8)],
            vec![b.clone(), c.clone()],
            10,
        );

        let ids: Vec<_> = fused.iter().map(|s| s.record.id.clone()).collect();
        assert_eq!(ids, vec![b.id.clone(), a.id.clone(), c.id.clone()]);
        // b: 0.7 * 0.8 + 0.3
        assert!((fused[0].score - 0.86).abs() < 1e-9);
        assert!((fused[1].score - 0.63).abs() < 1e-9);
        assert!((fused[2].score - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_fuse_truncates_and_handles_empty() {
        let ranker = HybridRanker::new(HybridWeights {
            semantic: 0.5,
            keyword: 0.5,
        });
        assert!(ranker.fuse(Vec::new(), Vec::new(), 5).is_empty());

        let records: Vec<_> = (0..4).map(|i| rec(&format!("r{}", i), i)).collect();
        let fused = ranker.fuse(Vec::new(), records, 2);
        assert_eq!(fused.len(), 2);
        // equal scores: newest first
        assert_eq!(fused[0].record.content, "r3");
    }
}
