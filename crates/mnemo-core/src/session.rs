//! Session tracking and analytics.
//!
//! One session per engine lifetime. Every record inserted during the session
//! is stamped with the session id and folded into running counts for the
//! pattern report and the end-of-session summary. Only the few highlight
//! records are kept whole.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::types::{MemoryKind, MemoryRecord};

/// Attribute key stamped on every record inserted by a session
pub const SESSION_ID_KEY: &str = "session_id";

const LOW_IMPORTANCE: f64 = 0.4;
const HIGH_IMPORTANCE: f64 = 0.7;
const HIGHLIGHT_IMPORTANCE: f64 = 0.6;
const HIGHLIGHT_LIMIT: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportanceDistribution {
    /// importance < 0.4
    pub low: usize,
    /// 0.4 <= importance < 0.7
    pub medium: usize,
    /// importance >= 0.7
    pub high: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveHour {
    /// Hour of day, UTC
    pub hour: u32,
    pub count: usize,
}

/// How memory was used during the session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryPatterns {
    pub kinds: BTreeMap<MemoryKind, usize>,
    /// Busiest hours over the last 24 hours, top 3
    pub active_hours: Vec<ActiveHour>,
    pub importance: ImportanceDistribution,
    pub session_length: usize,
}

/// End-of-session summary
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub total: usize,
    pub high_importance: usize,
    pub duration_secs: i64,
    /// Most frequent tags, top 5
    pub top_tags: Vec<(String, usize)>,
    /// Newest records with importance >= 0.6, top 3
    pub highlights: Vec<MemoryRecord>,
}

impl SessionSummary {
    pub fn to_markdown(&self) -> String {
        let mut out = format!("# Session summary ({})\n\n", self.session_id);
        out.push_str("## Statistics\n");
        out.push_str(&format!("- Memories: {}\n", self.total));
        out.push_str(&format!("- High importance: {}\n", self.high_importance));
        out.push_str(&format!("- Duration: {}\n\n", format_duration(self.duration_secs)));

        out.push_str("## Topics\n");
        let topics: Vec<String> = self
            .top_tags
            .iter()
            .map(|(tag, count)| format!("{}({})", tag, count))
            .collect();
        out.push_str(&topics.join(", "));
        out.push_str("\n\n## Highlights\n");
        for (i, record) in self.highlights.iter().enumerate() {
            let snippet: String = record.content.chars().take(100).collect();
            out.push_str(&format!("{}. {}\n", i + 1, snippet));
        }
        out
    }
}

/// Human-readable duration: `42s`, `5m`, `2h 3m`
pub fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Running aggregates over the records inserted during one engine lifetime
#[derive(Debug)]
pub struct SessionTracker {
    session_id: String,
    started_at: DateTime<Utc>,
    total: usize,
    first_seen: Option<DateTime<Utc>>,
    kinds: BTreeMap<MemoryKind, usize>,
    importance: ImportanceDistribution,
    tags: BTreeMap<String, usize>,
    /// Insert timestamps within 24 hours of the newest one
    recent: BTreeMap<DateTime<Utc>, usize>,
    latest: Option<DateTime<Utc>>,
    /// Newest first, at most `HIGHLIGHT_LIMIT`
    highlights: Vec<MemoryRecord>,
}

impl SessionTracker {
    pub fn start(now: DateTime<Utc>) -> Self {
        Self {
            session_id: format!("session_{}", now.timestamp()),
            started_at: now,
            total: 0,
            first_seen: None,
            kinds: BTreeMap::new(),
            importance: ImportanceDistribution::default(),
            tags: BTreeMap::new(),
            recent: BTreeMap::new(),
            latest: None,
            highlights: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn record(&mut self, record: &MemoryRecord) {
        self.total += 1;
        self.first_seen.get_or_insert(record.created_at);
        *self.kinds.entry(record.kind).or_insert(0) += 1;

        if record.importance < LOW_IMPORTANCE {
            self.importance.low += 1;
        } else if record.importance < HIGH_IMPORTANCE {
            self.importance.medium += 1;
        } else {
            self.importance.high += 1;
        }

        for tag in &record.tags {
            *self.tags.entry(tag.clone()).or_insert(0) += 1;
        }

        let latest = self.latest.map_or(record.created_at, |l| l.max(record.created_at));
        self.latest = Some(latest);
        *self.recent.entry(record.created_at).or_insert(0) += 1;
        self.recent = self.recent.split_off(&(latest - Duration::hours(24)));

        if record.importance >= HIGHLIGHT_IMPORTANCE {
            self.highlights.push(record.clone());
            self.highlights
                .sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
            self.highlights.truncate(HIGHLIGHT_LIMIT);
        }
    }

    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn patterns(&self, now: DateTime<Utc>) -> MemoryPatterns {
        let mut hours: HashMap<u32, usize> = HashMap::new();
        for (at, count) in &self.recent {
            if now - *at < Duration::hours(24) {
                *hours.entry(at.hour()).or_insert(0) += count;
            }
        }

        let mut active_hours: Vec<ActiveHour> = hours
            .into_iter()
            .map(|(hour, count)| ActiveHour { hour, count })
            .collect();
        active_hours.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.hour.cmp(&b.hour)));
        active_hours.truncate(3);

        MemoryPatterns {
            kinds: self.kinds.clone(),
            active_hours,
            importance: self.importance.clone(),
            session_length: self.total,
        }
    }

    pub fn summary(&self, now: DateTime<Utc>) -> SessionSummary {
        let mut top_tags: Vec<(String, usize)> = self
            .tags
            .iter()
            .map(|(tag, count)| (tag.clone(), *count))
            .collect();
        top_tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_tags.truncate(5);

        SessionSummary {
            session_id: self.session_id.clone(),
            total: self.total,
            high_importance: self.importance.high,
            duration_secs: self
                .first_seen
                .map(|first| (now - first).num_seconds())
                .unwrap_or(0),
            top_tags,
            highlights: self.highlights.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordAttributes;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 15, 30, 0).unwrap()
    }

    fn rec(content: &str, kind: MemoryKind, importance: f64, tags: &[&str], at: DateTime<Utc>) -> MemoryRecord {
        MemoryRecord::new(
            content,
            kind,
            at,
            importance,
            tags.iter().copied(),
            RecordAttributes::for_kind(kind, BTreeMap::new()),
        )
    }

    #[test]
    fn test_session_id_format() {
        let tracker = SessionTracker::start(now());
        assert_eq!(tracker.session_id(), format!("session_{}", now().timestamp()));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_patterns() {
        let mut tracker = SessionTracker::start(now());
        tracker.record(&rec("a", MemoryKind::Working, 0.2, &[], now() - Duration::hours(1)));
        tracker.record(&rec("b", MemoryKind::Working, 0.5, &[], now() - Duration::hours(1)));
        tracker.record(&rec("c", MemoryKind::Semantic, 0.9, &[], now()));
        tracker.record(&rec("d", MemoryKind::Episodic, 0.7, &[], now() - Duration::days(2)));

        let patterns = tracker.patterns(now());
        assert_eq!(patterns.kinds[&MemoryKind::Working], 2);
        assert_eq!(patterns.importance, ImportanceDistribution { low: 1, medium: 1, high: 2 });
        assert_eq!(
            patterns.active_hours,
            vec![ActiveHour { hour: 14, count: 2 }, ActiveHour { hour: 15, count: 1 }]
        );
        assert_eq!(patterns.session_length, 4);
    }

    #[test]
    fn test_summary() {
        let mut tracker = SessionTracker::start(now());
        let start = now() - Duration::minutes(90);
        tracker.record(&rec("first", MemoryKind::Episodic, 0.6, &["rust", "db"], start));
        tracker.record(&rec("second", MemoryKind::Episodic, 0.9, &["rust"], start + Duration::minutes(10)));
        tracker.record(&rec("third", MemoryKind::Episodic, 0.1, &["misc"], start + Duration::minutes(20)));

        let summary = tracker.summary(now());
        assert_eq!(summary.total, 3);
        assert_eq!(summary.high_importance, 1);
        assert_eq!(summary.duration_secs, 5400);
        assert_eq!(summary.top_tags[0], ("rust".to_string(), 2));
        let highlights: Vec<_> = summary.highlights.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(highlights, vec!["second", "first"]);

        let md = summary.to_markdown();
        assert!(md.contains("rust(2)"));
        assert!(md.contains("1h 30m"));
    }

    #[test]
    fn test_long_session_keeps_bounded_state() {
        let mut tracker = SessionTracker::start(now());
        for i in 0..200 {
            let at = now() - Duration::hours(i);
            tracker.record(&rec(&format!("note {}", i), MemoryKind::Episodic, 0.9, &["bulk"], at));
        }

        assert_eq!(tracker.len(), 200);
        assert_eq!(tracker.highlights.len(), 3);
        assert!(tracker.recent.len() <= 25);

        let summary = tracker.summary(now());
        assert_eq!(summary.total, 200);
        assert_eq!(summary.high_importance, 200);
        assert_eq!(summary.top_tags, vec![("bulk".to_string(), 200)]);
        let highlights: Vec<_> = summary.highlights.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(highlights, vec!["note 0", "note 1", "note 2"]);

        let patterns = tracker.patterns(now());
        let counted: usize = patterns.active_hours.iter().map(|h| h.count).sum();
        assert_eq!(counted, 3);
        assert_eq!(patterns.session_length, 200);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(5), "5s");
        assert_eq!(format_duration(125), "2m");
        assert_eq!(format_duration(3725), "1h 2m");
    }
}
