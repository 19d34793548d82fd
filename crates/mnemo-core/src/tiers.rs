//! Tiered In-Memory Index
//!
//! Five partitions mirroring the record kinds:
//!
//! - **working**: bounded ring buffer; the oldest record falls out of memory
//!   (it stays in the durable store)
//! - **episodic**: append-only sequence
//! - **procedural**: latest record per skill name
//! - **project**: ordered sequence per project name
//! - **semantic**: append-only sequence
//!
//! The index is a cache of the record store and is rebuilt from it on startup.

use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::types::{DEFAULT_PROJECT_NAME, DEFAULT_SKILL_NAME, MemoryKind, MemoryRecord, normalize_text};

/// In-memory tier partitions
#[derive(Debug)]
pub struct TieredIndex {
    capacity: usize,
    working: VecDeque<MemoryRecord>,
    episodic: Vec<MemoryRecord>,
    procedural: BTreeMap<String, MemoryRecord>,
    project: BTreeMap<String, Vec<MemoryRecord>>,
    semantic: Vec<MemoryRecord>,
}

impl TieredIndex {
    /// Create an empty index with the given working capacity
    pub fn new(working_capacity: usize) -> Self {
        Self {
            capacity: working_capacity.max(1),
            working: VecDeque::with_capacity(working_capacity.max(1)),
            episodic: Vec::new(),
            procedural: BTreeMap::new(),
            project: BTreeMap::new(),
            semantic: Vec::new(),
        }
    }

    /// Rebuild from records in creation order
    pub fn rebuild<'a>(&mut self, records: impl IntoIterator<Item = &'a MemoryRecord>) {
        self.clear();
        for record in records {
            self.insert(record.clone());
        }
    }

    pub fn clear(&mut self) {
        self.working.clear();
        self.episodic.clear();
        self.procedural.clear();
        self.project.clear();
        self.semantic.clear();
    }

    /// Route a record to its partition.
    ///
    /// A record whose id is already indexed replaces the earlier copy.
    pub fn insert(&mut self, record: MemoryRecord) {
        self.remove_id(&record.id);

        match record.kind {
            MemoryKind::Working => {
                if self.working.len() == self.capacity {
                    self.working.pop_front();
                }
                self.working.push_back(record);
            }
            MemoryKind::Episodic => self.episodic.push(record),
            MemoryKind::Procedural => {
                let skill = record
                    .attributes
                    .skill_name()
                    .unwrap_or(DEFAULT_SKILL_NAME)
                    .to_string();
                self.procedural.insert(skill, record);
            }
            MemoryKind::Project => {
                let project = record
                    .attributes
                    .project_name()
                    .unwrap_or(DEFAULT_PROJECT_NAME)
                    .to_string();
                self.project.entry(project).or_default().push(record);
            }
            MemoryKind::Semantic => self.semantic.push(record),
        }
    }

    /// Records of the given kinds that match the query.
    ///
    /// `query` must already be normalized (see [`normalize_text`]).
    pub fn candidates(&self, query: &str, kinds: &[MemoryKind]) -> Vec<&MemoryRecord> {
        let mut out = Vec::new();
        for kind in kinds {
            match kind {
                MemoryKind::Working => {
                    out.extend(self.working.iter().filter(|r| matches_query(r, query)));
                }
                MemoryKind::Episodic => {
                    out.extend(self.episodic.iter().filter(|r| matches_query(r, query)));
                }
                MemoryKind::Procedural => {
                    out.extend(self.procedural.values().filter(|r| matches_query(r, query)));
                }
                MemoryKind::Project => {
                    for (name, records) in &self.project {
                        if name.to_lowercase().contains(query) {
                            out.extend(records.iter());
                        } else {
                            out.extend(records.iter().filter(|r| matches_query(r, query)));
                        }
                    }
                }
                MemoryKind::Semantic => {
                    out.extend(self.semantic.iter().filter(|r| matches_query(r, query)));
                }
            }
        }
        out
    }

    /// The most recent `limit` working records, oldest first
    pub fn recent_working(&self, limit: usize) -> Vec<&MemoryRecord> {
        let skip = self.working.len().saturating_sub(limit);
        self.working.iter().skip(skip).collect()
    }

    /// Drop every record whose id is in `ids`; returns how many were removed
    pub fn remove(&mut self, ids: &HashSet<String>) -> usize {
        let before = self.len();
        self.working.retain(|r| !ids.contains(&r.id));
        self.episodic.retain(|r| !ids.contains(&r.id));
        self.procedural.retain(|_, r| !ids.contains(&r.id));
        for records in self.project.values_mut() {
            records.retain(|r| !ids.contains(&r.id));
        }
        self.project.retain(|_, records| !records.is_empty());
        self.semantic.retain(|r| !ids.contains(&r.id));
        before - self.len()
    }

    fn remove_id(&mut self, id: &str) {
        let ids: HashSet<String> = std::iter::once(id.to_string()).collect();
        self.remove(&ids);
    }

    /// Records held per partition
    pub fn counts(&self) -> BTreeMap<MemoryKind, usize> {
        let mut counts = BTreeMap::new();
        counts.insert(MemoryKind::Working, self.working.len());
        counts.insert(MemoryKind::Episodic, self.episodic.len());
        counts.insert(MemoryKind::Procedural, self.procedural.len());
        counts.insert(
            MemoryKind::Project,
            self.project.values().map(Vec::len).sum(),
        );
        counts.insert(MemoryKind::Semantic, self.semantic.len());
        counts
    }

    pub fn len(&self) -> usize {
        self.counts().values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Candidate rule shared by the tiers and durable recall: the query is a
/// substring of the content, of a tag, or of the record's skill/project name.
pub fn matches_query(record: &MemoryRecord, query: &str) -> bool {
    if normalize_text(&record.content).contains(query) || record.has_tag_containing(query) {
        return true;
    }
    if let Some(skill) = record.attributes.skill_name() {
        if skill.to_lowercase().contains(query) {
            return true;
        }
    }
    if let Some(project) = record.attributes.project_name() {
        if project.to_lowercase().contains(query) {
            return true;
        }
    }
    false
}
