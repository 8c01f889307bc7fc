use rustc_hash::{FxHashMap, FxHashSet};

use crate::ncc_structs::GroupId;

/// Per-group outcome of a filtering stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOutcome {
    Untouched,
    /// Surviving line indices.
    Resolved(Vec<usize>),
    Removed,
}

/// Resolved and removed groups. A group is never in both: removal wins and
/// a later `resolve` of a removed group is ignored.
#[derive(Debug, Clone, Default)]
pub struct Decisions {
    resolved: FxHashMap<GroupId, Vec<usize>>,
    removed: FxHashSet<GroupId>,
}

impl Decisions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&mut self, group: GroupId, line_indices: Vec<usize>) {
        if !self.removed.contains(&group) {
            self.resolved.insert(group, line_indices);
        }
    }

    pub fn remove(&mut self, group: GroupId) {
        self.resolved.remove(&group);
        self.removed.insert(group);
    }

    pub fn apply(&mut self, group: GroupId, outcome: GroupOutcome) {
        match outcome {
            GroupOutcome::Untouched => {}
            GroupOutcome::Resolved(lines) => self.resolve(group, lines),
            GroupOutcome::Removed => self.remove(group),
        }
    }

    pub fn is_removed(&self, group: GroupId) -> bool {
        self.removed.contains(&group)
    }

    pub fn resolved_lines(&self, group: GroupId) -> Option<&[usize]> {
        self.resolved.get(&group).map(|v| v.as_slice())
    }

    pub fn is_decided(&self, group: GroupId) -> bool {
        self.removed.contains(&group) || self.resolved.contains_key(&group)
    }

    /// Whether `line_idx` of `group` stays active in the rewritten file.
    pub fn keeps_line(&self, group: GroupId, line_idx: usize) -> bool {
        if self.removed.contains(&group) {
            return false;
        }
        match self.resolved.get(&group) {
            Some(lines) => lines.contains(&line_idx),
            None => true,
        }
    }

    pub fn n_resolved(&self) -> usize {
        self.resolved.len()
    }

    pub fn n_removed(&self) -> usize {
        self.removed.len()
    }
}
