//! Per-session progress state
//!
//! The mutable record of node statuses, best scores and earned XP. Ordered
//! maps keep serialized snapshots deterministic, which the write scheduler
//! relies on for its equality guard.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reachability of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Locked,
    Unlocked,
    Completed,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Locked => "locked",
            NodeStatus::Unlocked => "unlocked",
            NodeStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node id -> status; absent entries are implicitly locked
pub type StatusMap = BTreeMap<String, NodeStatus>;

/// Node id -> integer value (best score percentage or awarded XP)
pub type ScoreMap = BTreeMap<String, u32>;

/// Progress of one user through the trail
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    pub status_map: StatusMap,
    /// Best score per node (0-100), never decreases
    pub best_score_by_node: ScoreMap,
    /// XP awarded per node, written once on first pass
    pub xp_by_node: ScoreMap,
    pub total_xp: u32,
}

impl ProgressState {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn status(&self, id: &str) -> NodeStatus {
        lookup_status(&self.status_map, id)
    }

    pub fn best_score(&self, id: &str) -> u32 {
        self.best_score_by_node.get(id).copied().unwrap_or(0)
    }

    pub fn node_xp(&self, id: &str) -> u32 {
        self.xp_by_node.get(id).copied().unwrap_or(0)
    }

    /// Sum of the per-node XP ledger
    pub fn recorded_xp(&self) -> u32 {
        self.xp_by_node.values().fold(0u32, |acc, xp| acc.saturating_add(*xp))
    }

    pub fn completed_count(&self) -> usize {
        self.status_map
            .values()
            .filter(|s| **s == NodeStatus::Completed)
            .count()
    }
}

/// Status lookup with the implicit `Locked` default
pub fn lookup_status(map: &StatusMap, id: &str) -> NodeStatus {
    map.get(id).copied().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_entries_are_locked() {
        let state = ProgressState::empty();
        assert_eq!(state.status("sec1-n1"), NodeStatus::Locked);
        assert_eq!(state.best_score("sec1-n1"), 0);
        assert_eq!(state.node_xp("sec1-n1"), 0);
        assert_eq!(state.total_xp, 0);
    }

    #[test]
    fn test_recorded_xp_sums_ledger() {
        let mut state = ProgressState::empty();
        state.xp_by_node.insert("a".to_string(), 40);
        state.xp_by_node.insert("b".to_string(), 80);
        assert_eq!(state.recorded_xp(), 120);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&NodeStatus::Unlocked).unwrap();
        assert_eq!(json, "\"unlocked\"");

        let mut state = ProgressState::empty();
        state.status_map.insert("sec1-n1".to_string(), NodeStatus::Completed);
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["statusMap"]["sec1-n1"], "completed");
        assert_eq!(value["totalXp"], 0);
    }
}
