//! Derived metrics - pure functions of the progress state
//!
//! Levels follow a quadratic curve: level `L` needs `L²` cumulative XP.

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, TrailSection};
use crate::state::{lookup_status, NodeStatus, ProgressState, StatusMap};

/// Fixed achievement catalog, ascending XP marks
pub const ACHIEVEMENT_XP_MARKS: [u32; 6] = [100, 300, 600, 1000, 1500, 2100];

/// `floor(sqrt(total_xp))`
pub fn level(total_xp: u32) -> u32 {
    let xp = u64::from(total_xp);
    let mut lvl = (xp as f64).sqrt() as u64;
    // Correct float error around perfect squares
    while lvl * lvl > xp {
        lvl -= 1;
    }
    while (lvl + 1) * (lvl + 1) <= xp {
        lvl += 1;
    }
    lvl as u32
}

/// XP still missing to reach the next level cap `(level+1)²`
pub fn xp_to_next_level(total_xp: u32) -> u32 {
    let lvl = u64::from(level(total_xp));
    ((lvl + 1) * (lvl + 1)).saturating_sub(u64::from(total_xp)) as u32
}

/// Percent progress from the current level cap to the next one
pub fn progress_to_next_level(total_xp: u32) -> u32 {
    let lvl = u64::from(level(total_xp));
    let current_cap = lvl * lvl;
    let span = 2 * lvl + 1; // (lvl+1)² - lvl²
    let into_level = u64::from(total_xp) - current_cap;
    ((200 * into_level + span) / (2 * span)) as u32
}

pub fn achievements_unlocked(total_xp: u32) -> Vec<u32> {
    ACHIEVEMENT_XP_MARKS
        .iter()
        .copied()
        .filter(|mark| total_xp >= *mark)
        .collect()
}

pub fn is_achievement_unlocked(total_xp: u32, mark: u32) -> bool {
    total_xp >= mark
}

/// Ring progress for a node: best score if any, else 100 when completed
pub fn node_progress(state: &ProgressState, id: &str) -> u32 {
    match state.best_score_by_node.get(id) {
        Some(best) => (*best).min(100),
        None if state.status(id) == NodeStatus::Completed => 100,
        None => 0,
    }
}

pub fn done_count(section: &TrailSection, map: &StatusMap) -> usize {
    section
        .nodes
        .iter()
        .filter(|n| lookup_status(map, &n.id) == NodeStatus::Completed)
        .count()
}

/// Percent of the section's nodes that are completed
pub fn section_progress(section: &TrailSection, map: &StatusMap) -> u32 {
    let total = section.nodes.len().max(1) as u64;
    let done = done_count(section, map) as u64;
    ((200 * done + total) / (2 * total)) as u32
}

pub fn is_section_completed(section: &TrailSection, map: &StatusMap) -> bool {
    done_count(section, map) == section.nodes.len()
}

/// "Start here" marker: the first unlocked node of the section, or the last
/// node when the whole section is completed.
pub fn is_current(section: &TrailSection, index: usize, map: &StatusMap) -> bool {
    let first_unlocked = section
        .nodes
        .iter()
        .position(|n| lookup_status(map, &n.id) == NodeStatus::Unlocked);

    match first_unlocked {
        Some(pos) => index == pos,
        None => {
            is_section_completed(section, map) && index + 1 == section.nodes.len()
        }
    }
}

/// Last completed node in trail order
pub fn frontier<'a>(catalog: &'a Catalog, map: &StatusMap) -> Option<&'a str> {
    catalog
        .nodes()
        .filter(|n| lookup_status(map, &n.id) == NodeStatus::Completed)
        .last()
        .map(|n| n.id.as_str())
}

/// Per-section progress line of a summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSummary {
    pub section_id: String,
    pub title: String,
    pub completed: usize,
    pub total: usize,
    pub progress: u32,
}

/// Snapshot of every derived metric, for collaborators that render the trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailSummary {
    pub total_xp: u32,
    pub level: u32,
    pub xp_to_next_level: u32,
    pub progress_to_next_level: u32,
    pub achievements: Vec<u32>,
    pub frontier: Option<String>,
    pub sections: Vec<SectionSummary>,
}

impl TrailSummary {
    pub fn compute(catalog: &Catalog, state: &ProgressState) -> Self {
        let sections = catalog
            .sections()
            .iter()
            .map(|section| SectionSummary {
                section_id: section.id.clone(),
                title: section.title.clone(),
                completed: done_count(section, &state.status_map),
                total: section.nodes.len(),
                progress: section_progress(section, &state.status_map),
            })
            .collect();

        Self {
            total_xp: state.total_xp,
            level: level(state.total_xp),
            xp_to_next_level: xp_to_next_level(state.total_xp),
            progress_to_next_level: progress_to_next_level(state.total_xp),
            achievements: achievements_unlocked(state.total_xp),
            frontier: frontier(catalog, &state.status_map).map(str::to_string),
            sections,
        }
    }
}
