//! Scoring & completion engine
//!
//! The only two entry points that mutate progress: scored submissions
//! (quizzes, challenges) and direct completions (lessons without a score).
//! Both award XP at most once per node and re-apply the gates before
//! returning.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{Catalog, NodeKind};
use crate::error::TrailError;
use crate::gating::{apply_gates, unlock_next_from};
use crate::state::{NodeStatus, ProgressState};

/// Minimum score (percent) for a node to count as passed
pub const PASS_THRESHOLD: u32 = 60;

/// XP for a node completed at 100%
pub fn base_xp(kind: NodeKind) -> u32 {
    match kind {
        NodeKind::Lesson => 50,
        NodeKind::Game => 80,
    }
}

/// Result of a scored submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreOutcome {
    /// Percentage score of this submission (0-100)
    pub score: u32,
    /// XP awarded by this submission (0 unless first pass)
    pub xp_gain: u32,
    pub unlocked_next: bool,
    /// Whether this submission completed the node
    pub completed: bool,
    pub passed_now: bool,
}

/// Result of a direct completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOutcome {
    pub xp_gain: u32,
    pub unlocked_next: bool,
}

/// Integer `round(numerator / denominator)`, halves rounded up
fn round_div(numerator: u64, denominator: u64) -> u64 {
    (2 * numerator + denominator) / (2 * denominator)
}

/// `round(100 * correct / max(1, total))`, clamped to `[0, 100]`
pub fn score_percent(correct: u32, total: u32) -> u32 {
    let total = u64::from(total.max(1));
    let score = round_div(100 * u64::from(correct), total);
    score.min(100) as u32
}

/// XP for passing a node of `kind` with `score` percent
pub fn xp_for_score(kind: NodeKind, score: u32) -> u32 {
    round_div(u64::from(score.min(100)) * u64::from(base_xp(kind)), 100) as u32
}

/// Record a scored submission for `node_id`.
///
/// Fails with `UnknownNode` without touching the state when the id is not
/// part of the catalog.
pub fn submit_score(
    catalog: &Catalog,
    state: &mut ProgressState,
    node_id: &str,
    correct: u32,
    total: u32,
) -> Result<ScoreOutcome, TrailError> {
    let node = catalog
        .find_node(node_id)
        .ok_or_else(|| TrailError::UnknownNode(node_id.to_string()))?;

    let score = score_percent(correct, total);
    let prev_best = state.best_score(node_id);
    let passed_before = prev_best >= PASS_THRESHOLD;
    let passed_now = score >= PASS_THRESHOLD;

    if score > prev_best {
        state.best_score_by_node.insert(node_id.to_string(), score);
    }

    let mut outcome = ScoreOutcome {
        score,
        xp_gain: 0,
        unlocked_next: false,
        completed: false,
        passed_now,
    };

    if !passed_before && passed_now {
        let xp = award_xp(state, node_id, xp_for_score(node.kind, score));
        state.status_map.insert(node_id.to_string(), NodeStatus::Completed);

        outcome.xp_gain = xp;
        outcome.completed = true;
        outcome.unlocked_next = unlock_next_from(catalog, node_id, &mut state.status_map);
    } else if !passed_now && state.status(node_id) == NodeStatus::Locked {
        // A failed attempt must not leave a reachable node looking locked
        state.status_map.insert(node_id.to_string(), NodeStatus::Unlocked);
    }

    state.status_map = apply_gates(catalog, &state.status_map);

    debug!(
        node_id = %node_id,
        score = score,
        xp_gain = outcome.xp_gain,
        passed_now = passed_now,
        "Score submitted"
    );
    Ok(outcome)
}

/// Complete a node that has no scoring mechanism (100% directly).
///
/// Full base XP is awarded only when the node had not passed before.
pub fn complete_by_id(
    catalog: &Catalog,
    state: &mut ProgressState,
    node_id: &str,
) -> Result<CompletionOutcome, TrailError> {
    let node = catalog
        .find_node(node_id)
        .ok_or_else(|| TrailError::UnknownNode(node_id.to_string()))?;

    let prev_best = state.best_score(node_id);
    let already_passed = prev_best >= PASS_THRESHOLD;

    state.status_map.insert(node_id.to_string(), NodeStatus::Completed);
    state
        .best_score_by_node
        .insert(node_id.to_string(), prev_best.max(100));

    let mut xp_gain = 0;
    if !already_passed {
        xp_gain = award_xp(state, node_id, base_xp(node.kind));
    }

    let unlocked_next = unlock_next_from(catalog, node_id, &mut state.status_map);
    state.status_map = apply_gates(catalog, &state.status_map);

    debug!(node_id = %node_id, xp_gain = xp_gain, "Node completed");
    Ok(CompletionOutcome { xp_gain, unlocked_next })
}

/// Write the node's ledger entry and add it to the total, unless the node
/// already has one. Returns the XP actually granted.
fn award_xp(state: &mut ProgressState, node_id: &str, xp: u32) -> u32 {
    if state.xp_by_node.contains_key(node_id) {
        return 0;
    }
    state.xp_by_node.insert(node_id.to_string(), xp);
    state.total_xp = state.total_xp.saturating_add(xp);
    xp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gating::bootstrap_unlocks;

    fn fresh() -> (Catalog, ProgressState) {
        let catalog = Catalog::standard();
        let mut state = ProgressState::empty();
        bootstrap_unlocks(&catalog, &mut state);
        (catalog, state)
    }

    #[test]
    fn test_score_percent_bounds() {
        assert_eq!(score_percent(0, 0), 0);
        assert_eq!(score_percent(5, 0), 100);
        assert_eq!(score_percent(1, 3), 33);
        assert_eq!(score_percent(2, 3), 67);
        assert_eq!(score_percent(1, 8), 13); // 12.5 rounds up
        assert_eq!(score_percent(12, 10), 100);
        assert_eq!(score_percent(u32::MAX, 1), 100);

        for total in 0..12u32 {
            for correct in 0..15u32 {
                assert!(score_percent(correct, total) <= 100);
            }
        }
    }

    #[test]
    fn test_xp_for_score() {
        assert_eq!(xp_for_score(NodeKind::Lesson, 80), 40);
        assert_eq!(xp_for_score(NodeKind::Lesson, 100), 50);
        assert_eq!(xp_for_score(NodeKind::Game, 60), 48);
        assert_eq!(xp_for_score(NodeKind::Game, 67), 54); // 53.6
    }

    #[test]
    fn test_pass_on_first_try() {
        let (catalog, mut state) = fresh();
        let outcome = submit_score(&catalog, &mut state, "sec1-n1", 8, 10).unwrap();

        assert_eq!(outcome.score, 80);
        assert!(outcome.passed_now);
        assert!(outcome.completed);
        assert!(outcome.unlocked_next);
        assert_eq!(outcome.xp_gain, 40);
        assert_eq!(state.status("sec1-n1"), NodeStatus::Completed);
        assert_eq!(state.status("sec1-n2"), NodeStatus::Unlocked);
        assert_eq!(state.total_xp, 40);
    }

    #[test]
    fn test_fail_then_pass() {
        let (catalog, mut state) = fresh();
        state.status_map.remove("sec1-n2");

        let failed = submit_score(&catalog, &mut state, "sec1-n2", 3, 10).unwrap();
        assert_eq!(failed.score, 30);
        assert!(!failed.completed);
        assert!(!failed.passed_now);
        assert_eq!(failed.xp_gain, 0);
        assert_eq!(state.status("sec1-n2"), NodeStatus::Unlocked);
        assert_eq!(state.best_score("sec1-n2"), 30);

        let passed = submit_score(&catalog, &mut state, "sec1-n2", 10, 10).unwrap();
        assert_eq!(passed.score, 100);
        assert_eq!(passed.xp_gain, 80);
        assert!(passed.completed);
        assert_eq!(state.status("sec1-n2"), NodeStatus::Completed);
    }

    #[test]
    fn test_repeat_pass_awards_nothing() {
        let (catalog, mut state) = fresh();
        let first = submit_score(&catalog, &mut state, "sec1-n1", 9, 10).unwrap();
        let second = submit_score(&catalog, &mut state, "sec1-n1", 9, 10).unwrap();

        assert_eq!(first.xp_gain, 45);
        assert_eq!(second.xp_gain, 0);
        assert!(!second.completed);
        assert_eq!(state.total_xp, 45);
        assert_eq!(state.node_xp("sec1-n1"), 45);
    }

    #[test]
    fn test_best_score_never_decreases() {
        let (catalog, mut state) = fresh();
        submit_score(&catalog, &mut state, "sec1-n1", 9, 10).unwrap();
        submit_score(&catalog, &mut state, "sec1-n1", 2, 10).unwrap();
        assert_eq!(state.best_score("sec1-n1"), 90);
        assert_eq!(state.status("sec1-n1"), NodeStatus::Completed);
    }

    #[test]
    fn test_unknown_node_leaves_state_untouched() {
        let (catalog, mut state) = fresh();
        let before = state.clone();

        let err = submit_score(&catalog, &mut state, "ghost", 1, 1).unwrap_err();
        assert!(matches!(err, TrailError::UnknownNode(id) if id == "ghost"));
        assert!(complete_by_id(&catalog, &mut state, "ghost").is_err());
        assert_eq!(state, before);
    }

    #[test]
    fn test_complete_by_id_awards_once() {
        let (catalog, mut state) = fresh();
        let first = complete_by_id(&catalog, &mut state, "sec1-n1").unwrap();
        assert_eq!(first.xp_gain, 50);
        assert!(first.unlocked_next);
        assert_eq!(state.best_score("sec1-n1"), 100);

        let again = complete_by_id(&catalog, &mut state, "sec1-n1").unwrap();
        assert_eq!(again.xp_gain, 0);
        assert_eq!(state.total_xp, 50);
    }

    #[test]
    fn test_complete_after_pass_keeps_original_award() {
        let (catalog, mut state) = fresh();
        submit_score(&catalog, &mut state, "sec1-n1", 6, 10).unwrap();
        assert_eq!(state.total_xp, 30);

        let outcome = complete_by_id(&catalog, &mut state, "sec1-n1").unwrap();
        assert_eq!(outcome.xp_gain, 0);
        assert_eq!(state.node_xp("sec1-n1"), 30);
        assert_eq!(state.best_score("sec1-n1"), 100);
    }

    #[test]
    fn test_completing_section_opens_next_section() {
        let (catalog, mut state) = fresh();
        for i in 1..=5 {
            complete_by_id(&catalog, &mut state, &format!("sec1-n{}", i)).unwrap();
        }
        assert_eq!(state.status("sec2-n1"), NodeStatus::Unlocked);
        assert_eq!(state.status("sec2-n2"), NodeStatus::Locked);
        assert_eq!(state.total_xp, 50 + 80 + 50 + 80 + 50);
        assert_eq!(state.total_xp, state.recorded_xp());
    }

    #[test]
    fn test_existing_ledger_entry_is_never_rewritten() {
        let (catalog, mut state) = fresh();
        // A stored ledger entry without a passing score, as in a truncated document
        state.xp_by_node.insert("sec1-n1".to_string(), 20);
        state.total_xp = 20;

        let outcome = submit_score(&catalog, &mut state, "sec1-n1", 10, 10).unwrap();
        assert!(outcome.completed);
        assert_eq!(outcome.xp_gain, 0);
        assert_eq!(state.node_xp("sec1-n1"), 20);
        assert_eq!(state.total_xp, 20);
    }

    #[test]
    fn test_first_node_never_locked_after_mutations() {
        let (catalog, mut state) = fresh();
        submit_score(&catalog, &mut state, "sec2-n3", 0, 4).unwrap();
        submit_score(&catalog, &mut state, "sec1-n1", 1, 4).unwrap();
        complete_by_id(&catalog, &mut state, "sec3-n5").unwrap();
        assert_ne!(state.status("sec1-n1"), NodeStatus::Locked);
        assert_eq!(state.total_xp, state.recorded_xp());
    }
}
