//! Gating engine - which nodes are reachable
//!
//! `apply_gates` is a normalization pass over the whole trail, not a
//! node-local rule: it forces the first node open and locks every node that
//! is neither completed nor already unlocked. `unlock_next_from` is the only
//! place that opens new nodes after a completion.

use tracing::trace;

use crate::catalog::Catalog;
use crate::metrics::is_section_completed;
use crate::state::{lookup_status, NodeStatus, ProgressState, StatusMap};

/// Normalize a status map against the catalog. Pure and idempotent.
pub fn apply_gates(catalog: &Catalog, map: &StatusMap) -> StatusMap {
    let mut gated = map.clone();
    let first_id = &catalog.first_node().id;

    for node in catalog.nodes() {
        // Absent entries are written out as explicit `Locked`
        let current = lookup_status(&gated, &node.id);
        let next = if &node.id == first_id && current == NodeStatus::Locked {
            NodeStatus::Unlocked
        } else {
            current
        };
        gated.insert(node.id.clone(), next);
    }

    gated
}

/// Open the node that follows `node_id` in trail order.
///
/// The next node of the same section is promoted if locked. Otherwise, once
/// the section is fully completed, the first node of the next section is
/// promoted if locked. Returns whether anything was promoted.
pub fn unlock_next_from(catalog: &Catalog, node_id: &str, map: &mut StatusMap) -> bool {
    let Some(pos) = catalog.position(node_id) else {
        return false;
    };
    let Some(section) = catalog.section(pos.section_index) else {
        return false;
    };

    if let Some(next) = section.nodes.get(pos.node_index + 1) {
        if lookup_status(map, &next.id) == NodeStatus::Locked {
            map.insert(next.id.clone(), NodeStatus::Unlocked);
            trace!(from = %node_id, unlocked = %next.id, "Unlocked next node in section");
            return true;
        }
    }

    if !is_section_completed(section, map) {
        return false;
    }

    match catalog.section(pos.section_index + 1) {
        Some(next_section) => {
            let first = &next_section.nodes[0];
            if lookup_status(map, &first.id) == NodeStatus::Locked {
                map.insert(first.id.clone(), NodeStatus::Unlocked);
                trace!(from = %node_id, unlocked = %first.id, section = %next_section.id, "Unlocked next section");
                true
            } else {
                false
            }
        }
        None => false,
    }
}

/// Apply gates to whatever state currently exists (after load or reset)
pub fn bootstrap_unlocks(catalog: &Catalog, state: &mut ProgressState) {
    state.status_map = apply_gates(catalog, &state.status_map);
}
