//! Persisted progress document codec
//!
//! Remote documents come in two shapes:
//!
//! ```text
//! Full    { statusMap, bestScoreByNode, xpByNode, totalXp }
//! Minimal { currentNodeId, totalXp }      (currentNodeId = frontier or null)
//! ```
//!
//! Both decode into [`ProgressDocument`] and are normalized into a
//! [`ProgressState`] right away; nothing past this module knows which shape
//! a document had.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::catalog::Catalog;
use crate::error::TrailError;
use crate::gating::{apply_gates, unlock_next_from};
use crate::metrics::frontier;
use crate::state::{NodeStatus, ProgressState, ScoreMap, StatusMap};

/// Keys that may carry the status map, most recent first
const STATUS_MAP_KEYS: [&str; 2] = ["statusMap", "map"];

/// Full document shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullDocument {
    #[serde(default, deserialize_with = "nullable")]
    pub status_map: StatusMap,
    #[serde(default, deserialize_with = "nullable")]
    pub best_score_by_node: ScoreMap,
    #[serde(default, deserialize_with = "nullable")]
    pub xp_by_node: ScoreMap,
    #[serde(default, deserialize_with = "lenient_xp")]
    pub total_xp: u32,
}

/// Minimal document shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinimalDocument {
    #[serde(default)]
    pub current_node_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_xp")]
    pub total_xp: u32,
}

/// Which shape a decoded document had
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentShape {
    Full,
    Minimal,
}

impl std::fmt::Display for DocumentShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentShape::Full => f.write_str("full"),
            DocumentShape::Minimal => f.write_str("minimal"),
        }
    }
}

/// A remote progress document in one of its two shapes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressDocument {
    Full(FullDocument),
    Minimal(MinimalDocument),
}

impl ProgressDocument {
    /// Decode a raw document. Objects whose `statusMap` (or, failing that,
    /// the older `map` key) holds an object are full documents; any other
    /// object is minimal.
    pub fn decode(value: &Value) -> Result<Self, TrailError> {
        let object = value.as_object().ok_or_else(|| {
            TrailError::Document(format!("expected an object, got {}", json_type(value)))
        })?;

        let status_key = STATUS_MAP_KEYS
            .into_iter()
            .find(|key| object.get(*key).is_some_and(Value::is_object));

        if let Some(key) = status_key {
            let mut fields = object.clone();
            fields.remove("map");
            if let Some(map) = object.get(key) {
                fields.insert("statusMap".to_string(), map.clone());
            }
            let full: FullDocument = serde_json::from_value(Value::Object(fields))?;
            Ok(ProgressDocument::Full(full))
        } else {
            let minimal: MinimalDocument = serde_json::from_value(value.clone())?;
            Ok(ProgressDocument::Minimal(minimal))
        }
    }

    pub fn shape(&self) -> DocumentShape {
        match self {
            ProgressDocument::Full(_) => DocumentShape::Full,
            ProgressDocument::Minimal(_) => DocumentShape::Minimal,
        }
    }

    /// Encode the full shape of a state
    pub fn full(state: &ProgressState) -> Self {
        ProgressDocument::Full(FullDocument {
            status_map: state.status_map.clone(),
            best_score_by_node: state.best_score_by_node.clone(),
            xp_by_node: state.xp_by_node.clone(),
            total_xp: state.total_xp,
        })
    }

    /// Encode the minimal shape: frontier node plus total XP
    pub fn minimal(catalog: &Catalog, state: &ProgressState) -> Self {
        ProgressDocument::Minimal(MinimalDocument {
            current_node_id: frontier(catalog, &state.status_map).map(str::to_string),
            total_xp: state.total_xp,
        })
    }

    pub fn to_value(&self) -> Result<Value, TrailError> {
        let value = match self {
            ProgressDocument::Full(doc) => serde_json::to_value(doc)?,
            ProgressDocument::Minimal(doc) => serde_json::to_value(doc)?,
        };
        Ok(value)
    }

    /// Normalize into the canonical state and re-apply the gates
    pub fn into_state(self, catalog: &Catalog) -> ProgressState {
        let mut state = match self {
            ProgressDocument::Full(doc) => {
                let best_score_by_node = doc
                    .best_score_by_node
                    .into_iter()
                    .map(|(id, score)| (id, score.min(100)))
                    .collect();
                let mut state = ProgressState {
                    status_map: doc.status_map,
                    best_score_by_node,
                    xp_by_node: doc.xp_by_node,
                    total_xp: doc.total_xp,
                };
                // Total can lag the ledger in hand-edited or truncated documents
                state.total_xp = state.total_xp.max(state.recorded_xp());
                state
            }
            ProgressDocument::Minimal(doc) => ProgressState {
                status_map: expand_frontier(catalog, doc.current_node_id.as_deref()),
                total_xp: doc.total_xp,
                ..ProgressState::default()
            },
        };

        state.status_map = apply_gates(catalog, &state.status_map);
        state
    }
}

/// Mark every node up to and including `frontier` as completed and open the
/// node that follows it
fn expand_frontier(catalog: &Catalog, frontier: Option<&str>) -> StatusMap {
    let mut map = StatusMap::new();
    let Some(frontier) = frontier else {
        return map;
    };

    if !catalog.contains(frontier) {
        warn!(node_id = %frontier, "Frontier node not in catalog, starting from scratch");
        return map;
    }

    for node in catalog.nodes() {
        map.insert(node.id.clone(), NodeStatus::Completed);
        if node.id == frontier {
            break;
        }
    }
    unlock_next_from(catalog, frontier, &mut map);
    map
}

/// Accept any JSON number for XP totals; anything else reads as 0
fn lenient_xp<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let xp = match value {
        Value::Number(n) => n
            .as_u64()
            .map(|v| v.min(u64::from(u32::MAX)) as u32)
            .or_else(|| n.as_f64().map(|f| f.max(0.0).min(u32::MAX as f64).round() as u32))
            .unwrap_or(0),
        _ => 0,
    };
    Ok(xp)
}

/// Read `null` as the type's default
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_picks_shape() {
        let full = json!({ "statusMap": { "sec1-n1": "completed" }, "totalXp": 50 });
        let legacy = json!({ "map": { "sec1-n1": "completed" } });
        let minimal = json!({ "currentNodeId": "sec1-n2", "totalXp": 90 });

        assert_eq!(ProgressDocument::decode(&full).unwrap().shape(), DocumentShape::Full);
        assert_eq!(ProgressDocument::decode(&legacy).unwrap().shape(), DocumentShape::Full);
        assert_eq!(ProgressDocument::decode(&minimal).unwrap().shape(), DocumentShape::Minimal);
        assert_eq!(ProgressDocument::decode(&json!({})).unwrap().shape(), DocumentShape::Minimal);
    }

    #[test]
    fn test_decode_prefers_status_map_over_legacy_key() {
        let raw = json!({
            "statusMap": { "sec1-n1": "completed", "sec1-n2": "completed" },
            "map": { "sec1-n1": "completed" },
            "totalXp": 130
        });
        let ProgressDocument::Full(doc) = ProgressDocument::decode(&raw).unwrap() else {
            panic!("expected full shape");
        };
        assert_eq!(doc.status_map.len(), 2);
        assert_eq!(doc.total_xp, 130);

        let raw = json!({ "statusMap": null, "map": { "sec1-n1": "completed" } });
        let ProgressDocument::Full(doc) = ProgressDocument::decode(&raw).unwrap() else {
            panic!("expected full shape");
        };
        assert_eq!(doc.status_map.get("sec1-n1"), Some(&NodeStatus::Completed));
    }

    #[test]
    fn test_null_status_map_reads_as_minimal() {
        let catalog = Catalog::standard();
        let raw = json!({ "statusMap": null, "currentNodeId": "sec1-n2", "totalXp": 90 });
        let doc = ProgressDocument::decode(&raw).unwrap();
        assert_eq!(doc.shape(), DocumentShape::Minimal);

        let state = doc.into_state(&catalog);
        assert_eq!(state.status("sec1-n2"), NodeStatus::Completed);
        assert_eq!(state.total_xp, 90);
    }

    #[test]
    fn test_null_score_maps_read_as_empty() {
        let raw = json!({
            "statusMap": { "sec1-n1": "completed" },
            "bestScoreByNode": null,
            "xpByNode": null,
            "totalXp": 50
        });
        let ProgressDocument::Full(doc) = ProgressDocument::decode(&raw).unwrap() else {
            panic!("expected full shape");
        };
        assert!(doc.best_score_by_node.is_empty());
        assert!(doc.xp_by_node.is_empty());
        assert_eq!(doc.status_map.get("sec1-n1"), Some(&NodeStatus::Completed));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            ProgressDocument::decode(&json!([1, 2])),
            Err(TrailError::Document(_))
        ));
        assert!(ProgressDocument::decode(&json!({ "statusMap": { "a": "flying" } })).is_err());
    }

    #[test]
    fn test_minimal_shape_expands_frontier() {
        let catalog = Catalog::standard();
        let doc = ProgressDocument::decode(&json!({ "currentNodeId": "sec1-n2", "totalXp": 90 })).unwrap();
        let state = doc.into_state(&catalog);

        assert_eq!(state.status("sec1-n1"), NodeStatus::Completed);
        assert_eq!(state.status("sec1-n2"), NodeStatus::Completed);
        assert_eq!(state.status("sec1-n3"), NodeStatus::Unlocked);
        assert_eq!(state.status("sec1-n4"), NodeStatus::Locked);
        assert_eq!(state.status("sec2-n1"), NodeStatus::Locked);
        assert_eq!(state.total_xp, 90);
    }

    #[test]
    fn test_minimal_shape_without_frontier() {
        let catalog = Catalog::standard();
        let doc = ProgressDocument::decode(&json!({ "currentNodeId": null, "totalXp": "lots" })).unwrap();
        let state = doc.into_state(&catalog);
        assert_eq!(state.status("sec1-n1"), NodeStatus::Unlocked);
        assert_eq!(state.completed_count(), 0);
        assert_eq!(state.total_xp, 0);
    }

    #[test]
    fn test_frontier_at_section_end_opens_next_section() {
        let catalog = Catalog::standard();
        let doc = ProgressDocument::decode(&json!({ "currentNodeId": "sec1-n5", "totalXp": 310 })).unwrap();
        let state = doc.into_state(&catalog);
        assert_eq!(state.completed_count(), 5);
        assert_eq!(state.status("sec2-n1"), NodeStatus::Unlocked);
        assert_eq!(state.status("sec2-n2"), NodeStatus::Locked);
    }

    #[test]
    fn test_unknown_frontier_starts_empty() {
        let catalog = Catalog::standard();
        let doc = ProgressDocument::Minimal(MinimalDocument {
            current_node_id: Some("sec9-n9".to_string()),
            total_xp: 10,
        });
        let state = doc.into_state(&catalog);
        assert_eq!(state.completed_count(), 0);
    }

    #[test]
    fn test_full_shape_normalizes() {
        let catalog = Catalog::standard();
        let raw = json!({
            "statusMap": { "sec1-n1": "completed", "sec2-n3": "unlocked" },
            "bestScoreByNode": { "sec1-n1": 140 },
            "xpByNode": { "sec1-n1": 50 },
            "totalXp": 20.0
        });
        let state = ProgressDocument::decode(&raw).unwrap().into_state(&catalog);

        assert_eq!(state.best_score("sec1-n1"), 100);
        assert_eq!(state.total_xp, 50);
        assert_eq!(state.status("sec2-n3"), NodeStatus::Unlocked);
        assert_eq!(state.status("sec1-n2"), NodeStatus::Locked);
    }

    #[test]
    fn test_full_encoding_round_trips_state() {
        let catalog = Catalog::standard();
        let mut state = ProgressState::empty();
        crate::scoring::complete_by_id(&catalog, &mut state, "sec1-n1").unwrap();
        crate::scoring::submit_score(&catalog, &mut state, "sec1-n2", 7, 10).unwrap();

        let value = ProgressDocument::full(&state).to_value().unwrap();
        assert_eq!(value["statusMap"]["sec1-n2"], "completed");
        assert_eq!(value["totalXp"], 50 + 56);

        let decoded = ProgressDocument::decode(&value).unwrap().into_state(&catalog);
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_minimal_encoding_uses_frontier() {
        let catalog = Catalog::standard();
        let mut state = ProgressState::empty();
        crate::scoring::complete_by_id(&catalog, &mut state, "sec1-n1").unwrap();

        let value = ProgressDocument::minimal(&catalog, &state).to_value().unwrap();
        assert_eq!(value, json!({ "currentNodeId": "sec1-n1", "totalXp": 50 }));
    }
}
