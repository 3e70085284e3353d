//! Delivered/skipped terminal actions per waypoint.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::PointActionRecord;

/// Normalized terminal action for a waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointAction {
    Delivered,
    Skipped,
}

const DELIVERED_SYNONYMS: &[&str] = &[
    "delivered",
    "deliver",
    "done",
    "completed",
    "livré",
    "livre",
    "livrée",
    "entregado",
    "entregada",
    "entregue",
    "zugestellt",
    "geliefert",
    "consegnato",
    "consegnata",
];

const SKIPPED_SYNONYMS: &[&str] = &[
    "skipped",
    "skip",
    "ignoré",
    "ignore",
    "ignorée",
    "sauté",
    "saltado",
    "omitido",
    "pulado",
    "übersprungen",
    "uebersprungen",
    "saltato",
];

impl PointAction {
    /// Case-insensitive parse, accepting the app's locale labels.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if DELIVERED_SYNONYMS.contains(&normalized.as_str()) {
            Some(PointAction::Delivered)
        } else if SKIPPED_SYNONYMS.contains(&normalized.as_str()) {
            Some(PointAction::Skipped)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PointAction::Delivered => "delivered",
            PointAction::Skipped => "skipped",
        }
    }

    /// Record this action at `ts`, clearing the opposite timestamp.
    pub fn apply(&self, record: &mut PointActionRecord, ts: i64) {
        match self {
            PointAction::Delivered => {
                record.delivered_at = Some(ts);
                record.skipped_at = None;
            }
            PointAction::Skipped => {
                record.skipped_at = Some(ts);
                record.delivered_at = None;
            }
        }
    }
}

/// Set `action` for `point_id` in a ride's action map.
pub fn record_action(
    actions: &mut BTreeMap<String, PointActionRecord>,
    point_id: &str,
    action: PointAction,
    ts: i64,
) {
    let record = actions.entry(point_id.to_string()).or_default();
    action.apply(record, ts);
}

/// Clear both timestamps for `point_id`. Returns whether anything was set.
pub fn clear_action(actions: &mut BTreeMap<String, PointActionRecord>, point_id: &str) -> bool {
    actions.remove(point_id).is_some()
}
