//! Recency index of all rides, most recent first.

use serde::{Deserialize, Serialize};

use crate::types::{IndexEntry, Ride, RideStatus};

/// Ordered ride summaries. Serialized as a bare JSON array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RideIndex {
    entries: Vec<IndexEntry>,
}

impl RideIndex {
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<IndexEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, ride_id: &str) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| e.id == ride_id)
    }

    pub fn contains(&self, ride_id: &str) -> bool {
        self.get(ride_id).is_some()
    }

    /// Insert a new ride at the front. A stale entry with the same id is
    /// dropped first so ids stay unique.
    pub fn prepend(&mut self, entry: IndexEntry) {
        self.entries.retain(|e| e.id != entry.id);
        self.entries.insert(0, entry);
    }

    /// Overwrite the summary for `ride` in place, or prepend it if missing.
    pub fn upsert_from(&mut self, ride: &Ride) {
        let summary = IndexEntry::from_ride(ride);
        match self.entries.iter_mut().find(|e| e.id == ride.id) {
            Some(entry) => *entry = summary,
            None => self.prepend(summary),
        }
    }

    /// Update only the waypoint count, leaving other fields as indexed.
    pub fn set_points_count(&mut self, ride_id: &str, points_count: u32) -> bool {
        match self.entries.iter_mut().find(|e| e.id == ride_id) {
            Some(entry) => {
                entry.points_count = points_count;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, ride_id: &str) -> Option<IndexEntry> {
        let pos = self.entries.iter().position(|e| e.id == ride_id)?;
        Some(self.entries.remove(pos))
    }

    /// Entries that started at or after `cutoff_ms`, in index order.
    pub fn started_since(&self, cutoff_ms: i64) -> Vec<IndexEntry> {
        self.entries
            .iter()
            .filter(|e| e.start_ts >= cutoff_ms)
            .cloned()
            .collect()
    }

    /// Ids of entries that started strictly before `cutoff_ms`.
    pub fn started_before(&self, cutoff_ms: i64) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.start_ts < cutoff_ms)
            .map(|e| e.id.clone())
            .collect()
    }

    pub fn open_ids(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|e| e.status == RideStatus::Open)
            .map(|e| e.id.as_str())
    }
}
