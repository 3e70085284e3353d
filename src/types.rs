//! Persisted record types.
//!
//! Every record serializes as camelCase JSON. Optional timestamps are omitted
//! when absent so an open stop reads back without an `endTs` field.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Route Snapshot
// ============================================================================

/// A planned delivery stop, as supplied by the route provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Waypoint {
    pub point_id: String,
    #[serde(default)]
    pub label: String,
    pub lat: f64,
    pub lng: f64,
    /// Position in the optimized visiting order
    #[serde(default)]
    pub order: u32,
}

impl Waypoint {
    pub fn new(point_id: &str, label: &str, lat: f64, lng: f64, order: u32) -> Self {
        Self {
            point_id: point_id.to_string(),
            label: label.to_string(),
            lat,
            lng,
            order,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSnapshot {
    /// When the user triggered the optimization that produced this ride
    pub optimize_clicked_ts: i64,
    #[serde(default)]
    pub points_snapshot: Vec<Waypoint>,
}

/// Audit entry for a mid-ride re-optimization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reoptimization {
    pub ts: i64,
    pub points_count: u32,
}

// ============================================================================
// Ride
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RideStatus {
    Open,
    Closed,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Open => "open",
            RideStatus::Closed => "closed",
        }
    }
}

/// Terminal status of one waypoint. At most one of the two is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointActionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_at: Option<i64>,
}

/// A dwell interval near a waypoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stop {
    pub point_id: String,
    pub start_ts: i64,
    /// None while the device is still inside the geofence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_ts: Option<i64>,
    /// Waypoint coordinates, not the device's
    pub center_lat: f64,
    pub center_lng: f64,
}

impl Stop {
    pub fn is_open(&self) -> bool {
        self.end_ts.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RideStats {
    /// Distance in meters, as reported by the trip distance tracker
    pub distance_m: f64,
    /// Seconds since ride start (at last update or close)
    pub duration_s: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_gps_ts: Option<i64>,
    pub gps_gap_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackInfo {
    /// Chunk keys in write order
    pub chunk_keys: Vec<String>,
    pub track_point_count: u64,
}

/// One tracked delivery run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ride {
    pub id: String,
    pub start_ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_ts: Option<i64>,
    pub status: RideStatus,
    pub route: RouteSnapshot,
    #[serde(default)]
    pub actions: BTreeMap<String, PointActionRecord>,
    #[serde(default)]
    pub stops: Vec<Stop>,
    #[serde(default)]
    pub stats: RideStats,
    #[serde(default)]
    pub track: TrackInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reoptimizations: Vec<Reoptimization>,
}

impl Ride {
    /// A fresh open ride with empty actions, stops, stats and track.
    pub fn open(id: String, start_ts: i64, route: RouteSnapshot) -> Self {
        Self {
            id,
            start_ts,
            end_ts: None,
            status: RideStatus::Open,
            route,
            actions: BTreeMap::new(),
            stops: Vec::new(),
            stats: RideStats::default(),
            track: TrackInfo::default(),
            reoptimizations: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == RideStatus::Open
    }

    /// Seconds elapsed between ride start and `now_ms`.
    pub fn elapsed_s(&self, now_ms: i64) -> i64 {
        ((now_ms - self.start_ts) / 1000).max(0)
    }

    pub fn open_stops(&self) -> impl Iterator<Item = &Stop> {
        self.stops.iter().filter(|s| s.is_open())
    }
}

// ============================================================================
// Track
// ============================================================================

/// A single GPS sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackPoint {
    pub ts: i64,
    pub lat: f64,
    pub lng: f64,
    pub accuracy_meters: f64,
    /// Increments whenever the location provider restarts a track segment
    #[serde(default)]
    pub segment_id: u32,
}

// ============================================================================
// Index
// ============================================================================

/// Denormalized ride summary kept in the recency index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub id: String,
    pub start_ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_ts: Option<i64>,
    pub status: RideStatus,
    #[serde(default)]
    pub points_count: u32,
    #[serde(default)]
    pub distance_m: f64,
    #[serde(default)]
    pub duration_s: i64,
    #[serde(default)]
    pub track_point_count: u64,
}

impl IndexEntry {
    pub fn from_ride(ride: &Ride) -> Self {
        Self {
            id: ride.id.clone(),
            start_ts: ride.start_ts,
            end_ts: ride.end_ts,
            status: ride.status,
            points_count: ride.route.points_snapshot.len() as u32,
            distance_m: ride.stats.distance_m,
            duration_s: ride.stats.duration_s,
            track_point_count: ride.track.track_point_count,
        }
    }
}

// ============================================================================
// Export
// ============================================================================

/// A ride together with its full track, for sharing as one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideExport {
    pub ride: Ride,
    pub track: Vec<TrackPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_stop_omits_end_ts() {
        let stop = Stop {
            point_id: "p1".to_string(),
            start_ts: 10,
            end_ts: None,
            center_lat: 1.0,
            center_lng: 2.0,
        };
        let json = serde_json::to_string(&stop).unwrap();
        assert!(!json.contains("endTs"));
        assert!(json.contains("\"pointId\":\"p1\""));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&RideStatus::Open).unwrap(), "\"open\"");
        assert_eq!(RideStatus::Closed.as_str(), "closed");
    }

    #[test]
    fn test_sparse_ride_record_reads_with_defaults() {
        let json = r#"{
            "id": "ride_1",
            "startTs": 1000,
            "status": "open",
            "route": {"optimizeClickedTs": 900}
        }"#;
        let ride: Ride = serde_json::from_str(json).unwrap();
        assert!(ride.is_open());
        assert!(ride.actions.is_empty());
        assert_eq!(ride.track.track_point_count, 0);
        assert!(ride.route.points_snapshot.is_empty());
    }

    #[test]
    fn test_elapsed_never_negative() {
        let ride = Ride::open("r".to_string(), 5_000, RouteSnapshot::default());
        assert_eq!(ride.elapsed_s(65_000), 60);
        assert_eq!(ride.elapsed_s(0), 0);
    }
}
