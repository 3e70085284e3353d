//! FFI bindings for mobile platforms (iOS/Android).
//!
//! Exposes one [`FfiRideHistory`] object per database. Structured records
//! (waypoint snapshots, rides, index entries) cross the boundary as JSON
//! strings in the persisted camelCase shape, so the app can hand them straight
//! to its history screens. Failures are logged and collapse to `false`, empty
//! JSON or zero; the app treats ride history as best-effort.

use std::sync::Arc;

use log::{error, info};

use crate::config::{HistoryConfig, SharedFlag};
use crate::error::HistoryError;
use crate::history::RideHistory;
use crate::persistence::SqliteStore;
use crate::stops::{StopTransition, TransitionKind};
use crate::types::Waypoint;

// ============================================================================
// Errors and Records
// ============================================================================

/// Errors surfaced when opening the history database.
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum FfiHistoryError {
    #[error("storage error: {message}")]
    Storage { message: String },
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl From<HistoryError> for FfiHistoryError {
    fn from(e: HistoryError) -> Self {
        match e {
            HistoryError::Config { message } => FfiHistoryError::Config { message },
            HistoryError::Serialization(e) => FfiHistoryError::Config {
                message: e.to_string(),
            },
            other => FfiHistoryError::Storage {
                message: other.to_string(),
            },
        }
    }
}

/// A stop opening ("entered") or closing ("exited") at a waypoint.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiStopTransition {
    pub point_id: String,
    pub kind: String,
    pub ts: i64,
    pub distance_m: f64,
}

impl From<StopTransition> for FfiStopTransition {
    fn from(t: StopTransition) -> Self {
        Self {
            point_id: t.point_id,
            kind: match t.kind {
                TransitionKind::Entered => "entered".to_string(),
                TransitionKind::Exited => "exited".to_string(),
            },
            ts: t.ts,
            distance_m: t.distance_m,
        }
    }
}

// ============================================================================
// History Object
// ============================================================================

/// Ride history bound to one SQLite database.
#[derive(uniffi::Object)]
pub struct FfiRideHistory {
    history: RideHistory,
    tracking: Arc<SharedFlag>,
}

fn log_failure<T>(op: &str, result: crate::error::Result<T>, fallback: T) -> T {
    result.unwrap_or_else(|e| {
        error!("[RideHistory] {} failed: {}", op, e);
        fallback
    })
}

fn to_json<T: serde::Serialize>(op: &str, value: &T, fallback: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        error!("[RideHistory] {} serialization failed: {}", op, e);
        fallback.to_string()
    })
}

fn parse_snapshot(op: &str, points_json: &str) -> Option<Vec<Waypoint>> {
    match serde_json::from_str(points_json) {
        Ok(points) => Some(points),
        Err(e) => {
            error!("[RideHistory] {} got malformed points JSON: {}", op, e);
            None
        }
    }
}

#[uniffi::export]
impl FfiRideHistory {
    /// Open (or create) the history database with default tunables.
    /// Tracking starts disabled until the app calls `set_tracking_enabled`.
    #[uniffi::constructor]
    pub fn open(db_path: String) -> Result<Arc<Self>, FfiHistoryError> {
        Self::open_with_config(db_path, "{}".to_string())
    }

    /// Open with a partial camelCase JSON config merged over the defaults.
    #[uniffi::constructor]
    pub fn open_with_config(
        db_path: String,
        config_json: String,
    ) -> Result<Arc<Self>, FfiHistoryError> {
        crate::init_logging();
        info!("[RideHistory] Opening database: {}", db_path);

        let config = HistoryConfig::from_json(&config_json)?;
        let store = SqliteStore::new(&db_path)?;
        let tracking = Arc::new(SharedFlag::new(false));
        let history = RideHistory::builder(Box::new(store))
            .settings(tracking.clone())
            .config(config)
            .open()?;

        Ok(Arc::new(Self { history, tracking }))
    }

    /// Mirror the app's "history tracking" setting.
    pub fn set_tracking_enabled(&self, enabled: bool) {
        self.tracking.set(enabled);
    }

    pub fn tracking_enabled(&self) -> bool {
        self.history.tracking_enabled()
    }

    /// Start a ride from a JSON waypoint array. Returns the ride id, or None
    /// when tracking is off or the snapshot is rejected.
    pub fn start_ride(&self, points_json: String, optimize_clicked_ts: i64) -> Option<String> {
        let points = parse_snapshot("start_ride", &points_json)?;
        log_failure(
            "start_ride",
            self.history.start_ride(points, optimize_clicked_ts),
            None,
        )
    }

    pub fn close_current_ride(&self, reason: String) -> bool {
        log_failure(
            "close_current_ride",
            self.history.close_current_ride(&reason),
            false,
        )
    }

    pub fn current_ride_id(&self) -> Option<String> {
        log_failure("current_ride_id", self.history.current_ride_id(), None)
    }

    pub fn add_track_point(
        &self,
        lat: f64,
        lng: f64,
        accuracy_meters: f64,
        ts: i64,
        segment_id: u32,
    ) -> bool {
        log_failure(
            "add_track_point",
            self.history
                .add_track_point(lat, lng, accuracy_meters, ts, segment_id),
            false,
        )
    }

    pub fn check_stop_proximity(&self, lat: f64, lng: f64, ts: i64) -> Vec<FfiStopTransition> {
        log_failure(
            "check_stop_proximity",
            self.history.check_stop_proximity(lat, lng, ts),
            Vec::new(),
        )
        .into_iter()
        .map(Into::into)
        .collect()
    }

    pub fn update_distance(&self, distance_m: f64) -> bool {
        log_failure(
            "update_distance",
            self.history.update_distance(distance_m),
            false,
        )
    }

    pub fn update_points_snapshot(&self, points_json: String, ts: i64) -> bool {
        let Some(points) = parse_snapshot("update_points_snapshot", &points_json) else {
            return false;
        };
        log_failure(
            "update_points_snapshot",
            self.history.update_points_snapshot(points, ts),
            false,
        )
    }

    pub fn record_point_action(&self, point_id: String, action: String, ts: i64) -> bool {
        log_failure(
            "record_point_action",
            self.history.record_point_action(&point_id, &action, ts),
            false,
        )
    }

    pub fn remove_point_action(&self, point_id: String) -> bool {
        log_failure(
            "remove_point_action",
            self.history.remove_point_action(&point_id),
            false,
        )
    }

    /// Rate-limited retention sweep. Returns the number of rides deleted.
    pub fn cleanup_old_rides(&self) -> u32 {
        log_failure("cleanup_old_rides", self.history.cleanup_old_rides(), 0)
    }

    /// Index entries inside the retention window as a JSON array.
    pub fn rides_within_retention_window_json(&self) -> String {
        let entries = log_failure(
            "rides_within_retention_window",
            self.history.rides_within_retention_window(),
            Vec::new(),
        );
        to_json("rides_within_retention_window", &entries, "[]")
    }

    pub fn get_index_json(&self) -> String {
        let entries = log_failure("get_index", self.history.get_index(), Vec::new());
        to_json("get_index", &entries, "[]")
    }

    /// Ride record as JSON, or None if it does not exist.
    pub fn get_ride_json(&self, ride_id: String) -> Option<String> {
        let ride = log_failure("get_ride", self.history.get_ride(&ride_id), None)?;
        serde_json::to_string(&ride)
            .map_err(|e| error!("[RideHistory] get_ride serialization failed: {}", e))
            .ok()
    }

    pub fn get_chunk_json(&self, chunk_key: String) -> String {
        let chunk = log_failure("get_chunk", self.history.get_chunk(&chunk_key), Vec::new());
        to_json("get_chunk", &chunk, "[]")
    }

    /// Ride plus full track as one JSON document, for sharing.
    pub fn export_ride_json(&self, ride_id: String) -> Option<String> {
        let export = log_failure("export_ride", self.history.export_ride(&ride_id), None)?;
        serde_json::to_string(&export)
            .map_err(|e| error!("[RideHistory] export_ride serialization failed: {}", e))
            .ok()
    }

    pub fn delete_ride(&self, ride_id: String) -> bool {
        log_failure("delete_ride", self.history.delete_ride(&ride_id), false)
    }

    pub fn clear_all(&self) -> u32 {
        log_failure("clear_all", self.history.clear_all(), 0)
    }
}
