//! In-ride updates: track samples, stop proximity, distance, re-optimization.

use log::{debug, warn};

use super::{RideHistory, validate_snapshot};
use crate::error::Result;
use crate::geo_utils::is_valid_coordinate;
use crate::persistence::{Batch, keys};
use crate::stops::StopTransition;
use crate::track::TrackLog;
use crate::types::{Reoptimization, TrackPoint, Waypoint};

impl RideHistory {
    /// Append a GPS sample to the current ride's track.
    ///
    /// Returns false when tracking is disabled, no ride is open, or the
    /// coordinates are unusable.
    pub fn add_track_point(
        &self,
        lat: f64,
        lng: f64,
        accuracy_meters: f64,
        ts: i64,
        segment_id: u32,
    ) -> Result<bool> {
        if !self.tracking_enabled() {
            return Ok(false);
        }
        if !is_valid_coordinate(lat, lng) {
            warn!("[RideHistory] Dropping track point with invalid coordinates ({}, {})", lat, lng);
            return Ok(false);
        }

        let chunk_size = self.config.chunk_size;
        let gap_threshold_ms = self.config.gps_gap_threshold_ms;
        self.with_state(|state| {
            let Some(mut ride) = state.load_current_ride()? else {
                return Ok(false);
            };

            let point = TrackPoint {
                ts,
                lat,
                lng,
                accuracy_meters: if accuracy_meters.is_finite() { accuracy_meters } else { 0.0 },
                segment_id,
            };
            let appended = TrackLog::new(state.store(), &ride.id, chunk_size)
                .append(&mut ride.track, point)?;

            if let Some(previous) = &appended.previous {
                if ts - previous.ts > gap_threshold_ms || previous.segment_id != segment_id {
                    ride.stats.gps_gap_count += 1;
                    debug!(
                        "[RideHistory] GPS gap on ride {}: {}ms, segment {} -> {}",
                        ride.id,
                        ts - previous.ts,
                        previous.segment_id,
                        segment_id
                    );
                }
            }
            ride.stats.last_gps_ts = Some(ts);

            let mut batch = Batch::new();
            batch.put_record(appended.chunk_key, &appended.chunk)?;
            batch.put_record(keys::ride(&ride.id), &ride)?;
            batch.commit(state.store.as_mut())?;
            Ok(true)
        })
    }

    /// Run the stop geofence for every waypoint of the current ride.
    ///
    /// Returns the transitions that fired; empty when no ride is open.
    pub fn check_stop_proximity(&self, lat: f64, lng: f64, ts: i64) -> Result<Vec<StopTransition>> {
        if !is_valid_coordinate(lat, lng) {
            return Ok(Vec::new());
        }

        self.with_state(|state| {
            let Some(mut ride) = state.load_current_ride()? else {
                return Ok(Vec::new());
            };

            let mut stops = state.stops.clone();
            let transitions = stops.evaluate(&mut ride, lat, lng, ts);
            if transitions.is_empty() {
                return Ok(transitions);
            }

            let mut batch = Batch::new();
            batch.put_record(keys::ride(&ride.id), &ride)?;
            batch.commit(state.store.as_mut())?;
            state.stops = stops;
            Ok(transitions)
        })
    }

    /// Overwrite the running distance and refresh the duration.
    pub fn update_distance(&self, distance_m: f64) -> Result<bool> {
        if !distance_m.is_finite() || distance_m < 0.0 {
            warn!("[RideHistory] Ignoring invalid distance {}", distance_m);
            return Ok(false);
        }

        let now = self.now();
        self.with_state(|state| {
            let Some(mut ride) = state.load_current_ride()? else {
                return Ok(false);
            };
            ride.stats.distance_m = distance_m;
            ride.stats.duration_s = ride.elapsed_s(now);

            let mut batch = Batch::new();
            batch.put_record(keys::ride(&ride.id), &ride)?;
            batch.commit(state.store.as_mut())?;
            Ok(true)
        })
    }

    /// Replace the current ride's waypoints after a mid-ride re-optimization.
    ///
    /// Recorded stops and actions are kept. Returns false when no ride is open
    /// or the snapshot is malformed.
    pub fn update_points_snapshot(&self, points_snapshot: Vec<Waypoint>, ts: i64) -> Result<bool> {
        if let Err(e) = validate_snapshot(&points_snapshot) {
            warn!("[RideHistory] Rejected re-optimized snapshot: {}", e);
            return Ok(false);
        }

        self.with_state(|state| {
            let Some(mut ride) = state.load_current_ride()? else {
                return Ok(false);
            };

            let points_count = points_snapshot.len() as u32;
            ride.route.points_snapshot = points_snapshot;
            ride.reoptimizations.push(Reoptimization { ts, points_count });

            let mut index = state.load_index()?;
            if !index.set_points_count(&ride.id, points_count) {
                index.upsert_from(&ride);
            }

            let mut batch = Batch::new();
            batch.put_record(keys::ride(&ride.id), &ride)?;
            batch.put_record(keys::INDEX, &index)?;
            batch.commit(state.store.as_mut())?;

            debug!(
                "[RideHistory] Ride {} re-optimized to {} points",
                ride.id, points_count
            );
            Ok(true)
        })
    }
}
