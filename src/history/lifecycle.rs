//! Ride lifecycle: start, close, delete.

use log::{debug, info, warn};

use super::{HistoryState, RideHistory, validate_snapshot};
use crate::error::Result;
use crate::persistence::{Batch, keys};
use crate::types::{IndexEntry, Ride, RideStatus, RouteSnapshot, Waypoint};

impl RideHistory {
    /// Open a new ride for `points_snapshot`, closing any open ride first.
    ///
    /// Returns `Ok(None)` without touching storage when history tracking is
    /// disabled.
    pub fn start_ride(
        &self,
        points_snapshot: Vec<Waypoint>,
        optimize_clicked_ts: i64,
    ) -> Result<Option<String>> {
        if !self.tracking_enabled() {
            debug!("[RideHistory] Tracking disabled, not starting a ride");
            return Ok(None);
        }
        validate_snapshot(&points_snapshot)?;

        let now = self.now();
        self.with_state(|state| {
            state.close_current(now, "superseded")?;
            state.close_orphaned_rides(now)?;

            let ride_id = state.allocate_ride_id(now)?;
            let points_count = points_snapshot.len();
            let ride = Ride::open(
                ride_id.clone(),
                now,
                RouteSnapshot {
                    optimize_clicked_ts,
                    points_snapshot,
                },
            );

            let mut index = state.load_index()?;
            index.prepend(IndexEntry::from_ride(&ride));

            let mut batch = Batch::new();
            batch.put_record(keys::ride(&ride_id), &ride)?;
            batch.put_record(keys::INDEX, &index)?;
            batch.put_string(keys::CURRENT_RIDE, ride_id.clone());
            batch.commit(state.store.as_mut())?;

            state.stops.clear();
            info!(
                "[RideHistory] Started ride {} with {} points",
                ride_id, points_count
            );
            Ok(Some(ride_id))
        })
    }

    /// Close the open ride, force-closing its open stops. Returns false if no
    /// ride is open.
    pub fn close_current_ride(&self, reason: &str) -> Result<bool> {
        let now = self.now();
        self.with_state(|state| state.close_current(now, reason))
    }

    /// Id of the open ride, if any.
    pub fn current_ride_id(&self) -> Result<Option<String>> {
        self.with_state(|state| state.current_ride_id())
    }

    /// Delete a ride with its chunks and index entry. Deleting the current
    /// ride also clears the pointer and the stop cache.
    pub fn delete_ride(&self, ride_id: &str) -> Result<bool> {
        self.with_state(|state| {
            let mut index = state.load_index()?;
            let mut batch = Batch::new();
            if !state.stage_ride_removal(&mut index, ride_id, &mut batch)? {
                return Ok(false);
            }

            let is_current = state.current_ride_id()?.as_deref() == Some(ride_id);
            batch.put_record(keys::INDEX, &index)?;
            if is_current {
                batch.remove(keys::CURRENT_RIDE);
            }
            batch.commit(state.store.as_mut())?;

            if is_current {
                state.stops.clear();
            }
            info!("[RideHistory] Deleted ride {}", ride_id);
            Ok(true)
        })
    }

    /// Delete every ride and chunk. Returns the number of rides removed.
    pub fn clear_all(&self) -> Result<u32> {
        self.with_state(|state| {
            let mut index = state.load_index()?;
            let mut ride_ids: Vec<String> = index.entries().iter().map(|e| e.id.clone()).collect();
            for key in state.store().keys_with_prefix(keys::RIDE_PREFIX)? {
                if let Some(id) = key.strip_prefix(keys::RIDE_PREFIX) {
                    if !ride_ids.iter().any(|r| r == id) {
                        ride_ids.push(id.to_string());
                    }
                }
            }

            let mut batch = Batch::new();
            let mut removed = 0;
            for ride_id in &ride_ids {
                if state.stage_ride_removal(&mut index, ride_id, &mut batch)? {
                    removed += 1;
                }
            }
            batch.remove(keys::INDEX);
            batch.remove(keys::CURRENT_RIDE);
            batch.commit(state.store.as_mut())?;

            state.stops.clear();
            info!("[RideHistory] Cleared {} rides", removed);
            Ok(removed)
        })
    }
}

impl HistoryState {
    /// Close the ride named by the pointer at `now`.
    pub(super) fn close_current(&mut self, now: i64, reason: &str) -> Result<bool> {
        let Some(ride_id) = self.current_ride_id()? else {
            return Ok(false);
        };
        let Some(mut ride) = self.load_ride(&ride_id)?.filter(Ride::is_open) else {
            warn!(
                "[RideHistory] Pointer '{}' names no open ride, clearing",
                ride_id
            );
            self.store.remove(keys::CURRENT_RIDE)?;
            self.stops.clear();
            return Ok(false);
        };

        let mut stops = self.stops.clone();
        let closed_stops = stops.close_all(&mut ride, now);
        finalize(&mut ride, now);

        let mut index = self.load_index()?;
        index.upsert_from(&ride);

        let mut batch = Batch::new();
        batch.put_record(keys::ride(&ride.id), &ride)?;
        batch.put_record(keys::INDEX, &index)?;
        batch.remove(keys::CURRENT_RIDE);
        batch.commit(self.store.as_mut())?;

        self.stops = stops;
        info!(
            "[RideHistory] Closed ride {} ({}): {}s, {:.0}m, {} track points, {} stops force-closed",
            ride.id,
            reason,
            ride.stats.duration_s,
            ride.stats.distance_m,
            ride.track.track_point_count,
            closed_stops
        );
        Ok(true)
    }

    /// Close rides the index still lists as open although no pointer names
    /// them (left behind by a crash between writes).
    pub(super) fn close_orphaned_rides(&mut self, now: i64) -> Result<usize> {
        let current = self.current_ride_id()?;
        let mut index = self.load_index()?;
        let orphan_ids: Vec<String> = index
            .open_ids()
            .filter(|id| current.as_deref() != Some(*id))
            .map(str::to_string)
            .collect();
        if orphan_ids.is_empty() {
            return Ok(0);
        }

        let mut batch = Batch::new();
        for ride_id in &orphan_ids {
            match self.load_ride(ride_id)? {
                Some(mut ride) => {
                    if ride.is_open() {
                        for stop in ride.stops.iter_mut().filter(|s| s.is_open()) {
                            stop.end_ts = Some(now);
                        }
                        finalize(&mut ride, now);
                        batch.put_record(keys::ride(ride_id), &ride)?;
                    }
                    index.upsert_from(&ride);
                }
                None => {
                    index.remove(ride_id);
                }
            }
        }
        batch.put_record(keys::INDEX, &index)?;
        batch.commit(self.store.as_mut())?;

        warn!("[RideHistory] Closed {} orphaned open rides", orphan_ids.len());
        Ok(orphan_ids.len())
    }
}

fn finalize(ride: &mut Ride, now: i64) {
    ride.status = RideStatus::Closed;
    ride.end_ts = Some(now);
    ride.stats.duration_s = ride.elapsed_s(now);
}
