//! Retention window reads and the rate-limited sweep.

use log::{debug, info, warn};

use super::RideHistory;
use crate::error::Result;
use crate::persistence::{Batch, keys, read_timestamp};
use crate::types::{IndexEntry, RideStatus};

impl RideHistory {
    /// Delete rides that started before the retention window.
    ///
    /// Runs at most once per cleanup interval; a call inside the interval
    /// returns 0 without scanning. The last-run timestamp is written on every
    /// run that is allowed, whether or not anything was deleted. The open ride
    /// is never swept.
    pub fn cleanup_old_rides(&self) -> Result<u32> {
        let now = self.now();
        let interval_ms = self.config.cleanup_interval_ms();
        let cutoff = now - self.config.retention_window_ms();

        self.with_state(|state| {
            match read_timestamp(state.store(), keys::LAST_CLEANUP)? {
                Some(last) if last > now => {
                    warn!(
                        "[RideHistory] Last cleanup {} is ahead of now {}, running anyway",
                        last, now
                    );
                }
                Some(last) if now - last <= interval_ms => {
                    debug!(
                        "[RideHistory] Cleanup skipped: last run {}ms ago",
                        now - last
                    );
                    return Ok(0);
                }
                _ => {}
            }

            let current = state.current_ride_id()?;
            let mut index = state.load_index()?;
            let mut batch = Batch::new();
            let mut deleted = 0;

            for ride_id in index.started_before(cutoff) {
                if current.as_deref() == Some(ride_id.as_str()) {
                    continue;
                }
                if state.stage_ride_removal(&mut index, &ride_id, &mut batch)? {
                    deleted += 1;
                }
            }

            if deleted > 0 {
                batch.put_record(keys::INDEX, &index)?;
            }
            batch.put_string(keys::LAST_CLEANUP, now.to_string());
            batch.commit(state.store.as_mut())?;

            if deleted > 0 {
                info!(
                    "[RideHistory] Cleaned up {} rides older than {} days",
                    deleted, self.config.retention_days
                );
            }
            Ok(deleted)
        })
    }

    /// Index entries inside the retention window, most recent first.
    ///
    /// Open entries are refreshed from the live ride record, since the index
    /// copy of an in-progress ride lags behind its stats.
    pub fn rides_within_retention_window(&self) -> Result<Vec<IndexEntry>> {
        let now = self.now();
        let cutoff = now - self.config.retention_window_ms();

        self.with_state(|state| {
            let mut entries = state.load_index()?.started_since(cutoff);
            for entry in entries.iter_mut().filter(|e| e.status == RideStatus::Open) {
                if let Some(ride) = state.load_ride(&entry.id)? {
                    entry.distance_m = ride.stats.distance_m;
                    entry.duration_s = ride.elapsed_s(now);
                    entry.track_point_count = ride.track.track_point_count;
                }
            }
            Ok(entries)
        })
    }
}
