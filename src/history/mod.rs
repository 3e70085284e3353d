//! # Ride History Engine
//!
//! Stateful owner of the current ride. One `RideHistory` instance holds the
//! store handle, the current-ride pointer (persisted) and the active-stop
//! cache (in memory) behind a single mutex. Every operation takes the lock
//! for its whole read-modify-persist sequence and writes everything it
//! changed in one `commit`.
//!
//! ## Operations
//!
//! - Lifecycle: [`RideHistory::start_ride`], [`RideHistory::close_current_ride`],
//!   [`RideHistory::delete_ride`], [`RideHistory::clear_all`]
//! - Tracking: [`RideHistory::add_track_point`], [`RideHistory::check_stop_proximity`],
//!   [`RideHistory::update_distance`], [`RideHistory::update_points_snapshot`]
//! - Actions: [`RideHistory::record_point_action`], [`RideHistory::remove_point_action`]
//! - Retention: [`RideHistory::cleanup_old_rides`],
//!   [`RideHistory::rides_within_retention_window`]
//! - Reads: [`RideHistory::get_index`], [`RideHistory::get_ride`],
//!   [`RideHistory::read_track`], [`RideHistory::export_ride`]

use std::sync::{Arc, Mutex};

use log::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{HistoryConfig, SettingsProvider, SharedFlag};
use crate::error::{HistoryError, Result};
use crate::geo_utils::is_valid_coordinate;
use crate::index::RideIndex;
use crate::persistence::{Batch, KeyValueStore, keys, read_record, read_string};
use crate::stops::StopDetector;
use crate::track::chunk_keys_for_removal;
use crate::types::{Ride, Waypoint};

mod actions;
mod lifecycle;
mod queries;
mod retention;
mod tracking;

// ============================================================================
// Engine
// ============================================================================

/// Ride history engine. Cheap to share behind an `Arc`; all methods take `&self`.
pub struct RideHistory {
    state: Mutex<HistoryState>,
    settings: Arc<dyn SettingsProvider>,
    clock: Arc<dyn Clock>,
    config: HistoryConfig,
}

/// Everything guarded by the engine lock.
pub(crate) struct HistoryState {
    store: Box<dyn KeyValueStore>,
    stops: StopDetector,
    /// Disambiguates rides started within the same millisecond
    id_seq: u32,
}

/// Configures and opens a [`RideHistory`].
pub struct RideHistoryBuilder {
    store: Box<dyn KeyValueStore>,
    settings: Option<Arc<dyn SettingsProvider>>,
    clock: Option<Arc<dyn Clock>>,
    config: HistoryConfig,
}

impl RideHistoryBuilder {
    /// Settings provider for the tracking flag. Defaults to a flag that is off.
    pub fn settings(mut self, settings: Arc<dyn SettingsProvider>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Time source. Defaults to the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn config(mut self, config: HistoryConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate configuration, then restore the active-stop cache from the
    /// current ride's persisted open stops.
    pub fn open(self) -> Result<RideHistory> {
        self.config.validate()?;

        let mut state = HistoryState {
            store: self.store,
            stops: StopDetector::from_config(&self.config),
            id_seq: 0,
        };
        state.restore_active_stops()?;

        Ok(RideHistory {
            state: Mutex::new(state),
            settings: self
                .settings
                .unwrap_or_else(|| Arc::new(SharedFlag::new(false))),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            config: self.config,
        })
    }
}

impl RideHistory {
    pub fn builder(store: Box<dyn KeyValueStore>) -> RideHistoryBuilder {
        RideHistoryBuilder {
            store,
            settings: None,
            clock: None,
            config: HistoryConfig::default(),
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn tracking_enabled(&self) -> bool {
        self.settings.history_tracking_enabled()
    }

    /// Number of stops currently open in the in-memory cache.
    pub fn active_stop_count(&self) -> Result<usize> {
        self.with_state(|state| Ok(state.stops.active_count()))
    }

    fn now(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Run `f` with exclusive access to the engine state.
    fn with_state<R>(&self, f: impl FnOnce(&mut HistoryState) -> Result<R>) -> Result<R> {
        let mut guard = self.state.lock().map_err(|_| HistoryError::LockPoisoned)?;
        f(&mut guard)
    }
}

// ============================================================================
// Shared State Helpers
// ============================================================================

impl HistoryState {
    fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    fn current_ride_id(&self) -> Result<Option<String>> {
        read_string(self.store(), keys::CURRENT_RIDE)
    }

    fn load_ride(&self, ride_id: &str) -> Result<Option<Ride>> {
        read_record(self.store(), &keys::ride(ride_id))
    }

    /// The ride named by the pointer, if it exists and is still open.
    fn load_current_ride(&self) -> Result<Option<Ride>> {
        let Some(ride_id) = self.current_ride_id()? else {
            return Ok(None);
        };
        Ok(self.load_ride(&ride_id)?.filter(Ride::is_open))
    }

    fn load_index(&self) -> Result<RideIndex> {
        Ok(read_record(self.store(), keys::INDEX)?.unwrap_or_default())
    }

    fn allocate_ride_id(&mut self, now: i64) -> Result<String> {
        loop {
            self.id_seq = self.id_seq.wrapping_add(1);
            let id = format!("ride_{}_{}", now, self.id_seq);
            if self.store.get(&keys::ride(&id))?.is_none() {
                return Ok(id);
            }
        }
    }

    /// Stage deletion of a ride record, its chunks and its index entry.
    /// Returns false if neither the entry nor the record existed.
    fn stage_ride_removal(
        &self,
        index: &mut RideIndex,
        ride_id: &str,
        batch: &mut Batch,
    ) -> Result<bool> {
        let entry = index.remove(ride_id);
        let ride = self.load_ride(ride_id)?;
        if entry.is_none() && ride.is_none() {
            return Ok(false);
        }

        for key in chunk_keys_for_removal(self.store(), ride_id, ride.as_ref().map(|r| &r.track))? {
            batch.remove(key);
        }
        batch.remove(keys::ride(ride_id));
        Ok(true)
    }

    /// Rebuild the stop cache from persisted state. A pointer naming a
    /// missing or closed ride is cleared.
    fn restore_active_stops(&mut self) -> Result<()> {
        self.stops.clear();

        let Some(ride_id) = self.current_ride_id()? else {
            return Ok(());
        };

        match self.load_ride(&ride_id)? {
            Some(ride) if ride.is_open() => {
                self.stops.rebuild_from(&ride);
                if self.stops.active_count() > 0 {
                    info!(
                        "[RideHistory] Resumed {} open stops for ride {}",
                        self.stops.active_count(),
                        ride_id
                    );
                }
            }
            _ => {
                warn!(
                    "[RideHistory] Current ride pointer '{}' has no open ride, clearing",
                    ride_id
                );
                self.store.remove(keys::CURRENT_RIDE)?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Input Validation
// ============================================================================

/// Reject snapshots that cannot be stored or geofenced meaningfully.
pub(crate) fn validate_snapshot(points: &[Waypoint]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for point in points {
        if point.point_id.trim().is_empty() {
            return Err(HistoryError::invalid_snapshot("empty pointId"));
        }
        if !is_valid_coordinate(point.lat, point.lng) {
            return Err(HistoryError::invalid_snapshot(format!(
                "pointId '{}' has invalid coordinates ({}, {})",
                point.point_id, point.lat, point.lng
            )));
        }
        if !seen.insert(point.point_id.as_str()) {
            return Err(HistoryError::invalid_snapshot(format!(
                "duplicate pointId '{}'",
                point.point_id
            )));
        }
    }
    Ok(())
}
