//! Engine configuration and the external "history tracking enabled" flag.

use crate::error::{HistoryError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Tunables for the history engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryConfig {
    /// Maximum track points per persisted chunk (default: 500)
    pub chunk_size: usize,
    /// Distance at or below which a waypoint stop opens, meters (default: 50m)
    pub stop_enter_radius_m: f64,
    /// Distance above which an open stop closes, meters (default: 70m)
    pub stop_exit_radius_m: f64,
    /// Rides older than this are swept (default: 30 days)
    pub retention_days: u32,
    /// Minimum time between two retention sweeps (default: 6 hours)
    pub cleanup_interval_hours: u32,
    /// Sample spacing that counts as a GPS gap, milliseconds (default: 30s)
    pub gps_gap_threshold_ms: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            stop_enter_radius_m: 50.0,
            stop_exit_radius_m: 70.0,
            retention_days: 30,
            cleanup_interval_hours: 6,
            gps_gap_threshold_ms: 30_000,
        }
    }
}

impl HistoryConfig {
    /// Parse a (possibly partial) JSON object over the defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: HistoryConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(HistoryError::config("chunkSize must be at least 1"));
        }
        if !(self.stop_enter_radius_m > 0.0) {
            return Err(HistoryError::config("stopEnterRadiusM must be positive"));
        }
        if self.stop_exit_radius_m < self.stop_enter_radius_m {
            return Err(HistoryError::config(format!(
                "stopExitRadiusM ({}) must not be below stopEnterRadiusM ({})",
                self.stop_exit_radius_m, self.stop_enter_radius_m
            )));
        }
        if self.gps_gap_threshold_ms <= 0 {
            return Err(HistoryError::config("gpsGapThresholdMs must be positive"));
        }
        Ok(())
    }

    pub fn retention_window_ms(&self) -> i64 {
        self.retention_days as i64 * 24 * 60 * 60 * 1000
    }

    pub fn cleanup_interval_ms(&self) -> i64 {
        self.cleanup_interval_hours as i64 * 60 * 60 * 1000
    }
}

/// Read access to the host app's settings store.
///
/// Only the tracking flag is consulted. It is read on every check so a
/// settings change takes effect on the next call.
pub trait SettingsProvider: Send + Sync {
    fn history_tracking_enabled(&self) -> bool;
}

impl<F> SettingsProvider for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn history_tracking_enabled(&self) -> bool {
        self()
    }
}

/// Settings provider backed by an atomic flag the host toggles.
#[derive(Debug, Default)]
pub struct SharedFlag {
    enabled: AtomicBool,
}

impl SharedFlag {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn set(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }
}

impl SettingsProvider for SharedFlag {
    fn history_tracking_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}
