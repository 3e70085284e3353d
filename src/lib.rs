//! Ridelog - on-device ride history for delivery routes
//!
//! This crate provides:
//! - Ride lifecycle with a single current ride
//! - Chunked GPS track log
//! - Hysteresis geofence stop detection per waypoint
//! - Delivered/skipped action recording
//! - Recency index and retention sweep
//! - SQLite persistence layer
//! - UniFFI bindings for iOS/Android (`ffi` feature)
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use ridelog::{MemoryStore, RideHistory, SharedFlag, Waypoint};
//!
//! let history = RideHistory::builder(Box::new(MemoryStore::new()))
//!     .settings(Arc::new(SharedFlag::new(true)))
//!     .open()
//!     .unwrap();
//!
//! let stops = vec![Waypoint::new("p1", "Bakery", 51.5074, -0.1278, 0)];
//! let ride_id = history.start_ride(stops, 0).unwrap().unwrap();
//! history.add_track_point(51.5075, -0.1279, 5.0, 1_000, 0).unwrap();
//! assert_eq!(history.current_ride_id().unwrap(), Some(ride_id));
//! ```

// Unified error handling
pub mod error;
pub use error::{HistoryError, Result};

// Configuration, settings flag and time source
pub mod clock;
pub mod config;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{HistoryConfig, SettingsProvider, SharedFlag};

// Geographic utilities
pub mod geo_utils;

// Persisted record types
pub mod types;
pub use types::{
    IndexEntry, PointActionRecord, Reoptimization, Ride, RideExport, RideStats, RideStatus,
    RouteSnapshot, Stop, TrackInfo, TrackPoint, Waypoint,
};

// Key-value persistence and typed record layer
pub mod persistence;
pub use persistence::{KeyValueStore, MemoryStore, SqliteStore, WriteOp};

// Building blocks driven by the history engine
pub mod actions;
pub mod index;
pub mod stops;
pub mod track;
pub use actions::PointAction;
pub use index::RideIndex;
pub use stops::{StopDetector, StopTransition, TransitionKind};
pub use track::TrackReader;

// Stateful history engine
pub mod history;
pub use history::{RideHistory, RideHistoryBuilder};

// FFI bindings for mobile platforms
#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android
#[cfg(target_os = "android")]
pub fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("ridelog"),
    );
}

/// Initialize logging for iOS
#[cfg(target_os = "ios")]
pub fn init_logging() {
    use std::sync::Once;

    static INIT: Once = Once::new();
    INIT.call_once(|| {
        oslog::OsLogger::new("ridelog")
            .level_filter(log::LevelFilter::Debug)
            .init()
            .ok();
    });
}

#[cfg(not(any(target_os = "android", target_os = "ios")))]
pub fn init_logging() {
    // No-op on desktop; hosts install their own logger
}
