//! Retention sweep against a SQLite-backed engine.

use std::sync::Arc;

use ridelog::{HistoryConfig, ManualClock, RideHistory, RideStatus, SharedFlag, SqliteStore};
use tempfile::TempDir;

const HOUR_MS: i64 = 3_600_000;
const DAY_MS: i64 = 24 * HOUR_MS;
const START_MS: i64 = 1_700_000_000_000;

fn setup(config: HistoryConfig) -> (RideHistory, Arc<ManualClock>, TempDir) {
    let _ = env_logger::builder().is_test(true).try_init();
    let tmp = TempDir::new().expect("failed to create temp dir");
    let db_path = tmp.path().join("retention.db");
    let store = SqliteStore::new(db_path.to_str().unwrap()).expect("failed to open store");
    let clock = Arc::new(ManualClock::new(START_MS));
    let history = RideHistory::builder(Box::new(store))
        .settings(Arc::new(SharedFlag::new(true)))
        .clock(clock.clone())
        .config(config)
        .open()
        .expect("failed to open history");
    (history, clock, tmp)
}

/// Record a closed ride with `points` track samples, starting at the current clock.
fn closed_ride(history: &RideHistory, clock: &ManualClock, points: i64) -> String {
    let id = history.start_ride(Vec::new(), 0).unwrap().unwrap();
    for i in 0..points {
        history.add_track_point(51.5, -0.12, 5.0, i, 0).unwrap();
    }
    clock.advance(HOUR_MS);
    history.close_current_ride("done").unwrap();
    id
}

#[test]
fn test_second_cleanup_within_hour_is_rate_limited() {
    let (history, clock, _tmp) = setup(HistoryConfig::default());
    let first = closed_ride(&history, &clock, 3);
    let second = closed_ride(&history, &clock, 3);

    // Only the first ride is past the window
    clock.set(START_MS + 30 * DAY_MS + 30 * 60 * 1000);
    assert_eq!(history.cleanup_old_rides().unwrap(), 1);
    assert!(history.get_ride(&first).unwrap().is_none());

    // The second ride has aged out too, but the sweep ran 45 minutes ago
    clock.advance(45 * 60 * 1000);
    assert_eq!(history.cleanup_old_rides().unwrap(), 0);
    assert!(history.get_ride(&second).unwrap().is_some());
}

#[test]
fn test_old_ride_removed_with_chunks() {
    let (history, clock, tmp) = setup(HistoryConfig {
        chunk_size: 4,
        ..HistoryConfig::default()
    });
    let old = closed_ride(&history, &clock, 10);
    let old_chunks = history.get_ride(&old).unwrap().unwrap().track.chunk_keys;
    assert_eq!(old_chunks.len(), 3);

    clock.advance(20 * DAY_MS);
    let recent = closed_ride(&history, &clock, 2);

    clock.advance(11 * DAY_MS);
    assert_eq!(history.cleanup_old_rides().unwrap(), 1);

    assert!(history.get_ride(&old).unwrap().is_none());
    for key in &old_chunks {
        assert!(history.get_chunk(key).unwrap().is_empty());
    }
    assert!(history.get_ride(&recent).unwrap().is_some());

    let ids: Vec<String> = history.get_index().unwrap().into_iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![recent.clone()]);

    // Only the recent ride, its chunk and the bookkeeping keys remain
    let store = SqliteStore::new(tmp.path().join("retention.db").to_str().unwrap()).unwrap();
    assert_eq!(store.key_count().unwrap(), 4);
}

#[test]
fn test_current_ride_survives_sweep() {
    let (history, clock, _tmp) = setup(HistoryConfig::default());
    let current = history.start_ride(Vec::new(), 0).unwrap().unwrap();
    history.add_track_point(51.5, -0.12, 5.0, 1, 0).unwrap();

    clock.advance(45 * DAY_MS);
    assert_eq!(history.cleanup_old_rides().unwrap(), 0);
    assert_eq!(history.current_ride_id().unwrap(), Some(current.clone()));
    assert_eq!(history.read_track(&current).unwrap().len(), 1);
}

#[test]
fn test_window_excludes_old_and_refreshes_open() {
    let (history, clock, _tmp) = setup(HistoryConfig::default());
    let old = closed_ride(&history, &clock, 1);

    clock.advance(35 * DAY_MS);
    let open = history.start_ride(Vec::new(), 0).unwrap().unwrap();
    history.add_track_point(51.5, -0.12, 5.0, 1, 0).unwrap();
    history.add_track_point(51.5, -0.12, 5.0, 2, 0).unwrap();
    history.update_distance(800.0).unwrap();
    clock.advance(10 * 60 * 1000);

    let entries = history.rides_within_retention_window().unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.id, open);
    assert_eq!(entry.status, RideStatus::Open);
    assert_eq!(entry.track_point_count, 2);
    assert_eq!(entry.distance_m, 800.0);
    assert_eq!(entry.duration_s, 600);

    // The stored index is not rewritten by the read
    let stored = history.get_index().unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().any(|e| e.id == old));
    assert_eq!(stored[0].track_point_count, 0);
}
