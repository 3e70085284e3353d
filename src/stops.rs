//! Waypoint stop detection.
//!
//! Each waypoint runs a two-state geofence, `NoStop -> Active -> NoStop`, with
//! hysteresis: a stop opens at or inside the enter radius and closes only
//! beyond the exit radius. Samples in between change nothing, which keeps GPS
//! jitter at the fence edge from flapping a stop open and closed.
//!
//! The detector's active set is a cache. The ride's persisted `stops` list is
//! authoritative, and [`StopDetector::rebuild_from`] restores the cache from it
//! after a restart.

use std::collections::HashMap;

use log::debug;

use crate::config::HistoryConfig;
use crate::geo_utils::haversine_distance;
use crate::types::{Ride, Stop};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    Entered,
    Exited,
}

/// A stop opening or closing at one waypoint.
#[derive(Debug, Clone, PartialEq)]
pub struct StopTransition {
    pub point_id: String,
    pub kind: TransitionKind,
    pub ts: i64,
    /// Device distance from the waypoint when the transition fired
    pub distance_m: f64,
}

#[derive(Debug, Clone, Copy)]
struct ActiveStop {
    start_ts: i64,
    center_lat: f64,
    center_lng: f64,
}

/// Hysteresis geofence over the waypoints of the current ride.
#[derive(Debug, Clone)]
pub struct StopDetector {
    enter_radius_m: f64,
    exit_radius_m: f64,
    /// pointId -> stop currently open at that waypoint
    active: HashMap<String, ActiveStop>,
}

impl StopDetector {
    pub fn new(enter_radius_m: f64, exit_radius_m: f64) -> Self {
        Self {
            enter_radius_m,
            exit_radius_m,
            active: HashMap::new(),
        }
    }

    pub fn from_config(config: &HistoryConfig) -> Self {
        Self::new(config.stop_enter_radius_m, config.stop_exit_radius_m)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, point_id: &str) -> bool {
        self.active.contains_key(point_id)
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }

    /// Replace the cache with the ride's persisted open stops.
    pub fn rebuild_from(&mut self, ride: &Ride) {
        self.active.clear();
        for stop in ride.open_stops() {
            self.active.insert(
                stop.point_id.clone(),
                ActiveStop {
                    start_ts: stop.start_ts,
                    center_lat: stop.center_lat,
                    center_lng: stop.center_lng,
                },
            );
        }
    }

    /// Feed one position sample. Mutates `ride.stops` for every transition;
    /// the caller persists the ride when the result is non-empty.
    pub fn evaluate(&mut self, ride: &mut Ride, lat: f64, lng: f64, ts: i64) -> Vec<StopTransition> {
        let mut transitions = Vec::new();

        for waypoint in &ride.route.points_snapshot {
            let distance = haversine_distance(lat, lng, waypoint.lat, waypoint.lng);
            let active = self.active.get(&waypoint.point_id).copied();

            match active {
                None if distance <= self.enter_radius_m => {
                    let stop = ActiveStop {
                        start_ts: ts,
                        center_lat: waypoint.lat,
                        center_lng: waypoint.lng,
                    };
                    ride.stops.push(Stop {
                        point_id: waypoint.point_id.clone(),
                        start_ts: ts,
                        end_ts: None,
                        center_lat: stop.center_lat,
                        center_lng: stop.center_lng,
                    });
                    self.active.insert(waypoint.point_id.clone(), stop);
                    debug!(
                        "[RideHistory] Stop opened at '{}' ({:.1}m)",
                        waypoint.point_id, distance
                    );
                    transitions.push(StopTransition {
                        point_id: waypoint.point_id.clone(),
                        kind: TransitionKind::Entered,
                        ts,
                        distance_m: distance,
                    });
                }
                Some(stop) if distance > self.exit_radius_m => {
                    close_persisted_stop(&mut ride.stops, &waypoint.point_id, stop, ts);
                    self.active.remove(&waypoint.point_id);
                    debug!(
                        "[RideHistory] Stop closed at '{}' ({:.1}m)",
                        waypoint.point_id, distance
                    );
                    transitions.push(StopTransition {
                        point_id: waypoint.point_id.clone(),
                        kind: TransitionKind::Exited,
                        ts,
                        distance_m: distance,
                    });
                }
                // Dead zone, or no change of side
                _ => {}
            }
        }

        transitions
    }

    /// Close every cached stop at `ts`, then any persisted stop still open
    /// (one the cache never learned about). Returns the number closed.
    pub fn close_all(&mut self, ride: &mut Ride, ts: i64) -> usize {
        let mut closed = 0;
        for (point_id, stop) in self.active.drain() {
            close_persisted_stop(&mut ride.stops, &point_id, stop, ts);
            closed += 1;
        }
        for stop in ride.stops.iter_mut().filter(|s| s.is_open()) {
            stop.end_ts = Some(ts);
            closed += 1;
        }
        closed
    }
}

/// Set `end_ts` on the persisted stop matching the cached one. If it has gone
/// missing, append a closed stop rather than lose the interval.
fn close_persisted_stop(stops: &mut Vec<Stop>, point_id: &str, active: ActiveStop, ts: i64) {
    let persisted = stops
        .iter_mut()
        .find(|s| s.point_id == point_id && s.start_ts == active.start_ts && s.is_open());

    match persisted {
        Some(stop) => stop.end_ts = Some(ts),
        None => stops.push(Stop {
            point_id: point_id.to_string(),
            start_ts: active.start_ts,
            end_ts: Some(ts),
            center_lat: active.center_lat,
            center_lng: active.center_lng,
        }),
    }
}
