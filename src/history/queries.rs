//! Read-only access for history screens and export.

use super::RideHistory;
use crate::error::Result;
use crate::track::{TrackReader, read_chunk};
use crate::types::{IndexEntry, Ride, RideExport, TrackPoint};

impl RideHistory {
    /// All index entries, most recent first.
    pub fn get_index(&self) -> Result<Vec<IndexEntry>> {
        self.with_state(|state| Ok(state.load_index()?.into_entries()))
    }

    pub fn get_ride(&self, ride_id: &str) -> Result<Option<Ride>> {
        self.with_state(|state| state.load_ride(ride_id))
    }

    /// One chunk by key; missing chunks are empty.
    pub fn get_chunk(&self, chunk_key: &str) -> Result<Vec<TrackPoint>> {
        self.with_state(|state| read_chunk(state.store(), chunk_key))
    }

    /// The full track of a ride in write order. Empty for unknown rides.
    pub fn read_track(&self, ride_id: &str) -> Result<Vec<TrackPoint>> {
        let mut points = Vec::new();
        self.visit_track(ride_id, |chunk| points.extend_from_slice(chunk))?;
        Ok(points)
    }

    /// Stream a ride's track one chunk at a time without materializing it.
    /// Returns false if the ride does not exist.
    pub fn visit_track(
        &self,
        ride_id: &str,
        mut visit: impl FnMut(&[TrackPoint]),
    ) -> Result<bool> {
        self.with_state(|state| {
            let Some(ride) = state.load_ride(ride_id)? else {
                return Ok(false);
            };
            for chunk in TrackReader::new(state.store(), &ride.track) {
                visit(chunk?.as_slice());
            }
            Ok(true)
        })
    }

    /// Ride record plus its full track, for sharing or backup.
    pub fn export_ride(&self, ride_id: &str) -> Result<Option<RideExport>> {
        self.with_state(|state| {
            let Some(ride) = state.load_ride(ride_id)? else {
                return Ok(None);
            };
            let mut track = Vec::new();
            for chunk in TrackReader::new(state.store(), &ride.track) {
                track.extend(chunk?);
            }
            Ok(Some(RideExport { ride, track }))
        })
    }
}
