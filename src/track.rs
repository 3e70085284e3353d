//! Chunked GPS track log.
//!
//! A ride's track is an append-only sequence of chunks stored under
//! `<ride-id>_<NNN>`. Every chunk except the last holds exactly `chunk_size`
//! points, so a single read or write never grows with ride length and a reader
//! can stream the track chunk by chunk.

use crate::error::Result;
use crate::persistence::{KeyValueStore, keys, read_record};
use crate::types::{TrackInfo, TrackPoint};

/// Outcome of appending one sample: the chunk to persist and the sample that
/// preceded the new one, if any.
#[derive(Debug)]
pub struct TrackAppend {
    pub chunk_key: String,
    pub chunk: Vec<TrackPoint>,
    pub previous: Option<TrackPoint>,
}

/// Append-only view over one ride's chunks.
pub struct TrackLog<'a> {
    store: &'a dyn KeyValueStore,
    ride_id: &'a str,
    chunk_size: usize,
}

impl<'a> TrackLog<'a> {
    pub fn new(store: &'a dyn KeyValueStore, ride_id: &'a str, chunk_size: usize) -> Self {
        Self {
            store,
            ride_id,
            chunk_size,
        }
    }

    /// Append `point`, updating `track` in place. Nothing is written; the
    /// caller persists the returned chunk together with the ride record.
    pub fn append(&self, track: &mut TrackInfo, point: TrackPoint) -> Result<TrackAppend> {
        let (chunk_key, mut chunk, previous) = match track.chunk_keys.last() {
            None => (keys::chunk(self.ride_id, 0), Vec::new(), None),
            Some(last_key) => {
                let last_chunk = read_chunk(self.store, last_key)?;
                let previous = last_chunk.last().cloned();
                if last_chunk.len() >= self.chunk_size {
                    let next_seq = keys::chunk_seq(self.ride_id, last_key)
                        .map(|seq| seq + 1)
                        .unwrap_or(track.chunk_keys.len());
                    (keys::chunk(self.ride_id, next_seq), Vec::new(), previous)
                } else {
                    (last_key.clone(), last_chunk, previous)
                }
            }
        };

        chunk.push(point);
        if track.chunk_keys.last() != Some(&chunk_key) {
            track.chunk_keys.push(chunk_key.clone());
        }
        track.track_point_count += 1;

        Ok(TrackAppend {
            chunk_key,
            chunk,
            previous,
        })
    }
}

/// Load one chunk; missing or malformed chunks are empty.
pub fn read_chunk(store: &dyn KeyValueStore, key: &str) -> Result<Vec<TrackPoint>> {
    Ok(read_record(store, key)?.unwrap_or_default())
}

/// Streams a ride's chunks in write order, one chunk per item.
pub struct TrackReader<'a> {
    store: &'a dyn KeyValueStore,
    keys: std::vec::IntoIter<String>,
}

impl<'a> TrackReader<'a> {
    pub fn new(store: &'a dyn KeyValueStore, track: &TrackInfo) -> Self {
        Self {
            store,
            keys: track.chunk_keys.clone().into_iter(),
        }
    }
}

impl Iterator for TrackReader<'_> {
    type Item = Result<Vec<TrackPoint>>;

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.keys.next()?;
        Some(read_chunk(self.store, &key))
    }
}

/// Every chunk key to delete for a ride: the ones it names, plus any orphans
/// found by prefix (a chunk written before a crash that lost the ride update).
pub fn chunk_keys_for_removal(
    store: &dyn KeyValueStore,
    ride_id: &str,
    track: Option<&TrackInfo>,
) -> Result<Vec<String>> {
    let mut keys_to_remove: Vec<String> = track.map(|t| t.chunk_keys.clone()).unwrap_or_default();
    for key in store.keys_with_prefix(&format!("{}_", ride_id))? {
        if keys::chunk_seq(ride_id, &key).is_some() && !keys_to_remove.contains(&key) {
            keys_to_remove.push(key);
        }
    }
    Ok(keys_to_remove)
}
