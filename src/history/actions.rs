use log::{debug, warn};

use super::RideHistory;
use crate::actions::{PointAction, clear_action, record_action};
use crate::error::{HistoryError, Result};
use crate::persistence::{Batch, keys};

impl RideHistory {
    /// Record a delivered/skipped action for a waypoint of the current ride.
    ///
    /// `action` is matched case-insensitively against the app's locale
    /// labels; anything else is [`HistoryError::UnknownAction`].
    pub fn record_point_action(&self, point_id: &str, action: &str, ts: i64) -> Result<bool> {
        if !self.tracking_enabled() {
            return Ok(false);
        }
        let action =
            PointAction::parse(action).ok_or_else(|| HistoryError::UnknownAction(action.to_string()))?;
        if point_id.trim().is_empty() {
            warn!("[RideHistory] Ignoring {} action with empty pointId", action.as_str());
            return Ok(false);
        }

        self.with_state(|state| {
            let Some(mut ride) = state.load_current_ride()? else {
                return Ok(false);
            };
            record_action(&mut ride.actions, point_id, action, ts);

            let mut batch = Batch::new();
            batch.put_record(keys::ride(&ride.id), &ride)?;
            batch.commit(state.store.as_mut())?;

            debug!(
                "[RideHistory] Point '{}' marked {} on ride {}",
                point_id,
                action.as_str(),
                ride.id
            );
            Ok(true)
        })
    }

    /// Clear any recorded action for a waypoint. True whenever a ride is
    /// open, including when nothing was recorded.
    pub fn remove_point_action(&self, point_id: &str) -> Result<bool> {
        self.with_state(|state| {
            let Some(mut ride) = state.load_current_ride()? else {
                return Ok(false);
            };
            if !clear_action(&mut ride.actions, point_id) {
                return Ok(true);
            }

            let mut batch = Batch::new();
            batch.put_record(keys::ride(&ride.id), &ride)?;
            batch.commit(state.store.as_mut())?;
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::config::SharedFlag;
    use crate::error::HistoryError;
    use crate::persistence::MemoryStore;
    use crate::types::{PointActionRecord, Waypoint};
    use crate::RideHistory;

    fn engine(flag: Arc<SharedFlag>) -> RideHistory {
        RideHistory::builder(Box::new(MemoryStore::new()))
            .settings(flag)
            .open()
            .unwrap()
    }

    #[test]
    fn test_record_and_reclassify() {
        let history = engine(Arc::new(SharedFlag::new(true)));
        let id = history
            .start_ride(vec![Waypoint::new("p", "", 1.0, 1.0, 0)], 0)
            .unwrap()
            .unwrap();

        assert!(history.record_point_action("p", "Delivered", 10).unwrap());
        assert!(history.record_point_action("p", "Skipped", 20).unwrap());

        let ride = history.get_ride(&id).unwrap().unwrap();
        assert_eq!(
            ride.actions["p"],
            PointActionRecord {
                delivered_at: None,
                skipped_at: Some(20),
            }
        );
    }

    #[test]
    fn test_unknown_action_is_error() {
        let history = engine(Arc::new(SharedFlag::new(true)));
        history.start_ride(Vec::new(), 0).unwrap();
        let result = history.record_point_action("p", "teleported", 1);
        assert!(matches!(result, Err(HistoryError::UnknownAction(_))));
    }

    #[test]
    fn test_disabled_tracking_ignores_actions() {
        let flag = Arc::new(SharedFlag::new(true));
        let history = engine(flag.clone());
        history.start_ride(Vec::new(), 0).unwrap();

        flag.set(false);
        assert!(!history.record_point_action("p", "delivered", 1).unwrap());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let history = engine(Arc::new(SharedFlag::new(true)));
        assert!(!history.remove_point_action("p").unwrap());

        let id = history.start_ride(Vec::new(), 0).unwrap().unwrap();
        assert!(history.remove_point_action("p").unwrap());

        history.record_point_action("p", "skipped", 5).unwrap();
        assert!(history.remove_point_action("p").unwrap());
        assert!(history.remove_point_action("p").unwrap());
        assert!(history.get_ride(&id).unwrap().unwrap().actions.is_empty());
    }
}
