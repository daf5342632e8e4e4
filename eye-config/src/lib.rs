//! Hot-reloadable, validated configuration tree for the tracking backend:
//! the `EyeTrackConfig` data model, a JSON-backed [`ConfigStore`] with a
//! mutation API that never persists a rejected update, and a debounced
//! filesystem watcher that notifies subscribers when the file changes
//! underneath them.

mod error;
mod model;
mod store;
mod watcher;

pub use error::{Error, FieldError, Result};
pub use model::{
    AlgorithmConfig, BlobConfig, CameraConfig, EyeTrackConfig, HsfConfig, OscConfig, OscEndpoints,
    TrackerConfig, Validate,
};
pub use store::{ConfigChanged, ConfigStore};
pub use watcher::watch;

#[cfg(test)]
mod integration_like_tests {
    use super::*;
    use eye_types::TrackerPosition;
    use uuid::Uuid;

    #[test]
    fn defaults_validate() {
        assert!(EyeTrackConfig::default().validate().is_ok());
    }

    #[test]
    fn duplicate_uuid_repair_emits_one_warning_and_distinct_uuids() {
        let mut cfg = EyeTrackConfig {
            trackers: vec![
                TrackerConfig::new("a", TrackerPosition::LeftEye),
                TrackerConfig::new("b", TrackerPosition::RightEye),
            ],
            ..EyeTrackConfig::default()
        };
        let shared = Uuid::new_v4();
        cfg.trackers[0].uuid = shared;
        cfg.trackers[1].uuid = shared;

        let warnings = cfg.normalize();
        assert_eq!(warnings.len(), 1);
        assert_ne!(cfg.trackers[0].uuid, cfg.trackers[1].uuid);
    }

    #[test]
    fn at_most_one_enabled_tracker_per_position_survives_normalize() {
        let mut cfg = EyeTrackConfig {
            trackers: vec![
                TrackerConfig::new("a", TrackerPosition::LeftEye),
                TrackerConfig::new("b", TrackerPosition::LeftEye),
            ],
            ..EyeTrackConfig::default()
        };
        cfg.normalize();
        let enabled_left = cfg
            .trackers
            .iter()
            .filter(|t| t.position == TrackerPosition::LeftEye && t.enabled)
            .count();
        assert_eq!(enabled_left, 1);
    }

    #[test]
    fn undefined_position_tracker_forced_disabled() {
        let mut cfg = EyeTrackConfig {
            trackers: vec![TrackerConfig::new("x", TrackerPosition::Undefined)],
            ..EyeTrackConfig::default()
        };
        cfg.normalize();
        assert!(!cfg.trackers[0].enabled);
    }
}
