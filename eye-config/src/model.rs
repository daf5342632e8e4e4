use eye_types::{Algorithm, TrackerPosition};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use uuid::Uuid;

use crate::error::FieldError;

fn ip_address_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Ported from the IPv4/localhost/.local pattern used by the original
    // tracker's capture_source validator.
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)^
            (?:
                (?:https?://)?
                (?:(?:25[0-5]|2[0-4]\d|[01]?\d\d?)\.){3}(?:25[0-5]|2[0-4]\d|[01]?\d\d?)
                (?::\d{1,5})?
              | localhost(?::\d{1,5})?
              | https?://localhost(?::\d{1,5})?
              | [\w-]+\.local(?::\d{1,5})?
            )
            $",
        )
        .expect("static regex is valid")
    })
}

pub trait Validate {
    fn validate(&self, path: &str, errors: &mut Vec<FieldError>);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobConfig {
    pub threshold: i32,
    pub minsize: f64,
    pub maxsize: f64,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            threshold: 65,
            minsize: 10.0,
            maxsize: 25.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HsfConfig {
    pub default_radius: i32,
    pub auto_radius: bool,
    pub blink_stat_frames: usize,
    /// Skips `BlinkDetector` entirely, leaving `blink` at its last value.
    pub skip_blink_detection: bool,
    /// Skips `AutoRadiusCalc`'s radius search, pinning the radius to
    /// `default_radius` for every frame.
    pub skip_autoradius: bool,
    pub step_x: i32,
    pub step_y: i32,
    /// outer-radius-to-inner-radius ratio of the Haar surround feature.
    pub ratio_outer: f64,
    /// multiplier applied to the inner (dark-pupil) term of the response.
    pub kf: f64,
}

impl Default for HsfConfig {
    fn default() -> Self {
        Self {
            default_radius: 20,
            auto_radius: true,
            blink_stat_frames: 60,
            skip_blink_detection: false,
            skip_autoradius: false,
            step_x: 5,
            step_y: 5,
            ratio_outer: 3.0,
            kf: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    pub algorithm_order: Vec<Algorithm>,
    pub speed_coefficient: f64,
    pub min_cutoff: f64,
    pub blob: BlobConfig,
    pub hsf: HsfConfig,
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        Self {
            algorithm_order: vec![
                Algorithm::Blob,
                Algorithm::Hsrac,
                Algorithm::Ransac,
                Algorithm::Hsf,
            ],
            speed_coefficient: 0.9,
            min_cutoff: 0.0004,
            blob: BlobConfig::default(),
            hsf: HsfConfig::default(),
        }
    }
}

impl Validate for AlgorithmConfig {
    fn validate(&self, path: &str, errors: &mut Vec<FieldError>) {
        if self.algorithm_order.is_empty() {
            errors.push(FieldError {
                path: format!("{path}.algorithm_order"),
                message: "at least one algorithm must be defined".into(),
            });
            return;
        }
        let mut seen = std::collections::HashSet::new();
        for algo in &self.algorithm_order {
            if !seen.insert(algo) {
                errors.push(FieldError {
                    path: format!("{path}.algorithm_order"),
                    message: "cannot have duplicate algorithms defined".into(),
                });
                return;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub enabled: bool,
    pub capture_source: String,
    pub threshold: i32,
    pub focal_length: i32,
    pub rotation_angle: i32,
    pub flip_x: bool,
    pub flip_y: bool,
    pub roi_x: i32,
    pub roi_y: i32,
    pub roi_w: i32,
    pub roi_h: i32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            capture_source: String::new(),
            threshold: 50,
            focal_length: 30,
            rotation_angle: 0,
            flip_x: false,
            flip_y: false,
            roi_x: 0,
            roi_y: 0,
            roi_w: 0,
            roi_h: 0,
        }
    }
}

impl Validate for CameraConfig {
    fn validate(&self, path: &str, errors: &mut Vec<FieldError>) {
        for (field, value) in [
            ("roi_x", self.roi_x),
            ("roi_y", self.roi_y),
            ("roi_w", self.roi_w),
            ("roi_h", self.roi_h),
        ] {
            if value < 0 {
                errors.push(FieldError {
                    path: format!("{path}.{field}"),
                    message: "ROI values must be non-negative".into(),
                });
            }
        }
        if !self.capture_source.is_empty()
            && !self.capture_source.starts_with("serial:")
            && !ip_address_regex().is_match(&self.capture_source)
        {
            errors.push(FieldError {
                path: format!("{path}.capture_source"),
                message: "must be empty, a serial:<port> identifier, localhost, or a valid IPv4/.local address".into(),
            });
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub enabled: bool,
    pub name: String,
    pub uuid: Uuid,
    pub position: TrackerPosition,
    pub camera: CameraConfig,
    pub algorithm: AlgorithmConfig,
}

impl TrackerConfig {
    pub fn new(name: impl Into<String>, position: TrackerPosition) -> Self {
        Self {
            enabled: true,
            name: name.into(),
            uuid: Uuid::new_v4(),
            position,
            camera: CameraConfig::default(),
            algorithm: AlgorithmConfig::default(),
        }
    }

    /// Resets every field except `uuid` and `name`, matching the original
    /// tracker's `reset_tracker` semantics.
    pub fn reset_keep_identity(&mut self) {
        let uuid = self.uuid;
        let name = std::mem::take(&mut self.name);
        *self = TrackerConfig::new(name, TrackerPosition::Undefined);
        self.uuid = uuid;
    }
}

impl Validate for TrackerConfig {
    fn validate(&self, path: &str, errors: &mut Vec<FieldError>) {
        self.camera.validate(&format!("{path}.camera"), errors);
        self.algorithm.validate(&format!("{path}.algorithm"), errors);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscEndpoints {
    pub eyes_y: String,
    pub left_eye_x: String,
    pub right_eye_x: String,
    pub left_eye_blink: String,
    pub right_eye_blink: String,
    pub recenter: String,
    pub recalibrate: String,
    pub sync_blink: String,
}

impl Default for OscEndpoints {
    fn default() -> Self {
        Self {
            eyes_y: "/avatar/parameters/EyesY".into(),
            left_eye_x: "/avatar/parameters/LeftEyeX".into(),
            right_eye_x: "/avatar/parameters/RightEyeX".into(),
            left_eye_blink: "/avatar/parameters/LeftEyeLidExpandedSqueeze".into(),
            right_eye_blink: "/avatar/parameters/RightEyeLidExpandedSqueeze".into(),
            recenter: "/avatar/parameters/etvr_recenter".into(),
            recalibrate: "/avatar/parameters/etvr_recalibrate".into(),
            sync_blink: "/avatar/parameters/etvr_sync_blink".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscConfig {
    pub address: String,
    pub sending_port: u16,
    pub receiver_port: u16,
    pub mirror_eyes: bool,
    pub sync_blink: bool,
    pub enable_sending: bool,
    pub enable_receiving: bool,
    pub vrchat_native_tracking: bool,
    pub endpoints: OscEndpoints,
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".into(),
            sending_port: 9000,
            receiver_port: 9001,
            mirror_eyes: false,
            sync_blink: false,
            enable_sending: true,
            enable_receiving: true,
            vrchat_native_tracking: false,
            endpoints: OscEndpoints::default(),
        }
    }
}

impl Validate for OscConfig {
    fn validate(&self, path: &str, errors: &mut Vec<FieldError>) {
        if !ip_address_regex().is_match(&self.address) {
            errors.push(FieldError {
                path: format!("{path}.address"),
                message: "must be localhost or a valid IPv4/.local address".into(),
            });
        }
        // sending_port/receiver_port are u16, so the [1, 65535] range is
        // enforced by the type except for 0.
        if self.sending_port == 0 {
            errors.push(FieldError {
                path: format!("{path}.sending_port"),
                message: "port must be in [1, 65535]".into(),
            });
        }
        if self.receiver_port == 0 {
            errors.push(FieldError {
                path: format!("{path}.receiver_port"),
                message: "port must be in [1, 65535]".into(),
            });
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EyeTrackConfig {
    pub version: u32,
    pub debug: bool,
    pub affinity_mask: Vec<usize>,
    pub osc: OscConfig,
    pub trackers: Vec<TrackerConfig>,
}

impl Default for EyeTrackConfig {
    fn default() -> Self {
        Self {
            version: 2,
            debug: false,
            affinity_mask: Vec::new(),
            osc: OscConfig::default(),
            trackers: vec![
                TrackerConfig::new("left eye", TrackerPosition::LeftEye),
                TrackerConfig::new("right eye", TrackerPosition::RightEye),
            ],
        }
    }
}

impl EyeTrackConfig {
    /// Validates and, where repairable, repairs the tree in place:
    /// duplicate/empty uuids get fresh ones, and at most one enabled
    /// tracker per non-undefined position survives. Returns a warning for
    /// every repair made so callers can log them.
    pub fn normalize(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();
        let mut seen_uuids = std::collections::HashSet::new();
        for tracker in &mut self.trackers {
            if !seen_uuids.insert(tracker.uuid) {
                let old = tracker.uuid;
                tracker.uuid = Uuid::new_v4();
                warnings.push(format!(
                    "duplicate tracker uuid {old} repaired to {}",
                    tracker.uuid
                ));
                seen_uuids.insert(tracker.uuid);
            }
        }

        let mut seen_positions = std::collections::HashSet::new();
        for tracker in &mut self.trackers {
            if tracker.position == TrackerPosition::Undefined && tracker.enabled {
                tracker.enabled = false;
                warnings.push(format!(
                    "tracker {} has undefined position, forced disabled",
                    tracker.uuid
                ));
                continue;
            }
            if tracker.enabled && !seen_positions.insert(tracker.position) {
                tracker.enabled = false;
                warnings.push(format!(
                    "tracker {} duplicates an already-enabled {:?} tracker, disabled",
                    tracker.uuid, tracker.position
                ));
            }
        }
        warnings
    }

    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        self.osc.validate("osc", &mut errors);
        for (i, tracker) in self.trackers.iter().enumerate() {
            tracker.validate(&format!("trackers[{i}]"), &mut errors);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
