//! Shared data model for the eye-tracking pipeline: detection results, frame
//! aliases, and the small closed enums the rest of the workspace dispatches
//! on.

use serde::{Deserialize, Serialize};

mod one_euro;
pub use one_euro::OneEuroFilter;

pub type GrayFrame = image::GrayImage;
pub type AnnotatedFrame = image::RgbImage;

/// Where in the pipeline a tracker's output belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerPosition {
    LeftEye,
    RightEye,
    Mouth,
    #[default]
    Undefined,
}

/// The closed set of detection algorithms a tracker's `algorithm_order` may
/// name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Algorithm {
    Hsf,
    Blob,
    Leap,
    Ahsf,
    Hsrac,
    Ransac,
}

/// Immutable result of running the detection chain on one frame.
///
/// `position = Undefined` iff every algorithm in the chain failed on this
/// frame; that case is always the sentinel [`TRACKING_FAILED`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeData {
    pub x: f64,
    pub y: f64,
    pub blink: f64,
    pub position: TrackerPosition,
}

impl EyeData {
    pub fn new(x: f64, y: f64, blink: f64, position: TrackerPosition) -> Self {
        Self {
            x,
            y,
            blink,
            position,
        }
    }

    pub fn is_tracking_failed(&self) -> bool {
        *self == TRACKING_FAILED
    }
}

pub const TRACKING_FAILED: EyeData = EyeData {
    x: 0.0,
    y: 0.0,
    blink: 0.0,
    position: TrackerPosition::Undefined,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracking_failed_is_undefined_position() {
        assert_eq!(TRACKING_FAILED.position, TrackerPosition::Undefined);
        assert!(TRACKING_FAILED.is_tracking_failed());
    }

    #[test]
    fn non_sentinel_result_is_not_tracking_failed() {
        let e = EyeData::new(0.5, 0.5, 1.0, TrackerPosition::LeftEye);
        assert!(!e.is_tracking_failed());
    }
}
