//! Pluggable pupil/gaze detection strategies (HSF, Blob, LEAP, AHSF, plus
//! registered no-op HSRAC/RANSAC slots) behind a common [`Detector`]
//! contract, and a [`DetectorChain`] that dispatches them in configured
//! order with fallback on `TRACKING_FAILED`.

mod ahsf;
mod blob;
mod chain;
mod detector;
mod error;
mod hsf;
mod integral;
mod leap;
mod noop;

pub use ahsf::Ahsf;
pub use blob::Blob;
pub use chain::DetectorChain;
pub use detector::Detector;
pub use error::{Error, Result};
pub use hsf::Hsf;
pub use leap::{LandmarkModel, Leap, NotLoaded};
pub use noop::Noop;

#[cfg(feature = "leap-onnx")]
pub mod leap_onnx;
