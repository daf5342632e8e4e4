//! Capture worker: turns one configured camera source into a stream of
//! preprocessed grayscale frames on the capture→detector and
//! capture→visualization queues.

mod error;
mod preprocess;
mod serial_codec;
mod source;
mod worker;

pub use error::{Error, Result};
pub use preprocess::preprocess;
pub use source::{is_serial_source, open as open_source, CaptureSource, SerialSource, VideoSource};
pub use worker::{CaptureState, CapturedFrame, CaptureWorker};
