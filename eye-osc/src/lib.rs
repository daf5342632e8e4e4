//! OSC transmitter (gaze smoothing + VRChat endpoint dispatch) and command
//! listener (`recalibrate`/`recenter`/`sync_blink`) over UDP.

mod error;
mod listener;
mod transmitter;

pub use error::{Error, Result};
pub use listener::{Command, CommandListener};
pub use transmitter::Transmitter;
