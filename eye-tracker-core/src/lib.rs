//! Wires the capture/detector/transmitter crates together into trackers and
//! an orchestrator, driven by the hot-reloadable config store, plus the
//! REST control plane that drives them from outside the process.

mod lifecycle;
mod orchestrator;
mod queues;
mod rest;
mod tracker;

pub use orchestrator::{Orchestrator, Status};
pub use rest::{router, AppState};
pub use tracker::Tracker;
