//! The `DISCONNECTED → CONNECTING → CONNECTED` capture loop.

use std::time::{Duration, Instant};

use eye_config::CameraConfig;
use eye_types::GrayFrame;

use crate::preprocess::preprocess;
use crate::source::{self, CaptureSource};

const SERIAL_RETRY_BACKOFF: Duration = Duration::from_millis(2_500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Disconnected,
    Connecting,
    Connected,
}

/// One preprocessed frame bound for the visualization or detector queue,
/// with the `fps` the worker itself measured when the source did not
/// supply one (serial sources never do).
#[derive(Clone)]
pub struct CapturedFrame {
    pub frame: GrayFrame,
    pub fps: Option<f64>,
}

/// Drives one capture source through its reconnect loop, pushing
/// preprocessed frames onto the two queues it's given.
pub struct CaptureWorker {
    state: CaptureState,
    source: Option<Box<dyn CaptureSource>>,
    last_iteration: Option<Instant>,
    last_serial_attempt: Option<Instant>,
}

impl CaptureWorker {
    pub fn new() -> Self {
        Self {
            state: CaptureState::Disconnected,
            source: None,
            last_iteration: None,
            last_serial_attempt: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Runs one iteration: reconnects if needed, reads one frame, and
    /// preprocesses it. Returns `None` when idle (empty source) or
    /// disconnected this iteration; the caller should call again.
    pub fn step(
        &mut self,
        config: &CameraConfig,
        viz_q: &eye_queue::Writer<CapturedFrame>,
        detector_q: &eye_queue::Writer<CapturedFrame>,
    ) -> Option<()> {
        if config.capture_source.is_empty() {
            self.state = CaptureState::Disconnected;
            self.source = None;
            return None;
        }

        if self.source.is_none() {
            if source::is_serial_source(&config.capture_source) {
                if let Some(last) = self.last_serial_attempt {
                    if last.elapsed() < SERIAL_RETRY_BACKOFF {
                        return None;
                    }
                }
                self.last_serial_attempt = Some(Instant::now());
            }

            self.state = CaptureState::Connecting;
            match source::open(&config.capture_source) {
                Ok(s) => {
                    self.source = Some(s);
                    self.state = CaptureState::Connected;
                }
                Err(e) => {
                    tracing::warn!(error = %e, source = %config.capture_source, "capture source connect failed");
                    self.state = CaptureState::Disconnected;
                    return None;
                }
            }
        }

        let now = Instant::now();
        let delta_time = self.last_iteration.map(|prev| now.duration_since(prev).as_secs_f64());
        self.last_iteration = Some(now);

        let source = self.source.as_mut().unwrap();
        let raw = match source.read_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "capture read failed, disconnecting");
                self.source = None;
                self.state = CaptureState::Disconnected;
                return None;
            }
        };

        let (viz_frame, detector_frame) = preprocess(&raw, config);
        let fps = delta_time.filter(|dt| *dt > 0.0).map(|dt| 1.0 / dt);

        viz_q.push(CapturedFrame { frame: viz_frame, fps });
        detector_q.push(CapturedFrame { frame: detector_frame, fps });
        Some(())
    }
}

impl Default for CaptureWorker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eye_queue::OverflowPolicy;

    #[test]
    fn empty_source_stays_disconnected_and_idle() {
        let mut worker = CaptureWorker::new();
        let config = CameraConfig::default();
        let (viz_w, _viz_r) = eye_queue::bounded::<CapturedFrame>("viz", 4, OverflowPolicy::DropNewest);
        let (det_w, _det_r) = eye_queue::bounded::<CapturedFrame>("det", 4, OverflowPolicy::DropNewest);

        assert!(worker.step(&config, &viz_w, &det_w).is_none());
        assert_eq!(worker.state(), CaptureState::Disconnected);
    }

    #[test]
    fn unreachable_video_source_reports_disconnected() {
        let mut worker = CaptureWorker::new();
        let mut config = CameraConfig::default();
        config.capture_source = "http://127.0.0.1:1/nonexistent".to_string();
        let (viz_w, _viz_r) = eye_queue::bounded::<CapturedFrame>("viz", 4, OverflowPolicy::DropNewest);
        let (det_w, _det_r) = eye_queue::bounded::<CapturedFrame>("det", 4, OverflowPolicy::DropNewest);

        assert!(worker.step(&config, &viz_w, &det_w).is_none());
        assert_eq!(worker.state(), CaptureState::Disconnected);
    }
}
