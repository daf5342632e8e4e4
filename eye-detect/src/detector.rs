use eye_config::AlgorithmConfig;
use eye_types::{Algorithm, AnnotatedFrame, EyeData, GrayFrame, TrackerPosition};

/// Common contract every detection strategy satisfies: stateful across
/// frames, tolerant of frame-shape changes, producing one result plus an
/// annotated frame per call.
pub trait Detector: Send {
    fn algorithm(&self) -> Algorithm;

    fn run(
        &mut self,
        frame: &GrayFrame,
        position: TrackerPosition,
        config: &AlgorithmConfig,
    ) -> (EyeData, AnnotatedFrame);
}
