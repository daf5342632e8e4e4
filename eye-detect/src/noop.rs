//! HSRAC and RANSAC are registered in the algorithm chain to satisfy the
//! closed `Algorithm` set but have no specified behavior; both always
//! report `TRACKING_FAILED` so the chain falls through to the next
//! configured algorithm.

use eye_config::AlgorithmConfig;
use eye_types::{Algorithm, AnnotatedFrame, EyeData, GrayFrame, TrackerPosition};

use crate::detector::Detector;

pub struct Noop(pub Algorithm);

fn to_annotated(frame: &GrayFrame) -> AnnotatedFrame {
    image::DynamicImage::ImageLuma8(frame.clone()).to_rgb8()
}

impl Detector for Noop {
    fn algorithm(&self) -> Algorithm {
        self.0
    }

    fn run(
        &mut self,
        frame: &GrayFrame,
        _position: TrackerPosition,
        _config: &AlgorithmConfig,
    ) -> (EyeData, AnnotatedFrame) {
        (eye_types::TRACKING_FAILED, to_annotated(frame))
    }
}
