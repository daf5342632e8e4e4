use eye_config::AlgorithmConfig;
use eye_types::{Algorithm, AnnotatedFrame, EyeData, GrayFrame, TrackerPosition};

use crate::ahsf::Ahsf;
use crate::blob::Blob;
use crate::detector::Detector;
use crate::hsf::Hsf;
use crate::leap::Leap;
use crate::noop::Noop;

fn build_one(algorithm: Algorithm, config: &AlgorithmConfig) -> Box<dyn Detector> {
    match algorithm {
        Algorithm::Hsf => Box::new(Hsf::new(&config.hsf)),
        Algorithm::Blob => Box::new(Blob::new()),
        Algorithm::Ahsf => Box::new(Ahsf::new(&config.hsf)),
        Algorithm::Leap => Box::new(Leap::not_loaded()),
        Algorithm::Hsrac => Box::new(Noop(Algorithm::Hsrac)),
        Algorithm::Ransac => Box::new(Noop(Algorithm::Ransac)),
    }
}

fn to_annotated(frame: &GrayFrame) -> AnnotatedFrame {
    image::DynamicImage::ImageLuma8(frame.clone()).to_rgb8()
}

/// Runs the configured algorithms in order, falling through to the next on
/// `TRACKING_FAILED`, always feeding each algorithm the original frame
/// rather than a previous algorithm's annotated output. Rebuilds every
/// detector instance whenever the algorithm configuration changes.
pub struct DetectorChain {
    detectors: Vec<Box<dyn Detector>>,
    config: AlgorithmConfig,
}

impl DetectorChain {
    pub fn new(config: AlgorithmConfig) -> Self {
        let detectors = config.algorithm_order.iter().map(|a| build_one(*a, &config)).collect();
        Self { detectors, config }
    }

    pub fn reconfigure(&mut self, config: AlgorithmConfig) {
        if config != self.config {
            self.detectors = config
                .algorithm_order
                .iter()
                .map(|a| build_one(*a, &config))
                .collect();
            self.config = config;
        }
    }

    pub fn run(&mut self, frame: &GrayFrame, position: TrackerPosition) -> (EyeData, AnnotatedFrame) {
        if self.detectors.is_empty() {
            return (eye_types::TRACKING_FAILED, to_annotated(frame));
        }
        let mut last_annotated = to_annotated(frame);
        for detector in &mut self.detectors {
            let (result, annotated) = detector.run(frame, position, &self.config);
            last_annotated = annotated;
            if !result.is_tracking_failed() {
                return (result, last_annotated);
            }
        }
        (eye_types::TRACKING_FAILED, last_annotated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eye_config::{AlgorithmConfig, BlobConfig};
    use image::{GrayImage, Luma};

    #[test]
    fn falls_back_through_the_whole_chain_and_reports_tracking_failed() {
        // BLOB is configured so no contour on a blank frame can match its
        // size window; HSRAC/RANSAC are always-failing placeholders. Every
        // algorithm in the chain fails, so the chain itself must too.
        let mut cfg = AlgorithmConfig::default();
        cfg.algorithm_order = vec![Algorithm::Blob, Algorithm::Hsrac, Algorithm::Ransac];
        cfg.blob = BlobConfig {
            threshold: 10,
            minsize: 5.0,
            maxsize: 10.0,
        };
        let mut chain = DetectorChain::new(cfg);
        let frame = GrayImage::from_pixel(256, 256, Luma([255]));
        let (result, _annotated) = chain.run(&frame, TrackerPosition::LeftEye);
        assert!(result.is_tracking_failed());
    }

    #[test]
    fn reconfigure_rebuilds_detectors_on_change() {
        let mut cfg = AlgorithmConfig::default();
        cfg.algorithm_order = vec![Algorithm::Blob];
        let mut chain = DetectorChain::new(cfg.clone());
        cfg.algorithm_order = vec![Algorithm::Hsf];
        chain.reconfigure(cfg);
        assert_eq!(chain.detectors.len(), 1);
        assert_eq!(chain.detectors[0].algorithm(), Algorithm::Hsf);
    }
}
