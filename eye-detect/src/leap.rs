//! LEAP: a neural landmark detector. Per frame, resize to 112x112, convert
//! to RGB, normalize to [0,1], transpose to CHW, run inference, and smooth
//! the resulting 7 landmarks through a One-Euro filter. Blink is derived
//! from the distance between landmarks 1 and 3 against a rolling window of
//! the last 5000 such distances.
//!
//! Actual inference is behind the [`LandmarkModel`] trait so the crate
//! builds and runs without an ONNX asset; [`NotLoaded`] is the default and
//! always reports `TRACKING_FAILED`.

use std::collections::VecDeque;

use eye_config::AlgorithmConfig;
use eye_types::{Algorithm, AnnotatedFrame, EyeData, GrayFrame, OneEuroFilter, TrackerPosition};
use image::{imageops::FilterType, Rgb};
use imageproc::drawing::draw_filled_circle_mut;

use crate::detector::Detector;
use crate::error::{Error, Result};

const INPUT_SIZE: u32 = 112;
const LANDMARKS: usize = 7;
const BLINK_WINDOW: usize = 5000;
const MIN_CUTOFF: f64 = 0.9;
const BETA: f64 = 5.0;

/// Runs a loaded landmark model: input is `112x112x3` RGB in `[0,1]`, CHW
/// layout, with a leading batch dimension; output is 7 `(x, y)` points in
/// normalized image coordinates.
pub trait LandmarkModel: Send {
    fn infer(&mut self, chw_input: &[f32]) -> Result<[(f64, f64); LANDMARKS]>;
}

/// Always-available placeholder used when no ONNX asset is configured;
/// every call reports `TRACKING_FAILED` so the chain falls through to the
/// next algorithm rather than panicking.
pub struct NotLoaded;

impl LandmarkModel for NotLoaded {
    fn infer(&mut self, _chw_input: &[f32]) -> Result<[(f64, f64); LANDMARKS]> {
        Err(Error::ModelNotLoaded)
    }
}

pub struct Leap {
    model: Box<dyn LandmarkModel>,
    filter: OneEuroFilter,
    blink_distances: VecDeque<f64>,
}

impl Leap {
    pub fn new(model: Box<dyn LandmarkModel>) -> Self {
        Self {
            model,
            filter: OneEuroFilter::new(LANDMARKS * 2, MIN_CUTOFF, BETA),
            blink_distances: VecDeque::with_capacity(BLINK_WINDOW),
        }
    }

    pub fn not_loaded() -> Self {
        Self::new(Box::new(NotLoaded))
    }
}

fn to_chw_input(frame: &GrayFrame) -> Vec<f32> {
    let resized = image::imageops::resize(frame, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
    let rgb = image::DynamicImage::ImageLuma8(resized).to_rgb8();
    let mut chw = vec![0f32; 3 * (INPUT_SIZE * INPUT_SIZE) as usize];
    let plane = (INPUT_SIZE * INPUT_SIZE) as usize;
    for (i, p) in rgb.pixels().enumerate() {
        chw[i] = p.0[0] as f32 / 255.0;
        chw[plane + i] = p.0[1] as f32 / 255.0;
        chw[2 * plane + i] = p.0[2] as f32 / 255.0;
    }
    chw
}

fn to_annotated(frame: &GrayFrame) -> AnnotatedFrame {
    image::DynamicImage::ImageLuma8(frame.clone()).to_rgb8()
}

impl Detector for Leap {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Leap
    }

    fn run(
        &mut self,
        frame: &GrayFrame,
        position: TrackerPosition,
        _config: &AlgorithmConfig,
    ) -> (EyeData, AnnotatedFrame) {
        let chw = to_chw_input(frame);
        let landmarks = match self.model.infer(&chw) {
            Ok(l) => l,
            Err(e) => {
                tracing::trace!(error = %e, "LEAP inference unavailable");
                return (eye_types::TRACKING_FAILED, to_annotated(frame));
            }
        };

        let flat: Vec<f64> = landmarks.iter().flat_map(|&(x, y)| [x, y]).collect();
        let smoothed = self.filter.filter(&flat, 1.0);
        let smoothed_points: Vec<(f64, f64)> = smoothed.chunks(2).map(|c| (c[0], c[1])).collect();

        let (x1, y1) = smoothed_points[1];
        let (x3, y3) = smoothed_points[3];
        let d = ((x1 - x3).powi(2) + (y1 - y3).powi(2)).sqrt();

        if self.blink_distances.len() == BLINK_WINDOW {
            self.blink_distances.pop_front();
        }
        self.blink_distances.push_back(d);

        let min_d = self.blink_distances.iter().cloned().fold(f64::MAX, f64::min);
        let max_d = self.blink_distances.iter().cloned().fold(f64::MIN, f64::max);
        let mut blink = if (min_d - max_d).abs() < f64::EPSILON {
            1.0
        } else {
            1.0 - (d - max_d) / (min_d - max_d)
        };
        const BLINK_THRESHOLD: f64 = 0.5;
        if blink <= BLINK_THRESHOLD {
            blink = 0.0;
        }

        let (out_x, out_y) = smoothed_points[6];

        let mut annotated = to_annotated(frame);
        let (w, h) = frame.dimensions();
        for &(px, py) in &smoothed_points {
            draw_filled_circle_mut(
                &mut annotated,
                ((px * w as f64) as i32, (py * h as f64) as i32),
                2,
                Rgb([0, 255, 255]),
            );
        }

        (EyeData::new(out_x, out_y, blink, position), annotated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed([(f64, f64); LANDMARKS]);
    impl LandmarkModel for Fixed {
        fn infer(&mut self, _chw_input: &[f32]) -> Result<[(f64, f64); LANDMARKS]> {
            Ok(self.0)
        }
    }

    #[test]
    fn not_loaded_model_always_reports_tracking_failed() {
        let mut leap = Leap::not_loaded();
        let frame = GrayFrame::from_pixel(64, 64, image::Luma([128]));
        let cfg = AlgorithmConfig::default();
        let (data, _) = leap.run(&frame, TrackerPosition::LeftEye, &cfg);
        assert!(data.is_tracking_failed());
    }

    #[test]
    fn reports_landmark_six_as_the_gaze_point() {
        let points = [
            (0.1, 0.1),
            (0.2, 0.2),
            (0.3, 0.3),
            (0.4, 0.4),
            (0.5, 0.5),
            (0.6, 0.6),
            (0.77, 0.88),
        ];
        let mut leap = Leap::new(Box::new(Fixed(points)));
        let frame = GrayFrame::from_pixel(64, 64, image::Luma([128]));
        let cfg = AlgorithmConfig::default();
        let (data, _) = leap.run(&frame, TrackerPosition::LeftEye, &cfg);
        assert!(!data.is_tracking_failed());
        // first call passes the One-Euro filter through unchanged
        assert!((data.x - 0.77).abs() < 1e-9);
        assert!((data.y - 0.88).abs() < 1e-9);
    }
}
