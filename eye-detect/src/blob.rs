//! Threshold + contour blob detector: accepts the largest contour whose
//! bounding box fits `[minsize, maxsize]` and reports its centroid.

use eye_config::AlgorithmConfig;
use eye_types::{Algorithm, AnnotatedFrame, EyeData, GrayFrame, TrackerPosition};
use image::Rgb;
use imageproc::contours::find_contours_with_threshold;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::detector::Detector;

#[derive(Debug, Default)]
pub struct Blob;

impl Blob {
    pub fn new() -> Self {
        Self
    }
}

fn to_annotated(frame: &GrayFrame) -> AnnotatedFrame {
    image::DynamicImage::ImageLuma8(frame.clone()).to_rgb8()
}

impl Detector for Blob {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Blob
    }

    fn run(
        &mut self,
        frame: &GrayFrame,
        position: TrackerPosition,
        config: &AlgorithmConfig,
    ) -> (EyeData, AnnotatedFrame) {
        let cfg = &config.blob;
        let threshold = cfg.threshold.clamp(0, 255) as u8;
        let contours: Vec<imageproc::contours::Contour<i32>> =
            find_contours_with_threshold(frame, threshold);

        let mut best: Option<(Rect, f64)> = None;
        for c in &contours {
            if c.points.is_empty() {
                continue;
            }
            let (mut min_x, mut min_y, mut max_x, mut max_y) =
                (i32::MAX, i32::MAX, i32::MIN, i32::MIN);
            for p in &c.points {
                min_x = min_x.min(p.x);
                min_y = min_y.min(p.y);
                max_x = max_x.max(p.x);
                max_y = max_y.max(p.y);
            }
            let w = (max_x - min_x + 1) as f64;
            let h = (max_y - min_y + 1) as f64;
            if w < cfg.minsize || w > cfg.maxsize || h < cfg.minsize || h > cfg.maxsize {
                continue;
            }
            let area = w * h;
            if best.map(|(_, a)| area > a).unwrap_or(true) {
                best = Some((
                    Rect::at(min_x, min_y).of_size((max_x - min_x + 1) as u32, (max_y - min_y + 1) as u32),
                    area,
                ));
            }
        }

        let mut annotated = to_annotated(frame);
        let Some((rect, _)) = best else {
            return (eye_types::TRACKING_FAILED, annotated);
        };

        draw_hollow_rect_mut(&mut annotated, rect, Rgb([0, 255, 0]));

        let (w, h) = frame.dimensions();
        let cx = rect.left() as f64 + rect.width() as f64 / 2.0;
        let cy = rect.top() as f64 + rect.height() as f64 / 2.0;
        let data = EyeData::new(cx / w as f64, cy / h as f64, 1.0, position);
        (data, annotated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eye_config::BlobConfig;
    use image::{GrayImage, Luma};

    #[test]
    fn reports_centroid_of_the_largest_in_range_blob() {
        let mut frame = GrayImage::from_pixel(100, 100, Luma([200]));
        for y in 40..60 {
            for x in 40..60 {
                frame.put_pixel(x, y, Luma([10]));
            }
        }
        let mut cfg = AlgorithmConfig::default();
        cfg.blob = BlobConfig {
            threshold: 100,
            minsize: 5.0,
            maxsize: 30.0,
        };
        let mut blob = Blob::new();
        let (data, _) = blob.run(&frame, TrackerPosition::LeftEye, &cfg);
        assert!(!data.is_tracking_failed());
        assert!((data.x - 0.5).abs() < 0.05);
        assert!((data.y - 0.5).abs() < 0.05);
    }

    #[test]
    fn reports_tracking_failed_when_no_blob_matches_size() {
        let frame = GrayImage::from_pixel(50, 50, Luma([200]));
        let mut cfg = AlgorithmConfig::default();
        cfg.blob = BlobConfig {
            threshold: 100,
            minsize: 5.0,
            maxsize: 30.0,
        };
        let mut blob = Blob::new();
        let (data, _) = blob.run(&frame, TrackerPosition::LeftEye, &cfg);
        assert!(data.is_tracking_failed());
    }
}
