//! Adaptive HSF: runs coarse HSF to locate a pupil rectangle, then refines
//! within a 1.2x expansion via edge-based contour fitting, reporting the
//! fitted contour's center rather than the raw Haar-feature argmin.

use eye_config::AlgorithmConfig;
use eye_types::{Algorithm, AnnotatedFrame, EyeData, GrayFrame, TrackerPosition};
use image::{GenericImageView, Luma, Rgb};
use imageproc::drawing::draw_filled_circle_mut;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;

use crate::detector::Detector;
use crate::hsf::Hsf;

const EXPANSION: f64 = 1.2;
const BRIGHT_THRESHOLD: u8 = 220;

pub struct Ahsf {
    coarse: Hsf,
}

impl Ahsf {
    pub fn new(config: &eye_config::HsfConfig) -> Self {
        Self {
            coarse: Hsf::new(config),
        }
    }
}

fn mean_intensity(frame: &GrayFrame) -> u8 {
    if frame.is_empty() {
        return 128;
    }
    let sum: u64 = frame.pixels().map(|p| u64::from(p.0[0])).sum();
    (sum / (frame.width() * frame.height()) as u64) as u8
}

fn to_annotated(frame: &GrayFrame) -> AnnotatedFrame {
    image::DynamicImage::ImageLuma8(frame.clone()).to_rgb8()
}

impl Detector for Ahsf {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Ahsf
    }

    fn run(
        &mut self,
        frame: &GrayFrame,
        position: TrackerPosition,
        config: &AlgorithmConfig,
    ) -> (EyeData, AnnotatedFrame) {
        // Pad into a square, filled with the average intensity, so the
        // Haar feature grid covers a uniform aspect ratio.
        let (w, h) = frame.dimensions();
        let side = w.max(h);
        let fill = mean_intensity(frame);
        let mut square = GrayFrame::from_pixel(side, side, Luma([fill]));
        image::imageops::replace(&mut square, frame, 0, 0);

        let (coarse_result, _) = self.coarse.run(&square, position, config);
        if coarse_result.is_tracking_failed() {
            return (coarse_result, to_annotated(frame));
        }

        let cx = (coarse_result.x * side as f64) as i32;
        let cy = (coarse_result.y * side as f64) as i32;
        let radius = (config.hsf.default_radius as f64 * EXPANSION) as i32;

        let x0 = (cx - radius).clamp(0, side as i32) as u32;
        let y0 = (cy - radius).clamp(0, side as i32) as u32;
        let x1 = (cx + radius).clamp(0, side as i32) as u32;
        let y1 = (cy + radius).clamp(0, side as i32) as u32;
        if x1 <= x0 || y1 <= y0 {
            return (coarse_result, to_annotated(frame));
        }
        let region = square.view(x0, y0, x1 - x0, y1 - y0).to_image();

        let blurred = gaussian_blur_f32(&region, 1.2);
        let edges = canny(&blurred, 50.0, 100.0);

        let mut bright_mask = GrayFrame::new(region.width(), region.height());
        for (x, y, p) in region.enumerate_pixels() {
            if p.0[0] > BRIGHT_THRESHOLD {
                bright_mask.put_pixel(x, y, Luma([255]));
            }
        }
        let bright_dilated = dilate(&bright_mask, Norm::LInf, 2);

        let mut refined = GrayFrame::new(region.width(), region.height());
        for (x, y, p) in edges.enumerate_pixels() {
            let bright = bright_dilated.get_pixel(x, y).0[0] > 0;
            if p.0[0] > 0 && !bright {
                refined.put_pixel(x, y, Luma([255]));
            }
        }

        let contours: Vec<imageproc::contours::Contour<i32>> =
            imageproc::contours::find_contours(&refined);
        let mut best: Option<(f64, f64, usize)> = None;
        for c in &contours {
            if c.points.len() < best.map(|(_, _, n)| n).unwrap_or(0) {
                continue;
            }
            let n = c.points.len() as f64;
            let sx: f64 = c.points.iter().map(|p| p.x as f64).sum();
            let sy: f64 = c.points.iter().map(|p| p.y as f64).sum();
            best = Some((sx / n, sy / n, c.points.len()));
        }

        let mut annotated = to_annotated(frame);
        let (out_x, out_y) = match best {
            Some((ex, ey, _)) => (x0 as f64 + ex, y0 as f64 + ey),
            None => (cx as f64, cy as f64),
        };
        draw_filled_circle_mut(&mut annotated, (out_x as i32, out_y as i32), 4, Rgb([255, 0, 255]));

        let data = EyeData::new(out_x / side as f64, out_y / side as f64, coarse_result.blink, position);
        (data, annotated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eye_config::HsfConfig;
    use image::GrayImage;

    #[test]
    fn refines_a_coarse_center_within_bounds() {
        let mut cfg = AlgorithmConfig::default();
        cfg.hsf.skip_autoradius = true;
        cfg.hsf.skip_blink_detection = true;
        let mut frame = GrayImage::from_pixel(120, 100, Luma([220]));
        for y in 40..60 {
            for x in 50..70 {
                frame.put_pixel(x, y, Luma([20]));
            }
        }
        let mut ahsf = Ahsf::new(&HsfConfig {
            skip_autoradius: true,
            skip_blink_detection: true,
            ..HsfConfig::default()
        });
        let (data, _) = ahsf.run(&frame, TrackerPosition::LeftEye, &cfg);
        assert!(!data.is_tracking_failed());
        assert!(data.x >= 0.0 && data.x <= 1.0);
        assert!(data.y >= 0.0 && data.y <= 1.0);
    }
}
