//! Haar Surround Feature detector: at each candidate center, compares a dark
//! inner disc against its brighter surround via an integral image; the
//! candidate with the lowest response is the pupil. Ported from the
//! original `HSF`/`CvParameters`/`HaarSurroundFeature`/`AutoRadiusCalc`/
//! `CenterCorrection`/`BlinkDetector` classes.

use eye_config::{AlgorithmConfig, HsfConfig};
use eye_types::{Algorithm, AnnotatedFrame, EyeData, GrayFrame, TrackerPosition};
use image::{GenericImageView, Rgb};
use imageproc::drawing::draw_filled_circle_mut;
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, open};

use crate::detector::Detector;
use crate::integral::{pad_constant, IntegralImage};

const AUTO_RADIUS_STEP: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CvMode {
    FirstFrame,
    RadiusAdjust,
    BlinkAdjust,
    Normal,
}

/// Online quartile tracker over a growing response sample, used both for
/// the blink threshold and the center-correction patch threshold.
#[derive(Debug, Default)]
struct BlinkDetector {
    quartile_1: f64,
    response_max: f64,
    responses: Vec<f64>,
}

fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

impl BlinkDetector {
    fn add_response(&mut self, response: f64) {
        self.responses.push(response);
    }

    fn response_len(&self) -> usize {
        self.responses.len()
    }

    fn calc_thresh(&mut self) {
        let mut sorted = self.responses.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let q1 = percentile(&sorted, 25.0);
        let q3 = percentile(&sorted, 75.0);
        self.quartile_1 = q1;
        self.response_max = q3 + (q3 - q1) * 1.5;
    }

    fn detect(&self, now_response: f64) -> bool {
        now_response > self.response_max
    }
}

/// Dark-inner/bright-outer Haar-like weights for a given inner radius.
#[derive(Debug, Clone, Copy)]
struct HaarSurroundFeature {
    val_in: f64,
    val_out: f64,
    r_in: i32,
    r_out: i32,
}

impl HaarSurroundFeature {
    fn new(r_inner: i32, ratio_outer: f64, kf: f64) -> Self {
        let r_outer = ((r_inner as f64) * ratio_outer).round() as i32;
        let count_inner = (r_inner * r_inner) as f64;
        let count_outer = (r_outer * r_outer) as f64 - count_inner;
        let val_in = kf / count_inner;
        let val_out = -val_in * count_inner / count_outer;
        Self {
            val_in,
            val_out,
            r_in: r_inner,
            r_out: r_outer,
        }
    }
}

/// Ternary-search-like exploration of the radius range that minimizes the
/// observed feature response. Mirrors `AutoRadiusCalc.get_radius`.
#[derive(Debug, Default)]
struct AutoRadiusCalc {
    responses: Vec<(i32, f64)>,
    candidates: Vec<i32>,
    left_item: (i32, f64),
    right_item: (i32, f64),
    left_index: i32,
    right_index: i32,
    middle_index: i32,
    pub adj_comp_flag: bool,
}

impl AutoRadiusCalc {
    fn range(default_radius: i32) -> (i32, i32) {
        (default_radius - 18, default_radius + 15)
    }

    fn get_radius(&mut self, default_radius: i32) -> i32 {
        let (lo, hi) = Self::range(default_radius);
        match self.responses.len() {
            1 => {
                self.adj_comp_flag = false;
                lo
            }
            2 => {
                self.adj_comp_flag = false;
                hi
            }
            3 => {
                if self.responses[1].1 < self.responses[2].1 {
                    self.left_item = self.responses[1];
                    self.right_item = self.responses[0];
                } else {
                    self.left_item = self.responses[0];
                    self.right_item = self.responses[2];
                }
                self.candidates = (self.left_item.0..=self.right_item.0)
                    .step_by(AUTO_RADIUS_STEP as usize)
                    .collect();
                self.left_index = 0;
                self.right_index = self.candidates.len() as i32 - 1;
                self.middle_index = (self.left_index + self.right_index) / 2;
                self.adj_comp_flag = false;
                self.candidates[self.middle_index as usize]
            }
            _ => {
                if self.left_index <= self.right_index && self.left_index != self.middle_index {
                    let last = *self.responses.last().unwrap();
                    if self.left_item.1 + last.1 < self.right_item.1 + last.1 {
                        self.right_item = last;
                        self.right_index = self.middle_index - 1;
                        self.middle_index = (self.left_index + self.right_index) / 2;
                        self.adj_comp_flag = false;
                        return self.candidates[self.middle_index as usize];
                    }
                    if self.left_item.1 + last.1 > self.right_item.1 + last.1 {
                        self.left_item = last;
                        self.left_index = self.middle_index + 1;
                        self.middle_index = (self.left_index + self.right_index) / 2;
                        self.adj_comp_flag = false;
                        return self.candidates[self.middle_index as usize];
                    }
                }
                self.adj_comp_flag = true;
                self.candidates[self.middle_index as usize]
            }
        }
    }

    fn add_response(&mut self, radius: i32, response: f64) {
        self.responses.push((radius, response));
    }
}

/// Local histogram threshold + morphological clean-up used to pull the
/// reported center toward the nearest dark connected component, gated on
/// the patch around it actually being darker than the blink quartile.
#[derive(Debug, Default)]
struct CenterCorrection {
    setup: bool,
    shape: (u32, u32),
    quartile_1: f64,
}

impl CenterCorrection {
    fn init(&mut self, frame: &GrayFrame, quartile_1: f64) {
        self.shape = frame.dimensions();
        self.quartile_1 = quartile_1;
        self.setup = true;
    }

    fn correction(&self, frame: &GrayFrame, orig_x: i32, orig_y: i32) -> (i32, i32) {
        let (w, h) = frame.dimensions();
        let mut hist = [0u32; 256];
        for p in frame.pixels() {
            hist[p.0[0] as usize] += 1;
        }
        let total: u32 = hist.iter().sum();
        let mut cumulative = 0.0;
        let mut thr = None;
        for (i, &count) in hist.iter().enumerate() {
            cumulative += 100.0 * count as f64 / total.max(1) as f64;
            if cumulative >= 4.0 {
                thr = Some(i as u8);
                break;
            }
        }
        let thr = thr.unwrap_or(4);

        let mut binary = image::GrayImage::new(w, h);
        for (x, y, p) in frame.enumerate_pixels() {
            if p.0[0] <= thr {
                binary.put_pixel(x, y, image::Luma([255]));
            }
        }
        let closed = close(&binary, Norm::LInf, 3);
        let opened = open(&closed, Norm::LInf, 3);

        let contours: Vec<imageproc::contours::Contour<i32>> =
            imageproc::contours::find_contours(&opened);
        let mut best: Option<(i32, i32, f64)> = None;
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
            let cx = (min_x + max_x) / 2;
            let cy = (min_y + max_y) / 2;
            let dist = ((orig_x - cx).abs() + (orig_y - cy).abs()) as f64;
            if best.map(|(_, _, d)| dist < d).unwrap_or(true) {
                best = Some((cx, cy, dist));
            }
        }

        let (x, y) = match best {
            Some((cx, cy, _)) => (cx, cy),
            None => (orig_x, orig_y),
        };

        let x0 = (x - 5).max(0) as u32;
        let y0 = (y - 5).max(0) as u32;
        let x1 = (x + 5).min(w as i32) as u32;
        let y1 = (y + 5).min(h as i32) as u32;
        let mut patch_min = 255u8;
        for py in y0..y1 {
            for px in x0..x1 {
                patch_min = patch_min.min(frame.get_pixel(px, py).0[0]);
            }
        }

        if f64::from(patch_min) < self.quartile_1 {
            (x, y)
        } else {
            (orig_x, orig_y)
        }
    }
}

/// Full HSF detector, stateful across frames: radius bootstrap, blink
/// threshold calibration, then steady-state center tracking.
pub struct Hsf {
    mode: CvMode,
    radius: i32,
    step: (i32, i32),
    ratio_outer: f64,
    kf: f64,
    blink_detector: BlinkDetector,
    center_q1: BlinkDetector,
    auto_radius: AutoRadiusCalc,
    center_correct: CenterCorrection,
    shape: (u32, u32),
}

impl Hsf {
    pub fn new(config: &HsfConfig) -> Self {
        Self {
            mode: CvMode::FirstFrame,
            radius: config.default_radius,
            step: (config.step_x, config.step_y),
            ratio_outer: config.ratio_outer,
            kf: config.kf,
            blink_detector: BlinkDetector::default(),
            center_q1: BlinkDetector::default(),
            auto_radius: AutoRadiusCalc::default(),
            center_correct: CenterCorrection::default(),
            shape: (0, 0),
        }
    }

    fn respond(&self, frame: &GrayFrame) -> (f64, (i32, i32)) {
        let pad = 2 * self.radius;
        let feature = HaarSurroundFeature::new(self.radius, self.ratio_outer, self.kf);
        let padded = pad_constant(frame, pad as u32, 0);
        let integral = IntegralImage::new(&padded);

        let (w, h) = frame.dimensions();
        let (step_x, step_y) = self.step;
        let mut best_response = f64::MAX;
        let mut best = (pad, pad);

        let mut y = pad;
        while y < pad + h as i32 {
            let mut x = pad;
            while x < pad + w as i32 {
                let inner = integral.rect_sum(
                    (x - feature.r_in) as i64,
                    (y - feature.r_in) as i64,
                    (x + feature.r_in) as i64,
                    (y + feature.r_in) as i64,
                );
                let outer = integral.rect_sum(
                    (x - feature.r_out) as i64,
                    (y - feature.r_out) as i64,
                    (x + feature.r_out) as i64,
                    (y + feature.r_out) as i64,
                ) - inner;
                let response = feature.val_in * inner as f64 + feature.val_out * outer as f64;
                if response < best_response {
                    best_response = response;
                    best = (x, y);
                }
                x += step_x;
            }
            y += step_y;
        }

        (best_response, (best.0 - pad, best.1 - pad))
    }
}

fn safe_crop(
    frame: &GrayFrame,
    lower_x: i32,
    lower_y: i32,
    upper_x: i32,
    upper_y: i32,
) -> Option<image::GrayImage> {
    let (w, h) = frame.dimensions();
    let x0 = lower_x.clamp(0, w as i32) as u32;
    let y0 = lower_y.clamp(0, h as i32) as u32;
    let x1 = upper_x.clamp(0, w as i32) as u32;
    let y1 = upper_y.clamp(0, h as i32) as u32;
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(frame.view(x0, y0, x1 - x0, y1 - y0).to_image())
}

fn mean(img: &image::GrayImage) -> f64 {
    if img.is_empty() {
        return 0.0;
    }
    let sum: u64 = img.pixels().map(|p| u64::from(p.0[0])).sum();
    sum as f64 / (img.width() * img.height()) as f64
}

fn to_annotated(frame: &GrayFrame) -> AnnotatedFrame {
    image::DynamicImage::ImageLuma8(frame.clone()).to_rgb8()
}

impl Detector for Hsf {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Hsf
    }

    fn run(
        &mut self,
        frame: &GrayFrame,
        position: TrackerPosition,
        config: &AlgorithmConfig,
    ) -> (EyeData, AnnotatedFrame) {
        let config = &config.hsf;
        if frame.dimensions() != self.shape {
            self.shape = frame.dimensions();
        }

        if self.mode == CvMode::RadiusAdjust {
            self.radius = self.auto_radius.get_radius(config.default_radius);
            if self.auto_radius.adj_comp_flag {
                tracing::info!(radius = self.radius, "HSF auto radius complete");
                self.mode = if config.skip_blink_detection {
                    CvMode::Normal
                } else {
                    CvMode::BlinkAdjust
                };
            }
        }

        let (response, (center_x, center_y)) = self.respond(frame);

        let lower_x = center_x - self.radius;
        let lower_y = center_y - self.radius;
        let upper_x = center_x + self.radius;
        let upper_y = center_y + self.radius;
        let Some(cropped) = safe_crop(frame, lower_x, lower_y, upper_x, upper_y) else {
            return (eye_types::TRACKING_FAILED, to_annotated(frame));
        };

        let mut blink = 1.0;
        let mut out_x = center_x;
        let mut out_y = center_y;

        match self.mode {
            CvMode::Normal => {
                let (orig_x, orig_y) = (center_x, center_y);
                if !self.blink_detector.detect(mean(&cropped)) {
                    if !self.center_correct.setup || self.center_correct.shape != frame.dimensions()
                    {
                        self.center_correct.init(frame, self.center_q1.quartile_1);
                    }
                    let (cx, cy) = self.center_correct.correction(frame, center_x, center_y);
                    out_x = cx;
                    out_y = cy;
                } else {
                    blink = 0.0;
                }
                let _ = (orig_x, orig_y);
            }
            CvMode::BlinkAdjust => {
                if self.blink_detector.response_len() < config.blink_stat_frames {
                    let expand = self.radius.max(20);
                    if let Some(expanded) = safe_crop(
                        frame,
                        center_x - expand,
                        center_y - expand,
                        center_x + expand,
                        center_y + expand,
                    ) {
                        self.blink_detector.add_response(mean(&cropped));
                        self.center_q1.add_response(mean(&expanded));
                    }
                } else {
                    self.mode = CvMode::Normal;
                    self.center_q1.calc_thresh();
                    self.blink_detector.calc_thresh();
                    tracing::info!("HSF blink adjust complete");
                }
            }
            CvMode::FirstFrame | CvMode::RadiusAdjust => {
                self.auto_radius.add_response(self.radius, response);
            }
        }

        if self.mode == CvMode::FirstFrame {
            tracing::info!("HSF first frame complete");
            self.mode = if config.skip_autoradius && config.skip_blink_detection {
                CvMode::Normal
            } else if config.skip_autoradius {
                CvMode::BlinkAdjust
            } else {
                CvMode::RadiusAdjust
            };
        }

        let mut annotated = to_annotated(frame);
        draw_filled_circle_mut(&mut annotated, (center_x, center_y), 3, Rgb([255, 0, 0]));
        draw_filled_circle_mut(&mut annotated, (out_x, out_y), 6, Rgb([0, 0, 255]));

        let (w, h) = frame.dimensions();
        let data = EyeData::new(
            out_x as f64 / w as f64,
            out_y as f64 / h as f64,
            blink,
            position,
        );
        (data, annotated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn dark_pupil_frame() -> GrayImage {
        let mut frame = GrayImage::from_pixel(128, 128, Luma([200]));
        for y in 54..74 {
            for x in 54..74 {
                frame.put_pixel(x, y, Luma([10]));
            }
        }
        frame
    }

    #[test]
    fn finds_a_dark_disc_against_a_bright_background() {
        let mut algo_cfg = AlgorithmConfig::default();
        algo_cfg.hsf.skip_autoradius = true;
        algo_cfg.hsf.skip_blink_detection = true;
        let mut hsf = Hsf::new(&algo_cfg.hsf);
        let frame = dark_pupil_frame();
        let (data, _annotated) = hsf.run(&frame, TrackerPosition::LeftEye, &algo_cfg);
        assert!(!data.is_tracking_failed());
        let cx = data.x * frame.width() as f64;
        let cy = data.y * frame.height() as f64;
        assert!((cx - 64.0).abs() < 15.0, "cx={cx}");
        assert!((cy - 64.0).abs() < 15.0, "cy={cy}");
    }

    #[test]
    fn bootstraps_through_state_machine_into_normal_mode() {
        let algo_cfg = AlgorithmConfig::default();
        let mut hsf = Hsf::new(&algo_cfg.hsf);
        let frame = dark_pupil_frame();
        assert_eq!(hsf.mode, CvMode::FirstFrame);
        hsf.run(&frame, TrackerPosition::LeftEye, &algo_cfg);
        assert_eq!(hsf.mode, CvMode::RadiusAdjust);
    }
}
