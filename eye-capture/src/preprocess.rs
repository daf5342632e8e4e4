//! Flip/rotate/crop pipeline applied to every captured frame before it
//! reaches the visualization and detector queues.

use eye_config::CameraConfig;
use eye_types::GrayFrame;
use image::{imageops, Luma};

/// Rotates `frame` about its center by `degrees`, filling the border with
/// white (matching OpenCV's `BORDER_CONSTANT` white-fill convention used
/// for rotation in the original capture pipeline).
fn rotate_about_center(frame: &GrayFrame, degrees: i32) -> GrayFrame {
    let degrees = degrees.rem_euclid(360);
    match degrees {
        0 => frame.clone(),
        90 => imageops::rotate90(frame),
        180 => imageops::rotate180(frame),
        270 => imageops::rotate270(frame),
        _ => rotate_arbitrary(frame, degrees as f32),
    }
}

fn rotate_arbitrary(frame: &GrayFrame, degrees: f32) -> GrayFrame {
    let radians = degrees.to_radians();
    imageproc::geometric_transformations::rotate_about_center(
        frame,
        radians,
        imageproc::geometric_transformations::Interpolation::Bilinear,
        Luma([255]),
    )
}

/// Applies `flip_x`/`flip_y`/`rotation_angle`, returning the rotated frame
/// (destined for the pre-detection visualization stream) and, unless any
/// ROI dimension is zero, the ROI-cropped frame (destined for the
/// capture→detector queue).
pub fn preprocess(frame: &GrayFrame, config: &CameraConfig) -> (GrayFrame, GrayFrame) {
    let mut out = frame.clone();
    if config.flip_x {
        out = imageops::flip_horizontal(&out);
    }
    if config.flip_y {
        out = imageops::flip_vertical(&out);
    }
    let rotated = rotate_about_center(&out, config.rotation_angle);

    if config.roi_w == 0 || config.roi_h == 0 {
        return (rotated.clone(), rotated);
    }

    let (w, h) = rotated.dimensions();
    let x0 = (config.roi_x.max(0) as u32).min(w);
    let y0 = (config.roi_y.max(0) as u32).min(h);
    let crop_w = (config.roi_w as u32).min(w.saturating_sub(x0));
    let crop_h = (config.roi_h as u32).min(h.saturating_sub(y0));
    if crop_w == 0 || crop_h == 0 {
        return (rotated.clone(), rotated);
    }

    let cropped = imageops::crop_imm(&rotated, x0, y0, crop_w, crop_h).to_image();
    (rotated, cropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    #[test]
    fn roi_crop_is_skipped_when_any_dimension_is_zero() {
        let frame = GrayImage::from_pixel(64, 64, Luma([128]));
        let mut cfg = CameraConfig::default();
        cfg.roi_w = 0;
        cfg.roi_h = 10;
        let (rotated, cropped) = preprocess(&frame, &cfg);
        assert_eq!(cropped.dimensions(), rotated.dimensions());
    }

    #[test]
    fn roi_crop_applies_when_both_dimensions_are_nonzero() {
        let frame = GrayImage::from_pixel(64, 64, Luma([128]));
        let mut cfg = CameraConfig::default();
        cfg.roi_x = 10;
        cfg.roi_y = 10;
        cfg.roi_w = 20;
        cfg.roi_h = 20;
        let (_rotated, cropped) = preprocess(&frame, &cfg);
        assert_eq!(cropped.dimensions(), (20, 20));
    }

    #[test]
    fn flip_x_mirrors_the_frame_horizontally() {
        let mut frame = GrayImage::from_pixel(4, 4, Luma([0]));
        frame.put_pixel(0, 0, Luma([255]));
        let mut cfg = CameraConfig::default();
        cfg.flip_x = true;
        let (rotated, _) = preprocess(&frame, &cfg);
        assert_eq!(rotated.get_pixel(3, 0).0[0], 255);
    }
}
