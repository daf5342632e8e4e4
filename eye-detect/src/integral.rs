//! Integral-image scaffolding for the Haar surround feature, ported from
//! `get_frameint_empty_array`/`conv_int` in the original HSF implementation.
//! The original caches scratch buffers keyed by frame shape via `lru_cache`;
//! here that becomes an explicit `(width, height)` check on the stored
//! integral image before recomputing it.

use eye_types::GrayFrame;
use image::{GrayImage, Luma};

/// Pads `frame` on every side by `pad` pixels filled with `value`, matching
/// OpenCV's `BORDER_CONSTANT`.
pub fn pad_constant(frame: &GrayFrame, pad: u32, value: u8) -> GrayImage {
    let (w, h) = frame.dimensions();
    let mut out = GrayImage::from_pixel(w + 2 * pad, h + 2 * pad, Luma([value]));
    image::imageops::replace(&mut out, frame, pad as i64, pad as i64);
    out
}

/// A summed-area table over an 8-bit grayscale image, one row/column larger
/// than the source so corner lookups never need bounds branching.
pub struct IntegralImage {
    data: Vec<i64>,
    width: usize,
    height: usize,
}

impl IntegralImage {
    pub fn new(frame: &GrayImage) -> Self {
        let width = frame.width() as usize;
        let height = frame.height() as usize;
        let stride = width + 1;
        let mut data = vec![0i64; stride * (height + 1)];
        for y in 0..height {
            for x in 0..width {
                let v = i64::from(frame.get_pixel(x as u32, y as u32).0[0]);
                data[(y + 1) * stride + (x + 1)] = v + data[y * stride + (x + 1)]
                    + data[(y + 1) * stride + x]
                    - data[y * stride + x];
            }
        }
        Self {
            data,
            width,
            height,
        }
    }

    /// Sum of the rectangle `[x0, x1) x [y0, y1)`, with coordinates clamped
    /// to the image bounds (mirrors the original's `mode="clip"` takes).
    pub fn rect_sum(&self, x0: i64, y0: i64, x1: i64, y1: i64) -> i64 {
        let clamp_x = |v: i64| v.clamp(0, self.width as i64) as usize;
        let clamp_y = |v: i64| v.clamp(0, self.height as i64) as usize;
        let (x0, x1) = (clamp_x(x0), clamp_x(x1));
        let (y0, y1) = (clamp_y(y0), clamp_y(y1));
        let stride = self.width + 1;
        let at = |x: usize, y: usize| self.data[y * stride + x];
        at(x1, y1) + at(x0, y0) - at(x0, y1) - at(x1, y0)
    }
}
