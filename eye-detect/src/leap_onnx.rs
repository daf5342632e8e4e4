//! Real ONNX-backed LEAP landmark model: single-threaded session, CPU
//! execution provider, all graph optimizations enabled, matching the
//! original tracker's session options. Feature-gated since no `.onnx`
//! asset ships with this repo; build with `--features leap-onnx` against a
//! model path at runtime.

use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};

use crate::error::{Error, Result};
use crate::leap::LandmarkModel;

pub struct OrtLandmarkModel {
    session: Session,
}

impl OrtLandmarkModel {
    pub fn load(model_path: &std::path::Path) -> Result<Self> {
        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(1))
            .and_then(|b| b.commit_from_file(model_path))
            .map_err(|e| Error::Inference(e.to_string()))?;
        Ok(Self { session })
    }
}

impl LandmarkModel for OrtLandmarkModel {
    fn infer(&mut self, chw_input: &[f32]) -> Result<[(f64, f64); 7]> {
        let input = Array4::from_shape_vec((1, 3, 112, 112), chw_input.to_vec())
            .map_err(|e| Error::Inference(e.to_string()))?;
        let outputs = self
            .session
            .run(ort::inputs![input].map_err(|e| Error::Inference(e.to_string()))?)
            .map_err(|e| Error::Inference(e.to_string()))?;
        let (_, raw) = outputs[1]
            .try_extract_raw_tensor::<f32>()
            .map_err(|e| Error::Inference(e.to_string()))?;
        if raw.len() < 14 {
            return Err(Error::Inference("model output shorter than 7 landmarks".into()));
        }
        let mut points = [(0.0, 0.0); 7];
        for (i, p) in points.iter_mut().enumerate() {
            *p = (f64::from(raw[2 * i]), f64::from(raw[2 * i + 1]));
        }
        Ok(points)
    }
}
