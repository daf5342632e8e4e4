/// Internal per-algorithm failure; always collapses to `TRACKING_FAILED` at
/// the chain boundary, per the detector worker's fallback contract.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("frame has zero width or height")]
    EmptyFrame,
    #[error("cropped region had zero-sized dimension")]
    BadCrop,
    #[error("no landmark model loaded")]
    ModelNotLoaded,
    #[error("inference failed: {0}")]
    Inference(String),
}

pub type Result<T> = std::result::Result<T, Error>;
