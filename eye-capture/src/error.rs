#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serial(#[from] tokio_serial::Error),
    #[error("frame decode failed: {0}")]
    Decode(String),
    #[error("capture source disconnected")]
    Disconnected,
}

pub type Result<T> = std::result::Result<T, Error>;
