#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("OSC encode/decode error: {0:?}")]
    Osc(rosc::OscError),
}

pub type Result<T> = std::result::Result<T, Error>;
