use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// A single rejected field, reported with its dotted path so REST callers
/// (outside this crate's scope) can point at the offending input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation failed: {}", summarize(.0))]
    Validation(Vec<FieldError>),

    #[error("no tracker with uuid {0}")]
    NotFound(uuid::Uuid),

    #[error("watcher error: {0}")]
    Watch(#[from] notify::Error),
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    pub fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation(vec![FieldError {
            path: path.into(),
            message: message.into(),
        }])
    }
}
