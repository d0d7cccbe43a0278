use thiserror::Error;

#[derive(Debug, Error)]
pub enum SttError {
    #[error("model warm-up failed: {0}")]
    WarmUpFailed(String),
    #[error("engine inference failed: {0}")]
    EngineFailed(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SttError>;
