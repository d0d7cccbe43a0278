use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShmError {
    #[error("shared memory region {0:?} not found")]
    NotFound(String),
    #[error("shared memory region {0:?} already exists")]
    AlreadyExists(String),
    #[error("shared memory region {0:?} has an incompatible header (magic/version/frame_size/capacity mismatch)")]
    IncompatibleHeader(String),
    #[error("I/O error opening shared memory region {0:?}: {1}")]
    Io(String, #[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ShmError>;
