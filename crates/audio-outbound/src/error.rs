use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutboundError {
    #[error("shared memory error: {0}")]
    Shm(#[from] audio_shm_channel::ShmError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TTS connect failed after retries: {0}")]
    TtsConnectFailed(std::io::Error),
}

pub type Result<T> = std::result::Result<T, OutboundError>;
