//! # Inbound audio processor (C3)
//!
//! Consumes SHM frames from `/ap_in_<id>`, decodes mu-law to float,
//! chunks speech with a per-call VAD state machine, resamples to the
//! STT sample rate, and streams chunks to the STT service over TCP.

pub mod error;
pub mod processor;
pub mod vad;

pub use error::{InboundError, Result};
pub use processor::InboundProcessor;
pub use vad::VadState;
