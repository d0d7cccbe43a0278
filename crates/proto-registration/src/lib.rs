//! # Registration & framing protocol
//!
//! The cross-cutting wire protocol that wires the audio fabric's
//! components together at call start and unwires them at call end: the
//! deterministic port scheme, the UDP REGISTER/BYE registration
//! protocol, and the big-endian length-prefixed TCP framing used by the
//! STT audio, TTS audio, and STT->LLM text streams.

pub mod framing;
pub mod ports;
pub mod registration;

pub use ports::{
    inbound_audio_port, outbound_audio_port, tts_consumer_registration_port, CallId, LLM_PORT,
    LLM_TTS_PORT, STT_REGISTRATION_PORT, TTS_REGISTRATION_MIRROR_PORT,
};
pub use registration::{RegistrationMessage, RegistrationParseError};
