//! Deterministic, localhost-only port scheme. `CallId` doubles
//! as a port-space coordinate: every per-call port is a fixed base plus
//! the call id.

use std::fmt;

/// A non-negative integer uniquely identifying a live call for the
/// duration of its existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallId(pub u32);

impl CallId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for CallId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// STT UDP registration listener (REGISTER/BYE).
pub const STT_REGISTRATION_PORT: u16 = 13000;

/// TTS UDP registration listener mirror, for the other engine.
pub const TTS_REGISTRATION_MIRROR_PORT: u16 = 13001;

/// STT <- LLM TCP port.
pub const LLM_PORT: u16 = 8083;

/// LLM -> TTS TCP port.
pub const LLM_TTS_PORT: u16 = 8090;

const TTS_CONSUMER_REGISTRATION_BASE: u16 = 13000;
const INBOUND_AUDIO_BASE: u16 = 9001;
const OUTBOUND_AUDIO_BASE: u16 = 9002;

/// TTS-consumer (C4) UDP registration listener port for this call.
pub fn tts_consumer_registration_port(call_id: CallId) -> u16 {
    TTS_CONSUMER_REGISTRATION_BASE + call_id.get() as u16
}

/// Inbound audio TCP port: the inbound processor (C3) listens here,
/// STT connects.
pub fn inbound_audio_port(call_id: CallId) -> u16 {
    INBOUND_AUDIO_BASE + call_id.get() as u16
}

/// Outbound audio TCP port: TTS listens here, the outbound processor
/// (C4) connects.
pub fn outbound_audio_port(call_id: CallId) -> u16 {
    OUTBOUND_AUDIO_BASE + call_id.get() as u16
}
