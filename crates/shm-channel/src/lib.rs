//! # SHM audio channel
//!
//! A named, single-producer/single-consumer ring of fixed-size audio
//! frames shared between the telephony process and an audio processor.
//! The telephony process creates `/ap_in_<id>` and `/ap_out_<id>`; the
//! audio processors only open them.

pub mod channel;
pub mod error;

pub use channel::{Role, ShmChannel, WriteStatus};
pub use error::{Result, ShmError};

/// Default frame size: 20 ms at 8 kHz mu-law telephony audio.
pub const DEFAULT_FRAME_SIZE: u32 = 160;

/// Default ring capacity in frames (tunable at creation).
pub const DEFAULT_CAPACITY: u32 = 2048;

/// Build the conventional inbound channel name for a call.
pub fn inbound_channel_name(call_id: u32) -> String {
    format!("/ap_in_{call_id}")
}

/// Build the conventional outbound channel name for a call.
pub fn outbound_channel_name(call_id: u32) -> String {
    format!("/ap_out_{call_id}")
}
