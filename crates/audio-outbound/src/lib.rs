//! # Outbound audio processor (C4)
//!
//! Produces a continuous 20 ms mu-law frame stream into `/ap_out_<id>`
//! regardless of whether TTS has delivered audio yet: waits for the
//! `REGISTER:<id>` UDP handshake, connects to the TTS server, decodes
//! and resamples its float/mu-law chunks, and paces the result into SHM
//! at 20 ms absolute-time ticks with silence fill.

pub mod error;
pub mod pacer;
pub mod processor;
pub mod queue;
pub mod registration;
pub mod tts_client;

pub use error::{OutboundError, Result};
pub use processor::OutboundProcessor;
