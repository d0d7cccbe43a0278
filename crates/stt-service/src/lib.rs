//! # STT service shell (C5)
//!
//! A single process hosting one warmed, shared inference context and an
//! unbounded number of concurrent per-call sessions: a UDP REGISTER/BYE
//! listener, outbound TCP connects to each call's inbound audio processor,
//! per-call transcription sessions, and a persistent forwarding connection
//! to the downstream LLM.

pub mod engine;
pub mod error;
pub mod llm_client;
pub mod model;
pub mod postprocess;
pub mod registration;
pub mod session;

pub use error::{Result, SttError};
pub use registration::Registry;
