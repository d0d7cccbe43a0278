//! The shared, pre-warmed inference context: one
//! process-wide engine instance mutably borrowed by every call's session
//! under a single serializing mutex. Mirrors the way `MediaSessionController`
//! wraps its G.711 codec in one `tokio::sync::Mutex` rather than sharding it
//! per session.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::error::{Result, SttError};

/// 1 s of silence at the STT sample rate, used for the startup warm-up pass.
const WARMUP_SAMPLE_COUNT: usize = 16_000;

/// Fixed decode parameters every engine call uses: greedy
/// sampling, no timestamps, English, a fixed thread count, GPU when
/// available. Engine-specific flags an engine doesn't understand are
/// accepted as no-ops by that engine, not by us.
#[derive(Debug, Clone, Copy)]
pub struct DecodeParams {
    pub temperature: f32,
    pub no_timestamps: bool,
    pub language: &'static str,
    pub threads: usize,
    pub gpu: bool,
}

impl DecodeParams {
    pub fn new(threads: usize) -> Self {
        Self {
            temperature: 0.0,
            no_timestamps: true,
            language: "en",
            threads,
            gpu: true,
        }
    }
}

/// The opaque inference collaborator, treated as external: "a
/// `process(samples) -> text` call with an explicit serialization
/// requirement." A real engine binding and this trait's test double both
/// implement it identically from the session's point of view.
pub trait InferenceContext: Send {
    /// Run one inference pass, returning recognized segments in order.
    fn process(&mut self, samples: &[f32], params: DecodeParams) -> std::result::Result<Vec<String>, String>;
}

/// Wraps an `InferenceContext` behind a single serializing mutex:
/// acquired outside any session-lookup lock, released as soon as inference
/// returns. Never shard this across calls -- if beam-search or
/// per-call caches are ever introduced, replace the mutex with a
/// work-stealing single-writer queue instead.
pub struct SharedInferenceContext {
    engine: Mutex<Box<dyn InferenceContext>>,
    params: DecodeParams,
}

impl SharedInferenceContext {
    /// Run one silent warm-up inference so kernels and working tensors are
    /// materialized before the service reports itself running.
    pub async fn warm_up(mut engine: Box<dyn InferenceContext>, threads: usize) -> Result<Arc<Self>> {
        let params = DecodeParams::new(threads);
        let silence = vec![0.0f32; WARMUP_SAMPLE_COUNT];
        engine
            .process(&silence, params)
            .map_err(SttError::WarmUpFailed)?;
        info!(threads, "inference context warmed up");
        Ok(Arc::new(Self {
            engine: Mutex::new(engine),
            params,
        }))
    }

    /// Acquire the engine mutex, run inference, release, and join the
    /// returned segments into one string. Callers apply post-processing.
    pub async fn process(&self, samples: &[f32]) -> Result<String> {
        let mut engine = self.engine.lock().await;
        let segments = engine
            .process(samples, self.params)
            .map_err(SttError::EngineFailed)?;
        Ok(segments.join(" "))
    }
}
