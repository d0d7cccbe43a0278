//! A per-call session: state held between chunks of one call, borrowing the
//! shared model rather than owning it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use audio_proto_registration::CallId;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::model::SharedInferenceContext;
use crate::postprocess;

pub struct SttSession {
    call_id: CallId,
    model: Arc<SharedInferenceContext>,
    last_activity: Mutex<Instant>,
    latest_transcription: Mutex<String>,
}

impl SttSession {
    pub fn new(call_id: CallId, model: Arc<SharedInferenceContext>) -> Self {
        Self {
            call_id,
            model,
            last_activity: Mutex::new(Instant::now()),
            latest_transcription: Mutex::new(String::new()),
        }
    }

    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    /// Updates `last_activity`, acquires the shared model mutex, runs
    /// inference, and post-processes the result. An engine error never
    /// advances `latest_transcription`; an empty post-processed result
    /// yields `None` rather than forwarding a blank line to the LLM.
    pub async fn process_audio(&self, samples: &[f32]) -> Result<Option<String>> {
        *self.last_activity.lock().await = Instant::now();
        let raw = self.model.process(samples).await?;
        let text = postprocess::apply(&raw);
        if text.is_empty() {
            return Ok(None);
        }
        *self.latest_transcription.lock().await = text.clone();
        Ok(Some(text))
    }

    pub async fn idle_for(&self) -> Duration {
        self.last_activity.lock().await.elapsed()
    }

    #[cfg(test)]
    pub async fn latest_transcription(&self) -> String {
        self.latest_transcription.lock().await.clone()
    }
}
