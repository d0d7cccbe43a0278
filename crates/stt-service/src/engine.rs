//! A deterministic stand-in for the real inference engine.
//!
//! The STT engine's internals are treated as external and opaque; this
//! module provides a controllable double implementing
//! [`InferenceContext`] so warm-up, mutex serialization, and session
//! lifecycle are exercised without a real model, the way `mock_impl.rs`
//! stands in for real audio hardware.

use std::collections::VecDeque;

use crate::model::{DecodeParams, InferenceContext};

/// Returns pre-programmed transcriptions in order, falling back to a
/// default once the script is exhausted. All-zero (silence) input always
/// yields no segments, matching how a real engine would handle the
/// warm-up pass and genuine silence alike.
pub struct ScriptedInferenceContext {
    script: VecDeque<Vec<String>>,
    default: Vec<String>,
}

impl ScriptedInferenceContext {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            default: Vec::new(),
        }
    }

    pub fn with_script(script: Vec<Vec<String>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            default: Vec::new(),
        }
    }
}

impl Default for ScriptedInferenceContext {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceContext for ScriptedInferenceContext {
    fn process(&mut self, samples: &[f32], _params: DecodeParams) -> Result<Vec<String>, String> {
        if samples.iter().all(|&s| s == 0.0) {
            return Ok(Vec::new());
        }
        Ok(self.script.pop_front().unwrap_or_else(|| self.default.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_never_produces_a_segment() {
        let mut ctx = ScriptedInferenceContext::with_script(vec![vec!["hello".to_string()]]);
        let silence = vec![0.0f32; 160];
        assert_eq!(ctx.process(&silence, DecodeParams::new(1)).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn scripted_responses_are_consumed_in_order() {
        let mut ctx = ScriptedInferenceContext::with_script(vec![
            vec!["hello".to_string()],
            vec!["world".to_string()],
        ]);
        let speech = vec![0.5f32; 160];
        assert_eq!(ctx.process(&speech, DecodeParams::new(1)).unwrap(), vec!["hello".to_string()]);
        assert_eq!(ctx.process(&speech, DecodeParams::new(1)).unwrap(), vec!["world".to_string()]);
    }
}
