//! Per-call voice-activity-detection state machine.
//!
//! `VadState` consumes fixed 20 ms windows at the telephony ingest rate
//! (8 kHz) and emits variable-length float chunks at that same rate; the
//! caller resamples an emitted chunk to the STT rate before sending it.
//! All thresholds below are fixed defaults, chosen to match a typical
//! telephony VAD tuning rather than configured per call.

use std::collections::VecDeque;

/// 20 ms @ 8 kHz.
pub const WINDOW_SAMPLES: usize = 160;
/// 900 ms of hangover, in 20 ms windows.
pub const HANGOVER_WINDOWS: u32 = 45;
const START_THRESHOLD: f32 = 0.02 * 1.05;
const STOP_THRESHOLD: f32 = 0.02 * 0.5;
/// 0.8 s at 8 kHz.
pub const MIN_CHUNK_SAMPLES: usize = 6_400;
/// 4.0 s at 8 kHz.
pub const MAX_CHUNK_SAMPLES: usize = 32_000;
/// 0.35 s at 8 kHz.
pub const PRE_ROLL_SAMPLES: usize = 2_800;
/// 0.25 s at 8 kHz.
pub const TAIL_OVERLAP_SAMPLES: usize = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Speaking,
}

/// Per-call VAD state. Created at call activation, destroyed at call
/// deactivation, never shared across calls.
pub struct VadState {
    phase: Phase,
    silence_windows: u32,
    consecutive_speech: u32,
    consecutive_silence: u32,
    preroll_ring: VecDeque<f32>,
    current_chunk: Vec<f32>,
    chunks_emitted: u64,
}

impl Default for VadState {
    fn default() -> Self {
        Self::new()
    }
}

impl VadState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            silence_windows: 0,
            consecutive_speech: 0,
            consecutive_silence: 0,
            preroll_ring: VecDeque::with_capacity(PRE_ROLL_SAMPLES),
            current_chunk: Vec::new(),
            chunks_emitted: 0,
        }
    }

    pub fn chunks_emitted(&self) -> u64 {
        self.chunks_emitted
    }

    /// Feed one 20 ms window (160 samples at 8 kHz). Returns `Some(chunk)`
    /// when a chunk is emitted this window, `None` otherwise. Emission
    /// is immediate: a chunk is returned the instant its condition is
    /// met, never buffered across calls.
    pub fn process_window(&mut self, window: &[f32]) -> Option<Vec<f32>> {
        let energy = rms(window);

        match self.phase {
            Phase::Idle => {
                push_ring(&mut self.preroll_ring, window);
                if energy > START_THRESHOLD {
                    self.consecutive_speech += 1;
                } else {
                    self.consecutive_speech = 0;
                }
                if self.consecutive_speech >= 1 {
                    self.phase = Phase::Speaking;
                    self.silence_windows = 0;
                    self.consecutive_silence = 0;
                    self.current_chunk = self.preroll_ring.iter().copied().collect();
                    self.current_chunk.extend_from_slice(window);
                }
                None
            }
            Phase::Speaking => {
                self.current_chunk.extend_from_slice(window);

                if energy <= STOP_THRESHOLD {
                    self.silence_windows += 1;
                    self.consecutive_silence += 1;
                    self.consecutive_speech = 0;
                } else {
                    self.silence_windows = 0;
                    self.consecutive_silence = 0;
                    self.consecutive_speech += 1;
                }

                let hangover_elapsed = self.silence_windows >= HANGOVER_WINDOWS;
                let min_satisfied = self.current_chunk.len() >= MIN_CHUNK_SAMPLES;
                let hard_cap = self.current_chunk.len() >= MAX_CHUNK_SAMPLES;

                if hard_cap || (hangover_elapsed && min_satisfied) {
                    Some(self.emit_and_reset())
                } else {
                    None
                }
            }
        }
    }

    /// Flush whatever is left of the current chunk on call deactivation
    /// or SHM close, even if it is shorter than `MIN_CHUNK_SAMPLES` --
    /// the final chunk of a call is explicitly allowed to be short.
    pub fn flush_final(&mut self) -> Option<Vec<f32>> {
        if self.phase == Phase::Speaking && !self.current_chunk.is_empty() {
            let chunk = std::mem::take(&mut self.current_chunk);
            self.chunks_emitted += 1;
            self.phase = Phase::Idle;
            Some(chunk)
        } else {
            None
        }
    }

    fn emit_and_reset(&mut self) -> Vec<f32> {
        let chunk = std::mem::take(&mut self.current_chunk);
        self.chunks_emitted += 1;

        // Carry the tail overlap into the next chunk's seed so words are
        // not fragmented across the chunk boundary.
        let overlap_start = chunk.len().saturating_sub(TAIL_OVERLAP_SAMPLES);
        self.current_chunk = chunk[overlap_start..].to_vec();
        self.phase = Phase::Idle;
        self.silence_windows = 0;
        self.preroll_ring.clear();

        chunk
    }
}

fn push_ring(ring: &mut VecDeque<f32>, window: &[f32]) {
    for &s in window {
        if ring.len() >= PRE_ROLL_SAMPLES {
            ring.pop_front();
        }
        ring.push_back(s);
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64).powi(2)).sum();
    ((sum_sq / samples.len() as f64).sqrt()) as f32
}
