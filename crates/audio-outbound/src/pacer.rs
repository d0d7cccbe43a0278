//! The 20 ms pacing task: the only thing that ever writes to
//! `/ap_out_<id>`. Runs on an absolute-time schedule (`tokio::time`'s
//! `MissedTickBehavior::Delay` interval, not a relative sleep) so it
//! cannot drift, and never stops while the call is active even if
//! nothing has arrived from TTS yet.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use audio_shm_channel::ShmChannel;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::queue::{OutputQueue, FRAME_BYTES};

const TICK_INTERVAL: Duration = Duration::from_millis(20);
const SILENCE_ULAW_BYTE: u8 = 0xFF;

/// A small pre-loaded mu-law test tone, cycled through when the TTS
/// connection is not yet established and `--test-tone` is set. Per
/// This is an optional developer affordance, never implied by
/// default.
const TEST_TONE: [u8; 8] = [0x82, 0x9A, 0xAE, 0xBA, 0x82, 0x9A, 0xAE, 0xBA];

pub struct Pacer {
    pub missed_ticks: AtomicU64,
    pub frames_emitted: AtomicU64,
    use_test_tone: AtomicBool,
}

impl Default for Pacer {
    fn default() -> Self {
        Self::new()
    }
}

impl Pacer {
    pub fn new() -> Self {
        Self {
            missed_ticks: AtomicU64::new(0),
            frames_emitted: AtomicU64::new(0),
            use_test_tone: AtomicBool::new(false),
        }
    }

    pub fn enable_test_tone(&self, enabled: bool) {
        self.use_test_tone.store(enabled, Ordering::Relaxed);
    }

    /// Run the pacing loop until `active` is cleared. `tts_connected`
    /// gates whether silence or the test tone fills an empty queue.
    pub async fn run(
        &self,
        mut shm: ShmChannel,
        queue: Arc<Mutex<OutputQueue>>,
        active: Arc<AtomicBool>,
        tts_connected: Arc<AtomicBool>,
    ) {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tone_cursor = 0usize;

        while active.load(Ordering::Acquire) {
            let tick_started = interval.tick().await;
            if tick_started.elapsed() > Duration::from_millis(2) {
                self.missed_ticks.fetch_add(1, Ordering::Relaxed);
            }

            let frame = {
                let mut q = queue.lock().unwrap();
                q.pop_frame()
            };

            let frame = match frame {
                Some(f) => f,
                None => self.fill_frame(&tts_connected, &mut tone_cursor),
            };

            shm.write_frame(&frame);
            self.frames_emitted.fetch_add(1, Ordering::Relaxed);
        }
        debug!("outbound pacer deactivated");
    }

    fn fill_frame(&self, tts_connected: &Arc<AtomicBool>, tone_cursor: &mut usize) -> [u8; FRAME_BYTES] {
        let mut frame = [SILENCE_ULAW_BYTE; FRAME_BYTES];
        if !tts_connected.load(Ordering::Relaxed) && self.use_test_tone.load(Ordering::Relaxed) {
            for slot in frame.iter_mut() {
                *slot = TEST_TONE[*tone_cursor % TEST_TONE.len()];
                *tone_cursor += 1;
            }
        }
        frame
    }
}
