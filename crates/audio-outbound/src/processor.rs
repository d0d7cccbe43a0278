//! Wires the registration handshake, the TTS client, and the pacer
//! together for one call. The pacer starts immediately on activation
//! and never stops while the call is active, independent of whether a
//! TTS stream has attached yet.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use audio_proto_registration::CallId;
use audio_shm_channel::{outbound_channel_name, ShmChannel};
use tracing::{info, warn};

use crate::error::Result;
use crate::pacer::Pacer;
use crate::queue::OutputQueue;
use crate::registration;
use crate::tts_client;

pub struct OutboundProcessor {
    call_id: CallId,
    active: Arc<AtomicBool>,
    pacer: Arc<Pacer>,
}

impl OutboundProcessor {
    pub fn new(call_id: CallId, test_tone: bool) -> Self {
        let pacer = Arc::new(Pacer::new());
        pacer.enable_test_tone(test_tone);
        Self {
            call_id,
            active: Arc::new(AtomicBool::new(true)),
            pacer,
        }
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub async fn run(&self) -> Result<()> {
        let channel_name = outbound_channel_name(self.call_id.get());
        let mut shm = ShmChannel::create_or_open(&channel_name, self.call_id.get(), 2048, 160, false)?;
        shm.set_role_producer();

        let queue = Arc::new(Mutex::new(OutputQueue::new()));
        let tts_connected = Arc::new(AtomicBool::new(false));

        let pacer_task = {
            let pacer = self.pacer.clone();
            let queue = queue.clone();
            let active = self.active.clone();
            let tts_connected = tts_connected.clone();
            tokio::spawn(async move {
                pacer.run(shm, queue, active, tts_connected).await;
            })
        };

        let call_id = self.call_id;
        let active = self.active.clone();
        let registration_task = tokio::spawn(async move {
            run_registration_and_tts(call_id, queue, tts_connected, active).await;
        });

        let _ = pacer_task.await;
        registration_task.abort();
        Ok(())
    }

    pub fn missed_ticks(&self) -> u64 {
        self.pacer.missed_ticks.load(Ordering::Relaxed)
    }

    pub fn frames_emitted(&self) -> u64 {
        self.pacer.frames_emitted.load(Ordering::Relaxed)
    }
}

async fn run_registration_and_tts(
    call_id: CallId,
    queue: Arc<Mutex<OutputQueue>>,
    tts_connected: Arc<AtomicBool>,
    active: Arc<AtomicBool>,
) {
    loop {
        if !active.load(Ordering::Acquire) {
            return;
        }
        let stop = active.clone();
        let registered = registration::wait_for_register(call_id, move || !stop.load(Ordering::Acquire)).await;
        match registered {
            Ok(true) => {}
            Ok(false) => return, // told to stop while waiting
            Err(e) => {
                warn!(%call_id, error = %e, "registration listener failed, giving up on TTS attach");
                return;
            }
        }

        match tts_client::connect_with_retry(call_id).await {
            Ok(stream) => {
                info!(%call_id, "connected to TTS");
                tts_connected.store(true, Ordering::Relaxed);
                tts_client::run_receive_loop(call_id, stream, queue.clone()).await;
                tts_connected.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                let err = crate::error::OutboundError::TtsConnectFailed(e);
                warn!(%call_id, error = %err, "giving up on TTS connect after retries");
                return;
            }
        }
        // TTS disconnected; loop back and wait for another REGISTER.
    }
}
