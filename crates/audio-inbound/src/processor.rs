//! Wires the SHM consumer, the VAD state machine, and the STT TCP
//! stream together for one call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use audio_dsp_core::{resample_linear, ulaw_frame_to_float, STT_SAMPLE_RATE_HZ, TELEPHONY_SAMPLE_RATE_HZ};
use audio_proto_registration::{inbound_audio_port, CallId};
use audio_shm_channel::{inbound_channel_name, ShmChannel};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::vad::VadState;

/// SHM polling cadence while the ring is empty. Negligible cost at
/// 160-byte frames / 20 ms cadence.
const SHM_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Bounded handoff between the VAD task and the network task; a few
/// chunks of slack is enough since chunks are emitted on the order of
/// once per second of speech, not once per frame.
const CHUNK_CHANNEL_CAPACITY: usize = 32;

pub struct InboundProcessor {
    call_id: CallId,
    active: Arc<AtomicBool>,
}

impl InboundProcessor {
    pub fn new(call_id: CallId) -> Self {
        Self {
            call_id,
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Signal the processor to wind down; observed by both the VAD and
    /// network tasks within one tick/select iteration.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub async fn run(&self) -> Result<()> {
        let channel_name = inbound_channel_name(self.call_id.get());
        let mut shm = match ShmChannel::create_or_open(&channel_name, self.call_id.get(), 2048, 160, false) {
            Ok(ch) => ch,
            Err(e) => {
                warn!(call_id = %self.call_id, error = %e, "inbound SHM channel unavailable, deactivating cleanly");
                return Ok(());
            }
        };
        shm.set_role_consumer();

        let (chunk_tx, chunk_rx) = mpsc::channel::<Vec<f32>>(CHUNK_CHANNEL_CAPACITY);

        let vad_active = self.active.clone();
        let vad_call_id = self.call_id;
        let vad_task = tokio::spawn(async move {
            run_vad_loop(vad_call_id, shm, chunk_tx, vad_active).await;
        });

        let port = inbound_audio_port(self.call_id);
        run_network_loop(self.call_id, port, chunk_rx, self.active.clone()).await?;

        let _ = vad_task.await;
        Ok(())
    }
}

async fn run_vad_loop(
    call_id: CallId,
    mut shm: ShmChannel,
    chunk_tx: mpsc::Sender<Vec<f32>>,
    active: Arc<AtomicBool>,
) {
    let mut vad = VadState::new();

    while active.load(Ordering::Acquire) {
        match shm.read_frame() {
            Some(frame) => {
                let samples_8k = ulaw_frame_to_float(&frame);
                if let Some(chunk_8k) = vad.process_window(&samples_8k) {
                    emit_chunk(call_id, &chunk_tx, chunk_8k).await;
                }
            }
            None => {
                tokio::time::sleep(SHM_POLL_INTERVAL).await;
            }
        }
    }

    if let Some(chunk_8k) = vad.flush_final() {
        emit_chunk(call_id, &chunk_tx, chunk_8k).await;
    }
    debug!(call_id = %call_id, chunks_emitted = vad.chunks_emitted(), "inbound VAD loop deactivated");
}

async fn emit_chunk(call_id: CallId, chunk_tx: &mpsc::Sender<Vec<f32>>, chunk_8k: Vec<f32>) {
    let chunk_16k = resample_linear(&chunk_8k, TELEPHONY_SAMPLE_RATE_HZ, STT_SAMPLE_RATE_HZ);
    if chunk_tx.try_send(chunk_16k).is_err() {
        warn!(call_id = %call_id, "chunk channel full, dropping emitted chunk");
    }
}

async fn run_network_loop(
    call_id: CallId,
    port: u16,
    mut chunk_rx: mpsc::Receiver<Vec<f32>>,
    active: Arc<AtomicBool>,
) -> Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    info!(call_id = %call_id, port, "inbound processor listening for STT connection");

    let mut socket: Option<TcpStream> = None;

    loop {
        if !active.load(Ordering::Acquire) {
            if let Some(s) = socket.as_mut() {
                let _ = audio_proto_registration::framing::write_stt_audio_bye(s).await;
            }
            return Ok(());
        }

        tokio::select! {
            accept_result = listener.accept(), if socket.is_none() => {
                match accept_result {
                    Ok((mut stream, peer)) => {
                        info!(call_id = %call_id, %peer, "STT connected");
                        if audio_proto_registration::framing::write_hello(&mut stream, &call_id.to_string()).await.is_ok() {
                            socket = Some(stream);
                        }
                    }
                    Err(e) => warn!(call_id = %call_id, error = %e, "accept failed"),
                }
            }
            maybe_chunk = chunk_rx.recv() => {
                match maybe_chunk {
                    None => return Ok(()),
                    Some(samples) => {
                        if let Some(s) = socket.as_mut() {
                            if audio_proto_registration::framing::write_stt_audio_chunk(s, &samples).await.is_err() {
                                warn!(call_id = %call_id, "STT connection dropped mid-call");
                                socket = None;
                            }
                        } else {
                            debug!(call_id = %call_id, "no client connected, dropping chunk");
                        }
                    }
                }
            }
        }
    }
}
