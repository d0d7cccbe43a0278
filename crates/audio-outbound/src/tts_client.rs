//! Connects to the TTS server for this call and turns its float/mu-law
//! chunks into bytes appended to the pacer's output queue.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use audio_dsp_core::{
    float_samples_to_ulaw, lowpass_telephony, resample_linear, TELEPHONY_SAMPLE_RATE_HZ,
};
use audio_proto_registration::framing::{read_tts_audio_frame, write_hello, FramingError, TtsAudioFrame};
use audio_proto_registration::{outbound_audio_port, CallId};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::queue::OutputQueue;

const CONNECT_RETRIES: u32 = 10;

/// Connect to the TTS server with bounded retries (50-200 ms backoff)
/// to tolerate a slow TTS boot.
pub async fn connect_with_retry(call_id: CallId) -> std::io::Result<TcpStream> {
    let port = outbound_audio_port(call_id);
    let mut attempt = 0u32;
    loop {
        match TcpStream::connect(("127.0.0.1", port)).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                attempt += 1;
                if attempt >= CONNECT_RETRIES {
                    return Err(e);
                }
                let backoff_ms = 50 + (attempt * 15).min(150);
                warn!(%call_id, attempt, error = %e, "TTS connect failed, retrying");
                tokio::time::sleep(Duration::from_millis(backoff_ms as u64)).await;
            }
        }
    }
}

/// Drive one TTS connection's receive loop until BYE, EOF, or a fatal
/// framing error, appending decoded audio to `queue`.
pub async fn run_receive_loop(call_id: CallId, mut stream: TcpStream, queue: Arc<Mutex<OutputQueue>>) {
    if write_hello(&mut stream, &call_id.to_string()).await.is_err() {
        warn!(%call_id, "failed to send HELLO to TTS");
        return;
    }

    let mut last_chunk_id: Option<u32> = None;

    loop {
        match read_tts_audio_frame(&mut stream).await {
            Ok(TtsAudioFrame::Bye) => {
                debug!(%call_id, "TTS stream sent BYE");
                return;
            }
            Ok(TtsAudioFrame::Chunk { sample_rate, chunk_id, payload }) => {
                let is_duplicate = matches!(last_chunk_id, Some(prev) if chunk_id <= prev);
                if is_duplicate {
                    // The payload has already been fully read off the
                    // wire per the framing contract; just discard it.
                    debug!(%call_id, chunk_id, "discarding duplicate/non-increasing TTS chunk id");
                    continue;
                }
                last_chunk_id = Some(chunk_id);
                let encoded = decode_chunk(sample_rate, &payload);
                queue.lock().unwrap().push(&encoded);
            }
            Err(FramingError::Eof) => {
                debug!(%call_id, "TTS connection closed (EOF)");
                return;
            }
            Err(e) => {
                warn!(%call_id, error = %e, "fatal TTS framing error, closing connection");
                return;
            }
        }
    }
}

/// `chunk_length % 4 == 0` payloads are float32 mono PCM at
/// `sample_rate`; anything else is treated as pre-encoded mu-law and
/// passed through verbatim.
fn decode_chunk(sample_rate: u32, payload: &[u8]) -> Vec<u8> {
    if payload.len() % 4 != 0 {
        return payload.to_vec();
    }

    let samples: Vec<f32> = payload
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    let filtered = if sample_rate > TELEPHONY_SAMPLE_RATE_HZ {
        lowpass_telephony(&samples)
    } else {
        samples
    };
    let resampled = resample_linear(&filtered, sample_rate, TELEPHONY_SAMPLE_RATE_HZ);
    float_samples_to_ulaw(&resampled)
}
