//! Big-endian, length-prefixed TCP framing for the three audio/text
//! streams: STT inbound audio, TTS outbound audio, and
//! STT -> LLM text.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// `0xFFFFFFFF` is the BYE sentinel on streams where a zero length
/// frame is reserved for something else (or simply to mirror the other
/// terminator used for inbound audio).
pub const BYE_SENTINEL: u32 = 0xFFFF_FFFF;

/// TTS frame payloads over 10 MiB are a fatal framing error.
pub const MAX_TTS_CHUNK_BYTES: u32 = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("connection closed")]
    Eof,
    #[error("short read: expected {expected} bytes, connection closed after {got}")]
    ShortRead { expected: usize, got: usize },
    #[error("chunk length {0} exceeds the 10 MiB framing limit")]
    ChunkTooLarge(u32),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FramingError>;

/// Read a HELLO frame: `u32 length || ascii call_id`.
pub async fn read_hello<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<String> {
    let len = read_u32(reader).await?;
    let bytes = read_exact_bytes(reader, len as usize).await?;
    Ok(String::from_utf8_lossy(&bytes).to_string())
}

/// Write a HELLO frame.
pub async fn write_hello<W: AsyncWriteExt + Unpin>(writer: &mut W, call_id: &str) -> Result<()> {
    let mut buf = BytesMut::with_capacity(4 + call_id.len());
    buf.put_u32(call_id.len() as u32);
    buf.put_slice(call_id.as_bytes());
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// A frame read from the STT inbound audio stream: either a chunk of
/// float32 samples, or BYE.
#[derive(Debug, Clone, PartialEq)]
pub enum SttAudioFrame {
    Chunk(Vec<f32>),
    Bye,
}

/// Read one STT inbound-audio frame: `u32 byte_length || f32_le samples`.
/// A length of `0` or `0xFFFFFFFF` is BYE.
pub async fn read_stt_audio_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<SttAudioFrame> {
    let byte_len = read_u32(reader).await?;
    if byte_len == 0 || byte_len == BYE_SENTINEL {
        return Ok(SttAudioFrame::Bye);
    }
    let mut bytes = read_exact_bytes(reader, byte_len as usize).await?;
    let mut samples = Vec::with_capacity(bytes.len() / 4);
    while bytes.remaining() >= 4 {
        samples.push(bytes.get_f32_le());
    }
    Ok(SttAudioFrame::Chunk(samples))
}

/// Write one STT inbound-audio chunk.
pub async fn write_stt_audio_chunk<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    samples: &[f32],
) -> Result<()> {
    let mut buf = BytesMut::with_capacity(4 + samples.len() * 4);
    buf.put_u32(samples.len() as u32 * 4);
    for &s in samples {
        buf.put_f32_le(s);
    }
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Write BYE on the STT inbound-audio stream.
pub async fn write_stt_audio_bye<W: AsyncWriteExt + Unpin>(writer: &mut W) -> Result<()> {
    writer.write_u32(0).await?;
    writer.flush().await?;
    Ok(())
}

/// A frame read from the TTS outbound-audio stream.
#[derive(Debug, Clone, PartialEq)]
pub enum TtsAudioFrame {
    Chunk {
        sample_rate: u32,
        chunk_id: u32,
        payload: Vec<u8>,
    },
    Bye,
}

/// Read one TTS outbound-audio frame:
/// `u32 chunk_length || u32 sample_rate || u32 chunk_id || bytes[chunk_length]`.
/// `chunk_length == 0` is BYE; `chunk_length > 10 MiB` is a fatal framing
/// error, but the frame header has already been consumed by the time
/// that's detected, so the connection must be closed by the caller.
pub async fn read_tts_audio_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<TtsAudioFrame> {
    let chunk_length = read_u32(reader).await?;
    if chunk_length == 0 {
        return Ok(TtsAudioFrame::Bye);
    }
    if chunk_length > MAX_TTS_CHUNK_BYTES {
        return Err(FramingError::ChunkTooLarge(chunk_length));
    }
    let sample_rate = read_u32(reader).await?;
    let chunk_id = read_u32(reader).await?;
    let payload = read_exact_bytes(reader, chunk_length as usize).await?.to_vec();
    Ok(TtsAudioFrame::Chunk {
        sample_rate,
        chunk_id,
        payload,
    })
}

/// Write one TTS outbound-audio chunk (used by test harnesses standing
/// in for a real TTS engine).
pub async fn write_tts_audio_chunk<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    sample_rate: u32,
    chunk_id: u32,
    payload: &[u8],
) -> Result<()> {
    let mut buf = BytesMut::with_capacity(12 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_u32(sample_rate);
    buf.put_u32(chunk_id);
    buf.put_slice(payload);
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn write_tts_audio_bye<W: AsyncWriteExt + Unpin>(writer: &mut W) -> Result<()> {
    writer.write_u32(0).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one STT -> LLM text message: `u32 length || utf8 text`.
/// `0xFFFFFFFF` terminates the stream.
pub async fn read_text_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<String>> {
    let len = read_u32(reader).await?;
    if len == BYE_SENTINEL {
        return Ok(None);
    }
    let bytes = read_exact_bytes(reader, len as usize).await?;
    Ok(Some(String::from_utf8_lossy(&bytes).to_string()))
}

/// Write one STT -> LLM text message.
pub async fn write_text_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, text: &str) -> Result<()> {
    let mut buf = BytesMut::with_capacity(4 + text.len());
    buf.put_u32(text.len() as u32);
    buf.put_slice(text.as_bytes());
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

async fn read_u32<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<u32> {
    match reader.read_u32().await {
        Ok(v) => Ok(v),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(FramingError::Eof),
        Err(e) => Err(FramingError::Io(e)),
    }
}

/// A partial read here is a fatal connection error: the
/// receiver must read exactly `len` bytes or fail, never return a
/// short buffer.
async fn read_exact_bytes<R: AsyncReadExt + Unpin>(reader: &mut R, len: usize) -> Result<Bytes> {
    let mut buf = BytesMut::zeroed(len);
    match reader.read_exact(&mut buf).await {
        Ok(_) => Ok(buf.freeze()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(FramingError::ShortRead { expected: len, got: 0 })
        }
        Err(e) => Err(FramingError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn hello_round_trips() {
        let mut buf = Vec::new();
        write_hello(&mut buf, "7").await.unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_hello(&mut cursor).await.unwrap(), "7");
    }

    #[tokio::test]
    async fn stt_audio_chunk_round_trips() {
        let samples = vec![0.1f32, -0.2, 0.3];
        let mut buf = Vec::new();
        write_stt_audio_chunk(&mut buf, &samples).await.unwrap();
        let mut cursor = Cursor::new(buf);
        match read_stt_audio_frame(&mut cursor).await.unwrap() {
            SttAudioFrame::Chunk(got) => assert_eq!(got, samples),
            SttAudioFrame::Bye => panic!("expected chunk"),
        }
    }

    #[tokio::test]
    async fn stt_audio_zero_length_is_bye() {
        let mut buf = Vec::new();
        write_stt_audio_bye(&mut buf).await.unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_stt_audio_frame(&mut cursor).await.unwrap(), SttAudioFrame::Bye);
    }

    #[tokio::test]
    async fn stt_audio_sentinel_length_is_bye() {
        let mut buf = Vec::new();
        tokio::io::AsyncWriteExt::write_u32(&mut buf, BYE_SENTINEL).await.unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_stt_audio_frame(&mut cursor).await.unwrap(), SttAudioFrame::Bye);
    }

    #[tokio::test]
    async fn tts_audio_chunk_round_trips() {
        let mut buf = Vec::new();
        write_tts_audio_chunk(&mut buf, 22050, 3, &[1, 2, 3, 4]).await.unwrap();
        let mut cursor = Cursor::new(buf);
        match read_tts_audio_frame(&mut cursor).await.unwrap() {
            TtsAudioFrame::Chunk { sample_rate, chunk_id, payload } => {
                assert_eq!(sample_rate, 22050);
                assert_eq!(chunk_id, 3);
                assert_eq!(payload, vec![1, 2, 3, 4]);
            }
            TtsAudioFrame::Bye => panic!("expected chunk"),
        }
    }

    #[tokio::test]
    async fn tts_audio_oversized_chunk_is_fatal() {
        let mut buf = Vec::new();
        tokio::io::AsyncWriteExt::write_u32(&mut buf, MAX_TTS_CHUNK_BYTES + 1).await.unwrap();
        let mut cursor = Cursor::new(buf);
        let err = read_tts_audio_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, FramingError::ChunkTooLarge(_)));
    }

    #[tokio::test]
    async fn text_frame_round_trips() {
        let mut buf = Vec::new();
        write_text_frame(&mut buf, "Hello").await.unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_text_frame(&mut cursor).await.unwrap(), Some("Hello".to_string()));
    }

    #[tokio::test]
    async fn text_frame_sentinel_terminates() {
        let mut buf = Vec::new();
        tokio::io::AsyncWriteExt::write_u32(&mut buf, BYE_SENTINEL).await.unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_text_frame(&mut cursor).await.unwrap(), None);
    }

    #[tokio::test]
    async fn short_read_is_a_fatal_error_not_a_partial_result() {
        // Header claims 10 bytes but only 2 are actually present.
        let mut buf = Vec::new();
        tokio::io::AsyncWriteExt::write_u32(&mut buf, 10).await.unwrap();
        buf.extend_from_slice(&[1, 2]);
        let mut cursor = Cursor::new(buf);
        let err = read_stt_audio_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, FramingError::ShortRead { .. }));
    }
}
