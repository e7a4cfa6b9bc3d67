// Wire framing for the data stream protocol.
//
// Every message on a data connection is a frame: a u32 big-endian length
// prefix followed by exactly that many payload bytes. Server-to-client
// frames carry chunks (row-major f32 little-endian samples); client-to-
// server frames carry short UTF-8 control strings, the empty frame being
// the plain-subscription hello. The two directions never mix, so the
// payload kind needs no tag.

use crate::error::{Error, Result};
use crate::types::Chunk;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame; anything larger is a corrupt prefix.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Encode a chunk into a complete frame (prefix included), ready to be
/// written verbatim to any number of subscribers.
pub fn encode_chunk(chunk: &Chunk) -> Vec<u8> {
    let payload_len = chunk.data().len() * 4;
    let mut frame = Vec::with_capacity(4 + payload_len);
    frame.extend_from_slice(&(payload_len as u32).to_be_bytes());
    for sample in chunk.data() {
        frame.extend_from_slice(&sample.to_le_bytes());
    }
    frame
}

/// Encode a control string into a complete frame (prefix included).
pub fn encode_control(text: &str) -> Vec<u8> {
    let mut frame = Vec::with_capacity(4 + text.len());
    frame.extend_from_slice(&(text.len() as u32).to_be_bytes());
    frame.extend_from_slice(text.as_bytes());
    frame
}

/// Decode a chunk payload with the channel count fixed at connection time.
pub fn decode_chunk(payload: &[u8], channels: usize) -> Result<Chunk> {
    if payload.len() % 4 != 0 {
        return Err(Error::Protocol(format!(
            "chunk payload of {} bytes is not f32-aligned",
            payload.len()
        )));
    }
    let samples: Vec<f32> = payload
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    if channels == 0 || samples.len() % channels != 0 {
        return Err(Error::Protocol(format!(
            "chunk payload of {} samples does not match {} channels",
            samples.len(),
            channels
        )));
    }
    Chunk::new(channels, samples)
}

/// Write one raw frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one raw frame.
///
/// Returns `Ok(None)` on a clean close at a frame boundary. A stream that
/// closes mid-frame is a protocol error (truncated frame); a partial
/// payload is never surfaced.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut header = [0u8; 4];
    let mut read = 0;
    while read < header.len() {
        let n = reader.read(&mut header[read..]).await?;
        if n == 0 {
            if read == 0 {
                return Ok(None);
            }
            return Err(Error::Protocol("truncated frame header".into()));
        }
        read += n;
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(Error::Protocol(format!("frame length {len} exceeds limit")));
    }

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::Protocol("truncated frame".into()),
            _ => Error::Io(e),
        })?;
    Ok(Some(payload))
}

/// Read one chunk frame, blocking until a full frame arrives or the
/// stream closes cleanly.
pub async fn read_chunk<R: AsyncRead + Unpin>(
    reader: &mut R,
    channels: usize,
) -> Result<Option<Chunk>> {
    match read_frame(reader).await? {
        Some(payload) => decode_chunk(&payload, channels).map(Some),
        None => Ok(None),
    }
}
