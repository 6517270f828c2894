//! Length-prefixed framing for the authority protocol.
//!
//! Each message travels as a 4-byte big-endian length followed by a bincode
//! payload of exactly that many bytes, so a message may arrive split across
//! several reads or share a read with its neighbour.

use bincode::{deserialize, serialize};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest payload either side will accept.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed payload: {0}")]
    Malformed(#[from] bincode::Error),

    #[error("frame of {0} bytes exceeds the 64 KiB limit")]
    TooLarge(usize),
}

impl FrameError {
    /// True when the stream itself is unusable, as opposed to one bad payload.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FrameError::Malformed(_))
    }
}

/// Reads one frame. Returns `Ok(None)` when the peer closed cleanly between frames.
pub async fn read_frame<T, R>(reader: &mut R) -> Result<Option<T>, FrameError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    // Only an end-of-stream before the first header byte is a clean close.
    let mut header = [0u8; 4];
    if reader.read(&mut header[..1]).await? == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut header[1..]).await?;
    let len = u32::from_be_bytes(header) as usize;

    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(Some(deserialize(&payload)?))
}

pub async fn write_frame<T, W>(writer: &mut W, message: &T) -> Result<(), FrameError>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let payload = serialize(message)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(payload.len()));
    }

    let mut buffer = Vec::with_capacity(payload.len() + 4);
    buffer.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buffer.extend_from_slice(&payload);

    writer.write_all(&buffer).await?;
    writer.flush().await?;
    Ok(())
}
