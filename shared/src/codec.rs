//! Length-prefixed framing of [`Packet`]s over a byte stream
//!
//! Each frame is a big-endian `u32` length followed by the bincode encoding
//! of one packet. A frame that cannot be decoded is consumed in full, so the
//! stream stays aligned and the caller may simply skip it.

use crate::Packet;
use bincode::{deserialize, serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAX_FRAME_LEN: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode packet: {0}")]
    Decode(bincode::Error),
    #[error("failed to encode packet: {0}")]
    Encode(bincode::Error),
    #[error("frame of {0} bytes exceeds the frame size limit")]
    FrameTooLarge(usize),
}

impl CodecError {
    /// True when the peer sent bad input but the stream itself is still usable
    pub fn is_malformed(&self) -> bool {
        matches!(self, CodecError::Decode(_) | CodecError::FrameTooLarge(_))
    }
}

pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    let data = serialize(packet).map_err(CodecError::Encode)?;
    if data.len() > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge(data.len()));
    }

    writer.write_u32(data.len() as u32).await?;
    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads the next packet. Returns `Ok(None)` on a clean end of stream.
pub async fn read_packet<R>(reader: &mut R) -> Result<Option<Packet>, CodecError>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if len > MAX_FRAME_LEN {
        let mut oversized = (&mut *reader).take(len as u64);
        let skipped = tokio::io::copy(&mut oversized, &mut tokio::io::sink()).await?;
        if skipped < len as u64 {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        return Err(CodecError::FrameTooLarge(len));
    }

    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer).await?;

    deserialize::<Packet>(&buffer)
        .map(Some)
        .map_err(CodecError::Decode)
}
