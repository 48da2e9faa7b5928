//! Native-messaging framing.
//!
//! Every message is a 4-byte unsigned length in native byte order followed
//! by that many bytes of UTF-8 JSON. Payloads are capped at
//! [`MAX_MESSAGE_SIZE`] bytes in both directions.

use crate::FrameError;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// Largest payload accepted or sent.
pub const MAX_MESSAGE_SIZE: usize = 4095;

/// Size of the length prefix.
pub const PREFIX_LEN: usize = 4;

/// Build a complete frame for `payload`.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(FrameError::TooLarge {
            declared: payload.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    let mut frame = Vec::with_capacity(PREFIX_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_ne_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Split one frame off the front of `buf`.
///
/// Returns the payload and the number of bytes consumed, or `None` when
/// `buf` does not yet hold a complete frame.
pub fn decode_frame(buf: &[u8]) -> Result<Option<(Vec<u8>, usize)>, FrameError> {
    let Some(prefix) = buf.get(..PREFIX_LEN) else {
        return Ok(None);
    };
    let declared = declared_len(prefix)?;
    Ok(buf
        .get(PREFIX_LEN..PREFIX_LEN + declared)
        .map(|payload| (payload.to_vec(), PREFIX_LEN + declared)))
}

fn declared_len(prefix: &[u8]) -> Result<usize, FrameError> {
    let mut raw = [0u8; PREFIX_LEN];
    raw.copy_from_slice(prefix);
    let declared = u32::from_ne_bytes(raw) as usize;
    if declared > MAX_MESSAGE_SIZE {
        return Err(FrameError::TooLarge {
            declared,
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(declared)
}

/// Length-prefixed message channel over any async byte stream pair.
pub struct FramedTransport<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> FramedTransport<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Read the next message.
    ///
    /// `Ok(None)` means the peer closed the stream cleanly between
    /// messages. EOF part-way through a frame is `ReadFailed`. On
    /// `TooLarge` only the prefix has been consumed.
    pub async fn read_message(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let mut prefix = [0u8; PREFIX_LEN];
        let mut filled = 0;
        while filled < PREFIX_LEN {
            let n = self
                .reader
                .read(&mut prefix[filled..])
                .await
                .map_err(FrameError::ReadFailed)?;
            if n == 0 {
                if filled == 0 {
                    debug!("Native-messaging stream closed");
                    return Ok(None);
                }
                return Err(FrameError::ReadFailed(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream closed inside length prefix",
                )));
            }
            filled += n;
        }

        let declared = declared_len(&prefix)?;
        let mut payload = vec![0u8; declared];
        self.reader
            .read_exact(&mut payload)
            .await
            .map_err(FrameError::ReadFailed)?;

        trace!(size = declared, "Read frame");
        Ok(Some(payload))
    }

    /// Write one message and flush it.
    pub async fn send_message(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        let frame = encode_frame(payload)?;
        self.writer
            .write_all(&frame)
            .await
            .map_err(FrameError::WriteFailed)?;
        self.writer.flush().await.map_err(FrameError::WriteFailed)?;
        trace!(size = payload.len(), "Sent frame");
        Ok(())
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }
}
