//! Length-prefixed frame codec shared by both channels.
//!
//! Wire layout: `[4 bytes, big-endian, unsigned payload length N][N bytes]`.
//! The payload is JSON produced by the message enums in this crate; the
//! codec itself moves opaque bytes. The codec enforces no upper payload
//! bound of its own — callers that need one use [`read_frame_limited`].
//!
//! A connection may close cleanly only between frames: EOF before the
//! first prefix byte yields `Ok(None)`, while EOF anywhere inside a frame
//! is a [`FrameError::Truncated`] and must tear the session down.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the big-endian length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Errors produced by the frame codec.
#[derive(Error, Debug)]
pub enum FrameError {
    /// Stream ended in the middle of a frame. Fatal to the connection.
    #[error("stream closed mid-frame while reading {context}")]
    Truncated { context: &'static str },

    /// Declared payload length exceeds the caller's limit.
    #[error("declared payload of {declared} bytes exceeds the {limit}-byte limit")]
    TooLarge { declared: u64, limit: u64 },

    /// Payload does not fit in a 4-byte length prefix.
    #[error("payload of {size} bytes does not fit in a u32 length prefix")]
    Oversize { size: usize },

    /// Message failed to serialize.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// Well-framed payload failed to deserialize.
    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Encodes a payload into a full frame: length prefix plus payload bytes.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let len = u32::try_from(payload.len())
        .map_err(|_| FrameError::Oversize { size: payload.len() })?;

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Writes one frame and flushes the stream.
pub async fn write_frame<W>(stream: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(payload)?;
    stream.write_all(&frame).await?;
    stream.flush().await?;
    Ok(())
}

/// Reads one frame without a payload bound.
///
/// Returns `Ok(None)` on a clean close (EOF before the first prefix byte).
pub async fn read_frame<R>(stream: &mut R) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncRead + Unpin,
{
    read_frame_limited(stream, u32::MAX).await
}

/// Reads one frame, rejecting payloads larger than `max_payload` bytes.
///
/// The limit is checked against the declared length before any payload
/// byte is read, so an oversized declaration never allocates.
pub async fn read_frame_limited<R>(
    stream: &mut R,
    max_payload: u32,
) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncRead + Unpin,
{
    // Filled byte by byte so a close before the first byte is
    // distinguishable from a close inside the prefix.
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    let mut filled = 0usize;

    while filled < LENGTH_PREFIX_SIZE {
        let n = stream.read(&mut prefix[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                // Clean close at a frame boundary: no message in flight.
                return Ok(None);
            }
            return Err(FrameError::Truncated {
                context: "length prefix",
            });
        }
        filled += n;
    }

    let declared = u32::from_be_bytes(prefix);
    if declared > max_payload {
        return Err(FrameError::TooLarge {
            declared: u64::from(declared),
            limit: u64::from(max_payload),
        });
    }

    let mut payload = vec![0u8; declared as usize];
    if let Err(e) = stream.read_exact(&mut payload).await {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            return Err(FrameError::Truncated { context: "payload" });
        }
        return Err(FrameError::Io(e));
    }

    Ok(Some(payload))
}

/// Serializes a message to JSON and writes it as one frame.
pub async fn write_message<W, T>(stream: &mut W, message: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(message).map_err(FrameError::Encode)?;
    write_frame(stream, &payload).await
}

/// Reads one frame and deserializes its JSON payload.
///
/// Returns `Ok(None)` on a clean close. Callers that must keep a
/// connection alive across malformed payloads should read raw frames with
/// [`read_frame`] and decode separately; here a decode failure is an error.
pub async fn read_message<R, T>(stream: &mut R) -> Result<Option<T>, FrameError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    match read_frame(stream).await? {
        Some(payload) => {
            let message = serde_json::from_slice(&payload).map_err(FrameError::Decode)?;
            Ok(Some(message))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_encode_frame_layout() {
        let frame = encode_frame(b"abc").unwrap();
        assert_eq!(frame, vec![0x00, 0x00, 0x00, 0x03, b'a', b'b', b'c']);
    }

    #[test]
    fn test_encode_frame_big_endian_order() {
        let payload = vec![0u8; 0x0102];
        let frame = encode_frame(&payload).unwrap();
        assert_eq!(&frame[..LENGTH_PREFIX_SIZE], &[0x00, 0x00, 0x01, 0x02]);
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (mut client, mut server) = tokio::io::duplex(256);

        write_frame(&mut client, b"{\"type\":\"resumen_estado\"}")
            .await
            .unwrap();

        let payload = read_frame(&mut server).await.unwrap().unwrap();
        assert_eq!(payload, b"{\"type\":\"resumen_estado\"}");
    }

    #[tokio::test]
    async fn test_empty_payload_round_trips() {
        let (mut client, mut server) = tokio::io::duplex(64);
        write_frame(&mut client, b"").await.unwrap();

        let payload = read_frame(&mut server).await.unwrap().unwrap();
        assert!(payload.is_empty());
    }

    #[tokio::test]
    async fn test_clean_close_at_boundary() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);

        assert!(read_frame(&mut server).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_inside_prefix_is_truncated() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[0x00, 0x00]).await.unwrap();
        drop(client);

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                context: "length prefix"
            }
        ));
    }

    #[tokio::test]
    async fn test_close_inside_payload_is_truncated() {
        let (mut client, mut server) = tokio::io::duplex(64);
        // Declares 10 bytes, delivers 4, then closes.
        client.write_all(&[0x00, 0x00, 0x00, 0x0A]).await.unwrap();
        client.write_all(b"nope").await.unwrap();
        drop(client);

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, FrameError::Truncated { context: "payload" }));
    }

    #[tokio::test]
    async fn test_declared_length_over_limit_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client
            .write_all(&[0xFF, 0xFF, 0xFF, 0xFF])
            .await
            .unwrap();

        let err = read_frame_limited(&mut server, 1024).await.unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { .. }));
    }

    #[tokio::test]
    async fn test_multiple_frames_in_sequence() {
        let (mut client, mut server) = tokio::io::duplex(256);
        write_frame(&mut client, b"first").await.unwrap();
        write_frame(&mut client, b"second").await.unwrap();
        drop(client);

        assert_eq!(read_frame(&mut server).await.unwrap().unwrap(), b"first");
        assert_eq!(read_frame(&mut server).await.unwrap().unwrap(), b"second");
        assert!(read_frame(&mut server).await.unwrap().is_none());
    }
}
