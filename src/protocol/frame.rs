//! Length-prefixed frame codec

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::constants::{LENGTH_PREFIX_SIZE, READ_CHUNK_SIZE};
use crate::error::{RelayError, RelayResult};

fn length_prefix(payload: &[u8]) -> RelayResult<[u8; LENGTH_PREFIX_SIZE]> {
    let len = u32::try_from(payload.len()).map_err(|_| RelayError::FrameTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;
    Ok(len.to_be_bytes())
}

/// Write one frame and flush it.
///
/// The payload is written straight from the caller's buffer, so fanning one
/// shared frame out to many sockets never copies it.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> RelayResult<()>
where
    W: AsyncWrite + Unpin,
{
    let prefix = length_prefix(payload)?;
    let mut wire = Buf::chain(prefix.as_slice(), payload);
    writer.write_all_buf(&mut wire).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame.
///
/// Returns `Ok(None)` when the peer closes the connection cleanly on a frame
/// boundary. A connection that closes partway through a frame yields
/// [`RelayError::TruncatedFrame`]. The payload buffer grows as bytes arrive,
/// never ahead of them by more than [`READ_CHUNK_SIZE`].
pub async fn read_frame<R>(reader: &mut R, max_frame_size: usize) -> RelayResult<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; LENGTH_PREFIX_SIZE];
    let mut filled = 0;
    while filled < LENGTH_PREFIX_SIZE {
        let n = reader.read(&mut len_bytes[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(RelayError::TruncatedFrame);
        }
        filled += n;
    }

    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > max_frame_size {
        return Err(RelayError::FrameTooLarge {
            size: len,
            max: max_frame_size,
        });
    }

    let mut payload = BytesMut::with_capacity(len.min(READ_CHUNK_SIZE));
    let mut body = (&mut *reader).take(len as u64);
    while payload.len() < len {
        if payload.len() == payload.capacity() {
            payload.reserve((len - payload.len()).min(READ_CHUNK_SIZE));
        }
        if body.read_buf(&mut payload).await? == 0 {
            return Err(RelayError::TruncatedFrame);
        }
    }

    Ok(Some(payload.freeze()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Records every buffer handed to `poll_write`
    #[derive(Default)]
    struct RecordingWriter {
        writes: Vec<Vec<u8>>,
    }

    impl AsyncWrite for RecordingWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            self.writes.push(buf.to_vec());
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    async fn encode(payload: &[u8]) -> Vec<u8> {
        let mut wire = Vec::new();
        write_frame(&mut wire, payload).await.unwrap();
        wire
    }

    #[tokio::test]
    async fn test_frame_prefix() {
        assert_eq!(encode(b"abc").await, vec![0, 0, 0, 3, b'a', b'b', b'c']);
        assert_eq!(encode(&[]).await, vec![0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_write_frame_sends_payload_without_reencoding() {
        let payload = vec![0xAB; 4096];
        let mut writer = RecordingWriter::default();

        write_frame(&mut writer, &payload).await.unwrap();

        assert_eq!(writer.writes.len(), 2);
        assert_eq!(writer.writes[0], vec![0, 0, 0x10, 0]);
        assert_eq!(writer.writes[1], payload);
    }

    #[tokio::test]
    async fn test_read_frames_in_sequence() {
        let mut wire = encode(b"first").await;
        wire.extend_from_slice(&encode(&[]).await);
        wire.extend_from_slice(&encode(b"third").await);
        let mut reader = &wire[..];

        assert_eq!(read_frame(&mut reader, 64).await.unwrap().unwrap(), &b"first"[..]);
        assert!(read_frame(&mut reader, 64).await.unwrap().unwrap().is_empty());
        assert_eq!(read_frame(&mut reader, 64).await.unwrap().unwrap(), &b"third"[..]);
        assert!(read_frame(&mut reader, 64).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_rejects_oversized() {
        let wire = encode(&[7u8; 100]).await;
        let mut reader = &wire[..];

        let result = read_frame(&mut reader, 99).await;
        assert!(matches!(
            result,
            Err(RelayError::FrameTooLarge { size: 100, max: 99 })
        ));
    }

    #[tokio::test]
    async fn test_read_frame_truncated_payload() {
        let wire = encode(b"hello").await;
        let mut reader = &wire[..wire.len() - 2];

        let result = read_frame(&mut reader, 64).await;
        assert!(matches!(result, Err(RelayError::TruncatedFrame)));
    }

    #[tokio::test]
    async fn test_read_frame_truncated_prefix() {
        let wire = [0u8, 0];
        let mut reader = &wire[..];

        let result = read_frame(&mut reader, 64).await;
        assert!(matches!(result, Err(RelayError::TruncatedFrame)));
    }

    #[tokio::test]
    async fn test_large_declared_frame_with_few_bytes_is_truncated() {
        // Declares 8 MiB but delivers ten bytes before closing
        let mut wire = (8u32 * 1024 * 1024).to_be_bytes().to_vec();
        wire.extend_from_slice(&[1u8; 10]);
        let mut reader = &wire[..];

        let result = read_frame(&mut reader, 16 * 1024 * 1024).await;
        assert!(matches!(result, Err(RelayError::TruncatedFrame)));
    }

    #[tokio::test]
    async fn test_frame_spanning_many_chunks_arrives_intact() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let payload: Vec<u8> = (0..READ_CHUNK_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();

        let expected = payload.clone();
        let writer = tokio::spawn(async move {
            write_frame(&mut a, &payload).await.unwrap();
        });

        let received = read_frame(&mut b, READ_CHUNK_SIZE * 4).await.unwrap().unwrap();
        writer.await.unwrap();

        assert_eq!(received.len(), expected.len());
        assert_eq!(&received[..], &expected[..]);
    }
}
