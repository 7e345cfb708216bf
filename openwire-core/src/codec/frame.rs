//! Wire frame read/write (spec.md §4.2 "Frame format").
//!
//! Every command is sent as `u32` big-endian size (the byte count of
//! everything that follows, excluding the size field itself), then a `u8`
//! data-structure type byte, then the command body. `size` is disabled only
//! during the very first bytes of a TCP connection, before a `WireFormatInfo`
//! has been exchanged in either direction (spec.md §5.1).

use crate::error::{DecodeErrorKind, OpenWireError, OpenWireResult};
use byteorder::{BigEndian, WriteBytesExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frames above this size are rejected outright rather than allocated, so a
/// corrupted or hostile peer cannot force an unbounded allocation.
pub const MAX_FRAME_SIZE: u32 = 100 * 1024 * 1024;

#[derive(Debug)]
pub struct Frame {
    pub data_type: u8,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn new(data_type: u8, body: Vec<u8>) -> Self {
        Self { data_type, body }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(5 + self.body.len());
        let size = 1 + self.body.len() as u32;
        WriteBytesExt::write_u32::<BigEndian>(&mut out, size).expect("Vec write never fails");
        WriteBytesExt::write_u8(&mut out, self.data_type).expect("Vec write never fails");
        out.extend_from_slice(&self.body);
        out
    }

    pub async fn read<R: AsyncRead + Unpin>(reader: &mut R) -> OpenWireResult<Self> {
        let size = reader.read_u32().await.map_err(|e| io_or_truncated(e))?;
        if size == 0 {
            // A bare size-0 frame is the broker's keepalive `KeepAliveInfo`
            // shortcut used by some wire format versions; treat it as an
            // empty `data_type` 0 body rather than an error.
            return Ok(Self { data_type: 0, body: Vec::new() });
        }
        if size > MAX_FRAME_SIZE {
            return Err(OpenWireError::decode(DecodeErrorKind::FrameTooLarge, 0));
        }
        let data_type = reader.read_u8().await.map_err(|e| io_or_truncated(e))?;
        let body_len = size as usize - 1;
        let mut body = vec![0_u8; body_len];
        reader
            .read_exact(&mut body)
            .await
            .map_err(|e| io_or_truncated(e))?;
        Ok(Self { data_type, body })
    }

    pub async fn write<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> OpenWireResult<()> {
        writer.write_all(&self.encode()).await?;
        writer.flush().await?;
        Ok(())
    }
}

fn io_or_truncated(err: std::io::Error) -> OpenWireError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        OpenWireError::decode(DecodeErrorKind::TruncatedFrame, 0)
    } else {
        OpenWireError::from(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn round_trips_a_frame() {
        let frame = Frame::new(7, vec![1, 2, 3, 4]);
        let encoded = frame.encode();
        assert_eq!(&encoded[0..4], &[0, 0, 0, 5]);
        let mut cursor = Cursor::new(encoded);
        let decoded = Frame::read(&mut cursor).await.unwrap();
        assert_eq!(decoded.data_type, 7);
        assert_eq!(decoded.body, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn rejects_oversized_frame() {
        let mut buf = Vec::new();
        byteorder::WriteBytesExt::write_u32::<BigEndian>(&mut buf, MAX_FRAME_SIZE + 1).unwrap();
        let mut cursor = Cursor::new(buf);
        let err = Frame::read(&mut cursor).await.unwrap_err();
        assert!(matches!(
            err,
            OpenWireError::Decode { kind: DecodeErrorKind::FrameTooLarge, .. }
        ));
    }

    #[tokio::test]
    async fn truncated_body_is_reported_as_truncated_frame() {
        let mut buf = Vec::new();
        byteorder::WriteBytesExt::write_u32::<BigEndian>(&mut buf, 10).unwrap();
        byteorder::WriteBytesExt::write_u8(&mut buf, 1).unwrap();
        buf.extend_from_slice(&[1, 2]);
        let mut cursor = Cursor::new(buf);
        let err = Frame::read(&mut cursor).await.unwrap_err();
        assert!(matches!(
            err,
            OpenWireError::Decode { kind: DecodeErrorKind::TruncatedFrame, .. }
        ));
    }
}
