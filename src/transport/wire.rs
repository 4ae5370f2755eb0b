//! Wire framing for the TCP process group.
//!
//! ```text
//! +-------------+---------+---------------+---------------+------------------+
//! | magic SCMP  | kind u8 | source u32 LE | length u64 LE | payload (length) |
//! +-------------+---------+---------------+---------------+------------------+
//! ```
//!
//! The receiver allocates exactly `length` bytes. A header that does not
//! parse is a protocol violation; there is no resynchronisation.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::TransportError;

/// Frame magic
pub const MAGIC: [u8; 4] = *b"SCMP";

/// Encoded header size in bytes
pub const HEADER_LEN: usize = 4 + 1 + 4 + 8;

/// Largest payload a peer may announce (2 GiB)
pub const MAX_PAYLOAD_LEN: u64 = 1 << 31;

/// Message kinds on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    /// First message on a new connection, announces the sender's rank
    Hello = 1,
    /// One rank's scalar contribution to an all-gather
    Gather = 2,
    /// The full gathered vector, coordinator to peers
    GatherResult = 3,
    /// Point-to-point payload
    Payload = 4,
    /// A rank has reached the barrier
    Barrier = 5,
    /// Every rank reached the barrier, coordinator to peers
    Release = 6,
}

impl MessageKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(MessageKind::Hello),
            2 => Some(MessageKind::Gather),
            3 => Some(MessageKind::GatherResult),
            4 => Some(MessageKind::Payload),
            5 => Some(MessageKind::Barrier),
            6 => Some(MessageKind::Release),
            _ => None,
        }
    }
}

/// Decoded message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub kind: MessageKind,
    pub source: u32,
    pub length: u64,
}

impl FrameHeader {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&MAGIC);
        buf.put_u8(self.kind as u8);
        buf.put_u32_le(self.source);
        buf.put_u64_le(self.length);
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self, TransportError> {
        if buf.len() < HEADER_LEN {
            return Err(TransportError::ProtocolViolation(format!(
                "header is {} bytes, expected {}",
                buf.len(),
                HEADER_LEN
            )));
        }

        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if magic != MAGIC {
            return Err(TransportError::ProtocolViolation(format!("bad magic {:?}", magic)));
        }

        let raw_kind = buf.get_u8();
        let kind = MessageKind::from_u8(raw_kind).ok_or_else(|| {
            TransportError::ProtocolViolation(format!("unknown message kind {}", raw_kind))
        })?;
        let source = buf.get_u32_le();
        let length = buf.get_u64_le();
        if length > MAX_PAYLOAD_LEN {
            return Err(TransportError::ProtocolViolation(format!(
                "payload length {} exceeds limit",
                length
            )));
        }

        Ok(Self { kind, source, length })
    }
}

/// A complete message as read from a stream
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Message {
    /// Fail unless this message is of the `expected` kind
    pub fn expect_kind(self, expected: MessageKind) -> Result<Self, TransportError> {
        if self.header.kind != expected {
            return Err(TransportError::ProtocolViolation(format!(
                "expected {:?} from rank {}, got {:?}",
                expected, self.header.source, self.header.kind
            )));
        }
        Ok(self)
    }
}

/// Write one message and flush it
pub async fn write_message<W>(
    writer: &mut W,
    kind: MessageKind,
    source: usize,
    payload: &[u8],
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let source = u32::try_from(source)
        .map_err(|_| TransportError::ProtocolViolation(format!("rank {} does not fit the header", source)))?;
    let header = FrameHeader {
        kind,
        source,
        length: payload.len() as u64,
    };

    let mut buf = BytesMut::with_capacity(HEADER_LEN);
    header.encode(&mut buf);
    writer.write_all(&buf).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one message, allocating exactly the announced payload length
pub async fn read_message<R>(reader: &mut R) -> Result<Message, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; HEADER_LEN];
    reader.read_exact(&mut header_buf).await?;
    let header = FrameHeader::decode(&header_buf)?;

    let mut payload = BytesMut::zeroed(header.length as usize);
    reader.read_exact(&mut payload).await?;
    Ok(Message {
        header,
        payload: payload.freeze(),
    })
}

/// Encode a vector of f64 values (all-gather result)
pub fn encode_f64s(values: &[f64]) -> Bytes {
    let mut buf = BytesMut::with_capacity(values.len() * 8);
    for &value in values {
        buf.put_f64_le(value);
    }
    buf.freeze()
}

/// Decode exactly `count` f64 values
pub fn decode_f64s(mut payload: Bytes, count: usize) -> Result<Vec<f64>, TransportError> {
    if payload.len() != count * 8 {
        return Err(TransportError::ProtocolViolation(format!(
            "expected {} f64 values, got {} bytes",
            count,
            payload.len()
        )));
    }
    let mut values = Vec::with_capacity(count);
    while payload.has_remaining() {
        values.push(payload.get_f64_le());
    }
    Ok(values)
}
