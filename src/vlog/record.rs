//! Value log record definitions
//!
//! Defines the framing of individual records and the pointers the index
//! keeps into the log.

use serde::{Deserialize, Serialize};

use crate::error::{KvError, Result};

/// Frame header size: BodyLen (4) + CRC (4)
pub const HEADER_SIZE: usize = 8;

/// Smallest possible body: seq (8) + two empty length-prefixed byte strings
pub(crate) const MIN_BODY_SIZE: usize = 24;

/// A single Set as stored in the value log
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogRecord {
    /// Sequence number - monotonically increasing across segments
    pub seq: u64,

    /// Key bytes
    pub key: Vec<u8>,

    /// Value bytes
    pub value: Vec<u8>,
}

/// Borrowed form used on the write path so keys and values are not cloned.
/// Serializes to the same bytes as `LogRecord`.
#[derive(Serialize)]
struct RecordRef<'a> {
    seq: u64,
    key: &'a [u8],
    value: &'a [u8],
}

impl LogRecord {
    pub fn new(seq: u64, key: Vec<u8>, value: Vec<u8>) -> Self {
        Self { seq, key, value }
    }

    /// Encode into a framed record: [body_len][crc][body]
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_parts(self.seq, &self.key, &self.value)
    }

    /// Decode a complete framed record, verifying length and checksum
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() < HEADER_SIZE {
            return Err(KvError::Corruption(format!(
                "record frame too short: {} bytes",
                frame.len()
            )));
        }

        let (body_len, crc) = decode_header(&frame[..HEADER_SIZE]);
        let body = &frame[HEADER_SIZE..];

        if body.len() != body_len as usize {
            return Err(KvError::Corruption(format!(
                "record length mismatch: header says {}, frame has {}",
                body_len,
                body.len()
            )));
        }

        if crc32fast::hash(body) != crc {
            return Err(KvError::Corruption("record checksum mismatch".to_string()));
        }

        Self::decode_body(body)
    }

    /// Decode a body whose checksum has already been verified
    pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
        bincode::deserialize(body)
            .map_err(|e| KvError::Corruption(format!("undecodable record body: {}", e)))
    }
}

/// Encode a record without taking ownership of key and value
pub(crate) fn encode_parts(seq: u64, key: &[u8], value: &[u8]) -> Result<Vec<u8>> {
    let body = bincode::serialize(&RecordRef { seq, key, value })?;

    // The whole frame length must fit the u32 in a ValuePointer
    if u32::try_from(HEADER_SIZE + body.len()).is_err() {
        return Err(KvError::ValueLog(format!(
            "record of {} bytes exceeds the frame limit",
            body.len()
        )));
    }
    let body_len = body.len() as u32;

    let mut frame = Vec::with_capacity(HEADER_SIZE + body.len());
    frame.extend_from_slice(&body_len.to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Split a frame header into (body_len, crc)
pub(crate) fn decode_header(header: &[u8]) -> (u32, u32) {
    let mut len = [0u8; 4];
    let mut crc = [0u8; 4];
    len.copy_from_slice(&header[0..4]);
    crc.copy_from_slice(&header[4..8]);
    (u32::from_le_bytes(len), u32::from_le_bytes(crc))
}

/// Location of a framed record inside the value log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValuePointer {
    /// Segment id
    pub file_id: u32,

    /// Byte offset of the frame inside the segment
    pub offset: u64,

    /// Length of the whole frame (header + body)
    pub len: u32,
}

impl ValuePointer {
    /// Encoded size: FileId (4) + Offset (8) + Len (4)
    pub const ENCODED_SIZE: usize = 16;

    pub fn to_bytes(&self) -> [u8; Self::ENCODED_SIZE] {
        let mut out = [0u8; Self::ENCODED_SIZE];
        out[0..4].copy_from_slice(&self.file_id.to_le_bytes());
        out[4..12].copy_from_slice(&self.offset.to_le_bytes());
        out[12..16].copy_from_slice(&self.len.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::ENCODED_SIZE {
            return Err(KvError::Corruption(format!(
                "value pointer must be {} bytes, got {}",
                Self::ENCODED_SIZE,
                bytes.len()
            )));
        }
        let mut file_id = [0u8; 4];
        let mut offset = [0u8; 8];
        let mut len = [0u8; 4];
        file_id.copy_from_slice(&bytes[0..4]);
        offset.copy_from_slice(&bytes[4..12]);
        len.copy_from_slice(&bytes[12..16]);
        Ok(Self {
            file_id: u32::from_le_bytes(file_id),
            offset: u64::from_le_bytes(offset),
            len: u32::from_le_bytes(len),
        })
    }
}

/// A position in the value log (segment id + byte offset)
///
/// Ordered first by segment, then by offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct LogPosition {
    pub file_id: u32,
    pub offset: u64,
}

impl LogPosition {
    pub fn new(file_id: u32, offset: u64) -> Self {
        Self { file_id, offset }
    }
}
