//! Response definitions
//!
//! Represents replies sent to clients and their RESP encoding.

use std::io::Write;

use bytes::{BufMut, Bytes, BytesMut};

/// A reply to send to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `+<text>\r\n` (raw bytes; CR and LF are not allowed)
    Simple(Bytes),

    /// `$<len>\r\n<bytes>\r\n` (binary safe)
    Bulk(Bytes),

    /// `$-1\r\n`
    Null,

    /// `-<message>\r\n`
    Error(String),
}

impl Response {
    /// Create a simple string reply
    pub fn simple(text: impl Into<Bytes>) -> Self {
        Response::Simple(text.into())
    }

    /// Create a bulk string reply
    pub fn bulk(bytes: impl Into<Bytes>) -> Self {
        Response::Bulk(bytes.into())
    }

    /// Create an error reply
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error(message.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }

    /// Append the RESP encoding to `out`
    pub fn encode_into(&self, out: &mut BytesMut) {
        match self {
            Response::Simple(text) => {
                out.put_u8(b'+');
                put_line(out, text);
                out.put_slice(b"\r\n");
            }
            Response::Error(message) => {
                out.put_u8(b'-');
                put_line(out, message.as_bytes());
                out.put_slice(b"\r\n");
            }
            Response::Bulk(bytes) => {
                out.put_u8(b'$');
                out.put_slice(bytes.len().to_string().as_bytes());
                out.put_slice(b"\r\n");
                out.put_slice(bytes);
                out.put_slice(b"\r\n");
            }
            Response::Null => out.put_slice(b"$-1\r\n"),
        }
    }

    /// Encode to a fresh buffer
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        self.encode_into(&mut out);
        out.freeze()
    }

    /// Write the encoding to a stream (no flush)
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.encode())
    }
}

/// Line-based replies cannot carry CR or LF; write them as spaces
fn put_line(out: &mut BytesMut, text: &[u8]) {
    out.reserve(text.len());
    for &b in text {
        out.put_u8(if b == b'\r' || b == b'\n' { b' ' } else { b });
    }
}
