//! Client-side codec
//!
//! Encodes requests as RESP multibulk arrays and decodes replies. Used by the
//! CLI and by tests that talk to a running server.

use std::io::{BufRead, Write};

use bytes::Bytes;

use crate::error::{KvError, Result};

use super::{Response, MAX_BULK_LEN};

/// Encode arguments as `*<n>\r\n` followed by n bulk strings
pub fn encode_request<A: AsRef<[u8]>>(args: &[A]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        let arg = arg.as_ref();
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Write a request to a stream and flush it
pub fn write_request<W: Write, A: AsRef<[u8]>>(writer: &mut W, args: &[A]) -> Result<()> {
    writer.write_all(&encode_request(args))?;
    writer.flush()?;
    Ok(())
}

/// Read one complete reply from a stream
///
/// Blocks until a complete reply is received or an error occurs
pub fn read_reply<R: BufRead>(reader: &mut R) -> Result<Response> {
    let mut line = Vec::new();
    if reader.read_until(b'\n', &mut line)? == 0 {
        return Err(KvError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed before reply",
        )));
    }

    if !line.ends_with(b"\r\n") {
        return Err(KvError::Protocol("reply line not terminated by CRLF".to_string()));
    }
    if line.len() < 3 {
        return Err(KvError::Protocol("empty reply line".to_string()));
    }
    let body = &line[1..line.len() - 2];
    let text = || String::from_utf8_lossy(body).into_owned();

    match line[0] {
        b'+' => Ok(Response::Simple(Bytes::copy_from_slice(body))),
        b'-' => Ok(Response::Error(text())),
        b'$' => {
            if body == b"-1" {
                return Ok(Response::Null);
            }
            let len: usize = text()
                .parse()
                .map_err(|_| KvError::Protocol(format!("invalid bulk length '{}'", text())))?;

            if len > MAX_BULK_LEN {
                return Err(KvError::Protocol(format!("bulk length {} exceeds limit", len)));
            }

            let mut payload = vec![0u8; len + 2];
            reader.read_exact(&mut payload)?;
            if &payload[len..] != b"\r\n" {
                return Err(KvError::Protocol("bulk reply not terminated by CRLF".to_string()));
            }
            payload.truncate(len);
            Ok(Response::Bulk(Bytes::from(payload)))
        }
        other => Err(KvError::Protocol(format!(
            "unexpected reply type '{}'",
            (other as char).escape_default()
        ))),
    }
}
