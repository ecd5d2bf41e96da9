//! Request decoding
//!
//! Incremental RESP request parser. The caller keeps unconsumed bytes in a
//! `BytesMut`; each call either yields one complete request, reports that more
//! bytes are needed, or fails with a protocol error.
//!
//! ## Accepted forms
//! ```text
//! *<argc>\r\n $<len>\r\n<bytes>\r\n ... (argc times)    multibulk
//! PING hello\r\n                                         inline
//! ```

use std::ops::Range;

use bytes::{Bytes, BytesMut};

use crate::error::{KvError, Result};

/// Maximum number of arguments in one request
pub const MAX_ARGS: usize = 1024 * 1024;

/// Maximum length of one bulk argument (512 MB)
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Maximum length of a header or inline line (64 KB)
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Result of parsing the front of a buffer
type Parsed = Option<(Vec<Range<usize>>, usize)>;

/// Decode one request from the front of `buffer`
///
/// - `Ok(Some(args))`: a complete request; its bytes are removed from `buffer`
///   and the arguments share that allocation
/// - `Ok(None)`: incomplete, read more bytes and call again
/// - `Err(Protocol)`: malformed; the connection cannot be resynchronized
///
/// An empty `args` vector is a blank request and deserves no reply.
pub fn decode_request(buffer: &mut BytesMut) -> Result<Option<Vec<Bytes>>> {
    match parse_request(buffer)? {
        Some((ranges, consumed)) => {
            let frame = buffer.split_to(consumed).freeze();
            Ok(Some(ranges.into_iter().map(|r| frame.slice(r)).collect()))
        }
        None => Ok(None),
    }
}

/// Parse one request, returning argument ranges and bytes consumed
pub fn parse_request(buf: &[u8]) -> Result<Parsed> {
    match buf.first() {
        None => Ok(None),
        Some(b'*') => parse_multibulk(buf),
        Some(_) => parse_inline(buf),
    }
}

/// `*<argc>\r\n` followed by argc bulk strings
fn parse_multibulk(buf: &[u8]) -> Result<Parsed> {
    let line_end = match find_line_end(buf, 1)? {
        Some(end) => end,
        None => return Ok(None),
    };

    let argc = parse_length(&buf[1..line_end], "multibulk length")?;
    if argc > MAX_ARGS {
        return Err(KvError::Protocol(format!(
            "invalid multibulk length {} (max {})",
            argc, MAX_ARGS
        )));
    }

    let mut args = Vec::with_capacity(argc.min(64));
    let mut pos = line_end + 2;

    for _ in 0..argc {
        match buf.get(pos) {
            None => return Ok(None),
            Some(b'$') => {}
            Some(&other) => {
                return Err(KvError::Protocol(format!(
                    "expected '$', got '{}'",
                    (other as char).escape_default()
                )))
            }
        }

        let len_end = match find_line_end(buf, pos + 1)? {
            Some(end) => end,
            None => return Ok(None),
        };

        let len = parse_length(&buf[pos + 1..len_end], "bulk length")?;
        if len > MAX_BULK_LEN {
            return Err(KvError::Protocol(format!(
                "invalid bulk length {} (max {})",
                len, MAX_BULK_LEN
            )));
        }

        let start = len_end + 2;
        let end = start + len;
        if buf.len() < end + 2 {
            return Ok(None);
        }
        if &buf[end..end + 2] != b"\r\n" {
            return Err(KvError::Protocol(
                "bulk string is longer than its declared length".to_string(),
            ));
        }

        args.push(start..end);
        pos = end + 2;
    }

    Ok(Some((args, pos)))
}

/// A plain text line split on ASCII whitespace
fn parse_inline(buf: &[u8]) -> Result<Parsed> {
    let newline = match buf.iter().position(|&b| b == b'\n') {
        Some(pos) => pos,
        None if buf.len() > MAX_LINE_LEN => {
            return Err(KvError::Protocol("too big inline request".to_string()))
        }
        None => return Ok(None),
    };

    let line_end = if newline > 0 && buf[newline - 1] == b'\r' {
        newline - 1
    } else {
        newline
    };

    let mut args = Vec::new();
    let mut start = None;
    for (i, &b) in buf[..line_end].iter().enumerate() {
        match (b.is_ascii_whitespace(), start) {
            (false, None) => start = Some(i),
            (true, Some(s)) => {
                args.push(s..i);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        args.push(s..line_end);
    }

    Ok(Some((args, newline + 1)))
}

/// Find the `\r\n` ending a header line that starts at `from`
///
/// Returns the index of `\r`, `None` if the line is not complete yet.
fn find_line_end(buf: &[u8], from: usize) -> Result<Option<usize>> {
    let window = &buf[from.min(buf.len())..];
    match window.windows(2).position(|w| w == b"\r\n") {
        Some(offset) => Ok(Some(from + offset)),
        None if window.len() > MAX_LINE_LEN => {
            Err(KvError::Protocol("header line too long".to_string()))
        }
        None => Ok(None),
    }
}

/// Parse a non-negative decimal length; anything else is a protocol error
fn parse_length(digits: &[u8], what: &str) -> Result<usize> {
    let invalid = || {
        KvError::Protocol(format!(
            "invalid {} '{}'",
            what,
            String::from_utf8_lossy(digits)
        ))
    };

    if digits.is_empty() || digits.len() > 19 || !digits.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }

    digits.iter().try_fold(0usize, |acc, &d| {
        acc.checked_mul(10)
            .and_then(|v| v.checked_add((d - b'0') as usize))
            .ok_or_else(invalid)
    })
}
