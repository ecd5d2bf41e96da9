//! Protocol Module
//!
//! RESP wire protocol for client-server communication.
//!
//! ### Request Format
//! ```text
//! *<argc>\r\n
//! $<len>\r\n<arg bytes>\r\n      (repeated argc times)
//! ```
//! Inline requests (`PING hello\r\n`) are accepted as well.
//!
//! ### Reply Format
//! ```text
//! +PONG\r\n                      simple string
//! $5\r\nhello\r\n                bulk string (binary safe)
//! $-1\r\n                        null
//! -ERR message\r\n               error
//! ```
//!
//! A declared length that is negative, oversized, or disagrees with the bytes
//! that follow is a protocol error and ends the connection.

mod resp;
mod response;
mod codec;

pub use resp::{decode_request, parse_request, MAX_ARGS, MAX_BULK_LEN, MAX_LINE_LEN};
pub use response::Response;
pub use codec::{encode_request, read_reply, write_request};
