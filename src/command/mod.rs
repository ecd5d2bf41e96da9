//! Command Module
//!
//! Binds decoded requests to storage operations.
//!
//! ## Commands
//! | Command | Arity | Reply                                  |
//! |---------|-------|----------------------------------------|
//! | GET     | 2     | bulk value, or null if absent          |
//! | SET     | 3     | the key as a bulk string once stored   |
//! | PING    | 1, 2  | `PONG` or `PONG <message>`             |
//!
//! Names are matched ASCII case-insensitively. Arity counts the command name.
//! Storage failures are reported to the client as `-ERR` replies.

mod handlers;
mod table;

pub use handlers::{get, ping, set};
pub use table::{CommandFn, CommandTable};
