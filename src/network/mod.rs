//! Network Module
//!
//! TCP server and client handling.
//!
//! ## Architecture
//! - Single acceptor thread polling a non-blocking listener
//! - One thread per connection, capped at `max_connections`
//! - Requests routed through the `CommandTable` to the `Engine`

mod server;
mod connection;

pub use server::{Server, ShutdownHandle};
pub use connection::Connection;
