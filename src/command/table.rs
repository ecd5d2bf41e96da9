//! Command table
//!
//! Registry of command handlers keyed by lower-cased name.

use std::collections::HashMap;

use bytes::Bytes;

use crate::engine::Engine;
use crate::protocol::Response;

use super::handlers;

/// A command handler: receives the full request (name included)
pub type CommandFn = fn(&Engine, &[Bytes]) -> Response;

/// Dispatches requests to registered handlers
#[derive(Clone, Default)]
pub struct CommandTable {
    handlers: HashMap<String, CommandFn>,
}

impl CommandTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with GET, SET and PING registered
    pub fn with_default_commands() -> Self {
        let mut table = Self::new();
        table.register("get", handlers::get);
        table.register("set", handlers::set);
        table.register("ping", handlers::ping);
        table
    }

    /// Register (or replace) a handler; names are case-insensitive
    pub fn register(&mut self, name: &str, handler: CommandFn) {
        self.handlers.insert(name.to_ascii_lowercase(), handler);
    }

    /// Whether a command name is registered
    pub fn contains(&self, name: &[u8]) -> bool {
        self.lookup(name).is_some()
    }

    /// Run one request
    ///
    /// Unknown commands produce an error reply; they never end the connection.
    pub fn dispatch(&self, engine: &Engine, args: &[Bytes]) -> Response {
        let name = match args.first() {
            Some(name) => name,
            None => return Response::error("ERR empty command"),
        };

        match self.lookup(name) {
            Some(handler) => handler(engine, args),
            None => Response::error(format!(
                "ERR unknown command '{}'",
                String::from_utf8_lossy(name)
            )),
        }
    }

    fn lookup(&self, name: &[u8]) -> Option<CommandFn> {
        let name = std::str::from_utf8(name).ok()?.to_ascii_lowercase();
        self.handlers.get(&name).copied()
    }
}
