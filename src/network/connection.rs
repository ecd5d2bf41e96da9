//! Connection Handler
//!
//! Handles individual client connections.

use std::io::{self, BufWriter, ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;

use crate::command::CommandTable;
use crate::engine::Engine;
use crate::error::{KvError, Result};
use crate::protocol::{decode_request, Response};

/// Bytes read from the socket per call
const READ_CHUNK: usize = 16 * 1024;

/// Handles a single client connection
pub struct Connection {
    /// TCP stream, read side (unbuffered; bytes land in `buffer`)
    reader: TcpStream,

    /// TCP stream writer (buffered so pipelined replies go out together)
    writer: BufWriter<TcpStream>,

    /// Bytes received but not yet decoded
    buffer: BytesMut,

    /// Reference to the storage engine
    engine: Arc<Engine>,

    /// Registered commands
    commands: Arc<CommandTable>,

    /// Set when the server is shutting down
    shutdown: Arc<AtomicBool>,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Create a new connection handler
    pub fn new(
        stream: TcpStream,
        engine: Arc<Engine>,
        commands: Arc<CommandTable>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self> {
        // Get peer address for logging before we split the stream
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        // Clone stream for separate read/write handles
        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        Ok(Self {
            reader: read_stream,
            writer: BufWriter::new(write_stream),
            buffer: BytesMut::with_capacity(READ_CHUNK),
            engine,
            commands,
            shutdown,
            peer_addr,
        })
    }

    /// Configure connection timeouts
    ///
    /// The read timeout is a poll interval: an idle connection wakes up that
    /// often to check for shutdown, then keeps waiting.
    pub fn set_timeouts(&mut self, poll_ms: u64, write_ms: u64) -> Result<()> {
        if poll_ms > 0 {
            self.reader.set_read_timeout(Some(Duration::from_millis(poll_ms)))?;
        }
        if write_ms > 0 {
            self.writer
                .get_ref()
                .set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }
        Ok(())
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Decodes every complete request already buffered, replies in order,
    /// flushes, then reads more. Returns when the client disconnects, the
    /// server shuts down, or a malformed frame arrives.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        loop {
            // Serve everything pipelined so far
            loop {
                let args = match decode_request(&mut self.buffer) {
                    Ok(Some(args)) => args,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("Protocol error from {}: {}", self.peer_addr, e);
                        let detail = match &e {
                            KvError::Protocol(detail) => detail.clone(),
                            other => other.to_string(),
                        };
                        let reply = Response::error(format!("ERR Protocol error: {}", detail));
                        let _ = reply.write_to(&mut self.writer).and_then(|_| self.writer.flush());
                        return Err(e);
                    }
                };

                if args.is_empty() {
                    continue;
                }

                tracing::trace!(
                    "Received {} from {}",
                    String::from_utf8_lossy(&args[0]),
                    self.peer_addr
                );

                let response = self.commands.dispatch(&self.engine, &args);
                if let Err(e) = response.write_to(&mut self.writer) {
                    return self.write_failed(e);
                }
            }

            if let Err(e) = self.writer.flush() {
                return self.write_failed(e);
            }

            if self.shutdown.load(Ordering::SeqCst) {
                tracing::debug!("Closing connection {} for shutdown", self.peer_addr);
                return Ok(());
            }

            match self.read_more() {
                Ok(0) => {
                    if self.buffer.is_empty() {
                        tracing::debug!("Client {} disconnected", self.peer_addr);
                    } else {
                        tracing::debug!(
                            "Client {} disconnected with {} unparsed bytes",
                            self.peer_addr,
                            self.buffer.len()
                        );
                    }
                    return Ok(());
                }
                Ok(_) => {}
                // Poll interval elapsed; loop around to check for shutdown
                Err(ref e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(ref e) if is_disconnect(e) => {
                    tracing::debug!("Connection {} closed by peer: {}", self.peer_addr, e);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                    return Err(KvError::Io(e));
                }
            }
        }
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// Append whatever the socket has to the decode buffer
    fn read_more(&mut self) -> io::Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = self.reader.read(&mut chunk)?;
        self.buffer.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    /// A client that vanished mid-reply is not a server error
    fn write_failed(&self, e: io::Error) -> Result<()> {
        if is_disconnect(&e) {
            tracing::debug!(
                "Client {} disconnected before response could be sent: {}",
                self.peer_addr,
                e
            );
            return Ok(());
        }
        tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
        Err(KvError::Io(e))
    }
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe
    )
}
