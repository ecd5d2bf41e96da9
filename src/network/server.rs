//! TCP Server
//!
//! Accepts connections and hands each one to its own thread.
//!
//! `accept` blocks; shutdown sets the flag and then connects to the listener
//! once so the blocked call returns.

use std::io::{ErrorKind, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::command::CommandTable;
use crate::config::Config;
use crate::engine::Engine;
use crate::error::{KvError, Result};

use super::Connection;

/// Sent to a client that arrives while the server is full
const TOO_MANY_CLIENTS: &[u8] = b"-ERR max number of clients reached\r\n";

/// How long a shutdown waits to wake the blocked accept call
const WAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// TCP server for splitkv
pub struct Server {
    config: Config,
    engine: Arc<Engine>,
    commands: Arc<CommandTable>,
    listener: TcpListener,
    wake_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
}

/// Stops a running server from another thread
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    wake_addr: SocketAddr,
}

impl ShutdownHandle {
    /// Ask the accept loop and every connection to stop
    pub fn shutdown(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            wake(self.wake_addr);
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Decrements the live connection count when a connection thread ends
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Server {
    /// Bind the listener on `config.listen_addr` with the default commands
    pub fn bind(config: Config, engine: Arc<Engine>) -> Result<Self> {
        Self::with_commands(config, engine, CommandTable::with_default_commands())
    }

    /// Bind the listener with a custom command table
    pub fn with_commands(config: Config, engine: Arc<Engine>, commands: CommandTable) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(&config.listen_addr).map_err(|e| {
            KvError::Network(format!("failed to bind {}: {}", config.listen_addr, e))
        })?;
        let wake_addr = loopback(listener.local_addr()?);

        Ok(Self {
            config,
            engine,
            commands: Arc::new(commands),
            listener,
            wake_addr,
            shutdown: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Address the listener is bound to (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
            wake_addr: self.wake_addr,
        }
    }

    /// Number of connections currently being served
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown_handle().shutdown();
    }

    /// Serve clients until shutdown is requested (blocking)
    ///
    /// After shutdown, waits up to `shutdown_grace_ms` for connection threads
    /// to drain before returning. The engine is left open for the caller.
    pub fn run(&self) -> Result<()> {
        let addr = self.local_addr()?;
        tracing::info!("Listening on {}", addr);

        let poll = Duration::from_millis(self.config.poll_interval_ms);
        let mut workers: Vec<JoinHandle<()>> = Vec::new();

        while !self.shutdown.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    // The wake-up connection from a shutdown lands here
                    if self.shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    workers.retain(|h| !h.is_finished());
                    if let Some(handle) = self.admit(stream, peer) {
                        workers.push(handle);
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    // Transient accept failures (e.g. EMFILE) should not kill the server
                    tracing::warn!("Failed to accept connection: {}", e);
                    thread::sleep(poll);
                }
            }
        }

        tracing::info!("Shutting down, {} connection(s) active", self.active_connections());
        self.drain(workers);
        tracing::info!("Server stopped");
        Ok(())
    }

    /// Start a thread for `stream`, or turn it away if the server is full
    fn admit(&self, stream: TcpStream, peer: SocketAddr) -> Option<JoinHandle<()>> {
        let active = self.active.fetch_add(1, Ordering::SeqCst);
        if active >= self.config.max_connections {
            self.active.fetch_sub(1, Ordering::SeqCst);
            tracing::warn!("Rejecting {}: {} connections already active", peer, active);
            let mut stream = stream;
            let _ = stream.write_all(TOO_MANY_CLIENTS);
            return None;
        }
        let guard = ActiveGuard(Arc::clone(&self.active));

        let engine = Arc::clone(&self.engine);
        let commands = Arc::clone(&self.commands);
        let shutdown = Arc::clone(&self.shutdown);
        let poll_ms = self.config.poll_interval_ms;
        let write_ms = self.config.write_timeout_ms;

        let spawned = thread::Builder::new()
            .name("splitkv-conn".to_string())
            .spawn(move || {
                let _guard = guard;
                let result = Connection::new(stream, engine, commands, shutdown).and_then(|mut conn| {
                    conn.set_timeouts(poll_ms, write_ms)?;
                    conn.handle()
                });
                if let Err(e) = result {
                    tracing::debug!("Connection {} ended with error: {}", peer, e);
                }
            });

        match spawned {
            Ok(handle) => {
                tracing::debug!("Accepted connection from {}", peer);
                Some(handle)
            }
            Err(e) => {
                // The closure (and its guard) was dropped, so the count is already restored
                tracing::error!("Failed to spawn connection thread for {}: {}", peer, e);
                None
            }
        }
    }

    /// Wait for connection threads to finish, up to the grace period
    fn drain(&self, workers: Vec<JoinHandle<()>>) {
        let deadline = Instant::now() + Duration::from_millis(self.config.shutdown_grace_ms);
        let poll = Duration::from_millis(self.config.poll_interval_ms.min(10).max(1));

        while self.active_connections() > 0 && Instant::now() < deadline {
            thread::sleep(poll);
        }

        let remaining = self.active_connections();
        if remaining > 0 {
            tracing::warn!("{} connection(s) still open after grace period", remaining);
            return;
        }

        for handle in workers {
            if handle.join().is_err() {
                tracing::error!("Connection thread panicked");
            }
        }
    }
}

/// Unblock `accept` by connecting to the listener once
fn wake(addr: SocketAddr) {
    if let Err(e) = TcpStream::connect_timeout(&addr, WAKE_TIMEOUT) {
        tracing::debug!("Shutdown wake-up connect to {} failed: {}", addr, e);
    }
}

/// A wildcard bind address is not connectable; use loopback instead
fn loopback(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => SocketAddr::new(Ipv4Addr::LOCALHOST.into(), addr.port()),
        IpAddr::V6(ip) if ip.is_unspecified() => SocketAddr::new(Ipv6Addr::LOCALHOST.into(), addr.port()),
        _ => addr,
    }
}
