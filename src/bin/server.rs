//! splitkv Server Binary
//!
//! Opens the storage engine and serves it over TCP until Ctrl+C or SIGTERM.

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use splitkv::{Config, Engine, Server};
use tracing_subscriber::{fmt, EnvFilter};

/// splitkv Server
#[derive(Parser, Debug)]
#[command(name = "splitkv-server")]
#[command(about = "RESP key-value server with separated key and value storage")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "0.0.0.0:16379")]
    addr: String,

    /// Directory for index tables
    #[arg(long, default_value = "db/meta")]
    meta_dir: String,

    /// Directory for value log segments
    #[arg(long, default_value = "db/data")]
    value_dir: String,

    /// Fsync every write before acknowledging it
    #[arg(long)]
    sync_writes: bool,

    /// Maximum concurrent connections
    #[arg(long, default_value = "1024")]
    max_connections: usize,

    /// MemTable size limit in MB before flush
    #[arg(short = 'm', long, default_value = "64")]
    memtable_mb: usize,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,splitkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("splitkv server v{}", splitkv::VERSION);
    tracing::info!("Meta directory: {}", args.meta_dir);
    tracing::info!("Value directory: {}", args.value_dir);
    tracing::info!("Listen address: {}", args.addr);

    for dir in [&args.meta_dir, &args.value_dir] {
        if let Err(e) = create_data_dir(Path::new(dir)) {
            tracing::error!("Failed to create directory {}: {}", dir, e);
            std::process::exit(1);
        }
    }

    // Build config from args
    let config = Config::builder()
        .meta_dir(&args.meta_dir)
        .value_dir(&args.value_dir)
        .listen_addr(&args.addr)
        .sync_writes(args.sync_writes)
        .max_connections(args.max_connections)
        .memtable_size_limit(args.memtable_mb * 1024 * 1024)
        .build();

    // Open engine
    let engine = match Engine::open(config.clone()) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    let recovery = engine.last_recovery();
    tracing::info!(
        "Engine initialized: {} entries replayed, {} discarded",
        recovery.entries_recovered,
        recovery.entries_discarded
    );

    let server = match Server::bind(config, Arc::clone(&engine)) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            let _ = engine.close();
            std::process::exit(1);
        }
    };

    let handle = server.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("Received shutdown signal, stopping server...");
        handle.shutdown();
    }) {
        tracing::warn!("Failed to install signal handler: {}", e);
    }

    let mut exit_code = 0;
    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        exit_code = 1;
    }

    tracing::info!("closing kvs");
    if let Err(e) = engine.close() {
        tracing::error!("Failed to close engine: {}", e);
        exit_code = 1;
    }

    std::process::exit(exit_code);
}

/// Create a data directory (and parents) with mode 0774
fn create_data_dir(path: &Path) -> std::io::Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o774);
    }
    builder.create(path)
}
