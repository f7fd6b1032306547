//! TenantKV Server Binary
//!
//! Starts the TCP server for TenantKV.

use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use tenantkv::network::Server;
use tenantkv::{Config, LsmEngine, WalSyncStrategy};
use tracing_subscriber::{fmt, EnvFilter};

/// TenantKV Server
#[derive(Parser, Debug)]
#[command(name = "tenantkv-server")]
#[command(about = "Multi-tenant key-value service")]
#[command(version)]
struct Args {
    /// Directory holding one subdirectory per logical database
    #[arg(short, long, default_value = "./tenantkv_data")]
    base_dir: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:50051")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// MemTable size limit in MB before flush
    #[arg(long, default_value = "64")]
    memtable_mb: usize,

    /// Sync the WAL after every write instead of every 100 entries
    #[arg(long)]
    sync_every_write: bool,

    /// Items a stream producer may run ahead of its client
    #[arg(long, default_value = "1")]
    stream_buffer: usize,

    /// Milliseconds an idle connection may wait for its next request (0 = forever)
    #[arg(long, default_value = "0")]
    read_timeout_ms: u64,

    /// Milliseconds a response write may block before the connection is dropped
    #[arg(long, default_value = "5000")]
    write_timeout_ms: u64,

    /// Milliseconds in-flight calls get to finish at shutdown
    #[arg(long, default_value = "5000")]
    shutdown_grace_ms: u64,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tenantkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("TenantKV Server v{}", tenantkv::VERSION);
    tracing::info!("Base directory: {}", args.base_dir);
    tracing::info!("Listen address: {}", args.listen);

    let sync_strategy = if args.sync_every_write {
        WalSyncStrategy::EveryWrite
    } else {
        WalSyncStrategy::EveryNEntries { count: 100 }
    };

    let config = Config::builder()
        .base_dir(&args.base_dir)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .memtable_size_limit(args.memtable_mb * 1024 * 1024)
        .wal_sync_strategy(sync_strategy)
        .stream_buffer(args.stream_buffer)
        .read_timeout_ms(args.read_timeout_ms)
        .write_timeout_ms(args.write_timeout_ms)
        .shutdown_grace_ms(args.shutdown_grace_ms)
        .build();

    let mut server = match Server::<LsmEngine>::new(config) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    let shutdown = server.shutdown_handle();
    for signal in [SIGINT, SIGTERM] {
        if let Err(e) = signal_hook::flag::register(signal, shutdown.flag()) {
            tracing::error!("Failed to register handler for signal {}: {}", signal, e);
            std::process::exit(1);
        }
    }

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
