//! PlugKV Server Binary
//!
//! Opens the configured storage driver and serves it over TCP.

use std::sync::Arc;

use clap::Parser;
use plugkv::config::WalSyncStrategy;
use plugkv::kvdb::register_builtin;
use plugkv::network::{Server, ShutdownHandle};
use plugkv::{Config, Context, KeyValueStore, KvService, Registry};
use tracing_subscriber::{fmt, EnvFilter};

/// PlugKV Server
#[derive(Parser, Debug)]
#[command(name = "plugkv-server")]
#[command(about = "Key-value store with pluggable storage drivers")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:50052")]
    listen: String,

    /// Storage driver to open
    #[arg(short, long, default_value = "logdb")]
    driver: String,

    /// Driver location (data directory for logdb)
    #[arg(long, default_value = "./plugkv_data")]
    location: String,

    /// Maximum open client connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Fsync the WAL after every N commits (0 = after every commit)
    #[arg(long, default_value = "100")]
    sync_every: usize,

    /// Print the registered drivers and exit
    #[arg(long)]
    list_drivers: bool,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,plugkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    let sync_strategy = match args.sync_every {
        0 => WalSyncStrategy::EveryWrite,
        count => WalSyncStrategy::EveryNEntries { count },
    };

    let config = Config::builder()
        .driver(&args.driver)
        .location(&args.location)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .wal_sync_strategy(sync_strategy)
        .build();

    let registry = Registry::new();
    register_builtin(&registry, config.wal_sync_strategy);

    if args.list_drivers {
        for name in registry.drivers() {
            println!("{}", name);
        }
        return;
    }

    tracing::info!("PlugKV Server v{}", plugkv::VERSION);
    tracing::info!("Driver: {} ({})", config.driver, config.location);
    tracing::info!("Listen address: {}", config.listen_addr);

    if !registry.contains(&config.driver) {
        tracing::error!(
            "Unknown driver '{}', available: {}",
            config.driver,
            registry.drivers().join(", ")
        );
        std::process::exit(2);
    }

    let store: Arc<dyn KeyValueStore> = match registry.open(&config.driver, &config.location) {
        Ok(store) => Arc::from(store),
        Err(e) => {
            tracing::error!("Failed to initialize underlying kvdb: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Store opened successfully");

    let service = KvService::new(Arc::clone(&store));
    let mut server = Server::new(config, service);

    if let Err(e) = server.bind() {
        tracing::error!("Failed to start listener: {}", e);
        close_store(&store);
        std::process::exit(1);
    }

    install_signal_handler(server.shutdown_handle());

    let served = server.run();

    // Workers have drained; nothing else holds a request in flight
    close_store(&store);

    if let Err(e) = served {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}

fn close_store(store: &Arc<dyn KeyValueStore>) {
    match store.close(&Context::background()) {
        Ok(()) => tracing::info!("Store closed"),
        Err(e) => tracing::error!("Failed to close store: {}", e),
    }
}

/// Stop the server on SIGINT/SIGTERM
#[cfg(unix)]
fn install_signal_handler(handle: ShutdownHandle) {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to register signal handlers: {}", e);
            return;
        }
    };

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            tracing::info!("Received signal {}, initiating shutdown...", sig);
            handle.shutdown();
        }
    });
}

#[cfg(not(unix))]
fn install_signal_handler(_handle: ShutdownHandle) {
    tracing::warn!("Signal handling unavailable on this platform");
}
