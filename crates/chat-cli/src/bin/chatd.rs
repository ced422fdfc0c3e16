//! Umbral Chat server daemon.
//!
//! Parses flags and environment, builds a [`chat_server::ServerConfig`], and
//! runs a [`chat_server::ServerEndpoint`] over a bound UDP socket until
//! interrupted.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use chat_core::notify::{ChannelSink, Event};
use chat_core::time::SystemClock;
use chat_crypto::password::PasswordParams;
use chat_server::{ServerConfig, ServerEndpoint, UserStore};
use chat_transport::transport::Transport;
use chat_transport::udp_async::AsyncUdpTransport;

/// Umbral Chat server.
#[derive(Parser)]
#[command(name = "chatd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address to bind the UDP socket to.
    #[arg(long, default_value = "0.0.0.0:0")]
    bind: SocketAddr,

    /// Heartbeat interval in milliseconds; clients silent longer than this
    /// are reaped.
    #[arg(long, default_value_t = 60_000)]
    heartbeat_ms: u64,

    /// Path to the persisted user credential store.
    #[arg(long, default_value = "./users.bin")]
    store: PathBuf,

    /// Per-log (public or per-peer) chat history capacity.
    #[arg(long, default_value_t = chat_core::DEFAULT_CHAT_HISTORY_CAPACITY)]
    history_capacity: usize,

    /// Enable verbose (debug) logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let exit_code = run().await;
    std::process::exit(exit_code);
}

async fn run() -> i32 {
    let cli = Cli::parse();

    let filter = std::env::var("CHATROOM_LOG").unwrap_or_else(|_| {
        if cli.verbose { "debug".into() } else { "info".into() }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig {
        bind_addr: cli.bind,
        heartbeat_interval: Duration::from_millis(cli.heartbeat_ms),
        store_path: cli.store,
        chat_history_capacity: cli.history_capacity,
        password_params: PasswordParams::default(),
    };

    if let Err(msg) = config.validate() {
        eprintln!("invalid configuration: {msg}");
        return 1;
    }

    let store = match UserStore::open(config.store_path.clone(), config.password_params) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("failed to open user store {}: {e}", config.store_path.display());
            return 2;
        }
    };

    let transport = match AsyncUdpTransport::bind(config.bind_addr).await {
        Ok(t) => Arc::new(t),
        Err(e) => {
            eprintln!("failed to bind {}: {e}", config.bind_addr);
            return 1;
        }
    };
    let local_addr = transport.local_addr().expect("bound socket has a local address");
    tracing::info!(%local_addr, "chatd listening");

    let (sink, mut events) = ChannelSink::new(256);
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Event::Log(line) = event {
                tracing::debug!("{line}");
            }
        }
    });

    let endpoint = Arc::new(ServerEndpoint::new(
        transport,
        store,
        Arc::new(sink),
        Arc::new(SystemClock),
        config,
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let run_handle = tokio::spawn(endpoint.run(shutdown_rx));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received interrupt, shutting down");
            let _ = shutdown_tx.send(());
        }
    }

    match run_handle.await {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            eprintln!("server endpoint failed: {e}");
            1
        }
        Err(e) => {
            eprintln!("server task panicked: {e}");
            1
        }
    }
}
