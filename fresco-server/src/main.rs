//! fresco-server — shared-canvas synchronization server.
//!
//! Binds the WebSocket hub, runs the flush and quota-reset schedulers, and
//! performs a final snapshot flush on SIGINT before exiting.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use fresco_collab::server::{CanvasServer, ServerConfig};

/// Collaborative pixel canvas server.
#[derive(Debug, Parser)]
#[command(name = "fresco-server", version, about)]
struct Args {
    /// Address to bind the WebSocket listener to.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Canvas side length in pixels.
    #[arg(long, default_value_t = 200)]
    grid_size: usize,

    /// Pixels granted to each new identity and restored on reset.
    #[arg(long, default_value_t = 1000)]
    initial_quota: u32,

    /// Directory for PNG snapshots; omit for a volatile canvas.
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Seconds between dirty-canvas flushes.
    #[arg(long, default_value_t = 900)]
    flush_interval_secs: u64,

    /// Seconds between quota resets.
    #[arg(long, default_value_t = 43_200)]
    reset_period_secs: u64,

    /// Fan-out buffer per connection.
    #[arg(long, default_value_t = 256)]
    broadcast_capacity: usize,

    /// Seconds the shutdown flush may take before the process exits anyway.
    #[arg(long, default_value_t = 5)]
    shutdown_grace_secs: u64,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            bind_addr: self.bind,
            grid_size: self.grid_size,
            initial_quota: self.initial_quota,
            broadcast_capacity: self.broadcast_capacity,
            snapshot_dir: self.snapshot_dir,
            flush_interval: Duration::from_secs(self.flush_interval_secs),
            reset_period: Duration::from_secs(self.reset_period_secs),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = Args::parse().into_config();
    let grace = config.shutdown_grace;

    let server = match CanvasServer::new(config) {
        Ok(server) => server,
        Err(e) => {
            log::error!("failed to start: {e}");
            std::process::exit(1);
        }
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                log::error!("server stopped: {e}");
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("shutting down, flushing canvas...");
            if tokio::time::timeout(grace, server.shutdown()).await.is_err() {
                log::error!("final flush did not finish within {grace:?}");
            }
        }
    }
}
