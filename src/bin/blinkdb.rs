/*!
 * blinkdb Server Entry Point
 *
 * Parses the command line, wires SIGINT/SIGTERM to the server's shutdown
 * flag, and runs the event loop until it exits.
 */

use anyhow::Result;
use blinkdb::server::{Server, ServerConfig};
use clap::Parser;
use std::time::Duration;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// In-memory key-value server speaking RESP-2.
#[derive(Parser)]
#[command(name = "blinkdb", version, about)]
struct Args {
    /// Port to listen on.
    #[arg(short, long, default_value_t = blinkdb::DEFAULT_PORT)]
    port: u16,

    /// Maximum number of concurrent client connections.
    #[arg(short = 'c', long, default_value_t = blinkdb::DEFAULT_MAX_CONNECTIONS)]
    connections: usize,

    /// Memory budget in bytes for stored keys and values.
    #[arg(long, default_value_t = blinkdb::DEFAULT_MAX_MEMORY)]
    max_memory: usize,

    /// Seconds between TTL sweep passes.
    #[arg(long, default_value_t = blinkdb::DEFAULT_SWEEP_INTERVAL_SECS)]
    sweep_interval: u64,
}

fn main() -> Result<()> {
    // Respects RUST_LOG, e.g. RUST_LOG=debug
    env_logger::init();

    let args = Args::parse();
    let config = ServerConfig {
        port: args.port,
        max_connections: args.connections,
        max_memory: args.max_memory,
        sweep_interval: Duration::from_secs(args.sweep_interval),
        ..ServerConfig::default()
    };

    let mut server = Server::bind(config)?;

    // Graceful shutdown: first signal sets the flag, the loop drains on
    // its next tick
    let shutdown = server.shutdown_handle();
    signal_hook::flag::register(signal_hook::consts::SIGINT, shutdown.clone())?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, shutdown)?;

    println!("blinkdb running on {}", server.local_addr()?);

    server.run()
}
