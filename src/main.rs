//! EdgeKV server binary
//!
//! Parses the command line, sets up logging, and runs the accept loop until
//! a client sends `SHUTDOWN` or the process gets Ctrl+C.

use edgekv::commands::CommandHandler;
use edgekv::fsm::{
    BufferAllocator, ConnectionStats, PoolAllocator, DEFAULT_POOL_SIZE, IO_BUFFER_SIZE,
};
use edgekv::server::Server;
use edgekv::storage::StorageEngine;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Server configuration
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
    /// Idle buffers kept for reuse
    pool_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: edgekv::DEFAULT_HOST.to_string(),
            port: edgekv::DEFAULT_PORT,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    config.host = value_of(&args, i, "--host").to_string();
                    i += 2;
                }
                "--port" | "-p" => {
                    config.port = value_of(&args, i, "--port").parse().unwrap_or_else(|_| {
                        eprintln!("Error: invalid port number");
                        std::process::exit(1);
                    });
                    i += 2;
                }
                "--pool-size" => {
                    config.pool_size = value_of(&args, i, "--pool-size").parse().unwrap_or_else(|_| {
                        eprintln!("Error: invalid pool size");
                        std::process::exit(1);
                    });
                    i += 2;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("EdgeKV version {}", edgekv::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The value following the flag at `args[i]`, or exit.
fn value_of<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match args.get(i + 1) {
        Some(value) => value,
        None => {
            eprintln!("Error: {} requires a value", flag);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"
EdgeKV - A key-value server on an edge-triggered connection state machine

USAGE:
    edgekv [OPTIONS]

OPTIONS:
    -h, --host <HOST>       Host to bind to (default: {host})
    -p, --port <PORT>       Port to listen on (default: {port})
        --pool-size <N>     Idle I/O buffers kept for reuse (default: {pool})
    -v, --version           Print version information
        --help              Print this help message

ENVIRONMENT:
    RUST_LOG                Log filter (default: info)

CONNECTING:
    Any line-based client works:
    $ nc 127.0.0.1 {port}
    PING
    PONG
    SET name edge
    OK
    GET name
    edge
"#,
        host = edgekv::DEFAULT_HOST,
        port = edgekv::DEFAULT_PORT,
        pool = DEFAULT_POOL_SIZE,
    );
}

fn print_banner(config: &Config) {
    println!(
        r#"
EdgeKV v{} - edge-triggered key-value server
──────────────────────────────────────────────────────────────
Server started on {}
I/O buffers: {} bytes, up to {} pooled
Ready to accept connections.

Send SHUTDOWN or use Ctrl+C to stop.
"#,
        edgekv::VERSION,
        config.bind_address(),
        IO_BUFFER_SIZE,
        config.pool_size,
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    print_banner(&config);

    // Shared by all connections
    let storage = Arc::new(StorageEngine::new());
    let stats = Arc::new(ConnectionStats::new());
    let processor = Arc::new(CommandHandler::new(storage).with_stats(Arc::clone(&stats)));
    let allocator = Arc::new(PoolAllocator::new(IO_BUFFER_SIZE, config.pool_size));
    info!(
        buffer_size = allocator.capacity(),
        pool_size = config.pool_size,
        "Buffer pool initialized"
    );

    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("Listening on {}", config.bind_address());

    let server = Server::new(processor, allocator).with_stats(stats);

    tokio::select! {
        result = server.run(listener) => result?,
        signal = signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received, stopping server...");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
