//! Accept loop
//!
//! [`Server`] accepts clients, runs each one in its own task through
//! [`handle_connection`], and watches the tasks' outcomes:
//!
//! - a connection that asks for shutdown stops the server cleanly;
//! - a connection that hits a fatal socket error stops it with that error;
//! - everything else just ends that one connection.
//!
//! When the server stops, the remaining connection tasks are aborted, their
//! buffers go back to the allocator, and the connection counters are logged.

use crate::connection::handle_connection;
use crate::fsm::{BufferAllocator, CommandProcessor, ConnectionStats, FsmError, Outcome};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, Instrument};

/// A line-protocol server over a shared processor and buffer allocator.
pub struct Server<P, A> {
    processor: Arc<P>,
    allocator: Arc<A>,
    stats: Arc<ConnectionStats>,
}

impl<P, A> Server<P, A>
where
    P: CommandProcessor + 'static,
    A: BufferAllocator + 'static,
{
    pub fn new(processor: Arc<P>, allocator: Arc<A>) -> Self {
        Self {
            processor,
            allocator,
            stats: Arc::new(ConnectionStats::new()),
        }
    }

    /// Reports into `stats` instead of a private set of counters, so a
    /// processor can share them.
    pub fn with_stats(mut self, stats: Arc<ConnectionStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Connection statistics, shared with every connection task.
    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    /// Serves `listener` until a client requests shutdown or a connection
    /// fails fatally.
    pub async fn run(self, listener: TcpListener) -> Result<(), FsmError> {
        let mut connections: JoinSet<(SocketAddr, Result<Outcome, FsmError>)> = JoinSet::new();

        let result = loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let processor = Arc::clone(&self.processor);
                        let allocator = Arc::clone(&self.allocator);
                        let stats = Arc::clone(&self.stats);

                        connections.spawn(
                            async move {
                                let result = handle_connection(stream, addr, processor, allocator, stats).await;
                                (addr, result)
                            }
                            .instrument(info_span!("conn", client = %addr)),
                        );
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                },
                Some(joined) = connections.join_next() => match joined {
                    Ok((addr, Ok(Outcome::ShutdownServer))) => {
                        info!(client = %addr, "Shutdown requested, stopping server");
                        break Ok(());
                    }
                    Ok((addr, Err(e))) => {
                        error!(client = %addr, error = %e, "Fatal connection error, stopping server");
                        break Err(e);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "Connection task failed");
                    }
                },
            }
        };

        let remaining = connections.len();
        connections.shutdown().await;

        let stats = &self.stats;
        info!(
            closed = remaining,
            connections = stats.connections_accepted.load(Ordering::Relaxed),
            commands = stats.commands_processed.load(Ordering::Relaxed),
            malformed = stats.commands_malformed.load(Ordering::Relaxed),
            send_stalls = stats.send_stalls.load(Ordering::Relaxed),
            bytes_read = stats.bytes_read.load(Ordering::Relaxed),
            bytes_written = stats.bytes_written.load(Ordering::Relaxed),
            "Server stopped"
        );
        result
    }
}
