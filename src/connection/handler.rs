//! Connection Handler Module
//!
//! This module drives one client connection with tokio. The state machine in
//! [`crate::fsm`] does the reading, processing and writing; this driver only
//! waits for the readiness the machine asks for and forwards it.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. Connection wrapped around the stream (no buffer yet)
//!        │
//!        ▼
//! 3. ┌──────────────────────────────────────┐
//!    │      Main Loop                       │
//!    │                                      │
//!    │  ┌────────────────────────────────┐  │
//!    │  │ stream.ready(conn.interest())  │  │
//!    │  └───────────────┬────────────────┘  │
//!    │                  │ Ready             │
//!    │                  ▼                   │
//!    │  ┌────────────────────────────────┐  │
//!    │  │ conn.dispatch(event)           │  │
//!    │  └───────────────┬────────────────┘  │
//!    │                  │ Continue          │
//!    │                  ▼                   │
//!    │             [Loop back]              │
//!    └──────────────────────────────────────┘
//!        │
//!        ▼
//! 4. Terminal outcome / fatal error
//!        │
//!        ▼
//! 5. Handler returns the outcome to the server
//! ```
//!
//! ## Readiness
//!
//! `TcpStream::try_read` and `try_write` clear tokio's readiness flag when
//! they hit `WouldBlock`, which is exactly the edge-triggered contract the
//! state machine is written against: after a dispatch the flag is only set
//! again once new data (or buffer space) shows up.

use crate::fsm::{BufferAllocator, CommandProcessor, Connection, ConnectionStats, Event, FsmError, Op, Outcome};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{Interest, Ready};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// Handles a client connection until it reaches a terminal outcome.
///
/// Returns [`Outcome::DropConnection`] when the client left or was dropped,
/// [`Outcome::ShutdownServer`] when it asked for shutdown, and the error when
/// the socket failed in a way the server should not survive.
///
/// # Arguments
///
/// * `stream` - The TCP stream for this connection
/// * `addr` - The client's socket address
/// * `processor` - The command processor shared by all connections
/// * `allocator` - Where the connection's I/O buffer comes from
/// * `stats` - Shared connection statistics
pub async fn handle_connection<P, A>(
    stream: TcpStream,
    addr: SocketAddr,
    processor: Arc<P>,
    allocator: Arc<A>,
    stats: Arc<ConnectionStats>,
) -> Result<Outcome, FsmError>
where
    P: CommandProcessor,
    A: BufferAllocator,
{
    let mut active = ActiveConnection::open(addr, Arc::clone(&stats));
    info!(client = %addr, "Client connected");

    let mut conn = Connection::new(stream, processor, allocator).with_stats(stats);
    let result = run(&mut conn).await;
    drop(conn);

    match &result {
        Ok(Outcome::ShutdownServer) => info!(client = %addr, "Client requested server shutdown"),
        Ok(_) => info!(client = %addr, "Client disconnected"),
        Err(e) => warn!(client = %addr, error = %e, "Connection error"),
    }

    active.finished = true;
    result
}

/// Keeps a connection counted as active until it is dropped, including when
/// the task running it is aborted.
struct ActiveConnection {
    addr: SocketAddr,
    stats: Arc<ConnectionStats>,
    finished: bool,
}

impl ActiveConnection {
    fn open(addr: SocketAddr, stats: Arc<ConnectionStats>) -> Self {
        stats.connection_opened();
        Self {
            addr,
            stats,
            finished: false,
        }
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        if !self.finished {
            info!(client = %self.addr, "Client disconnected by server stop");
        }
        self.stats.connection_closed();
    }
}

/// The wait-dispatch loop.
async fn run<P, A>(conn: &mut Connection<TcpStream, P, A>) -> Result<Outcome, FsmError>
where
    P: CommandProcessor,
    A: BufferAllocator,
{
    loop {
        let interest = conn.interest();
        let ready = conn
            .source()
            .ready(to_interest(interest))
            .await
            .map_err(|source| FsmError::Io { op: "poll", source })?;

        let event = to_event(ready);
        trace!(?interest, op = ?event.op, "readiness");

        let outcome = conn.dispatch(event)?;
        if outcome.is_terminal() {
            debug!(?outcome, "connection finished");
            return Ok(outcome);
        }
    }
}

fn to_interest(op: Op) -> Interest {
    match op {
        Op::Read => Interest::READABLE,
        Op::Write => Interest::WRITABLE,
        Op::ReadWrite => Interest::READABLE | Interest::WRITABLE,
    }
}

fn to_event(ready: Ready) -> Event {
    match (ready.is_readable(), ready.is_writable()) {
        (true, true) => Event::read_write(),
        (false, true) => Event::writable(),
        _ => Event::readable(),
    }
}
