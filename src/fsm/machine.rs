//! Per-connection state machine
//!
//! ## States
//!
//! ```text
//!                 Incomplete                      Write would block
//!   ┌───────────┐ ─────────────> ┌────────────────┐ ────────────┐
//!   │ Connected │                │ RecvIncomplete │             │
//!   └───────────┘ <───────────── └────────────────┘             ▼
//!     ▲   │  ▲     reply sent /                          ┌────────────────┐
//!     │   │  │     no reply                              │ SendIncomplete │
//!     │   │  └───────────────────────────────────────────└────────────────┘
//!     │   │              socket drained                     ▲
//!     │   └─────────────────────────────────────────────────┘
//!     │                  write would block
//!     └── reply sent / no reply / malformed
//! ```
//!
//! Peer close, `Quit` and `Shutdown` leave the machine from any state.
//!
//! ## Edge-triggered I/O
//!
//! A readiness source only reports transitions, so every dispatch drains
//! the socket until it would block:
//!
//! - the read pump keeps reading and handing chunks to the processor until
//!   `read` returns `WouldBlock`, or until a reply is stuck behind a full
//!   socket;
//! - when a parked reply finally drains, the read pump runs once more,
//!   because the notification that woke the writer may also have covered
//!   bytes that arrived in the meantime.

use std::io;
use std::mem;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use super::buffer::{BufferAllocator, IoBuffer};
use super::processor::{CommandBuffer, CommandProcessor, Verdict};
use super::source::{is_disconnect, Source};
use super::state::{Event, Op, Outcome, Phase, State};
use super::stats::ConnectionStats;

/// Reply sent for a [`Verdict::Malformed`] command. The trailing NUL is part
/// of the wire format.
pub const ERROR_REPLY: &[u8] = b"(ERROR) Unknown command\n\0";

/// Errors the state machine cannot recover from.
#[derive(Debug, Error)]
pub enum FsmError {
    /// A socket operation failed with something other than would-block or a
    /// peer disconnect.
    #[error("socket {op} failed: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// The connection already returned a terminal outcome.
    #[error("connection already terminated")]
    Terminated,
}

/// How far a write pump got before returning.
enum Flush {
    /// The whole reply reached the socket.
    Drained,
    /// The socket would block after `sent` bytes.
    Blocked(usize),
}

/// One accepted connection and its state machine.
///
/// The event loop owns a `Connection`, waits for readiness on
/// [`source`](Self::source) according to [`interest`](Self::interest), and
/// feeds every notification to [`dispatch`](Self::dispatch) until it returns
/// a terminal [`Outcome`]. Dropping the connection returns its buffer to the
/// allocator.
pub struct Connection<S, P, A>
where
    S: Source,
    P: CommandProcessor,
    A: BufferAllocator,
{
    source: S,
    phase: Phase,
    processor: Arc<P>,
    allocator: Arc<A>,
    stats: Arc<ConnectionStats>,
    terminated: bool,
}

impl<S, P, A> Connection<S, P, A>
where
    S: Source,
    P: CommandProcessor,
    A: BufferAllocator,
{
    /// Wraps a freshly accepted socket. No buffer is allocated until the
    /// first readable event.
    pub fn new(source: S, processor: Arc<P>, allocator: Arc<A>) -> Self {
        Self {
            source,
            phase: Phase::default(),
            processor,
            allocator,
            stats: Arc::new(ConnectionStats::new()),
            terminated: false,
        }
    }

    /// Reports byte and command counts into a shared [`ConnectionStats`].
    pub fn with_stats(mut self, stats: Arc<ConnectionStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn processor(&self) -> &Arc<P> {
        &self.processor
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    pub fn state(&self) -> State {
        self.phase.tag()
    }

    /// Valid bytes in the buffer (`nbuf`).
    pub fn nbuf(&self) -> usize {
        self.phase.buffer().map_or(0, IoBuffer::len)
    }

    /// Bytes of the pending reply already written (`snbuf`).
    pub fn snbuf(&self) -> usize {
        match self.phase {
            Phase::SendIncomplete { sent, .. } => sent,
            _ => 0,
        }
    }

    /// The bytes currently held in the buffer.
    pub fn buffered(&self) -> &[u8] {
        self.phase.buffer().map_or(&[][..], IoBuffer::filled)
    }

    pub fn has_buffer(&self) -> bool {
        self.phase.buffer().is_some()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// The readiness this connection is waiting for.
    ///
    /// A parked reply only cares about writability; every other state reads.
    pub fn interest(&self) -> Op {
        match self.phase {
            Phase::SendIncomplete { .. } => Op::Write,
            _ => Op::Read,
        }
    }

    /// Checks the per-state bounds on `nbuf` and `snbuf`.
    pub fn check_invariants(&self) -> bool {
        let capacity_ok = self
            .phase
            .buffer()
            .map_or(true, |buf| buf.capacity() == self.allocator.capacity());
        capacity_ok && self.phase.holds_invariants()
    }

    /// Routes a readiness event to the read or write pump.
    ///
    /// After a terminal outcome or an error the connection is spent: its
    /// buffer has been released and further calls fail with
    /// [`FsmError::Terminated`].
    pub fn dispatch(&mut self, event: Event) -> Result<Outcome, FsmError> {
        if self.terminated {
            return Err(FsmError::Terminated);
        }

        let result = match mem::take(&mut self.phase) {
            Phase::Connected { buf } => {
                let buf = buf.unwrap_or_else(|| self.allocator.allocate());
                self.read_pump(buf, false)
            }
            Phase::RecvIncomplete { buf } => self.read_pump(buf, true),
            Phase::SendIncomplete { buf, sent } => self.resume_send(buf, sent, event.op),
        };

        match result {
            Ok(Outcome::Continue) => {
                debug_assert!(self.check_invariants(), "state invariants violated");
                trace!(state = ?self.state(), nbuf = self.nbuf(), snbuf = self.snbuf(), "dispatch done");
            }
            _ => self.terminated = true,
        }

        result
    }

    /// Drains the socket, feeding each chunk to the processor.
    ///
    /// `receiving` is true when `buf` carries an incomplete command.
    fn read_pump(&mut self, mut buf: IoBuffer, mut receiving: bool) -> Result<Outcome, FsmError> {
        loop {
            if buf.is_full() {
                warn!(capacity = buf.capacity(), "command does not fit in the I/O buffer, dropping connection");
                self.release(buf);
                return Ok(Outcome::DropConnection);
            }

            let n = match self.source.read(buf.spare_mut()) {
                Ok(0) => {
                    debug!("peer closed the connection");
                    self.release(buf);
                    return Ok(Outcome::DropConnection);
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if receiving {
                        self.phase = Phase::RecvIncomplete { buf };
                    } else {
                        // Idle: give the buffer back until the next burst.
                        self.release(buf);
                    }
                    return Ok(Outcome::Continue);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return self.io_failure("read", e, buf),
            };

            buf.advance(n);
            self.stats.bytes_read(n);
            trace!(bytes = n, buffered = buf.len(), "read from socket");

            let verdict = self.processor.process(&mut CommandBuffer::new(&mut buf));
            trace!(?verdict, "processor verdict");

            match verdict {
                Verdict::Incomplete => {
                    receiving = true;
                    continue;
                }
                Verdict::NoResponse => {
                    self.stats.command_processed();
                    buf.clear();
                    receiving = false;
                    continue;
                }
                Verdict::ResponseReady => self.stats.command_processed(),
                Verdict::Malformed => {
                    debug!("malformed command, sending error reply");
                    self.stats.command_malformed();
                    buf.overwrite(ERROR_REPLY);
                }
                Verdict::Quit => {
                    debug!("client asked to close the connection");
                    self.release(buf);
                    return Ok(Outcome::DropConnection);
                }
                Verdict::Shutdown => {
                    info!("client asked for server shutdown");
                    self.release(buf);
                    return Ok(Outcome::ShutdownServer);
                }
            }

            match self.write_pump(&mut buf, 0) {
                Ok(Flush::Drained) => receiving = false,
                Ok(Flush::Blocked(sent)) => {
                    self.phase = Phase::SendIncomplete { buf, sent };
                    return Ok(Outcome::Continue);
                }
                Err(e) => return self.io_failure("write", e, buf),
            }
        }
    }

    /// Continues a parked reply on a writable event.
    fn resume_send(&mut self, mut buf: IoBuffer, sent: usize, op: Op) -> Result<Outcome, FsmError> {
        if !op.is_writable() {
            self.phase = Phase::SendIncomplete { buf, sent };
            return Ok(Outcome::Continue);
        }

        match self.write_pump(&mut buf, sent) {
            Ok(Flush::Drained) => {
                trace!("pending reply drained, reading input that arrived meanwhile");
                self.read_pump(buf, false)
            }
            Ok(Flush::Blocked(sent)) => {
                self.phase = Phase::SendIncomplete { buf, sent };
                Ok(Outcome::Continue)
            }
            Err(e) => self.io_failure("write", e, buf),
        }
    }

    /// Writes `buf[sent..nbuf)` until done or the socket would block.
    /// On completion `buf` is emptied.
    fn write_pump(&mut self, buf: &mut IoBuffer, mut sent: usize) -> io::Result<Flush> {
        while sent < buf.len() {
            match self.source.write(&buf.filled()[sent..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    sent += n;
                    self.stats.bytes_written(n);
                    trace!(bytes = n, remaining = buf.len() - sent, "wrote to socket");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    trace!(sent, pending = buf.len() - sent, "socket full, parking reply");
                    self.stats.send_stalled();
                    return Ok(Flush::Blocked(sent));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        buf.clear();
        Ok(Flush::Drained)
    }

    fn io_failure(&mut self, op: &'static str, err: io::Error, buf: IoBuffer) -> Result<Outcome, FsmError> {
        self.release(buf);

        if is_disconnect(&err) {
            debug!(op, error = %err, "peer went away");
            return Ok(Outcome::DropConnection);
        }

        error!(op, error = %err, "unrecoverable socket error");
        Err(FsmError::Io { op, source: err })
    }

    fn release(&self, buf: IoBuffer) {
        self.allocator.free(buf);
    }
}

impl<S, P, A> Drop for Connection<S, P, A>
where
    S: Source,
    P: CommandProcessor,
    A: BufferAllocator,
{
    fn drop(&mut self) {
        if let Some(buf) = mem::take(&mut self.phase).into_buffer() {
            self.allocator.free(buf);
        }
    }
}

impl<S, P, A> std::fmt::Debug for Connection<S, P, A>
where
    S: Source,
    P: CommandProcessor,
    A: BufferAllocator,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("nbuf", &self.nbuf())
            .field("snbuf", &self.snbuf())
            .field("terminated", &self.terminated)
            .finish()
    }
}
