//! Connection State Machine Module
//!
//! This module drives a single line-oriented connection over a non-blocking
//! socket. It owns the connection's I/O buffer, decides when to read and when
//! to write, and turns the command processor's verdicts into transitions.
//!
//! ## Architecture
//!
//! ```text
//!            readiness event (READ / WRITE / RDWR)
//!                          │
//!                          ▼
//!              ┌───────────────────────┐
//!              │  Connection::dispatch │
//!              └───────────┬───────────┘
//!            Connected /   │   SendIncomplete
//!            RecvIncomplete│
//!             ┌────────────┴────────────┐
//!             ▼                         ▼
//!      ┌─────────────┐  reply ready ┌─────────────┐
//!      │  Read pump  │─────────────>│ Write pump  │
//!      └──────┬──────┘<─────────────└─────────────┘
//!             │        drained, read again
//!             ▼
//!      ┌──────────────────┐
//!      │ CommandProcessor │  (injected)
//!      └──────────────────┘
//! ```
//!
//! Collaborators are injected through traits:
//!
//! - [`Source`]: non-blocking `read` / `write` on the socket;
//! - [`CommandProcessor`]: classifies the buffered bytes and writes replies;
//! - [`BufferAllocator`]: hands out and takes back fixed-size buffers.
//!
//! The readiness source is whatever event loop owns the [`Connection`]; see
//! [`crate::connection`] for the tokio driver.
//!
//! ## Example
//!
//! ```
//! use edgekv::fsm::{
//!     CommandBuffer, CommandProcessor, Connection, Event, HeapAllocator, Outcome, Source, Verdict,
//! };
//! use std::io;
//! use std::sync::Arc;
//!
//! struct Pong;
//!
//! impl CommandProcessor for Pong {
//!     fn process(&self, cmd: &mut CommandBuffer<'_>) -> Verdict {
//!         if !cmd.received().ends_with(b"\n") {
//!             return Verdict::Incomplete;
//!         }
//!         match cmd.reply(b"PONG\n") {
//!             Ok(()) => Verdict::ResponseReady,
//!             Err(_) => Verdict::Malformed,
//!         }
//!     }
//! }
//!
//! struct Loopback {
//!     input: Vec<u8>,
//!     output: Vec<u8>,
//! }
//!
//! impl Source for Loopback {
//!     fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
//!         if self.input.is_empty() {
//!             return Err(io::ErrorKind::WouldBlock.into());
//!         }
//!         let n = self.input.len().min(dst.len());
//!         dst[..n].copy_from_slice(&self.input[..n]);
//!         self.input.drain(..n);
//!         Ok(n)
//!     }
//!
//!     fn write(&mut self, src: &[u8]) -> io::Result<usize> {
//!         self.output.extend_from_slice(src);
//!         Ok(src.len())
//!     }
//! }
//!
//! let socket = Loopback { input: b"PING\n".to_vec(), output: Vec::new() };
//! let mut conn = Connection::new(socket, Arc::new(Pong), Arc::new(HeapAllocator::default()));
//!
//! assert_eq!(conn.dispatch(Event::readable()).unwrap(), Outcome::Continue);
//! assert_eq!(conn.source().output, b"PONG\n");
//! ```

pub mod buffer;
pub mod machine;
pub mod processor;
pub mod source;
pub mod state;
pub mod stats;

#[cfg(test)]
mod mock;
#[cfg(test)]
mod props;

// Re-export commonly used types
pub use buffer::{
    BufferAllocator, HeapAllocator, IoBuffer, PoolAllocator, DEFAULT_POOL_SIZE, IO_BUFFER_SIZE,
};
pub use machine::{Connection, FsmError, ERROR_REPLY};
pub use processor::{CommandBuffer, CommandProcessor, ReplyTooLarge, Verdict};
pub use source::{is_disconnect, Source};
pub use state::{Event, Op, Outcome, State};
pub use stats::ConnectionStats;
