//! Command Processor boundary
//!
//! The state machine knows nothing about the command grammar. After every
//! successful read it hands the buffered bytes to a [`CommandProcessor`] and
//! acts on the [`Verdict`] it returns.
//!
//! The processor only ever sees a [`CommandBuffer`]: the buffer contents and
//! the count of valid bytes. It cannot observe or change the connection
//! state.

use super::buffer::IoBuffer;
use thiserror::Error;

/// The processor's classification of the buffered bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Command consumed, nothing to send back.
    NoResponse,
    /// Command consumed, reply written into the buffer.
    ResponseReady,
    /// The buffer holds a command prefix; keep it and read more.
    Incomplete,
    /// The buffer holds garbage; answer with the fixed error reply.
    Malformed,
    /// Close this connection.
    Quit,
    /// Shut the whole server down.
    Shutdown,
}

/// A reply did not fit in the connection's buffer.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("reply of {len} bytes exceeds buffer capacity of {capacity} bytes")]
pub struct ReplyTooLarge {
    pub len: usize,
    pub capacity: usize,
}

/// Narrow view of a connection's buffer handed to the processor.
#[derive(Debug)]
pub struct CommandBuffer<'a> {
    buf: &'a mut IoBuffer,
}

impl<'a> CommandBuffer<'a> {
    pub(crate) fn new(buf: &'a mut IoBuffer) -> Self {
        Self { buf }
    }

    /// Bytes received so far, `buf[0..nbuf)`.
    pub fn received(&self) -> &[u8] {
        self.buf.filled()
    }

    /// Number of valid bytes (`nbuf`).
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Buffer capacity (`B`).
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Overwrites the buffer with `reply` and sets `nbuf` to its length.
    ///
    /// On error the buffer is left untouched.
    pub fn reply(&mut self, reply: &[u8]) -> Result<(), ReplyTooLarge> {
        self.check(reply.len())?;
        self.buf.overwrite(reply);
        Ok(())
    }

    /// The whole buffer, for processors that format a reply in place.
    /// Follow with [`set_len`](Self::set_len).
    ///
    /// Only `[0..len())` is meaningful. The bytes past it are left over from
    /// earlier use: pooled buffers are recycled without zeroing, so they may
    /// hold data another connection sent. Never send them without writing
    /// them first.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.buf.as_mut_slice()
    }

    /// Sets `nbuf` after an in-place write.
    pub fn set_len(&mut self, len: usize) -> Result<(), ReplyTooLarge> {
        self.check(len)?;
        self.buf.set_len(len);
        Ok(())
    }

    fn check(&self, len: usize) -> Result<(), ReplyTooLarge> {
        let capacity = self.buf.capacity();
        if len > capacity {
            return Err(ReplyTooLarge { len, capacity });
        }
        Ok(())
    }
}

/// Classifies buffered bytes and, when a reply is due, writes it in place.
///
/// One processor is shared by every connection of a server, so
/// implementations must be re-entrant; all per-call state arrives through the
/// [`CommandBuffer`].
///
/// Contract:
/// - on [`Verdict::ResponseReady`] the reply occupies `buf[0..nbuf)`;
/// - on [`Verdict::Incomplete`] the received bytes must be left as they are,
///   new bytes are appended before the next call.
pub trait CommandProcessor: Send + Sync {
    fn process(&self, cmd: &mut CommandBuffer<'_>) -> Verdict;
}
