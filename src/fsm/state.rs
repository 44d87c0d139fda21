//! Connection states, readiness events and dispatch outcomes.

use super::buffer::IoBuffer;

/// The externally visible state tag of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No outstanding operation; the buffer, if any, holds no data.
    Connected,
    /// A command prefix is buffered and more bytes are needed.
    RecvIncomplete,
    /// A reply is partially written and the socket is waiting to drain.
    SendIncomplete,
}

/// The direction(s) a readiness notification covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Read,
    Write,
    ReadWrite,
}

impl Op {
    #[inline]
    pub fn is_writable(self) -> bool {
        matches!(self, Op::Write | Op::ReadWrite)
    }
}

/// A socket readiness notification for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub op: Op,
}

impl Event {
    pub fn new(op: Op) -> Self {
        Self { op }
    }

    pub fn readable() -> Self {
        Self::new(Op::Read)
    }

    pub fn writable() -> Self {
        Self::new(Op::Write)
    }

    pub fn read_write() -> Self {
        Self::new(Op::ReadWrite)
    }
}

/// What the event loop should do with a connection after a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Keep the connection registered and wait for the next event.
    Continue,
    /// Tear this connection down.
    DropConnection,
    /// Tear the whole server down.
    ShutdownServer,
}

impl Outcome {
    #[inline]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Outcome::Continue)
    }
}

/// Internal state carrying the data each state is allowed to own.
///
/// The buffer lives inside the variant, so a parked `SendIncomplete` is the
/// only thing that can reach the pending reply.
#[derive(Debug)]
pub(crate) enum Phase {
    /// `nbuf == 0`, `snbuf == 0`; the buffer is kept after a send drains and
    /// released on the next idle would-block.
    Connected { buf: Option<IoBuffer> },
    /// `0 < nbuf < B`, `snbuf == 0`.
    RecvIncomplete { buf: IoBuffer },
    /// `0 <= sent < nbuf <= B`.
    SendIncomplete { buf: IoBuffer, sent: usize },
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Connected { buf: None }
    }
}

impl Phase {
    pub(crate) fn tag(&self) -> State {
        match self {
            Phase::Connected { .. } => State::Connected,
            Phase::RecvIncomplete { .. } => State::RecvIncomplete,
            Phase::SendIncomplete { .. } => State::SendIncomplete,
        }
    }

    pub(crate) fn buffer(&self) -> Option<&IoBuffer> {
        match self {
            Phase::Connected { buf } => buf.as_ref(),
            Phase::RecvIncomplete { buf } | Phase::SendIncomplete { buf, .. } => Some(buf),
        }
    }

    pub(crate) fn into_buffer(self) -> Option<IoBuffer> {
        match self {
            Phase::Connected { buf } => buf,
            Phase::RecvIncomplete { buf } | Phase::SendIncomplete { buf, .. } => Some(buf),
        }
    }

    /// Checks the numeric bounds the variant does not encode by itself.
    pub(crate) fn holds_invariants(&self) -> bool {
        match self {
            Phase::Connected { buf } => buf.as_ref().map_or(true, IoBuffer::is_empty),
            Phase::RecvIncomplete { buf } => !buf.is_empty() && !buf.is_full(),
            Phase::SendIncomplete { buf, sent } => *sent < buf.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_directions() {
        assert!(!Op::Read.is_writable());
        assert!(Op::Write.is_writable());
        assert!(Op::ReadWrite.is_writable());
    }

    #[test]
    fn test_outcome_terminal() {
        assert!(!Outcome::Continue.is_terminal());
        assert!(Outcome::DropConnection.is_terminal());
        assert!(Outcome::ShutdownServer.is_terminal());
    }

    #[test]
    fn test_phase_invariants() {
        assert!(Phase::default().holds_invariants());

        let mut buf = IoBuffer::zeroed(32);
        buf.overwrite(b"PI");
        let phase = Phase::RecvIncomplete { buf };
        assert_eq!(phase.tag(), State::RecvIncomplete);
        assert!(phase.holds_invariants());

        let buf = phase.into_buffer().unwrap();
        let phase = Phase::SendIncomplete { buf, sent: 2 };
        assert!(!phase.holds_invariants());

        let buf = phase.into_buffer().unwrap();
        let phase = Phase::Connected { buf: Some(buf) };
        assert!(!phase.holds_invariants());
    }
}
