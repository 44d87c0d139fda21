//! Non-blocking socket I/O
//!
//! The state machine talks to its socket through [`Source`], a pair of
//! non-blocking operations with POSIX-like semantics:
//!
//! - `Ok(n)` with `n > 0`: progress was made;
//! - `Ok(0)` from `read`: the peer closed the stream;
//! - `Err(e)` with `e.kind() == WouldBlock`: no progress is possible until
//!   the next readiness notification (`EAGAIN` / `EWOULDBLOCK`).

use std::io;

/// A non-blocking byte stream.
pub trait Source {
    /// Reads up to `dst.len()` bytes without blocking.
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize>;

    /// Writes up to `src.len()` bytes without blocking.
    fn write(&mut self, src: &[u8]) -> io::Result<usize>;
}

/// Tokio clears the socket's readiness whenever one of these calls reports
/// `WouldBlock`, which gives the edge-triggered behaviour the state machine
/// is written for.
impl Source for tokio::net::TcpStream {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        self.try_read(dst)
    }

    fn write(&mut self, src: &[u8]) -> io::Result<usize> {
        self.try_write(src)
    }
}

/// The stream must have been put in non-blocking mode with
/// [`set_nonblocking`](std::net::TcpStream::set_nonblocking).
impl Source for std::net::TcpStream {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        io::Read::read(self, dst)
    }

    fn write(&mut self, src: &[u8]) -> io::Result<usize> {
        io::Write::write(self, src)
    }
}

/// Errors that mean the peer is gone rather than that something is broken.
pub fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
    )
}
