//! Line Protocol Data Types
//!
//! Requests are single text lines; replies are text lines too. Every reply
//! type has a fixed rendering:
//!
//! | Reply              | Wire form              |
//! |--------------------|------------------------|
//! | `Status("OK")`     | `OK\n`                 |
//! | `Value(b"edge")`   | `edge\n`               |
//! | `Nil`              | `(nil)\n`              |
//! | `Integer(3)`       | `(integer) 3\n`        |
//! | `Error("boom")`    | `(ERROR) boom\n`       |

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Line terminator used by requests and replies.
pub const LF: u8 = b'\n';

/// The parsed form of one request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `PING [message]`
    Ping(Option<Bytes>),
    /// `ECHO message`
    Echo(Bytes),
    /// `SET key value`
    Set { key: Bytes, value: Bytes },
    /// `GET key`
    Get(Bytes),
    /// `DEL key [key ...]`
    Del(Vec<Bytes>),
    /// `EXISTS key [key ...]`
    Exists(Vec<Bytes>),
    /// `INCR key` / `INCRBY key delta`
    IncrBy { key: Bytes, delta: i64 },
    /// `DBSIZE`
    DbSize,
    /// `FLUSH`
    Flush,
    /// `INFO`: server and storage counters on one line.
    Info,
    /// `NOOP`: consumed without a reply.
    Noop,
    /// `QUIT`: close this connection.
    Quit,
    /// `SHUTDOWN`: stop the server.
    Shutdown,
}

impl Command {
    /// The command name as clients type it.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping(_) => "PING",
            Command::Echo(_) => "ECHO",
            Command::Set { .. } => "SET",
            Command::Get(_) => "GET",
            Command::Del(_) => "DEL",
            Command::Exists(_) => "EXISTS",
            Command::IncrBy { .. } => "INCRBY",
            Command::DbSize => "DBSIZE",
            Command::Flush => "FLUSH",
            Command::Info => "INFO",
            Command::Noop => "NOOP",
            Command::Quit => "QUIT",
            Command::Shutdown => "SHUTDOWN",
        }
    }
}

/// A reply to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Status(&'static str),
    Value(Bytes),
    Nil,
    Integer(i64),
    Error(String),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Status("OK")
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Reply::Error(msg.into())
    }

    /// Appends the wire form of this reply to `out`.
    pub fn write_to(&self, out: &mut BytesMut) {
        match self {
            Reply::Status(s) => out.put_slice(s.as_bytes()),
            Reply::Value(v) => out.put_slice(v),
            Reply::Nil => out.put_slice(b"(nil)"),
            Reply::Integer(n) => {
                out.put_slice(b"(integer) ");
                out.put_slice(n.to_string().as_bytes());
            }
            Reply::Error(msg) => {
                out.put_slice(b"(ERROR) ");
                out.put_slice(msg.as_bytes());
            }
        }
        out.put_u8(LF);
    }

    /// Serializes this reply into a standalone buffer.
    pub fn serialize(&self) -> Bytes {
        let mut out = BytesMut::new();
        self.write_to(&mut out);
        out.freeze()
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "{}", s),
            Reply::Value(v) => write!(f, "{}", String::from_utf8_lossy(v)),
            Reply::Nil => write!(f, "(nil)"),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::Error(msg) => write!(f, "(ERROR) {}", msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_replies() {
        assert_eq!(Reply::ok().serialize(), Bytes::from("OK\n"));
        assert_eq!(Reply::Value(Bytes::from("edge")).serialize(), Bytes::from("edge\n"));
        assert_eq!(Reply::Nil.serialize(), Bytes::from("(nil)\n"));
        assert_eq!(Reply::Integer(-3).serialize(), Bytes::from("(integer) -3\n"));
        assert_eq!(
            Reply::error("Reply too large").serialize(),
            Bytes::from("(ERROR) Reply too large\n")
        );
    }

    #[test]
    fn test_write_to_appends() {
        let mut out = BytesMut::new();
        Reply::ok().write_to(&mut out);
        Reply::Integer(2).write_to(&mut out);
        assert_eq!(&out[..], b"OK\n(integer) 2\n");
    }

    #[test]
    fn test_display() {
        assert_eq!(Reply::Integer(7).to_string(), "(integer) 7");
        assert_eq!(Reply::error("nope").to_string(), "(ERROR) nope");
    }
}
