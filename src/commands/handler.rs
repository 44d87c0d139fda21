//! Command Handler Module
//!
//! This module implements the commands of the line protocol and plugs them
//! into the connection state machine as its [`CommandProcessor`].
//!
//! ## Supported Commands
//!
//! - `PING [message]` - Test connection
//! - `ECHO message` - Echo message
//! - `SET key value` - Set a key (the value is the rest of the line)
//! - `GET key` - Get a key's value
//! - `DEL key [key ...]` - Delete keys
//! - `EXISTS key [key ...]` - Count existing keys
//! - `INCR key` / `INCRBY key delta` - Integer arithmetic
//! - `DBSIZE` - Number of keys
//! - `FLUSH` - Clear database
//! - `INFO` - Storage and connection counters
//! - `NOOP` - Accepted silently
//! - `QUIT` - Close the connection
//! - `SHUTDOWN` - Stop the server
//!
//! ## Batches
//!
//! ```text
//! buffer ──parse_batch()──> [Command] ──execute()──> replies ──> buffer
//!   │                          │
//!   │ no trailing '\n'         │ any bad line
//!   ▼                          ▼
//! Incomplete                Malformed (nothing executed)
//! ```
//!
//! All lines that arrived in one buffer fill are parsed before any of them
//! runs, and their replies are concatenated into the same buffer.

use crate::fsm::{CommandBuffer, CommandProcessor, ConnectionStats, Verdict};
use crate::protocol::{parse_batch, Command, Reply};
use crate::storage::StorageEngine;
use bytes::{Bytes, BytesMut};
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Executes line-protocol commands against a shared storage engine.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    /// The storage engine
    storage: Arc<StorageEngine>,

    /// Server-wide connection counters reported by `INFO`
    stats: Option<Arc<ConnectionStats>>,
}

impl CommandHandler {
    /// Creates a new command handler with the given storage engine.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self {
            storage,
            stats: None,
        }
    }

    /// Includes the server's connection counters in `INFO` replies.
    pub fn with_stats(mut self, stats: Arc<ConnectionStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    /// Executes one command. Returns `None` for commands without a reply.
    ///
    /// `QUIT` and `SHUTDOWN` are connection-level and answered by
    /// [`process`](CommandProcessor::process); here they produce nothing.
    pub fn execute(&self, command: Command) -> Option<Reply> {
        let reply = match command {
            Command::Ping(None) => Reply::Status("PONG"),
            Command::Ping(Some(msg)) | Command::Echo(msg) => Reply::Value(msg),
            Command::Set { key, value } => {
                self.storage.set(key, value);
                Reply::ok()
            }
            Command::Get(key) => match self.storage.get(&key) {
                Some(value) => Reply::Value(value),
                None => Reply::Nil,
            },
            Command::Del(keys) => Reply::Integer(self.count(&keys, |k| self.storage.delete(k))),
            Command::Exists(keys) => Reply::Integer(self.count(&keys, |k| self.storage.exists(k))),
            Command::IncrBy { key, delta } => match self.storage.incr_by(&key, delta) {
                Ok(n) => Reply::Integer(n),
                Err(e) => Reply::error(e),
            },
            Command::DbSize => Reply::Integer(self.storage.len() as i64),
            Command::Flush => {
                self.storage.flush();
                Reply::ok()
            }
            Command::Info => Reply::Value(self.info()),
            Command::Noop | Command::Quit | Command::Shutdown => return None,
        };
        Some(reply)
    }

    /// `INFO` as `name:value` pairs separated by spaces.
    fn info(&self) -> Bytes {
        let storage = self.storage.stats();
        let mut line = format!(
            "keys:{} get_ops:{} set_ops:{} del_ops:{}",
            storage.keys, storage.get_ops, storage.set_ops, storage.del_ops
        );

        if let Some(stats) = &self.stats {
            let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
            let _ = write!(
                line,
                " connected_clients:{} total_connections:{} commands_processed:{} \
                 commands_malformed:{} send_stalls:{} bytes_read:{} bytes_written:{}",
                load(&stats.active_connections),
                load(&stats.connections_accepted),
                load(&stats.commands_processed),
                load(&stats.commands_malformed),
                load(&stats.send_stalls),
                load(&stats.bytes_read),
                load(&stats.bytes_written),
            );
        }

        Bytes::from(line)
    }

    fn count(&self, keys: &[Bytes], mut op: impl FnMut(&[u8]) -> bool) -> i64 {
        keys.iter().filter(|k| op(k)).count() as i64
    }
}

impl CommandProcessor for CommandHandler {
    fn process(&self, cmd: &mut CommandBuffer<'_>) -> Verdict {
        let commands = match parse_batch(cmd.received()) {
            Ok(None) => return Verdict::Incomplete,
            Ok(Some(commands)) => commands,
            Err(e) => {
                debug!(error = %e, "rejecting command batch");
                return Verdict::Malformed;
            }
        };

        let mut out = BytesMut::new();
        for command in commands {
            match command {
                Command::Quit => return Verdict::Quit,
                Command::Shutdown => return Verdict::Shutdown,
                command => {
                    if let Some(reply) = self.execute(command) {
                        reply.write_to(&mut out);
                    }
                }
            }
        }

        if out.is_empty() {
            return Verdict::NoResponse;
        }

        if let Err(e) = cmd.reply(&out) {
            warn!(error = %e, "reply does not fit in the I/O buffer");
            if cmd.reply(&Reply::error("Reply too large").serialize()).is_err() {
                return Verdict::Malformed;
            }
        }
        Verdict::ResponseReady
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm::IoBuffer;

    fn handler() -> CommandHandler {
        CommandHandler::new(Arc::new(StorageEngine::new()))
    }

    /// Runs the processor over `input` in a buffer of `capacity` bytes.
    fn process_with(handler: &CommandHandler, input: &[u8], capacity: usize) -> (Verdict, Vec<u8>) {
        let mut buf = IoBuffer::zeroed(capacity);
        let mut cmd = CommandBuffer::new(&mut buf);
        cmd.as_mut_slice()[..input.len()].copy_from_slice(input);
        cmd.set_len(input.len()).unwrap();

        let verdict = handler.process(&mut cmd);
        (verdict, cmd.received().to_vec())
    }

    fn process(handler: &CommandHandler, input: &[u8]) -> (Verdict, Vec<u8>) {
        process_with(handler, input, 256)
    }

    #[test]
    fn test_ping() {
        let h = handler();
        assert_eq!(process(&h, b"PING\n"), (Verdict::ResponseReady, b"PONG\n".to_vec()));
        assert_eq!(
            process(&h, b"ping hi there\r\n"),
            (Verdict::ResponseReady, b"hi there\n".to_vec())
        );
    }

    #[test]
    fn test_incomplete_keeps_buffer() {
        let h = handler();
        assert_eq!(process(&h, b"PI"), (Verdict::Incomplete, b"PI".to_vec()));
    }

    #[test]
    fn test_set_get_del() {
        let h = handler();
        assert_eq!(process(&h, b"SET name edge kv\n").1, b"OK\n");
        assert_eq!(process(&h, b"GET name\n").1, b"edge kv\n");
        assert_eq!(process(&h, b"EXISTS name other\n").1, b"(integer) 1\n");
        assert_eq!(process(&h, b"DEL name\n").1, b"(integer) 1\n");
        assert_eq!(process(&h, b"GET name\n").1, b"(nil)\n");
    }

    #[test]
    fn test_incr() {
        let h = handler();
        assert_eq!(process(&h, b"INCR n\n").1, b"(integer) 1\n");
        assert_eq!(process(&h, b"INCRBY n 41\n").1, b"(integer) 42\n");

        process(&h, b"SET s text\n");
        assert_eq!(
            process(&h, b"INCR s\n").1,
            b"(ERROR) value is not an integer or out of range\n"
        );
    }

    #[test]
    fn test_batch_replies_in_order() {
        let h = handler();
        let (verdict, out) = process(&h, b"SET a 1\nINCR a\nGET a\nDBSIZE\n");
        assert_eq!(verdict, Verdict::ResponseReady);
        assert_eq!(out, b"OK\n(integer) 2\n2\n(integer) 1\n");
    }

    #[test]
    fn test_malformed_batch_runs_nothing() {
        let h = handler();
        let (verdict, _) = process(&h, b"SET a 1\nBOGUS\n");
        assert_eq!(verdict, Verdict::Malformed);
        assert!(h.storage().is_empty());
    }

    #[test]
    fn test_noop_has_no_reply() {
        let h = handler();
        assert_eq!(process(&h, b"NOOP\n").0, Verdict::NoResponse);
        assert_eq!(process(&h, b"\n").0, Verdict::NoResponse);
    }

    #[test]
    fn test_quit_and_shutdown() {
        let h = handler();
        assert_eq!(process(&h, b"QUIT\n").0, Verdict::Quit);

        let (verdict, _) = process(&h, b"SET a 1\nSHUTDOWN\nSET b 2\n");
        assert_eq!(verdict, Verdict::Shutdown);
        assert!(h.storage().exists(b"a"));
        assert!(!h.storage().exists(b"b"));
    }

    #[test]
    fn test_reply_too_large() {
        let h = handler();
        h.storage().set(Bytes::from("big"), Bytes::from("x".repeat(100)));

        let (verdict, out) = process_with(&h, b"GET big\n", 64);
        assert_eq!(verdict, Verdict::ResponseReady);
        assert_eq!(out, b"(ERROR) Reply too large\n");
    }

    #[test]
    fn test_info_reports_storage_counters() {
        let h = handler();
        process(&h, b"SET a 1\nGET a\nGET b\nDEL a\n");

        let (verdict, out) = process(&h, b"INFO\n");
        assert_eq!(verdict, Verdict::ResponseReady);
        assert_eq!(out, b"keys:0 get_ops:2 set_ops:1 del_ops:1\n");
    }

    #[test]
    fn test_info_reports_connection_counters() {
        let stats = Arc::new(ConnectionStats::new());
        let h = handler().with_stats(Arc::clone(&stats));
        stats.connection_opened();
        stats.command_malformed();
        stats.send_stalled();
        stats.send_stalled();

        let out = String::from_utf8(process(&h, b"INFO\n").1).unwrap();
        assert!(out.contains(" connected_clients:1 total_connections:1 "));
        assert!(out.contains(" commands_malformed:1 send_stalls:2 "));
        assert!(out.ends_with('\n'));
        assert_eq!(out.matches('\n').count(), 1);
    }

    #[test]
    fn test_flush() {
        let h = handler();
        process(&h, b"SET a 1\nSET b 2\n");
        assert_eq!(process(&h, b"FLUSH\nDBSIZE\n").1, b"OK\n(integer) 0\n");
    }
}
