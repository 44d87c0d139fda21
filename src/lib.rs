//! # EdgeKV - A Key-Value Server on an Edge-Triggered Connection State Machine
//!
//! EdgeKV serves a small line-oriented key-value protocol. Every client
//! connection is driven by an explicit state machine over a non-blocking
//! socket: it reads until the socket would block, hands the bytes to a
//! command processor, and parks partially written replies until the socket
//! becomes writable again.
//!
//! ## Features
//!
//! - **Edge-triggered**: each readiness notification drains the socket, so no
//!   event is ever lost and no connection busy-waits
//! - **Pluggable**: the socket, the command processor and the buffer
//!   allocator are all traits
//! - **Pooled buffers**: each connection holds one fixed-size buffer only
//!   while it has bytes in flight
//! - **Async I/O**: Built on Tokio readiness for thousands of connections
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              EdgeKV                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │   Server    │───>│ Connection  │───>│   fsm::     │                  │
//! │  │ (accept)    │    │  Handler    │    │ Connection  │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │ CommandProcessor        │
//! │                                               ▼                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────────────────────┐ │
//! │  │   Line      │<───│  Command    │───>│        StorageEngine         │ │
//! │  │   Parser    │    │  Handler    │    │  ┌────────┐ ┌────────┐       │ │
//! │  └─────────────┘    └─────────────┘    │  │Shard 0 │ │...N    │       │ │
//! │                                        │  └────────┘ └────────┘       │ │
//! │                                        └──────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use edgekv::{CommandHandler, PoolAllocator, Server, StorageEngine};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = Arc::new(StorageEngine::new());
//!     let processor = Arc::new(CommandHandler::new(storage));
//!     let allocator = Arc::new(PoolAllocator::default());
//!
//!     let listener = TcpListener::bind("127.0.0.1:7070").await?;
//!     Server::new(processor, allocator).run(listener).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING [message]`, `ECHO message`
//! - `SET key value`, `GET key`, `DEL key [key ...]`, `EXISTS key [key ...]`
//! - `INCR key` / `INCRBY key delta`
//! - `DBSIZE`, `FLUSH`, `INFO`, `NOOP`
//! - `QUIT` (close the connection), `SHUTDOWN` (stop the server)
//!
//! ## Module Overview
//!
//! - [`fsm`]: the per-connection state machine and its collaborator traits
//! - [`connection`]: tokio driver for one connection
//! - [`server`]: accept loop and shutdown handling
//! - [`protocol`]: line protocol parser and reply types
//! - [`commands`]: the command processor
//! - [`storage`]: thread-safe sharded storage engine

pub mod commands;
pub mod connection;
pub mod fsm;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use connection::handle_connection;
pub use fsm::{
    BufferAllocator, CommandProcessor, Connection, ConnectionStats, Event, FsmError, HeapAllocator,
    Outcome, PoolAllocator, Source, Verdict,
};
pub use protocol::{Command, ParseError, Reply};
pub use server::Server;
pub use storage::StorageEngine;

/// The default port EdgeKV listens on
pub const DEFAULT_PORT: u16 = 7070;

/// The default host EdgeKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of EdgeKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
