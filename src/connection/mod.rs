//! Connection Handler Module
//!
//! This module runs individual client connections on tokio. Each client is
//! handled by its own async task that owns a [`crate::fsm::Connection`] and
//! feeds it readiness events.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Server (server.rs)                      │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept() + spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 handle_connection                           │
//! │                                                             │
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐   │
//! │  │ await ready  │───>│  dispatch    │───>│  outcome?    │   │
//! │  └──────────────┘    └──────────────┘    └──────┬───────┘   │
//! │         ▲                                       │ Continue  │
//! │         └───────────────────────────────────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use edgekv::connection::{handle_connection, ConnectionStats};
//! use edgekv::commands::CommandHandler;
//! use edgekv::fsm::PoolAllocator;
//! use edgekv::storage::StorageEngine;
//! use std::sync::Arc;
//!
//! let processor = Arc::new(CommandHandler::new(Arc::new(StorageEngine::new())));
//! let allocator = Arc::new(PoolAllocator::default());
//! let stats = Arc::new(ConnectionStats::new());
//!
//! // For each accepted connection...
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, processor, allocator, stats));
//! ```

pub mod handler;

// Re-export commonly used types
pub use crate::fsm::ConnectionStats;
pub use handler::handle_connection;
