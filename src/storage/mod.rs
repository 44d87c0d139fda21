//! Storage Engine Module
//!
//! This module provides the key-value store the bundled command processor
//! operates on: a thread-safe, sharded map of `Bytes` keys to `Bytes` values.
//!
//! ## Example
//!
//! ```
//! use edgekv::storage::StorageEngine;
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! let engine = Arc::new(StorageEngine::new());
//!
//! engine.set(Bytes::from("hits"), Bytes::from("41"));
//! assert_eq!(engine.incr_by(&Bytes::from("hits"), 1), Ok(42));
//! ```

pub mod engine;

// Re-export commonly used types
pub use engine::{StorageEngine, StorageStats};
