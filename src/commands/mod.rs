//! Command Handler Module
//!
//! This module implements the command processing layer: it receives the
//! bytes a connection has buffered, executes the commands they contain
//! against the storage engine, and writes the replies back into the
//! connection's buffer.
//!
//! ## Architecture
//!
//! ```text
//! Connection buffer
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Line Parser    │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module, a fsm::CommandProcessor)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine   │  (storage module)
//! └─────────────────┘
//! ```

pub mod handler;

// Re-export the main command handler
pub use handler::CommandHandler;
