//! Line Protocol Implementation
//!
//! This module implements the text protocol spoken by the bundled command
//! processor: one command per `\n`-terminated line, one reply line per
//! command.
//!
//! ## Modules
//!
//! - `types`: the `Command` and `Reply` types and reply serialization
//! - `parser`: turns buffered request bytes into commands
//!
//! ## Example
//!
//! ```
//! use edgekv::protocol::{parse_batch, Command, Reply};
//! use bytes::Bytes;
//!
//! let commands = parse_batch(b"GET name\n").unwrap().unwrap();
//! assert_eq!(commands, vec![Command::Get(Bytes::from("name"))]);
//!
//! assert_eq!(Reply::Nil.serialize(), Bytes::from("(nil)\n"));
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{parse_batch, parse_line, ParseError, ParseResult};
pub use types::{Command, Reply};
