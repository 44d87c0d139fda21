//! Line Protocol Parser
//!
//! A request is one line of ASCII-whitespace separated words terminated by
//! `\n` (a trailing `\r` is tolerated). The first word names the command and
//! is case-insensitive.
//!
//! The parser works on whatever the connection has buffered so far:
//!
//! - `Ok(None)`: the buffer does not end with a newline yet, read more;
//! - `Ok(Some(commands))`: every line in the buffer parsed;
//! - `Err(ParseError)`: at least one line is not a valid command.
//!
//! A buffer is only parsed once it ends on a line boundary, so several
//! commands that arrive in one read are handled together.

use crate::protocol::types::{Command, LF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur while parsing a request line.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// The command name is not known
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// The command got the wrong number of arguments
    #[error("wrong number of arguments for '{0}'")]
    WrongArity(&'static str),

    /// An argument that should be an integer is not
    #[error("invalid integer: {0}")]
    InvalidInteger(String),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Parses every line of `buf` once it ends with a newline.
///
/// Blank lines are skipped, so `Ok(Some(vec![]))` is possible.
pub fn parse_batch(buf: &[u8]) -> ParseResult<Option<Vec<Command>>> {
    if buf.last() != Some(&LF) {
        return Ok(None);
    }

    let mut commands = Vec::new();
    for line in buf[..buf.len() - 1].split(|&b| b == LF) {
        if let Some(command) = parse_line(line)? {
            commands.push(command);
        }
    }
    Ok(Some(commands))
}

/// Parses a single line without its terminating `\n`.
///
/// Returns `Ok(None)` for a blank line.
pub fn parse_line(line: &[u8]) -> ParseResult<Option<Command>> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    let Some((name, rest)) = next_word(line) else {
        return Ok(None);
    };
    let name = String::from_utf8_lossy(name).to_ascii_uppercase();

    let command = match name.as_str() {
        "PING" => {
            let msg = trim_start(rest);
            Command::Ping((!msg.is_empty()).then(|| Bytes::copy_from_slice(msg)))
        }
        "ECHO" => Command::Echo(required_tail(rest, "ECHO")?),
        "SET" => {
            let (key, rest) = next_word(rest).ok_or(ParseError::WrongArity("SET"))?;
            Command::Set {
                key: Bytes::copy_from_slice(key),
                value: required_tail(rest, "SET")?,
            }
        }
        "GET" => {
            let [key] = exact::<1>(rest, "GET")?;
            Command::Get(key)
        }
        "DEL" => Command::Del(at_least_one(rest, "DEL")?),
        "EXISTS" => Command::Exists(at_least_one(rest, "EXISTS")?),
        "INCR" => {
            let [key] = exact::<1>(rest, "INCR")?;
            Command::IncrBy { key, delta: 1 }
        }
        "INCRBY" => {
            let [key, delta] = exact::<2>(rest, "INCRBY")?;
            Command::IncrBy {
                key,
                delta: parse_integer(&delta)?,
            }
        }
        "DBSIZE" => no_args(rest, Command::DbSize)?,
        "FLUSH" => no_args(rest, Command::Flush)?,
        "INFO" => no_args(rest, Command::Info)?,
        "NOOP" => no_args(rest, Command::Noop)?,
        "QUIT" => no_args(rest, Command::Quit)?,
        "SHUTDOWN" => no_args(rest, Command::Shutdown)?,
        _ => return Err(ParseError::UnknownCommand(name)),
    };

    Ok(Some(command))
}

/// Splits off the first word, skipping leading whitespace.
fn next_word(input: &[u8]) -> Option<(&[u8], &[u8])> {
    let input = trim_start(input);
    if input.is_empty() {
        return None;
    }
    let end = input
        .iter()
        .position(u8::is_ascii_whitespace)
        .unwrap_or(input.len());
    Some((&input[..end], &input[end..]))
}

fn trim_start(input: &[u8]) -> &[u8] {
    let start = input
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(input.len());
    &input[start..]
}

fn words(input: &[u8]) -> Vec<Bytes> {
    let mut out = Vec::new();
    let mut rest = input;
    while let Some((word, tail)) = next_word(rest) {
        out.push(Bytes::copy_from_slice(word));
        rest = tail;
    }
    out
}

/// The rest of the line as one argument (may contain spaces).
fn required_tail(rest: &[u8], cmd: &'static str) -> ParseResult<Bytes> {
    let tail = trim_start(rest);
    if tail.is_empty() {
        return Err(ParseError::WrongArity(cmd));
    }
    Ok(Bytes::copy_from_slice(tail))
}

fn exact<const N: usize>(rest: &[u8], cmd: &'static str) -> ParseResult<[Bytes; N]> {
    words(rest)
        .try_into()
        .map_err(|_| ParseError::WrongArity(cmd))
}

fn at_least_one(rest: &[u8], cmd: &'static str) -> ParseResult<Vec<Bytes>> {
    let args = words(rest);
    if args.is_empty() {
        return Err(ParseError::WrongArity(cmd));
    }
    Ok(args)
}

fn no_args(rest: &[u8], command: Command) -> ParseResult<Command> {
    if next_word(rest).is_some() {
        return Err(ParseError::WrongArity(command.name()));
    }
    Ok(command)
}

fn parse_integer(word: &[u8]) -> ParseResult<i64> {
    std::str::from_utf8(word)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ParseError::InvalidInteger(String::from_utf8_lossy(word).into_owned()))
}
