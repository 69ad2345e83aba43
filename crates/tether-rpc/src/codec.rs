//! JSONL framing for bridge envelopes.
//!
//! Every envelope is one JSON document followed by a newline. Readers
//! enforce an upper bound on line length so a misbehaving peer cannot make
//! the other side buffer without limit.

use std::io::{self, BufRead, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::TransportError;

/// Serialises a value as a single newline-terminated JSON line.
///
/// # Errors
///
/// Returns [`TransportError::Serialize`] if the value cannot be serialised.
pub fn encode_line<T: Serialize>(value: &T) -> Result<Vec<u8>, TransportError> {
    let mut line = serde_json::to_vec(value).map_err(TransportError::serialize)?;
    line.push(b'\n');
    Ok(line)
}

/// Parses a JSON line, ignoring trailing whitespace and the delimiter.
///
/// # Errors
///
/// Returns the underlying JSON error when the line is empty or does not
/// match `T`.
pub fn decode_line<T: DeserializeOwned>(line: &[u8]) -> Result<T, serde_json::Error> {
    serde_json::from_slice(trim_trailing_whitespace(line))
}

/// Writes one encoded line and flushes the writer.
///
/// # Errors
///
/// Returns [`TransportError::Serialize`] or [`TransportError::Io`].
pub fn write_line<W: Write, T: Serialize>(
    writer: &mut W,
    value: &T,
) -> Result<(), TransportError> {
    let line = encode_line(value)?;
    writer.write_all(&line).map_err(TransportError::io)?;
    writer.flush().map_err(TransportError::io)
}

/// Reads one newline-terminated line of at most `max_bytes` bytes.
///
/// Returns `Ok(None)` when the stream ends before any byte arrives, and the
/// partial line when it ends mid-line.
///
/// # Errors
///
/// Returns [`TransportError::EnvelopeTooLarge`] when the line exceeds the
/// limit and [`TransportError::Io`] when reading fails.
pub fn read_line<R: BufRead>(
    reader: &mut R,
    max_bytes: usize,
) -> Result<Option<Vec<u8>>, TransportError> {
    let mut line = Vec::new();
    loop {
        let available = match reader.fill_buf() {
            Ok(buffer) => buffer,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(TransportError::io(error)),
        };

        if available.is_empty() {
            return Ok(if line.is_empty() { None } else { Some(line) });
        }

        let (consumed, complete) = match available.iter().position(|byte| *byte == b'\n') {
            Some(newline) => {
                let (head, _) = available.split_at(newline + 1);
                line.extend_from_slice(head);
                (head.len(), true)
            }
            None => {
                line.extend_from_slice(available);
                (available.len(), false)
            }
        };
        reader.consume(consumed);
        enforce_limit(line.len(), max_bytes)?;

        if complete {
            return Ok(Some(line));
        }
    }
}

fn enforce_limit(size: usize, max_size: usize) -> Result<(), TransportError> {
    if size > max_size {
        return Err(TransportError::EnvelopeTooLarge { size, max_size });
    }
    Ok(())
}

fn trim_trailing_whitespace(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|byte| !byte.is_ascii_whitespace())
        .map_or(0, |pos| pos + 1);
    bytes.split_at(end).0
}
