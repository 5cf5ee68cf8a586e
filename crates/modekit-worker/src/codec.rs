//! `Content-Length` framing over byte streams.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{BufRead, Write};
use thiserror::Error;

const HEADER: &str = "content-length:";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed message body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid Content-Length header {0:?}")]
    InvalidLength(String),
}

/// Writes one framed message and flushes.
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<(), CodecError> {
    let body = serde_json::to_string(message)?;
    write!(writer, "Content-Length: {}\r\n\r\n{}", body.len(), body)?;
    writer.flush()?;
    Ok(())
}

/// Reads the next framed message. `Ok(None)` means the stream ended cleanly
/// between messages.
///
/// Header blocks without a length are skipped, other headers are ignored.
pub fn read_message<R: BufRead, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>, CodecError> {
    loop {
        let mut content_length = None;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            let line = line.trim();
            if line.is_empty() {
                break;
            }
            if line
                .get(..HEADER.len())
                .is_some_and(|name| name.eq_ignore_ascii_case(HEADER))
            {
                let value = line[HEADER.len()..].trim();
                let len = value
                    .parse::<usize>()
                    .map_err(|_| CodecError::InvalidLength(value.to_string()))?;
                content_length = Some(len);
            }
        }

        let Some(len) = content_length.filter(|&len| len > 0) else {
            continue;
        };
        let mut body = vec![0u8; len];
        reader.read_exact(&mut body)?;
        return Ok(Some(serde_json::from_slice(&body)?));
    }
}
