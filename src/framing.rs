//! Content-Length framing for JSON-RPC over byte streams
//!
//! Every message is `Content-Length: N\r\n\r\n` followed by exactly `N` bytes
//! of UTF-8 JSON. Other headers (such as `Content-Type`) are accepted and
//! ignored. Decoding never panics: malformed input is reported as
//! [`BridgeError::Protocol`].

use crate::error::{BridgeError, Result};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const CONTENT_LENGTH: &str = "content-length";

/// Largest body accepted from a peer (64 MiB)
pub const MAX_CONTENT_LENGTH: usize = 64 * 1024 * 1024;

/// Encode a message into a complete frame.
pub fn encode<T: Serialize + ?Sized>(message: &T) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(message)?;
    let mut frame = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode exactly one frame held in `bytes`.
///
/// The declared length must match the bytes that follow the header block.
pub fn decode(bytes: &[u8]) -> Result<serde_json::Value> {
    let header_end = find_header_end(bytes)
        .ok_or_else(|| BridgeError::Protocol("incomplete header block".to_string()))?;

    let mut content_length = None;
    for line in bytes[..header_end.start].split(|&b| b == b'\n') {
        let line = trim_line(line);
        if line.is_empty() {
            continue;
        }
        if let Some(length) = parse_header_line(line)? {
            content_length = Some(length);
        }
    }

    let length = content_length
        .ok_or_else(|| BridgeError::Protocol("missing Content-Length header".to_string()))?;
    let body = &bytes[header_end.end..];
    if body.len() != length {
        return Err(BridgeError::Protocol(format!(
            "Content-Length declares {} bytes but {} are available",
            length,
            body.len()
        )));
    }

    parse_body(body)
}

/// Read the next frame from a stream.
///
/// Returns `Ok(None)` on a clean end of stream before any header byte.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<serde_json::Value>>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length = None;
    let mut line = Vec::new();
    let mut saw_header = false;

    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line).await.map_err(|e| {
            BridgeError::Transport(format!("failed to read frame header: {}", e))
        })?;

        if read == 0 {
            if saw_header {
                return Err(BridgeError::Protocol(
                    "stream ended inside frame headers".to_string(),
                ));
            }
            return Ok(None);
        }
        saw_header = true;

        let trimmed = trim_line(&line);
        if trimmed.is_empty() {
            break;
        }
        if let Some(length) = parse_header_line(trimmed)? {
            content_length = Some(length);
        }
    }

    let length = content_length
        .ok_or_else(|| BridgeError::Protocol("missing Content-Length header".to_string()))?;

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await.map_err(|e| {
        BridgeError::Protocol(format!(
            "stream ended before {} byte body was read: {}",
            length, e
        ))
    })?;

    parse_body(&body).map(Some)
}

/// Encode and write one frame, then flush.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
    T: Serialize + ?Sized,
{
    let frame = encode(message)?;
    writer
        .write_all(&frame)
        .await
        .map_err(|e| BridgeError::Transport(format!("failed to write frame: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| BridgeError::Transport(format!("failed to flush frame: {}", e)))?;
    Ok(())
}

fn parse_body(body: &[u8]) -> Result<serde_json::Value> {
    serde_json::from_slice(body)
        .map_err(|e| BridgeError::Protocol(format!("invalid JSON body: {}", e)))
}

/// Returns `Some(length)` for a Content-Length header, `None` for any other.
fn parse_header_line(line: &[u8]) -> Result<Option<usize>> {
    let line = std::str::from_utf8(line)
        .map_err(|_| BridgeError::Protocol("header line is not valid UTF-8".to_string()))?;
    let (key, value) = line
        .split_once(':')
        .ok_or_else(|| BridgeError::Protocol(format!("malformed header line: {:?}", line)))?;

    if !key.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
        return Ok(None);
    }

    let length = value
        .trim()
        .parse::<u64>()
        .map_err(|_| BridgeError::Protocol(format!("invalid Content-Length value: {:?}", value)))?;
    match usize::try_from(length) {
        Ok(length) if length <= MAX_CONTENT_LENGTH => Ok(Some(length)),
        _ => Err(BridgeError::Protocol(format!(
            "Content-Length {} exceeds the {} byte limit",
            length, MAX_CONTENT_LENGTH
        ))),
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Byte range of the blank line that terminates the header block.
fn find_header_end(bytes: &[u8]) -> Option<std::ops::Range<usize>> {
    if let Some(pos) = bytes.windows(4).position(|w| w == b"\r\n\r\n") {
        return Some(pos + 2..pos + 4);
    }
    bytes
        .windows(2)
        .position(|w| w == b"\n\n")
        .map(|pos| pos + 1..pos + 2)
}
