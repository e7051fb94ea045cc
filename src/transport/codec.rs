//! Engine wire codec
//!
//! Frames exchanged with an engine process use HTTP-style headers followed
//! by a JSON body:
//! ```text
//! Content-Length: <byte-length>\r\n
//! \r\n
//! <JSON body>
//! ```

use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::common::Error;

/// Upper bound on a single frame body
const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Read one frame body from the stream
///
/// Returns `Ok(None)` on a clean end of stream before any header.
pub async fn read_message<R: AsyncBufRead + Unpin>(
    reader: &mut R,
) -> Result<Option<String>, Error> {
    let mut content_length: Option<usize> = None;
    let mut saw_header = false;

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line).await.map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::EngineCrashed
            } else {
                Error::Io(e)
            }
        })?;

        if bytes_read == 0 {
            if saw_header {
                return Err(Error::EngineCrashed);
            }
            return Ok(None);
        }

        // Empty line (just \r\n) signals end of headers
        if line == "\r\n" || line == "\n" {
            if !saw_header {
                continue;
            }
            break;
        }
        saw_header = true;

        let line = line.trim();
        if let Some(value) = line.strip_prefix("Content-Length:") {
            content_length = Some(value.trim().parse().map_err(|_| {
                Error::WireProtocol(format!("Invalid Content-Length: {}", value.trim()))
            })?);
        }
        // Other headers are ignored
    }

    let len = content_length
        .ok_or_else(|| Error::WireProtocol("Missing Content-Length header".to_string()))?;

    if len > MAX_FRAME_LEN {
        return Err(Error::WireProtocol(format!(
            "Content-Length too large: {} bytes",
            len
        )));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::EngineCrashed
        } else {
            Error::Io(e)
        }
    })?;

    String::from_utf8(body)
        .map(Some)
        .map_err(|e| Error::WireProtocol(format!("Invalid UTF-8: {}", e)))
}

/// Write one frame to the stream
pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, json: &str) -> Result<(), Error> {
    let header = format!("Content-Length: {}\r\n\r\n", json.len());

    writer.write_all(header.as_bytes()).await?;
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await?;

    Ok(())
}
