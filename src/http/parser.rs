//! HTTP/1.1 request parser.
//!
//! A single forward pass over the connection, one line at a time:
//!
//! 1. Request line: `<METHOD> <PATH> <VERSION>`, exactly three fields
//!    separated by single spaces.
//! 2. Headers: `<Name>: <Value>` lines until a blank line. Lines without a
//!    colon are skipped.
//! 3. Body length: `POST` only. `Content-Length` must be present and a
//!    non-negative base-10 integer.
//! 4. Body: exactly `Content-Length` bytes.
//!
//! Every error is terminal for the connection. There is no resynchronization.

use super::reader::{LineReader, ReadError};
use super::request::Request;
use bytes::Bytes;
use std::io;
use tokio::io::AsyncRead;
use tracing::trace;

/// Header carrying the body length
pub const CONTENT_LENGTH: &str = "Content-Length";

/// Request parsing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Request line did not have exactly three non-empty fields
    MalformedRequestLine(String),
    /// Stream ended while a line was expected
    StreamTruncated,
    /// POST without a usable Content-Length header
    MissingOrInvalidContentLength,
    /// Stream ended before the declared body length was read
    BodyShortRead { expected: usize, received: usize },
    /// Peer went silent longer than the configured read timeout
    ReadTimeout,
    /// Socket error other than end of stream
    Io(io::ErrorKind),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::MalformedRequestLine(line) => {
                write!(f, "Malformed request line: {:?}", line)
            }
            ParseError::StreamTruncated => write!(f, "Stream ended before request was complete"),
            ParseError::MissingOrInvalidContentLength => {
                write!(f, "Missing or invalid Content-Length")
            }
            ParseError::BodyShortRead { expected, received } => write!(
                f,
                "Body too short: expected {} bytes, received {}",
                expected, received
            ),
            ParseError::ReadTimeout => write!(f, "Timed out waiting for request data"),
            ParseError::Io(kind) => write!(f, "Read failed: {}", kind),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<ReadError> for ParseError {
    fn from(e: ReadError) -> Self {
        match e {
            ReadError::Eof { .. } => ParseError::StreamTruncated,
            ReadError::TimedOut => ParseError::ReadTimeout,
            ReadError::Io(kind) => ParseError::Io(kind),
        }
    }
}

/// Parse one request from `reader`.
pub async fn parse<R>(reader: &mut LineReader<R>) -> Result<Request, ParseError>
where
    R: AsyncRead + Unpin,
{
    let line = reader.read_line().await?;
    let mut request = parse_request_line(&line)?;

    loop {
        let line = reader.read_line().await?;
        let line = line.trim_ascii();
        if line.is_empty() {
            break;
        }

        if let Some((name, value)) = parse_header(line) {
            request = request.with_header(name, value);
        }
    }

    if request.method() != "POST" {
        return Ok(request);
    }

    let length = content_length(&request)?;
    trace!(length, "Reading request body");

    let body = reader.read_exact(length).await.map_err(|e| match e {
        ReadError::Eof { received } => ParseError::BodyShortRead {
            expected: length,
            received,
        },
        other => other.into(),
    })?;

    Ok(request.with_body(Bytes::from(body)))
}

/// Split the request line into method, path and version.
fn parse_request_line(line: &[u8]) -> Result<Request, ParseError> {
    let line = String::from_utf8_lossy(line.trim_ascii());
    let parts: Vec<&str> = line.split(' ').collect();

    match parts.as_slice() {
        [method, path, version]
            if !method.is_empty() && !path.is_empty() && !version.is_empty() =>
        {
            Ok(Request::new(*method, *path, *version))
        }
        _ => Err(ParseError::MalformedRequestLine(line.to_string())),
    }
}

/// Split a header line on its first colon. Returns `None` if there is none.
fn parse_header(line: &[u8]) -> Option<(String, String)> {
    let line = String::from_utf8_lossy(line);
    let (name, value) = line.split_once(':')?;
    Some((name.trim().to_string(), value.trim().to_string()))
}

fn content_length(request: &Request) -> Result<usize, ParseError> {
    request
        .header(CONTENT_LENGTH)
        .and_then(|value| value.parse::<usize>().ok())
        .ok_or(ParseError::MissingOrInvalidContentLength)
}
