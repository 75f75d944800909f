//! Buffered line and fixed-length reads over a single connection.
//!
//! The reader owns the inbound half of the connection and keeps an internal
//! buffer so that reading a request one header line at a time does not turn
//! into one socket read per line.

use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Read buffer size
const BUFFER_SIZE: usize = 16 * 1024;

/// Failure of a single read primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    /// The stream ended before the delimiter or byte count was reached.
    Eof {
        /// Bytes delivered before the end of the stream.
        received: usize,
    },
    /// No bytes arrived within the configured read timeout.
    TimedOut,
    /// Any other socket error.
    Io(io::ErrorKind),
}

impl From<io::Error> for ReadError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut => ReadError::TimedOut,
            kind => ReadError::Io(kind),
        }
    }
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadError::Eof { received } => {
                write!(f, "Unexpected end of stream after {} bytes", received)
            }
            ReadError::TimedOut => write!(f, "Read timed out"),
            ReadError::Io(kind) => write!(f, "Read failed: {}", kind),
        }
    }
}

impl std::error::Error for ReadError {}

/// Buffered reader exposing `read_line` and `read_exact`.
pub struct LineReader<R> {
    inner: BufReader<R>,
    read_timeout: Option<Duration>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Wrap a byte source with no read timeout.
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::with_capacity(BUFFER_SIZE, inner),
            read_timeout: None,
        }
    }

    /// Bound every individual socket read by `timeout`.
    ///
    /// `None` keeps reads unbounded: a silent peer then holds the reader
    /// until it sends more bytes or closes.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Read up to and including the next `\n`.
    ///
    /// Line terminators are returned as-is; callers trim them.
    pub async fn read_line(&mut self) -> Result<Vec<u8>, ReadError> {
        let mut line = Vec::new();

        loop {
            let (found, used) = {
                let available = self.fill_buf().await?;
                if available.is_empty() {
                    return Err(ReadError::Eof {
                        received: line.len(),
                    });
                }

                match available.iter().position(|&b| b == b'\n') {
                    Some(pos) => {
                        line.extend_from_slice(&available[..=pos]);
                        (true, pos + 1)
                    }
                    None => {
                        line.extend_from_slice(available);
                        (false, available.len())
                    }
                }
            };

            self.inner.consume(used);

            if found {
                return Ok(line);
            }
        }
    }

    /// Read exactly `n` bytes, failing if the stream ends first.
    pub async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>, ReadError> {
        // Capacity is capped so a bogus length cannot force a huge allocation
        // before any bytes have arrived.
        let mut data = Vec::with_capacity(n.min(BUFFER_SIZE));

        while data.len() < n {
            let used = {
                let available = self.fill_buf().await?;
                if available.is_empty() {
                    return Err(ReadError::Eof {
                        received: data.len(),
                    });
                }

                let take = available.len().min(n - data.len());
                data.extend_from_slice(&available[..take]);
                take
            };

            self.inner.consume(used);
        }

        Ok(data)
    }

    /// Give back the underlying stream, discarding any buffered bytes.
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }

    async fn fill_buf(&mut self) -> Result<&[u8], ReadError> {
        match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, self.inner.fill_buf())
                .await
                .map_err(|_| ReadError::TimedOut)?
                .map_err(ReadError::from),
            None => self.inner.fill_buf().await.map_err(ReadError::from),
        }
    }
}
