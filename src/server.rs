//! TCP server for handling HTTP connections.
//!
//! Accepts connections, parses one request per connection, hands it to a
//! dispatcher and writes the response back before closing.

use crate::config::Config;
use crate::http::{parse, LineReader, Request, Response, Status};
use bytes::Bytes;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, trace, warn};

/// Listen backlog for the bound socket
const LISTEN_BACKLOG: i32 = 1024;

/// Maps a parsed request to fully framed response bytes.
pub trait Dispatch: Send + Sync + 'static {
    fn dispatch(&self, request: Request) -> impl Future<Output = Bytes> + Send;
}

/// Server instance
pub struct Server<D> {
    config: Config,
    dispatcher: Arc<D>,
    connection_limit: Arc<Semaphore>,
}

impl<D: Dispatch> Server<D> {
    /// Create a new server instance
    pub fn new(config: Config, dispatcher: D) -> Self {
        let connection_limit = Arc::new(Semaphore::new(config.max_connections));

        Server {
            config,
            dispatcher: Arc::new(dispatcher),
            connection_limit,
        }
    }

    /// Bind the configured address and begin accepting connections.
    ///
    /// Only returns on a bind failure.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = tokio::net::lookup_host(&self.config.listen)
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("no address found for {}", self.config.listen),
                )
            })?;

        let listener = bind_listener(addr)?;
        info!(address = %addr, "Server listening");

        self.serve(listener).await
    }

    /// Accept connections on an already bound listener.
    pub async fn serve(
        &self,
        listener: TcpListener,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        loop {
            // Wait for a connection slot
            let permit = self.connection_limit.clone().acquire_owned().await?;

            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(peer = %addr, "New connection");

                    let dispatcher = Arc::clone(&self.dispatcher);
                    let read_timeout = self.config.read_timeout;

                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_connection(stream, dispatcher.as_ref(), read_timeout).await
                        {
                            debug!(peer = %addr, error = %e, "Connection error");
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// Bind `config.listen` and serve `dispatcher` forever.
pub async fn run<D: Dispatch>(
    config: Config,
    dispatcher: D,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    Server::new(config, dispatcher).run().await
}

/// Handle a single client connection: one request, one response, close.
///
/// Any parse failure is answered with a bare 400. The stream is owned here
/// and dropped on every return path.
pub async fn handle_connection<S, D>(
    stream: S,
    dispatcher: &D,
    read_timeout: Option<Duration>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    D: Dispatch,
{
    let mut reader = LineReader::new(stream).with_read_timeout(read_timeout);

    let response = match parse(&mut reader).await {
        Ok(request) => {
            trace!(
                method = request.method(),
                path = request.path(),
                version = request.version(),
                headers = request.headers().len(),
                "Dispatching request"
            );
            dispatcher.dispatch(request).await
        }
        Err(e) => {
            warn!(error = %e, "Parse error");
            Response::new(Status::BadRequest).encode()
        }
    };

    let mut stream = reader.into_inner();
    stream.write_all(&response).await?;
    stream.shutdown().await?;

    Ok(())
}

/// Create a TCP listener with SO_REUSEADDR set.
fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    TcpListener::from_std(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    /// Answers `/echo/<s>` with `s`, everything else with 404.
    struct EchoDispatcher;

    impl Dispatch for EchoDispatcher {
        fn dispatch(&self, request: Request) -> impl Future<Output = Bytes> + Send {
            async move {
                match request.path().strip_prefix("/echo/") {
                    Some(text) => Response::text(text.to_string()).encode(),
                    None => Response::new(Status::NotFound).encode(),
                }
            }
        }
    }

    fn test_config(listen: &str) -> Config {
        Config {
            listen: listen.to_string(),
            directory: None,
            workers: None,
            max_connections: 16,
            read_timeout: None,
            log_level: "info".to_string(),
        }
    }

    /// Send `input`, half-close, and collect everything the handler writes.
    async fn exchange(input: &[u8], read_timeout: Option<Duration>) -> Vec<u8> {
        let (mut client, server) = tokio::io::duplex(1024);
        let handler =
            tokio::spawn(async move { handle_connection(server, &EchoDispatcher, read_timeout).await });

        client.write_all(input).await.unwrap();
        client.shutdown().await.unwrap();

        let mut output = Vec::new();
        client.read_to_end(&mut output).await.unwrap();
        handler.await.unwrap().unwrap();
        output
    }

    #[tokio::test]
    async fn test_echo_end_to_end() {
        let mock = tokio_test::io::Builder::new()
            .read(b"GET /echo/abc HTTP/1.1\r\n\r\n")
            .write(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 3\r\n\r\nabc")
            .build();

        handle_connection(mock, &EchoDispatcher, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_truncated_after_request_line() {
        let output = exchange(b"GET /echo/abc HTTP/1.1\r\n", None).await;
        assert_eq!(output, b"HTTP/1.1 400 Bad Request\r\n\r\n");
    }

    #[tokio::test]
    async fn test_malformed_request_line() {
        let output = exchange(b"GET /echo/abc\r\n\r\n", None).await;
        assert_eq!(output, b"HTTP/1.1 400 Bad Request\r\n\r\n");
    }

    #[tokio::test]
    async fn test_post_without_content_length() {
        let output = exchange(b"POST /echo/abc HTTP/1.1\r\n\r\n", None).await;
        assert_eq!(output, b"HTTP/1.1 400 Bad Request\r\n\r\n");
    }

    #[tokio::test]
    async fn test_one_request_per_connection() {
        let output = exchange(
            b"GET /echo/one HTTP/1.1\r\n\r\nGET /echo/two HTTP/1.1\r\n\r\n",
            None,
        )
        .await;
        assert_eq!(
            output,
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 3\r\n\r\none"
        );
    }

    #[tokio::test]
    async fn test_stalled_peer_times_out() {
        let (mut client, server) = tokio::io::duplex(1024);
        let handler = tokio::spawn(async move {
            handle_connection(server, &EchoDispatcher, Some(Duration::from_millis(50))).await
        });

        // Request line but never the blank line; the write side stays open.
        client.write_all(b"GET /echo/abc HTTP/1.1\r\n").await.unwrap();

        let mut output = Vec::new();
        client.read_to_end(&mut output).await.unwrap();
        handler.await.unwrap().unwrap();
        assert_eq!(output, b"HTTP/1.1 400 Bad Request\r\n\r\n");
    }

    #[tokio::test]
    async fn test_serve_accepts_concurrent_connections() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Server::new(test_config(&addr.to_string()), EchoDispatcher);
        tokio::spawn(async move { server.serve(listener).await });

        // Hold a silent connection open; it must not block the next one.
        let _idle = TcpStream::connect(addr).await.unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /echo/hi HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();

        let mut output = Vec::new();
        client.read_to_end(&mut output).await.unwrap();
        assert_eq!(
            output,
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nhi"
        );
    }

    #[tokio::test]
    async fn test_run_reports_bind_failure() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        let result = run(test_config(&addr.to_string()), EchoDispatcher).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_bind_listener_ephemeral_port() {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        assert!(listener.local_addr().unwrap().port() > 0);
    }
}
