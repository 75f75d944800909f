//! Route dispatch.
//!
//! Routes, checked in order:
//! - `/echo/<text>`: 200 with the last path segment as `text/plain`
//! - `/user-agent`: 200 with the `User-Agent` header as `text/plain`
//! - `/files/<name>`: `GET` reads and `POST` writes `<directory>/<name>`
//! - `/`: bare 200
//! - anything else: bare 404

use crate::http::{Request, Response, Status};
use crate::server::Dispatch;
use bytes::Bytes;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Dispatcher for the fixed set of routes
pub struct Router {
    directory: Option<PathBuf>,
}

impl Router {
    /// `directory` backs the `/files/` route; `None` makes it answer 404.
    pub fn new(directory: Option<PathBuf>) -> Self {
        Router { directory }
    }

    /// Produce the response for `request`.
    pub async fn route(&self, request: &Request) -> Response {
        let path = request.path();

        if path.starts_with("/echo/") {
            return echo(path);
        }

        if path.starts_with("/user-agent") {
            return Response::text(request.header("User-Agent").unwrap_or("").to_string());
        }

        if let Some(name) = path.strip_prefix("/files/") {
            match request.method() {
                "GET" => return self.read_file(name).await,
                "POST" => {
                    let body = request.body().cloned().unwrap_or_default();
                    return self.write_file(name, body).await;
                }
                _ => {}
            }
        }

        if path == "/" {
            return Response::new(Status::Ok);
        }

        Response::new(Status::NotFound)
    }

    async fn read_file(&self, name: &str) -> Response {
        let Some(file) = self.resolve(name) else {
            return Response::new(Status::NotFound);
        };

        match tokio::fs::read(&file).await {
            Ok(data) => Response::octet_stream(data),
            Err(e) => {
                debug!(file = %file.display(), error = %e, "File not readable");
                Response::new(Status::NotFound)
            }
        }
    }

    async fn write_file(&self, name: &str, body: Bytes) -> Response {
        let Some(file) = self.resolve(name) else {
            // An empty name targets the directory itself, which cannot be written.
            if name.is_empty() && self.directory.is_some() {
                return Response::new(Status::InternalServerError);
            }
            return Response::new(Status::NotFound);
        };

        match tokio::fs::write(&file, &body).await {
            Ok(()) => {
                debug!(file = %file.display(), bytes = body.len(), "File written");
                Response::new(Status::Created)
            }
            Err(e) => {
                warn!(file = %file.display(), error = %e, "Failed to write file");
                Response::new(Status::InternalServerError)
            }
        }
    }

    /// Map a file name under the configured directory.
    ///
    /// Only plain relative names are accepted; `..`, absolute paths and
    /// empty names resolve to nothing.
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let directory = self.directory.as_ref()?;
        let relative = Path::new(name);

        let mut components = relative.components().peekable();
        components.peek()?;
        if !components.all(|c| matches!(c, Component::Normal(_))) {
            warn!(name, "Rejected file name outside the served directory");
            return None;
        }

        Some(directory.join(relative))
    }
}

impl Dispatch for Router {
    fn dispatch(&self, request: Request) -> impl Future<Output = Bytes> + Send {
        async move {
            let response = self.route(&request).await;
            debug!(
                method = request.method(),
                path = request.path(),
                status = response.status().code(),
                "Request handled"
            );
            response.encode()
        }
    }
}

/// Body is the final `/`-separated segment, so `/echo/a/b` answers `b`.
fn echo(path: &str) -> Response {
    let text = path.rsplit('/').next().unwrap_or_default();
    Response::text(text.to_string())
}
