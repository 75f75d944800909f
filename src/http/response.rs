//! HTTP/1.1 response framing.
//!
//! Responses are encoded as:
//!
//! ```text
//! HTTP/1.1 <code> <reason>\r\n
//! <Name>: <Value>\r\n      (zero or more)
//! Content-Length: <n>\r\n   (only when a body is set)
//! \r\n
//! <body>
//! ```

use bytes::{Bytes, BytesMut};

/// Response status codes used by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Created,
    BadRequest,
    NotFound,
    InternalServerError,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::Created => 201,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::InternalServerError => 500,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Created => "Created",
            Status::BadRequest => "Bad Request",
            Status::NotFound => "Not Found",
            Status::InternalServerError => "Internal Server Error",
        }
    }
}

/// An outgoing response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: Status,
    headers: Vec<(&'static str, String)>,
    body: Option<Bytes>,
}

impl Response {
    /// Bare status line with no headers and no body
    pub fn new(status: Status) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: None,
        }
    }

    /// 200 with a `text/plain` body
    pub fn text(body: impl Into<Bytes>) -> Self {
        Self::new(Status::Ok)
            .with_header("Content-Type", "text/plain")
            .with_body(body)
    }

    /// 200 with an `application/octet-stream` body
    pub fn octet_stream(body: impl Into<Bytes>) -> Self {
        Self::new(Status::Ok)
            .with_header("Content-Type", "application/octet-stream")
            .with_body(body)
    }

    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Serialize into wire bytes
    pub fn encode(&self) -> Bytes {
        let body_len = self.body.as_ref().map_or(0, Bytes::len);
        let mut response = BytesMut::with_capacity(64 + body_len);

        let status_line = format!(
            "HTTP/1.1 {} {}\r\n",
            self.status.code(),
            self.status.reason()
        );
        response.extend_from_slice(status_line.as_bytes());

        for (name, value) in &self.headers {
            response.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }

        if let Some(body) = &self.body {
            response.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
            response.extend_from_slice(body);
        } else {
            response.extend_from_slice(b"\r\n");
        }

        response.freeze()
    }
}
