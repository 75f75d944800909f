//! Parsed HTTP request.

use bytes::Bytes;
use std::collections::HashMap;

/// A request read from one connection.
///
/// Header names are kept exactly as they appeared on the wire; lookups are
/// case-sensitive and a repeated name keeps its last value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: String,
    path: String,
    version: String,
    headers: HashMap<String, String>,
    body: Option<Bytes>,
}

impl Request {
    /// Create a request with no headers and no body.
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            version: version.into(),
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Set a header, replacing any earlier value under the same name.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Attach a body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Request target, not percent-decoded.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Look up a header by its exact name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// The body, if one was read.
    ///
    /// `Some` with an empty slice means a `Content-Length: 0` body was read;
    /// `None` means no body was attempted.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }
}
