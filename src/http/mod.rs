//! Minimal HTTP/1.1 support.
//!
//! - `reader`: buffered line/exact reads over a connection
//! - `parser`: request line, headers and optional body
//! - `request`: the parsed request
//! - `response`: status codes and response framing

pub mod parser;
pub mod reader;
pub mod request;
pub mod response;

pub use parser::parse;
pub use reader::LineReader;
pub use request::Request;
pub use response::{Response, Status};
