//! Connection lifecycle.
//!
//! # Components
//!
//! - [`HttpConnection`]: drives one connection end to end: decode a single
//!   request, hand it to the handler, flush and shut the stream down. Parse
//!   failures are answered with an error response before the connection
//!   closes.

mod http_connection;

pub use http_connection::HttpConnection;
