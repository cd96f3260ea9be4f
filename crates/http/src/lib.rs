//! HTTP/1.1 message exchange directly over raw byte streams
//!
//! This crate parses requests and writes responses on top of plain TCP (or
//! any async byte stream), without a full HTTP stack behind it. The two
//! central pieces are a streaming request decoder that accepts arbitrarily
//! fragmented input and a response writer that enforces the legal ordering
//! of response sections. Everything else (the accept loop, the handler
//! seam, the connection lifecycle) is plumbing around that pair.
//!
//! # Features
//!
//! - Incremental request parsing over any fragmentation of the input
//! - Response writing with strict section ordering
//! - Chunked response bodies with optional trailers
//! - Chunked payload decoding for consuming upstream responses
//! - One worker task per connection, one request per connection
//! - Cooperative server shutdown through a shared close handle
//!
//! # Example
//!
//! ```no_run
//! use async_trait::async_trait;
//! use raw_http::handler::Handler;
//! use raw_http::protocol::Request;
//! use raw_http::response::{default_fields, HandlerError, ResponseWriter, STATUS_OK};
//! use raw_http::server::Server;
//! use tokio::io::AsyncWrite;
//! use tracing::info;
//!
//! struct HelloWorld;
//!
//! #[async_trait]
//! impl<W> Handler<W> for HelloWorld
//! where
//!     W: AsyncWrite + Unpin + Send,
//! {
//!     async fn handle(&self, writer: &mut ResponseWriter<W>, request: Request) -> Result<(), HandlerError> {
//!         info!(target = %request.target(), "handling request");
//!
//!         let body = b"Hello World!";
//!         writer
//!             .write_status_line(STATUS_OK)
//!             .await
//!             .map_err(|e| HandlerError::internal(e.to_string()))?;
//!         writer
//!             .write_headers(&default_fields(body.len() as u64))
//!             .await
//!             .map_err(|e| HandlerError::internal(e.to_string()))?;
//!         writer.write_body(body).await.map_err(|e| HandlerError::internal(e.to_string()))?;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let server = Server::bind("127.0.0.1:42069", HelloWorld).await?;
//!
//!     let close_handle = server.close_handle();
//!     tokio::spawn(async move {
//!         tokio::signal::ctrl_c().await.expect("listening for ctrl-c failed");
//!         close_handle.close();
//!     });
//!
//!     server.run().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The crate is organized into several key modules:
//!
//! - [`protocol`]: header table, request model and error taxonomy
//! - [`codec`]: the streaming request and chunked payload decoders
//! - [`response`]: the response writer state machine
//! - [`handler`]: the seam between connections and application code
//! - [`connection`]: per-connection lifecycle
//! - [`server`]: the TCP accept loop and close handle
//!
//! # Core Components
//!
//! ## Request Parsing
//!
//! [`codec::RequestDecoder`] assembles one [`protocol::Request`] from the
//! byte stream, however the peer fragments it. It consumes exactly the
//! bytes it parsed on each step, carries explicit state between calls, and
//! reports premature end-of-stream distinctly from malformed input.
//!
//! ## Response Writing
//!
//! [`response::ResponseWriter`] serializes a response section by section
//! and refuses out-of-order writes before a single byte reaches the wire.
//! Bodies are either fixed-length or chunk-framed; chunked bodies may end
//! with trailers.
//!
//! ## Error Handling
//!
//! The crate uses custom error types that implement `std::error::Error`:
//!
//! - [`protocol::HttpError`]: Top-level error type
//! - [`protocol::ParseError`]: Request parsing errors
//! - [`protocol::WriteError`]: Response writing errors
//!
//! A connection answers malformed input with a 400 response and local
//! failures with a 500 response before closing.
//!
//! # Limitations
//!
//! - HTTP/1.1 only, one request per connection (no keep-alive, no pipelining)
//! - No TLS support (use a reverse proxy for HTTPS)
//! - Supported response status codes: 200, 400, 500
//! - Maximum request head size: 8KB
//! - Maximum number of headers: 64
//! - Maximum request body size: 1MB

pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;
pub mod response;
pub mod server;

mod utils;
