//! The seam between the connection driver and application code.
//!
//! A [`Handler`] receives one parsed request together with a response writer
//! aimed at the same connection. It either writes a response itself or hands
//! back a [`HandlerError`] for the driver to render.
//!
//! # Example
//!
//! ```
//! use async_trait::async_trait;
//! use raw_http::handler::Handler;
//! use raw_http::protocol::Request;
//! use raw_http::response::{default_fields, HandlerError, ResponseWriter, STATUS_OK};
//! use tokio::io::AsyncWrite;
//!
//! struct EchoTarget;
//!
//! #[async_trait]
//! impl<W> Handler<W> for EchoTarget
//! where
//!     W: AsyncWrite + Unpin + Send,
//! {
//!     async fn handle(&self, writer: &mut ResponseWriter<W>, request: Request) -> Result<(), HandlerError> {
//!         let body = request.target().to_string();
//!         writer.write_status_line(STATUS_OK).await.map_err(|e| HandlerError::internal(e.to_string()))?;
//!         writer
//!             .write_headers(&default_fields(body.len() as u64))
//!             .await
//!             .map_err(|e| HandlerError::internal(e.to_string()))?;
//!         writer.write_body(body.as_bytes()).await.map_err(|e| HandlerError::internal(e.to_string()))?;
//!         Ok(())
//!     }
//! }
//! ```

use crate::protocol::Request;
use crate::response::{HandlerError, ResponseWriter};
use async_trait::async_trait;
use tokio::io::AsyncWrite;

/// Application callback invoked once per connection.
///
/// Returning `Err` asks the driver to render the error as a response,
/// provided the handler has not written a status line yet.
#[async_trait]
pub trait Handler<W>: Send + Sync
where
    W: AsyncWrite + Unpin + Send,
{
    async fn handle(&self, writer: &mut ResponseWriter<W>, request: Request) -> Result<(), HandlerError>;
}
