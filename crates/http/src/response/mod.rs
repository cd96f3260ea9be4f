//! Response serialization.
//!
//! # Components
//!
//! - [`ResponseWriter`]: state machine that emits one response onto a sink
//! - [`WriterState`]: the section the writer expects next
//! - [`HandlerError`]: a failure a handler hands back to be rendered as an
//!   error response
//! - [`default_fields`]: the header set every plain response starts from

mod writer;

pub use writer::{ResponseWriter, WriterState};

use crate::protocol::headers::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE};
use crate::protocol::{Headers, WriteError};
use thiserror::Error;
use tokio::io::AsyncWrite;

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_INTERNAL_SERVER_ERROR: u16 = 500;

/// The default header set: plain text, connection close, and the given
/// `Content-Length`, in that order.
pub fn default_fields(content_length: u64) -> Headers {
    let mut fields = Headers::new();
    // Safe: constant header names are valid tokens
    fields.set(CONTENT_TYPE, "text/plain").unwrap();
    fields.set(CONNECTION, "close").unwrap();
    fields.set(CONTENT_LENGTH, &content_length.to_string()).unwrap();
    fields
}

/// A failure surfaced by a request handler.
///
/// Carries the status code to answer with and a plain-text message for the
/// body. The connection driver renders it through [`HandlerError::render`]
/// when the handler gives up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("handler failed with status {status}: {message}")]
pub struct HandlerError {
    status: u16,
    message: String,
}

impl HandlerError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    /// The peer's request was unacceptable.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(STATUS_BAD_REQUEST, message)
    }

    /// The handler itself failed.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(STATUS_INTERNAL_SERVER_ERROR, message)
    }

    #[inline]
    pub fn status(&self) -> u16 {
        self.status
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Renders this failure as a complete plain-text response.
    ///
    /// Requires a writer that has not produced a status line yet.
    pub async fn render<W>(&self, writer: &mut ResponseWriter<W>) -> Result<(), WriteError>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_status_line(self.status).await?;
        writer.write_headers(&default_fields(self.message.len() as u64)).await?;
        writer.write_body(self.message.as_bytes()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_fields_order_and_values() {
        let fields = default_fields(42);
        let lines: Vec<(String, String)> =
            fields.iter().map(|(name, value)| (name.to_string(), value.to_string())).collect();

        assert_eq!(
            lines,
            vec![
                ("Content-Type".to_string(), "text/plain".to_string()),
                ("Connection".to_string(), "close".to_string()),
                ("Content-Length".to_string(), "42".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_handler_error_renders_complete_response() {
        let mut writer = ResponseWriter::new(Vec::new());
        let error = HandlerError::bad_request("Your problem is not my problem");

        error.render(&mut writer).await.unwrap();

        let expected = "HTTP/1.1 400 Bad Request\r\n\
                        Content-Type: text/plain\r\n\
                        Connection: close\r\n\
                        Content-Length: 30\r\n\
                        \r\n\
                        Your problem is not my problem\n";
        assert_eq!(writer.get_mut().as_slice(), expected.as_bytes());
    }

    #[tokio::test]
    async fn test_render_fails_on_a_started_response() {
        let mut writer = ResponseWriter::new(Vec::new());
        writer.write_status_line(STATUS_OK).await.unwrap();
        let before = writer.get_mut().len();

        let error = HandlerError::internal("Woopsie, my bad");
        assert!(error.render(&mut writer).await.is_err());
        assert_eq!(writer.get_mut().len(), before, "a failed render must not append to the response");
    }
}
