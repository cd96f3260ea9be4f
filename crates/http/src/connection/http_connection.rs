use std::sync::Arc;

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::FramedRead;
use tracing::{error, info, warn};

use crate::codec::RequestDecoder;
use crate::handler::Handler;
use crate::protocol::HttpError;
use crate::response::{HandlerError, ResponseWriter, STATUS_BAD_REQUEST, STATUS_INTERNAL_SERVER_ERROR};

/// Drives one connection from first byte to shutdown.
///
/// The lifecycle is fixed: read until one request has been decoded, invoke
/// the handler with that request and a response writer over the same
/// connection, then flush and close. Parse failures short-circuit the
/// handler and answer with an error response instead.
///
/// # Type Parameters
///
/// * `R`: the async readable stream type
/// * `W`: the async writable stream type
#[derive(Debug)]
pub struct HttpConnection<R, W> {
    framed_read: FramedRead<R, RequestDecoder>,
    writer: ResponseWriter<W>,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            framed_read: FramedRead::with_capacity(reader, RequestDecoder::new(), 8 * 1024),
            writer: ResponseWriter::new(writer),
        }
    }

    /// Processes the connection to completion.
    ///
    /// The output stream is flushed and shut down whatever the outcome, so
    /// whatever response was written reaches the peer before the connection
    /// closes.
    pub async fn process<H>(mut self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler<W>,
    {
        let result = self.handle_one(&handler).await;

        if let Err(e) = self.writer.flush().await {
            warn!(cause = %e, "can't flush the connection");
        }
        if let Err(e) = self.writer.shutdown().await {
            warn!(cause = %e, "can't shut the connection down");
        }

        result
    }

    async fn handle_one<H>(&mut self, handler: &Arc<H>) -> Result<(), HttpError>
    where
        H: Handler<W>,
    {
        match self.framed_read.next().await {
            Some(Ok(request)) => {
                info!(method = %request.method(), target = %request.target(), "received request");

                if let Err(handler_error) = handler.handle(&mut self.writer, request).await {
                    info!(status = handler_error.status(), "handler failed, rendering error response");
                    if let Err(e) = handler_error.render(&mut self.writer).await {
                        error!(cause = %e, "can't render the handler error response");
                        return Err(e.into());
                    }
                }
                Ok(())
            }

            Some(Err(e)) => {
                error!(cause = %e, "can't parse request");

                let status = if e.is_malformed_input() { STATUS_BAD_REQUEST } else { STATUS_INTERNAL_SERVER_ERROR };
                let error_response = HandlerError::new(status, e.to_string());
                if let Err(render_error) = error_response.render(&mut self.writer).await {
                    // a partial response may already be on the wire
                    warn!(cause = %render_error, "can't render the parse error response");
                }
                Err(e.into())
            }

            None => {
                info!("connection closed without a request");
                Ok(())
            }
        }
    }
}
