//! Request routing and the proxy handler.

use crate::config::Config;
use crate::upstream;
use async_trait::async_trait;
use raw_http::handler::Handler;
use raw_http::protocol::headers::{CONTENT_TYPE, TRAILER, TRANSFER_ENCODING};
use raw_http::protocol::{Headers, Request};
use raw_http::response::{HandlerError, ResponseWriter, STATUS_OK};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tokio::io::AsyncWrite;
use tracing::{info, warn};

const TRAILER_SHA256: &str = "X-Content-SHA256";
const TRAILER_LENGTH: &str = "X-Content-Length";

/// The daemon's routes.
///
/// - `/httpbin/<rest>`: proxies `/<rest>` from the upstream, re-framed as a
///   chunked body with checksum and length trailers
/// - `/yourproblem`: answers 400
/// - `/myproblem`: answers 500
/// - `/video`: serves `vim.mp4` from the assets directory
/// - anything else: serves `success.html` from the assets directory
#[derive(Debug)]
pub struct App {
    assets: PathBuf,
    upstream: String,
}

impl App {
    pub fn new(config: &Config) -> Self {
        Self { assets: config.assets.clone(), upstream: config.upstream.clone() }
    }

    async fn serve_file<W>(
        &self,
        writer: &mut ResponseWriter<W>,
        name: &str,
        content_type: &str,
    ) -> Result<(), HandlerError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let path = self.assets.join(name);
        match writer.write_file(&path, content_type, STATUS_OK).await {
            Ok(written) => {
                info!(path = %path.display(), bytes = written, "served file");
                Ok(())
            }
            Err(e) => {
                warn!(cause = %e, path = %path.display(), "can't serve file");
                Err(HandlerError::internal(format!("Failed to open {}", path.display())))
            }
        }
    }

    async fn proxy<W>(&self, writer: &mut ResponseWriter<W>, rest: &str) -> Result<(), HandlerError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let target = format!("/{rest}");
        let mut upstream = upstream::fetch(&self.upstream, &target).await.map_err(|e| {
            warn!(cause = %e, target = %target, "can't fetch from upstream");
            HandlerError::internal("Error fetching data from httpbin")
        })?;

        info!(status = upstream.status(), target = %target, "proxying upstream response");

        writer.write_status_line(STATUS_OK).await.map_err(internal_error)?;

        let content_type = upstream.headers().get(CONTENT_TYPE).unwrap_or("application/octet-stream");
        let mut headers = Headers::new();
        // Safe: constant header names are valid tokens
        headers.set(CONTENT_TYPE, content_type).unwrap();
        headers.set(TRANSFER_ENCODING, "chunked").unwrap();
        headers.set(TRAILER, &format!("{TRAILER_SHA256}, {TRAILER_LENGTH}")).unwrap();
        writer.write_headers(&headers).await.map_err(internal_error)?;

        let mut hasher = Sha256::new();
        let mut total: u64 = 0;
        while let Some(wave) = upstream.next_wave().await.map_err(internal_error)? {
            hasher.update(&wave);
            total += wave.len() as u64;
            writer.write_chunked_body(&wave).await.map_err(internal_error)?;
        }

        writer.write_chunked_body_done().await.map_err(internal_error)?;

        let mut trailers = Headers::new();
        // Safe: constant header names are valid tokens
        trailers.set(TRAILER_SHA256, &hex_digest(hasher)).unwrap();
        trailers.set(TRAILER_LENGTH, &total.to_string()).unwrap();
        writer.write_trailers(&trailers).await.map_err(internal_error)?;
        Ok(())
    }
}

#[async_trait]
impl<W> Handler<W> for App
where
    W: AsyncWrite + Unpin + Send,
{
    async fn handle(&self, writer: &mut ResponseWriter<W>, request: Request) -> Result<(), HandlerError> {
        if let Some(rest) = request.target().strip_prefix("/httpbin/") {
            return self.proxy(writer, rest).await;
        }

        match request.target() {
            "/yourproblem" => Err(HandlerError::bad_request("Your problem is not my problem")),
            "/myproblem" => Err(HandlerError::internal("Woopsie, my bad")),
            "/video" => self.serve_file(writer, "vim.mp4", "video/mp4").await,
            _ => self.serve_file(writer, "success.html", "text/html").await,
        }
    }
}

fn internal_error(e: impl ToString) -> HandlerError {
    HandlerError::internal(e.to_string())
}

fn hex_digest(hasher: Sha256) -> String {
    hasher.finalize().iter().map(|byte| format!("{byte:02x}")).collect()
}
