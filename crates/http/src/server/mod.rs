//! TCP accept loop.
//!
//! # Components
//!
//! - [`Server`]: binds a listener and spawns one worker task per accepted
//!   connection, each driving an [`HttpConnection`](crate::connection::HttpConnection)
//! - [`CloseHandle`]: flips the shared closed flag and wakes the accept
//!   loop, from any task

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::connection::HttpConnection;
use crate::handler::Handler;

/// Shared close state: the flag carries the decision, the notify wakes the
/// accept loop so it observes the flag without another connection arriving.
#[derive(Debug, Default)]
struct Shutdown {
    closed: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Stops a running [`Server`] from another task.
///
/// Closing stops the accept loop; connections already handed to workers run
/// to completion on their own tasks.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    shutdown: Arc<Shutdown>,
}

impl CloseHandle {
    pub fn close(&self) {
        self.shutdown.closed.store(true, Ordering::SeqCst);
        // notify_one stores a permit, so a close racing the accept loop's
        // next wait is still observed
        self.shutdown.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_closed()
    }
}

/// A TCP server that answers each connection with the given handler.
///
/// Every accepted connection gets its own worker task, so slow peers only
/// ever stall their own connection.
#[derive(Debug)]
pub struct Server<H> {
    listener: TcpListener,
    handler: Arc<H>,
    shutdown: Arc<Shutdown>,
}

impl<H> Server<H>
where
    H: Handler<OwnedWriteHalf> + Send + Sync + 'static,
{
    /// Binds the listener and prepares the server to run.
    pub async fn bind(address: impl ToSocketAddrs, handler: H) -> io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self { listener, handler: Arc::new(handler), shutdown: Arc::new(Shutdown::default()) })
    }

    /// The address the listener actually bound, useful with port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle { shutdown: Arc::clone(&self.shutdown) }
    }

    /// Accepts connections until the close handle fires.
    pub async fn run(self) {
        if let Ok(address) = self.listener.local_addr() {
            info!("start listening at {address:?}");
        }

        loop {
            if self.shutdown.is_closed() {
                info!("server closed, stop accepting");
                return;
            }

            let (tcp_stream, remote_addr) = tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok(stream_and_addr) => stream_and_addr,
                    Err(e) => {
                        warn!(cause = %e, "failed to accept");
                        continue;
                    }
                },
                () = self.shutdown.notify.notified() => {
                    info!("server closed, stop accepting");
                    return;
                }
            };

            debug!(%remote_addr, "accepted connection");
            let handler = Arc::clone(&self.handler);

            tokio::spawn(async move {
                let (reader, writer) = tcp_stream.into_split();
                let connection = HttpConnection::new(reader, writer);
                match connection.process(handler).await {
                    Ok(()) => info!("finished process, connection shutdown"),
                    Err(e) => error!(cause = %e, "connection failed, connection shutdown"),
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Request;
    use crate::response::{default_fields, HandlerError, ResponseWriter, STATUS_OK};
    use async_trait::async_trait;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    struct OkHandler;

    #[async_trait]
    impl<W> Handler<W> for OkHandler
    where
        W: tokio::io::AsyncWrite + Unpin + Send,
    {
        async fn handle(&self, writer: &mut ResponseWriter<W>, _request: Request) -> Result<(), HandlerError> {
            writer.write_status_line(STATUS_OK).await.map_err(|e| HandlerError::internal(e.to_string()))?;
            writer.write_headers(&default_fields(2)).await.map_err(|e| HandlerError::internal(e.to_string()))?;
            writer.write_body(b"ok").await.map_err(|e| HandlerError::internal(e.to_string()))?;
            Ok(())
        }
    }

    async fn send_request(address: SocketAddr) -> String {
        let mut stream = TcpStream::connect(address).await.unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").await.unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8(response).unwrap()
    }

    #[tokio::test]
    async fn test_serves_concurrent_connections_until_closed() {
        let server = Server::bind("127.0.0.1:0", OkHandler).await.unwrap();
        let address = server.local_addr().unwrap();
        let close_handle = server.close_handle();
        let server_task = tokio::spawn(server.run());

        let (first, second) = tokio::join!(send_request(address), send_request(address));
        assert!(first.starts_with("HTTP/1.1 200 OK\r\n"), "got: {first}");
        assert!(second.starts_with("HTTP/1.1 200 OK\r\n"), "got: {second}");

        assert!(!close_handle.is_closed());
        close_handle.close();
        assert!(close_handle.is_closed());
        server_task.await.unwrap();

        let refused = TcpStream::connect(address).await;
        assert!(refused.is_err(), "the listener must be gone after close");
    }
}
