//! A small HTTP/1.1 daemon built on [`raw_http`].
//!
//! Serves static assets, a pair of deliberate error routes and a chunked
//! proxy in front of an upstream origin. See [`app::App`] for the routes.

mod app;
mod config;
mod upstream;

use crate::app::App;
use crate::config::Config;
use clap::Parser;
use raw_http::server::Server;
use tracing::{error, info, Level};

#[tokio::main]
async fn main() {
    let config = Config::parse();

    let subscriber = tracing_subscriber::FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let app = App::new(&config);
    let server = match Server::bind(&config.listen, app).await {
        Ok(server) => server,
        Err(e) => {
            error!(cause = %e, listen = %config.listen, "bind server error");
            return;
        }
    };

    let close_handle = server.close_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received ctrl-c, closing server"),
            Err(e) => error!(cause = %e, "can't listen for ctrl-c, closing server"),
        }
        close_handle.close();
    });

    info!(listen = %config.listen, "server started");
    server.run().await;
    info!("server stopped");
}
