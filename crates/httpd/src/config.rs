use clap::Parser;
use std::path::PathBuf;

/// Command line configuration for the daemon.
#[derive(Debug, Clone, Parser)]
#[command(name = "raw-httpd", version, about = "http daemon serving static assets and a chunked proxy")]
pub struct Config {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:42069")]
    pub listen: String,

    /// Directory holding the static assets
    #[arg(long, default_value = "assets")]
    pub assets: PathBuf,

    /// Upstream authority proxied under /httpbin/
    #[arg(long, default_value = "httpbin.org:80")]
    pub upstream: String,
}
