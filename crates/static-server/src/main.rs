use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process;

use clap::Parser;

use static_server::{serve, DEFAULT_PORT};

/// Serve a directory over HTTP with headers suitable for a progressive web app.
#[derive(Parser, Debug)]
#[command(name = "static-server", version)]
struct Args {
    /// Directory to serve.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if !args.root.is_dir() {
        log::error!("{} is not a directory", args.root.display());
        process::exit(1);
    }

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, args.port));
    if let Err(e) = serve(&args.root, addr).await {
        log::error!("Server error: {e}");
        process::exit(1);
    }
}
