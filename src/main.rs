//! minihttp: A minimal HTTP/1.1 server
//!
//! Serves one request per connection:
//! - `GET /echo/<text>` echoes the last path segment
//! - `GET /user-agent` reflects the User-Agent header
//! - `GET|POST /files/<name>` reads or writes a file in the configured directory
//! - `GET /` answers 200, anything else 404
//!
//! Configuration via CLI arguments or TOML file.

mod config;
mod http;
mod router;
mod server;

use config::Config;
use router::Router;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        directory = ?config.directory,
        workers = ?config.workers,
        max_connections = config.max_connections,
        read_timeout = ?config.read_timeout,
        "Starting minihttp server"
    );

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.enable_all().build()?;

    // The directory is captured once here; handlers never consult process args.
    let router = Router::new(config.directory.clone());
    runtime.block_on(server::run(config, router))?;

    Ok(())
}
