//! pingpong-fixture: a fixed-width command server for client tests
//!
//! Speaks a four-byte protocol over TCP:
//! - `ping` is answered with `pong`
//! - `exit` closes the connection
//! - anything else is logged and closes the connection
//!
//! Clients are served strictly one at a time on the main thread, so test
//! runs against it are deterministic. There is no shutdown command; stop
//! the process with a signal.

mod config;
mod error;
mod protocol;
mod server;
mod session;

use config::Config;
use server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
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
        address = %config.addr,
        backlog = config.backlog,
        io_timeout = ?config.io_timeout,
        "Starting pingpong-fixture server"
    );

    let server = Server::bind(&config)?;
    info!(address = %server.local_addr(), "Server listening");

    server.run()?;
    Ok(())
}
