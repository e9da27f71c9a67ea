//! Fatal server errors.
//!
//! Per-session failures never surface here; they end the session and the
//! listener moves on. Only conditions that stop the accept loop do.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured address could not be reserved.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The listening socket stopped accepting connections.
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),
}
