//! TCP listener for the ping/pong fixture.
//!
//! Accepts one client at a time and runs its session to completion on the
//! calling thread before accepting the next. Only bind and accept failures
//! escape; everything that happens inside a session stays there.

use crate::config::Config;
use crate::error::ServerError;
use crate::session::{Session, SessionSummary};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;
use tracing::{debug, error, info_span, warn};

/// Server instance owning the listening socket.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    io_timeout: Option<Duration>,
}

impl Server {
    /// Bind the configured address and start listening.
    pub fn bind(config: &Config) -> Result<Self, ServerError> {
        let addr = config.addr;
        let listener = create_listener(addr, config.backlog)
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Server {
            listener,
            local_addr,
            io_timeout: config.io_timeout,
        })
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve clients forever, one at a time.
    ///
    /// Blocks the calling thread. Returns only if the listening socket fails.
    pub fn run(&self) -> Result<(), ServerError> {
        loop {
            self.serve_one()?;
        }
    }

    /// Accept a single client and run its session to completion.
    ///
    /// Returns `Ok(None)` when the accept failed for reasons local to the
    /// incoming connection, which the caller can simply retry.
    pub fn serve_one(&self) -> Result<Option<SessionSummary>, ServerError> {
        let (stream, peer) = match self.listener.accept() {
            Ok(accepted) => accepted,
            Err(e) if is_transient_accept_error(&e) => {
                warn!(error = %e, "Transient accept failure");
                return Ok(None);
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
                return Err(ServerError::Accept(e));
            }
        };

        Ok(Some(self.handle_connection(stream, peer)))
    }

    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) -> SessionSummary {
        let _span = info_span!("session", peer = %peer).entered();
        debug!("New connection");

        if let Err(e) = configure_stream(&stream, self.io_timeout) {
            debug!(error = %e, "Failed to configure connection");
        }

        let summary = Session::new(stream).run();
        debug!(
            reason = %summary.reason,
            pongs = summary.pongs_sent,
            "Connection closed"
        );
        summary
    }
}

/// Create a blocking TCP listener with SO_REUSEADDR so quick restarts
/// between test runs do not trip over TIME_WAIT.
fn create_listener(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    Ok(socket.into())
}

fn configure_stream(stream: &TcpStream, io_timeout: Option<Duration>) -> io::Result<()> {
    stream.set_nodelay(true)?;
    stream.set_read_timeout(io_timeout)?;
    stream.set_write_timeout(io_timeout)?;
    Ok(())
}

/// Errors that concern only the connection being accepted, not the
/// listening socket.
fn is_transient_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}
