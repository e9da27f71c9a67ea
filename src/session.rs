//! Per-connection session state machine.
//!
//! A session reads one token at a time, answers `ping` with `pong`, and
//! ends on `exit`, on an orderly disconnect, on an I/O failure, or on the
//! first unrecognized token. Every exit path is an explicit transition to
//! [`SessionState::Closed`].
//!
//! Short reads are buffered until a full token is available. Each read asks
//! for at most the bytes still missing from the current token, so the next
//! command is never read before the previous response has been written.

use crate::protocol::{parse, response_pong, Command, ParseResult, Token, TOKEN_LEN};
use bytes::{Buf, BytesMut};
use std::fmt;
use std::io::{self, Read, Write};
use tracing::{debug, trace, warn};

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Client sent `exit`.
    Exit,
    /// Client closed its side of the connection.
    Disconnect,
    /// A read or write failed (reset, broken pipe, timeout).
    Failed(io::ErrorKind),
    /// Client sent a token outside the command set.
    ProtocolViolation(Token),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Exit => f.write_str("exit"),
            CloseReason::Disconnect => f.write_str("disconnect"),
            CloseReason::Failed(kind) => write!(f, "io failure ({kind})"),
            // The offending bytes are reported once, when the token is rejected.
            CloseReason::ProtocolViolation(_) => f.write_str("protocol violation"),
        }
    }
}

/// Current state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the next full token.
    AwaitingCommand,
    /// A `ping` was received and `pong` is being written.
    Responding,
    /// Terminal.
    Closed(CloseReason),
}

/// Final accounting for a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub reason: CloseReason,
    pub pongs_sent: u64,
}

/// A single client session over any blocking byte stream.
pub struct Session<S> {
    stream: S,
    buffer: BytesMut,
    state: SessionState,
    pongs_sent: u64,
}

impl<S: Read + Write> Session<S> {
    /// Create a new session in the initial awaiting state.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(TOKEN_LEN),
            state: SessionState::AwaitingCommand,
            pongs_sent: 0,
        }
    }

    /// Drive the session until it closes.
    ///
    /// The stream is dropped (and so closed) when this returns, whatever the
    /// close reason.
    pub fn run(mut self) -> SessionSummary {
        loop {
            if let SessionState::Closed(reason) = self.step() {
                return SessionSummary {
                    reason,
                    pongs_sent: self.pongs_sent,
                };
            }
        }
    }

    /// Perform one transition and return the new state.
    pub fn step(&mut self) -> SessionState {
        self.state = match self.state {
            SessionState::AwaitingCommand => self.await_command(),
            SessionState::Responding => self.respond(),
            closed @ SessionState::Closed(_) => closed,
        };
        self.state
    }

    fn await_command(&mut self) -> SessionState {
        loop {
            if let ParseResult::Complete(command, consumed) = parse(&self.buffer) {
                self.buffer.advance(consumed);

                return match command {
                    Command::Ping => SessionState::Responding,
                    Command::Exit => SessionState::Closed(CloseReason::Exit),
                    Command::Unknown(token) => {
                        warn!(token = %token, "Unknown command, closing session");
                        SessionState::Closed(CloseReason::ProtocolViolation(token))
                    }
                };
            }

            match self.fill() {
                Ok(0) => {
                    if !self.buffer.is_empty() {
                        debug!(
                            dangling = %self.buffer.escape_ascii(),
                            "Peer closed mid-token"
                        );
                    }
                    trace!("Connection closed by client");
                    return SessionState::Closed(CloseReason::Disconnect);
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "Read failed");
                    return SessionState::Closed(CloseReason::Failed(e.kind()));
                }
            }
        }
    }

    fn respond(&mut self) -> SessionState {
        let result = self
            .stream
            .write_all(response_pong())
            .and_then(|()| self.stream.flush());

        match result {
            Ok(()) => {
                self.pongs_sent += 1;
                SessionState::AwaitingCommand
            }
            Err(e) => {
                debug!(error = %e, "Write failed");
                SessionState::Closed(CloseReason::Failed(e.kind()))
            }
        }
    }

    /// Read at most the bytes still missing from the current token.
    fn fill(&mut self) -> io::Result<usize> {
        let mut chunk = [0u8; TOKEN_LEN];
        let wanted = TOKEN_LEN - self.buffer.len();

        loop {
            match self.stream.read(&mut chunk[..wanted]) {
                Ok(n) => {
                    self.buffer.extend_from_slice(&chunk[..n]);
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}
