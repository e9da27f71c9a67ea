//! Fixed-width token protocol.
//!
//! Every command and every response is exactly four raw bytes, with no
//! length prefix and no delimiter:
//!
//! ```text
//! Request:  ping
//! Response: pong
//!
//! Request:  exit
//! Response: (none, connection closed)
//! ```
//!
//! Any other four bytes are a protocol violation and close the connection
//! without a reply.

use std::fmt;

/// Width of every command and response on the wire.
pub const TOKEN_LEN: usize = 4;

const PING: &[u8; TOKEN_LEN] = b"ping";
const PONG: &[u8; TOKEN_LEN] = b"pong";
const EXIT: &[u8; TOKEN_LEN] = b"exit";

/// One raw four-byte token as received from a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token([u8; TOKEN_LEN]);

impl Token {
    pub fn new(bytes: [u8; TOKEN_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; TOKEN_LEN] {
        &self.0
    }
}

/// Printable form with non-ASCII and control bytes escaped, e.g. `qu\x00t`.
impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.escape_ascii())
    }
}

/// Parsed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Liveness probe, answered with `pong`.
    Ping,
    /// Client is done; close without replying.
    Exit,
    /// Anything else.
    Unknown(Token),
}

impl Command {
    /// Classify a complete token.
    pub fn classify(token: Token) -> Self {
        match token.as_bytes() {
            PING => Command::Ping,
            EXIT => Command::Exit,
            _ => Command::Unknown(token),
        }
    }
}

/// Parse result.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseResult {
    /// Successfully parsed command with bytes consumed.
    Complete(Command, usize),
    /// Fewer than [`TOKEN_LEN`] bytes buffered.
    Incomplete,
}

/// Parse one command from the front of the input buffer.
pub fn parse(input: &[u8]) -> ParseResult {
    let Some(head) = input.first_chunk::<TOKEN_LEN>() else {
        return ParseResult::Incomplete;
    };

    ParseResult::Complete(Command::classify(Token::new(*head)), TOKEN_LEN)
}

/// Format a PONG response.
pub fn response_pong() -> &'static [u8] {
    PONG
}
