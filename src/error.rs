//! Error types for lantern

use std::collections::TryReserveError;
use std::io;

use thiserror::Error;

use crate::http::parser::ParseError;
use crate::server::adapter::Socket;

/// Result type alias for lantern operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the server, its connections and responses.
///
/// Transport and parser errors on a connection tear that connection down;
/// they never affect the listener or sibling connections.
#[derive(Debug, Error)]
pub enum Error {
    /// The I/O adapter reported a transport failure
    #[error("socket error: {0}")]
    Socket(#[source] io::Error),

    /// The socket is not managed by this server
    #[error("invalid socket {0}")]
    InvalidSocket(Socket),

    /// A required option was never configured
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// The socket is already registered
    #[error("socket {0} is already managed")]
    SocketExists(Socket),

    /// Bad argument, e.g. an unknown status code
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// The call is not allowed in the current state
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// The peer closed the connection
    #[error("end of file")]
    ClientEof,

    /// Malformed request, or a handler callback aborted it
    #[error("unable to parse HTTP request: {0}")]
    Parser(#[from] ParseError),

    /// An allocation could not be satisfied
    #[error("out of memory")]
    OutOfMemory,

    /// The content encoder failed
    #[error("compression error: {0}")]
    Compression(#[source] io::Error),
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Error::OutOfMemory
    }
}
