//! Error types for the console client.

use pharma_protocol::FrameError;
use std::io;
use thiserror::Error;

/// Errors that end a console command or session.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The daemon could not be reached at all.
    #[error("failed to connect to the daemon at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The daemon refused the registration. The reason was already
    /// printed for the user; the variant carries it for logs.
    #[error("registration rejected: {0}")]
    Rejected(String),

    /// The daemon closed the connection where a response was due.
    #[error("the daemon closed the connection before answering")]
    ConnectionClosed,

    /// The daemon answered the handshake with something other than a
    /// digest or a rejection.
    #[error("unexpected response to registration: {0}")]
    UnexpectedResponse(String),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
