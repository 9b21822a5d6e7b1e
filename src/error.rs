//! Error types for the SSE client

use thiserror::Error;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or running an SSE client
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors, raised at build time before any connection attempt
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-level errors (connect failure, timeout, reset, TLS failure)
    #[error("Transport error: {0}")]
    Transport(#[from] anyhow::Error),

    /// The server answered with a non-success HTTP status
    #[error("Unexpected HTTP status {0}")]
    HttpStatus(u16),

    /// The server answered with something other than `text/event-stream`
    #[error("Unexpected content type: {0}")]
    ContentType(String),

    /// The server closed the stream
    #[error("Stream closed by server")]
    StreamClosed,
}

impl Error {
    /// Whether this error is a protocol error subject to the configured
    /// retry policy. Transport errors and stream closures are always
    /// retryable and never consult the policy.
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::HttpStatus(_) | Error::ContentType(_))
    }
}
