//! Error types for the SMTP client.

use std::io;

use thiserror::Error;

/// Errors that can occur when talking to an SMTP server.
#[derive(Error, Debug)]
pub enum ClientError {
    /// IO error occurred during network operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Failed to parse an SMTP response from the server.
    #[error("Failed to parse SMTP response: {0}")]
    ParseError(String),

    /// Connection was closed unexpectedly.
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// UTF-8 decoding error.
    #[error("UTF-8 error: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),
}

impl From<ClientError> for io::Error {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Io(err) => err,
            ClientError::ConnectionClosed => {
                Self::new(io::ErrorKind::UnexpectedEof, err.to_string())
            }
            ClientError::ParseError(_) | ClientError::Utf8Error(_) => {
                Self::new(io::ErrorKind::InvalidData, err.to_string())
            }
        }
    }
}

/// Specialized `Result` type for SMTP client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
