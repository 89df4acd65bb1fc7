//! A minimal plain-text SMTP client.

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

use super::{
    error::{ClientError, Result},
    response::Response,
};
use crate::{incoming, outgoing};

/// Initial size of the read buffer for SMTP replies.
const BUFFER_SIZE: usize = 4096;

/// Upper bound for a single reply (1MB).
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// An SMTP client session over an established connection.
///
/// Dropping the client closes the connection.
pub struct SmtpClient {
    stream: TcpStream,
    buffer: Vec<u8>,
    filled: usize,
}

impl SmtpClient {
    /// Wraps an already connected stream. No bytes are exchanged yet.
    #[must_use]
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            buffer: vec![0u8; BUFFER_SIZE],
            filled: 0,
        }
    }

    /// Reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the greeting is malformed.
    pub async fn read_greeting(&mut self) -> Result<Response> {
        self.read_response().await
    }

    /// Sends a raw command line and reads the reply.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        outgoing!("{command}");
        self.stream
            .write_all(format!("{command}\r\n").as_bytes())
            .await?;
        self.read_response().await
    }

    /// Sends `HELO domain`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn helo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("HELO {domain}")).await
    }

    /// Sends `QUIT` and shuts down the write half of the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn quit(&mut self) -> Result<Response> {
        let response = self.command("QUIT").await?;
        self.stream.shutdown().await?;
        Ok(response)
    }

    async fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some((response, consumed)) =
                Response::parse_response(&self.buffer[..self.filled])?
            {
                self.buffer.copy_within(consumed..self.filled, 0);
                self.filled -= consumed;

                incoming!("{} {}", response.code, response.lines.join(" | "));

                return Ok(response);
            }

            if self.filled == self.buffer.len() {
                let grown = self.buffer.len() * 2;
                if grown > MAX_BUFFER_SIZE {
                    return Err(ClientError::ParseError(format!(
                        "Response too large (exceeds {MAX_BUFFER_SIZE} bytes)"
                    )));
                }
                self.buffer.resize(grown, 0);
            }

            let read = self.stream.read(&mut self.buffer[self.filled..]).await?;
            if read == 0 {
                return Err(ClientError::ConnectionClosed);
            }
            self.filled += read;
        }
    }
}
