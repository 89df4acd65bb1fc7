//! Mock SMTP relay for handshake tests
//!
//! The mock can:
#![allow(dead_code)] // Test utility module - not all methods used in every test
//! - Answer the greeting and `HELO` with configurable replies
//! - Hang on a given command to exercise deadlines
//! - Drop the connection after a number of commands
//! - Record every command it receives
//!
//! # Example
//!
//! ```rust,no_run
//! use support::mock_server::MockSmtpServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MockSmtpServer::builder()
//!     .with_helo_response(550, "Go away")
//!     .build()
//!     .await?;
//!
//! // Server is now running on server.addr()
//!
//! server.shutdown();
//! # Ok(())
//! # }
//! ```

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    task::JoinHandle,
};

/// SMTP command received by the mock server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    /// HELO command with hostname
    Helo(String),
    /// EHLO command with hostname
    Ehlo(String),
    /// QUIT command
    Quit,
    /// Unknown/other command
    Other(String),
}

#[derive(Debug, Clone)]
struct SmtpResponse {
    code: u16,
    message: String,
}

impl SmtpResponse {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Clone)]
struct MockServerConfig {
    greeting: SmtpResponse,
    /// `None` echoes the announced host name back.
    helo_response: Option<SmtpResponse>,
    quit_response: SmtpResponse,

    // Failure injection
    response_delay: Option<Duration>,
    drop_after_commands: Option<usize>,
    timeout_on_command: Option<usize>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: SmtpResponse::new(220, "Mock SMTP Server"),
            helo_response: None,
            quit_response: SmtpResponse::new(221, "Bye"),
            response_delay: None,
            drop_after_commands: None,
            timeout_on_command: None,
        }
    }
}

/// Mock SMTP server for testing
pub struct MockSmtpServer {
    addr: SocketAddr,
    commands_received: Arc<RwLock<Vec<SmtpCommand>>>,
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl MockSmtpServer {
    /// Create a new builder for configuring the mock server
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder::new()
    }

    /// Get the address the server is listening on
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get all commands received by the server
    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands_received.read().await.clone()
    }

    /// Get the number of connections accepted
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Shutdown the server and close its listener
    pub fn shutdown(&self) {
        self.task.abort();
    }

    /// Handle a single client connection
    async fn handle_client(
        mut stream: TcpStream,
        config: Arc<MockServerConfig>,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let mut command_count = 0;

        writer.write_all(&config.greeting.to_bytes()).await?;
        writer.flush().await?;

        loop {
            line.clear();

            if config
                .drop_after_commands
                .is_some_and(|drop_after| command_count >= drop_after)
            {
                return Ok(());
            }

            let bytes_read = reader.read_line(&mut line).await?;
            if bytes_read == 0 {
                return Ok(());
            }

            let cmd_line = line.trim();
            let (verb, argument) = cmd_line
                .split_once(' ')
                .map_or((cmd_line, ""), |(verb, argument)| (verb, argument.trim()));

            let (response, smtp_cmd) = match verb.to_uppercase().as_str() {
                "HELO" | "EHLO" => {
                    let response = config
                        .helo_response
                        .clone()
                        .unwrap_or_else(|| SmtpResponse::new(250, argument));
                    let cmd = if verb.eq_ignore_ascii_case("HELO") {
                        SmtpCommand::Helo(argument.to_string())
                    } else {
                        SmtpCommand::Ehlo(argument.to_string())
                    };
                    (response, cmd)
                }
                "QUIT" => (config.quit_response.clone(), SmtpCommand::Quit),
                _ => (
                    SmtpResponse::new(500, "Unknown command"),
                    SmtpCommand::Other(cmd_line.to_string()),
                ),
            };

            commands.write().await.push(smtp_cmd.clone());

            if config.timeout_on_command == Some(command_count) {
                // Sleep indefinitely to simulate a stalled server
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Ok(());
            }
            command_count += 1;

            if let Some(delay) = config.response_delay {
                tokio::time::sleep(delay).await;
            }

            writer.write_all(&response.to_bytes()).await?;
            writer.flush().await?;

            if smtp_cmd == SmtpCommand::Quit {
                return Ok(());
            }
        }
    }
}

impl Drop for MockSmtpServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Builder for configuring a `MockSmtpServer`
pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
}

impl MockSmtpServerBuilder {
    fn new() -> Self {
        Self {
            config: MockServerConfig::default(),
        }
    }

    /// Set the greeting message
    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = SmtpResponse::new(code, message);
        self
    }

    /// Set a fixed HELO response instead of echoing the host name
    #[must_use]
    pub fn with_helo_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.helo_response = Some(SmtpResponse::new(code, message));
        self
    }

    /// Set the QUIT response
    #[must_use]
    pub fn with_quit_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.quit_response = SmtpResponse::new(code, message);
        self
    }

    /// Add a delay before sending each response
    #[must_use]
    pub const fn with_response_delay(mut self, delay: Duration) -> Self {
        self.config.response_delay = Some(delay);
        self
    }

    /// Drop the connection after N commands
    #[must_use]
    pub const fn with_network_error_after_commands(mut self, count: usize) -> Self {
        self.config.drop_after_commands = Some(count);
        self
    }

    /// Timeout (hang) on the Nth command (0-indexed)
    #[must_use]
    pub const fn with_timeout_on_command(mut self, command_index: usize) -> Self {
        self.config.timeout_on_command = Some(command_index);
        self
    }

    /// Build and start the mock SMTP server
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to a port
    pub async fn build(self) -> Result<MockSmtpServer, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let commands_clone = Arc::clone(&commands);
        let connections_clone = Arc::clone(&connections);

        let task = tokio::spawn(async move {
            while let Ok((stream, _peer)) = listener.accept().await {
                connections_clone.fetch_add(1, Ordering::Relaxed);
                let config = Arc::clone(&config);
                let commands = Arc::clone(&commands_clone);

                tokio::spawn(async move {
                    if let Err(e) = MockSmtpServer::handle_client(stream, config, commands).await {
                        tracing::debug!("Mock server client error: {}", e);
                    }
                });
            }
        });

        Ok(MockSmtpServer {
            addr,
            commands_received: commands,
            connections,
            task,
        })
    }
}
