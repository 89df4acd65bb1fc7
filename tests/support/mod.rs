//! Shared fixtures for the integration tests.
#![allow(dead_code, unused_imports)] // Not every test binary uses every fixture

pub mod mock_server;

pub use mock_server::{MockSmtpServer, SmtpCommand};

use mxprobe::{Config, SmtpConfig};

/// Reserves a loopback port that nothing listens on right now.
pub async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to reserve a port");
    listener.local_addr().expect("Listener has no address").port()
}

/// A configuration pointing the SMTP probe at `127.0.0.1:port`.
pub fn config(port: u16, timeout_ms: u64) -> Config {
    Config {
        timeout_ms,
        smtp: SmtpConfig {
            host: "127.0.0.1".to_string(),
            port,
            ..SmtpConfig::default()
        },
    }
}
