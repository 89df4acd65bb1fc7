//! The `HELO` handshake.

use std::{sync::Arc, time::Duration};

use serde::{Serialize, Serializer};
use tokio::time::Instant;

use super::{
    client::SmtpClient,
    endpoint::{EndpointAcquirer, Transport},
    error::ClientError,
};
use crate::{
    config::Config,
    error::{ProbeError, Result},
    internal, timeout,
};

/// Upper bound on waiting for the reply to `QUIT`.
const QUIT_GRACE: Duration = Duration::from_secs(1);

/// A completed `HELO` exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Handshake {
    pub code: u16,
    pub lines: Vec<String>,
}

/// How the server answered the handshake.
///
/// Serializes as `{"code": .., "lines": [..]}` when accepted and as `false`
/// when rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeloOutcome {
    Accepted(Handshake),
    /// The greeting or the `HELO` reply was not a 2xx.
    Rejected,
}

impl HeloOutcome {
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    #[must_use]
    pub const fn handshake(&self) -> Option<&Handshake> {
        match self {
            Self::Accepted(handshake) => Some(handshake),
            Self::Rejected => None,
        }
    }
}

impl Serialize for HeloOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Accepted(handshake) => handshake.serialize(serializer),
            Self::Rejected => serializer.serialize_bool(false),
        }
    }
}

/// Runs `HELO` handshakes against the configured SMTP endpoint.
#[derive(Clone)]
pub struct HandshakeRunner {
    config: Arc<Config>,
    transport: Arc<dyn Transport>,
    acquirer: EndpointAcquirer,
}

impl HandshakeRunner {
    #[must_use]
    pub fn new(config: Arc<Config>, transport: Arc<dyn Transport>) -> Self {
        let acquirer = EndpointAcquirer::new(Arc::clone(&config), Arc::clone(&transport));
        Self {
            config,
            transport,
            acquirer,
        }
    }

    /// Announces `remote_host` to the SMTP endpoint, provisioning a transient
    /// listener first when nothing answers there.
    ///
    /// The whole call, acquisition included, shares one deadline. A
    /// provisioned listener is released before this returns, whatever the
    /// outcome.
    ///
    /// # Errors
    ///
    /// - [`ProbeError::InvalidArgument`] for an empty `remote_host`, or one
    ///   containing control characters, before any socket is opened.
    /// - [`ProbeError::ConnectionError`] when the client connection cannot be
    ///   established or breaks down mid-conversation.
    /// - [`ProbeError::Timeout`] when the deadline passes first.
    pub async fn helo(&self, remote_host: &str) -> Result<HeloOutcome> {
        let remote_host = remote_host.trim();
        if remote_host.is_empty() {
            return Err(ProbeError::missing("remote host"));
        }
        if remote_host.chars().any(char::is_control) {
            return Err(ProbeError::InvalidArgument(format!(
                "Remote host contains control characters: {remote_host:?}"
            )));
        }

        let deadline = Instant::now() + self.config.timeout();
        let endpoint = self.acquirer.acquire_until(deadline).await?;

        let outcome = match timeout::guard_until("helo", deadline, self.converse(remote_host)).await
        {
            Ok((outcome, client)) => {
                if let Some(client) = client {
                    quit(client).await;
                }
                Ok(outcome)
            }
            Err(err) => Err(err),
        };

        if endpoint.is_provisioned() {
            internal!(level = DEBUG, "Releasing SMTP listener provisioned for {remote_host}");
        }
        endpoint.release().await;

        outcome
    }

    /// Returns the outcome, plus the client when the session is still open
    /// and owes the server a `QUIT`.
    async fn converse(&self, remote_host: &str) -> Result<(HeloOutcome, Option<SmtpClient>)> {
        let address = self.config.smtp_address();
        let failed = |err: ClientError| ProbeError::connection(address.clone(), err.into());

        let stream = self
            .transport
            .connect(&address)
            .await
            .map_err(|err| ProbeError::connection(address.clone(), err))?;
        let mut client = SmtpClient::new(stream);

        let greeting = client.read_greeting().await.map_err(failed)?;
        if !greeting.is_success() {
            internal!(level = INFO, "{address} refused the session: {} {:?}", greeting.code, greeting.lines);
            return Ok((HeloOutcome::Rejected, None));
        }

        let reply = client.helo(remote_host).await.map_err(failed)?;
        if !reply.is_success() {
            internal!(level = INFO, "{address} rejected HELO {remote_host}: {} {:?}", reply.code, reply.lines);
            return Ok((HeloOutcome::Rejected, None));
        }

        let handshake = Handshake {
            code: reply.code,
            lines: reply.lines,
        };

        Ok((HeloOutcome::Accepted(handshake), Some(client)))
    }
}

/// Ends the session politely. The handshake has already settled, so a slow
/// or failing `QUIT` only gets logged.
async fn quit(mut client: SmtpClient) {
    match tokio::time::timeout(QUIT_GRACE, client.quit()).await {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => internal!(level = DEBUG, "QUIT failed: {err}"),
        Err(_) => internal!(level = DEBUG, "No reply to QUIT within {}ms", QUIT_GRACE.as_millis()),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        net::SocketAddr,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    /// Refuses everything and counts how often it was asked.
    #[derive(Default)]
    struct RefusingTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for RefusingTransport {
        async fn connect(&self, _address: &str) -> io::Result<TcpStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(io::ErrorKind::ConnectionRefused.into())
        }

        async fn bind(&self, _address: SocketAddr) -> io::Result<TcpListener> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(io::ErrorKind::AddrInUse.into())
        }
    }

    #[tokio::test]
    async fn test_invalid_remote_host_opens_nothing() {
        let transport = Arc::new(RefusingTransport::default());
        let runner = HandshakeRunner::new(Arc::new(Config::default()), transport.clone());

        for remote_host in ["", "  ", "a\r\nQUIT", "mx\texample.com", "a\0b"] {
            let err = runner.helo(remote_host).await.unwrap_err();
            assert!(
                matches!(err, ProbeError::InvalidArgument(_)),
                "{remote_host:?} gave {err}"
            );
        }

        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_outcome_serialization() {
        let accepted = HeloOutcome::Accepted(Handshake {
            code: 250,
            lines: vec!["example.com".to_string()],
        });

        assert_eq!(
            serde_json::to_string(&accepted).unwrap(),
            r#"{"code":250,"lines":["example.com"]}"#
        );
        assert_eq!(
            serde_json::to_string(&HeloOutcome::Rejected).unwrap(),
            "false"
        );
    }

    #[test]
    fn test_outcome_accessors() {
        let accepted = HeloOutcome::Accepted(Handshake {
            code: 250,
            lines: Vec::new(),
        });
        assert!(accepted.is_accepted());
        assert_eq!(accepted.handshake().map(|h| h.code), Some(250));

        assert!(!HeloOutcome::Rejected.is_accepted());
        assert!(HeloOutcome::Rejected.handshake().is_none());
    }
}
