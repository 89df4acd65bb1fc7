//! Deciding whether an SMTP endpoint already answers, and provisioning one
//! when it does not.

use std::{io, net::SocketAddr, pin::pin, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures_util::future::{select, Either};
use tokio::{
    net::{TcpListener, TcpStream},
    time::Instant,
};

use super::server::TransientServer;
use crate::{config::Config, error::Result, internal, timeout};

/// Hostname the transient server greets clients with.
const TRANSIENT_HOSTNAME: &str = "localhost";

/// Socket capabilities the SMTP probe depends on.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a client connection to `address` (`host:port`).
    async fn connect(&self, address: &str) -> io::Result<TcpStream>;

    /// Binds a listening socket on `address`.
    async fn bind(&self, address: SocketAddr) -> io::Result<TcpListener>;
}

/// [`Transport`] backed by plain tokio TCP sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpTransport;

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self, address: &str) -> io::Result<TcpStream> {
        TcpStream::connect(address).await
    }

    async fn bind(&self, address: SocketAddr) -> io::Result<TcpListener> {
        TcpListener::bind(address).await
    }
}

/// The outcome of endpoint acquisition.
#[derive(Debug)]
pub enum Endpoint {
    /// Something already accepts connections on the configured endpoint.
    Existing,
    /// A listener was started by this acquisition and must be released.
    Provisioned(TransientServer),
    /// Nothing answered and the port could not be bound either, usually
    /// because another process holds it.
    Unavailable,
}

impl Endpoint {
    #[must_use]
    pub const fn is_provisioned(&self) -> bool {
        matches!(self, Self::Provisioned(_))
    }

    /// Releases the listener owned by this handle, if any.
    ///
    /// Consuming the handle makes a second release impossible.
    pub async fn release(self) {
        if let Self::Provisioned(server) = self {
            server.release().await;
        }
    }
}

/// How the probe connection settled.
#[derive(Debug)]
enum ProbeAttempt {
    Connected,
    Failed(io::Error),
    Elapsed,
}

/// Finds or provisions the SMTP endpoint described by a [`Config`].
#[derive(Clone)]
pub struct EndpointAcquirer {
    config: Arc<Config>,
    transport: Arc<dyn Transport>,
}

impl EndpointAcquirer {
    #[must_use]
    pub fn new(config: Arc<Config>, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    /// Acquires an endpoint within the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Timeout`](crate::ProbeError::Timeout) when the
    /// acquisition does not settle in time. Anything opened by this call is
    /// closed before the error is returned.
    pub async fn acquire(&self) -> Result<Endpoint> {
        self.acquire_until(Instant::now() + self.config.timeout())
            .await
    }

    /// Acquires an endpoint before `deadline`.
    ///
    /// # Errors
    ///
    /// See [`EndpointAcquirer::acquire`].
    pub async fn acquire_until(&self, deadline: Instant) -> Result<Endpoint> {
        timeout::guard_until("endpoint acquisition", deadline, async {
            Ok(self.probe_or_provision().await)
        })
        .await
    }

    async fn probe_or_provision(&self) -> Endpoint {
        let address = self.config.smtp_address();

        match self.probe(&address, self.config.sub_timeout()).await {
            ProbeAttempt::Connected => {
                internal!(level = DEBUG, "SMTP endpoint {address} already accepts connections");
                return Endpoint::Existing;
            }
            ProbeAttempt::Failed(err) => {
                internal!(level = DEBUG, "SMTP endpoint {address} did not accept a connection: {err}");
            }
            ProbeAttempt::Elapsed => {
                internal!(level = DEBUG, "SMTP endpoint {address} did not answer in time");
            }
        }

        self.provision().await
    }

    /// Races a connection attempt against `limit`. The loser is dropped,
    /// which closes any socket it had opened, and a winning connection is
    /// closed right away.
    async fn probe(&self, address: &str, limit: Duration) -> ProbeAttempt {
        let connect = pin!(self.transport.connect(address));
        let elapsed = pin!(tokio::time::sleep(limit));

        match select(connect, elapsed).await {
            Either::Left((Ok(stream), _)) => {
                drop(stream);
                ProbeAttempt::Connected
            }
            Either::Left((Err(err), _)) => ProbeAttempt::Failed(err),
            Either::Right(((), _)) => ProbeAttempt::Elapsed,
        }
    }

    async fn provision(&self) -> Endpoint {
        let address = SocketAddr::new(self.config.smtp.listen_address, self.config.smtp.port);

        let listener = match self.transport.bind(address).await {
            Ok(listener) => listener,
            Err(err) => {
                internal!(level = INFO, "Unable to provision SMTP listener on {address}: {err}");
                return Endpoint::Unavailable;
            }
        };

        match TransientServer::start(listener, TRANSIENT_HOSTNAME) {
            Ok(server) => Endpoint::Provisioned(server),
            Err(err) => {
                internal!(level = INFO, "Unable to start SMTP listener on {address}: {err}");
                Endpoint::Unavailable
            }
        }
    }
}
