//! The diagnostic facade.

use std::{fmt, net::Ipv4Addr, net::Ipv6Addr, sync::Arc, time::Duration};

use tokio::time::Instant;

use crate::{
    config::Config,
    dns::{
        AddressFamily, DnsResolver, LookupAddress, MxRecord, RecordType, Records, ServiceName,
        SoaRecord, SrvRecord,
    },
    error::{ProbeError, Result},
    internal,
    ping::{Pinger, SystemPing},
    smtp::{HandshakeRunner, HeloOutcome, TcpTransport, Transport},
    timeout,
};

/// Every probe operation behind one immutable [`Config`].
///
/// Each call settles within the configured timeout, with either a result or
/// [`ProbeError::Timeout`].
pub struct MailProbe {
    config: Arc<Config>,
    dns: DnsResolver,
    pinger: Arc<dyn Pinger>,
    handshakes: HandshakeRunner,
}

impl fmt::Debug for MailProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailProbe")
            .field("config", &self.config)
            .field("dns", &self.dns)
            .finish_non_exhaustive()
    }
}

impl MailProbe {
    /// Creates a probe using real sockets and the system `ping`.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::InvalidArgument`] if the configuration fails
    /// [`Config::validate`].
    pub fn new(config: Config) -> Result<Self> {
        Self::with_capabilities(config, Arc::new(TcpTransport), Arc::new(SystemPing))
    }

    /// Creates a probe with explicit socket and ping capabilities.
    ///
    /// # Errors
    ///
    /// See [`MailProbe::new`].
    pub fn with_capabilities(
        config: Config,
        transport: Arc<dyn Transport>,
        pinger: Arc<dyn Pinger>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        Ok(Self {
            dns: DnsResolver::new(config.timeout()),
            handshakes: HandshakeRunner::new(Arc::clone(&config), transport),
            pinger,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.config.timeout()
    }

    #[must_use]
    pub const fn resolver(&self) -> &DnsResolver {
        &self.dns
    }

    /// Round-trip time to `host` in whole milliseconds.
    ///
    /// # Errors
    ///
    /// - [`ProbeError::InvalidArgument`] for an empty host.
    /// - [`ProbeError::HostUnreachable`] when the host does not answer.
    /// - [`ProbeError::ConnectionError`] when the probe cannot be run.
    /// - [`ProbeError::Timeout`].
    pub async fn ping(&self, host: &str) -> Result<u64> {
        let host = host.trim();
        if host.is_empty() {
            return Err(ProbeError::missing("host"));
        }
        if host.starts_with('-') {
            return Err(ProbeError::InvalidArgument(format!("Invalid host: {host}")));
        }

        let wait = self.config.timeout();
        let start = Instant::now();

        let round_trip = timeout::guard("ping", wait, async {
            self.pinger
                .probe(host, wait)
                .await
                .map_err(|err| ProbeError::connection(host, err))?
                .ok_or_else(|| ProbeError::HostUnreachable(host.to_string()))
        })
        .await?;

        internal!(
            level = DEBUG,
            "{host} answered in {}ms ({}ms elapsed)",
            round_trip.as_millis(),
            start.elapsed().as_millis()
        );
        Ok(u64::try_from(round_trip.as_millis()).unwrap_or(u64::MAX))
    }

    /// # Errors
    ///
    /// See [`DnsResolver::lookup`].
    pub async fn lookup(&self, hostname: &str, family: AddressFamily) -> Result<LookupAddress> {
        self.dns.lookup(hostname, family).await
    }

    /// # Errors
    ///
    /// See [`DnsResolver::lookup_all`].
    pub async fn lookup_all(
        &self,
        hostname: &str,
        family: AddressFamily,
    ) -> Result<Vec<LookupAddress>> {
        self.dns.lookup_all(hostname, family).await
    }

    /// # Errors
    ///
    /// See [`DnsResolver::lookup_service`].
    pub async fn lookup_service(&self, address: &str, port: u16) -> Result<ServiceName> {
        self.dns.lookup_service(address, port).await
    }

    /// # Errors
    ///
    /// See [`DnsResolver::resolve`].
    pub async fn resolve(&self, hostname: &str, record_type: RecordType) -> Result<Records> {
        self.dns.resolve(hostname, record_type).await
    }

    /// # Errors
    ///
    /// See [`DnsResolver::resolve`].
    pub async fn resolve4(&self, hostname: &str) -> Result<Vec<Ipv4Addr>> {
        self.dns.resolve4(hostname).await
    }

    /// # Errors
    ///
    /// See [`DnsResolver::resolve`].
    pub async fn resolve6(&self, hostname: &str) -> Result<Vec<Ipv6Addr>> {
        self.dns.resolve6(hostname).await
    }

    /// # Errors
    ///
    /// See [`DnsResolver::resolve`].
    pub async fn resolve_cname(&self, hostname: &str) -> Result<Vec<String>> {
        self.dns.resolve_cname(hostname).await
    }

    /// # Errors
    ///
    /// See [`DnsResolver::resolve`].
    pub async fn resolve_mx(&self, hostname: &str) -> Result<Vec<MxRecord>> {
        self.dns.resolve_mx(hostname).await
    }

    /// # Errors
    ///
    /// See [`DnsResolver::resolve`].
    pub async fn resolve_ns(&self, hostname: &str) -> Result<Vec<String>> {
        self.dns.resolve_ns(hostname).await
    }

    /// # Errors
    ///
    /// See [`DnsResolver::resolve_soa`].
    pub async fn resolve_soa(&self, hostname: &str) -> Result<SoaRecord> {
        self.dns.resolve_soa(hostname).await
    }

    /// # Errors
    ///
    /// See [`DnsResolver::resolve`].
    pub async fn resolve_srv(&self, hostname: &str) -> Result<Vec<SrvRecord>> {
        self.dns.resolve_srv(hostname).await
    }

    /// # Errors
    ///
    /// See [`DnsResolver::resolve`].
    pub async fn resolve_txt(&self, hostname: &str) -> Result<Vec<Vec<String>>> {
        self.dns.resolve_txt(hostname).await
    }

    /// # Errors
    ///
    /// See [`DnsResolver::reverse`].
    pub async fn reverse(&self, address: &str) -> Result<Vec<String>> {
        self.dns.reverse(address).await
    }

    /// # Errors
    ///
    /// See [`DnsResolver::set_servers`].
    pub fn set_servers<S: AsRef<str>>(&self, servers: &[S]) -> Result<bool> {
        self.dns.set_servers(servers)
    }

    #[must_use]
    pub fn get_servers(&self) -> Vec<String> {
        self.dns.get_servers()
    }

    /// Announces `remote_host` to the configured SMTP endpoint.
    ///
    /// # Errors
    ///
    /// See [`HandshakeRunner::helo`].
    pub async fn helo(&self, remote_host: &str) -> Result<HeloOutcome> {
        self.handshakes.helo(remote_host).await
    }
}

#[cfg(test)]
mod tests {
    use std::{
        future::pending,
        io,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;

    struct FixedPing(Option<Duration>);

    #[async_trait]
    impl Pinger for FixedPing {
        async fn probe(&self, _host: &str, _wait: Duration) -> io::Result<Option<Duration>> {
            Ok(self.0)
        }
    }

    #[derive(Default)]
    struct HangingPing {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Pinger for HangingPing {
        async fn probe(&self, _host: &str, _wait: Duration) -> io::Result<Option<Duration>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            pending().await
        }
    }

    fn probe_with(pinger: Arc<dyn Pinger>, timeout_ms: u64) -> MailProbe {
        let config = Config {
            timeout_ms,
            ..Config::default()
        };
        MailProbe::with_capabilities(config, Arc::new(TcpTransport), pinger).unwrap()
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = Config {
            timeout_ms: 0,
            ..Config::default()
        };
        assert!(matches!(
            MailProbe::new(config),
            Err(ProbeError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout_accessor() {
        let probe = probe_with(Arc::new(FixedPing(None)), 1_500);
        assert_eq!(probe.timeout(), Duration::from_millis(1_500));
    }

    #[tokio::test]
    async fn test_ping_reports_round_trip() {
        let probe = probe_with(Arc::new(FixedPing(Some(Duration::from_micros(12_900)))), 1_000);
        assert_eq!(probe.ping("example.com").await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_ping_unreachable() {
        let probe = probe_with(Arc::new(FixedPing(None)), 1_000);
        let err = probe.ping("192.0.2.1").await.unwrap_err();
        assert!(matches!(err, ProbeError::HostUnreachable(host) if host == "192.0.2.1"));
    }

    #[tokio::test]
    async fn test_ping_rejects_empty_host_without_probing() {
        let pinger = Arc::new(HangingPing::default());
        let probe = probe_with(pinger.clone(), 1_000);

        assert!(matches!(
            probe.ping("  ").await,
            Err(ProbeError::InvalidArgument(_))
        ));
        assert!(matches!(
            probe.ping("-f").await,
            Err(ProbeError::InvalidArgument(_))
        ));
        assert_eq!(pinger.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_times_out() {
        let probe = probe_with(Arc::new(HangingPing::default()), 250);

        let err = probe.ping("example.com").await.unwrap_err();
        assert!(matches!(
            err,
            ProbeError::Timeout {
                operation: "ping",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_servers_are_per_instance() {
        let first = probe_with(Arc::new(FixedPing(None)), 1_000);
        let second = probe_with(Arc::new(FixedPing(None)), 1_000);

        first.set_servers(&["192.0.2.53"]).unwrap();
        assert_eq!(first.get_servers(), ["192.0.2.53"]);
        assert_ne!(second.get_servers(), ["192.0.2.53"]);
    }
}
