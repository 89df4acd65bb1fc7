//! Name resolution.
//!
//! [`DnsResolver::lookup`] and [`DnsResolver::lookup_all`] go through the
//! operating system resolver, exactly like a connecting client would. Every
//! other operation queries the configured name servers directly through
//! `hickory-resolver`, so [`DnsResolver::set_servers`] only affects those.

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use hickory_resolver::{
    config::{NameServerConfigGroup, ResolverConfig, ResolverOpts},
    name_server::TokioConnectionProvider,
    proto::rr::{Name, RData, RecordType as WireType},
    ResolveError, TokioResolver,
};
use parking_lot::RwLock;
use serde::Serialize;

use crate::{
    error::{ProbeError, ResolverCode, Result},
    internal, timeout,
};

/// Port assumed by [`DnsResolver::lookup_service`] callers that do not name one.
pub const DEFAULT_SERVICE_PORT: u16 = 80;

const DNS_PORT: u16 = 53;

/// Which address families a lookup may return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AddressFamily {
    #[default]
    Any,
    V4,
    V6,
}

impl AddressFamily {
    const fn admits(self, address: &IpAddr) -> bool {
        match self {
            Self::Any => true,
            Self::V4 => address.is_ipv4(),
            Self::V6 => address.is_ipv6(),
        }
    }
}

impl FromStr for AddressFamily {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "0" | "any" => Ok(Self::Any),
            "4" | "v4" | "ipv4" => Ok(Self::V4),
            "6" | "v6" | "ipv6" => Ok(Self::V6),
            other => Err(ProbeError::InvalidArgument(format!(
                "Unknown address family: {other}"
            ))),
        }
    }
}

/// One resolved address and its family (`4` or `6`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LookupAddress {
    pub address: IpAddr,
    pub family: u8,
}

impl From<IpAddr> for LookupAddress {
    fn from(address: IpAddr) -> Self {
        let family = if address.is_ipv4() { 4 } else { 6 };
        Self { address, family }
    }
}

/// The host and service names behind an address and port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceName {
    pub hostname: String,
    pub service: String,
}

/// DNS record types understood by [`DnsResolver::resolve`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RecordType {
    #[default]
    A,
    Aaaa,
    Cname,
    Mx,
    Ns,
    Ptr,
    Soa,
    Srv,
    Txt,
}

impl RecordType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
            Self::Cname => "CNAME",
            Self::Mx => "MX",
            Self::Ns => "NS",
            Self::Ptr => "PTR",
            Self::Soa => "SOA",
            Self::Srv => "SRV",
            Self::Txt => "TXT",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Self::A),
            "AAAA" => Ok(Self::Aaaa),
            "CNAME" => Ok(Self::Cname),
            "MX" => Ok(Self::Mx),
            "NS" => Ok(Self::Ns),
            "PTR" => Ok(Self::Ptr),
            "SOA" => Ok(Self::Soa),
            "SRV" => Ok(Self::Srv),
            "TXT" => Ok(Self::Txt),
            other => Err(ProbeError::InvalidArgument(format!(
                "Unknown record type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MxRecord {
    pub exchange: String,
    pub priority: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SoaRecord {
    pub nsname: String,
    pub hostmaster: String,
    pub serial: u32,
    pub refresh: i32,
    pub retry: i32,
    pub expire: i32,
    pub minttl: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SrvRecord {
    pub name: String,
    pub port: u16,
    pub priority: u16,
    pub weight: u16,
}

/// The answer to [`DnsResolver::resolve`], typed by record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Records {
    A(Vec<Ipv4Addr>),
    Aaaa(Vec<Ipv6Addr>),
    Cname(Vec<String>),
    Mx(Vec<MxRecord>),
    Ns(Vec<String>),
    Ptr(Vec<String>),
    Soa(SoaRecord),
    Srv(Vec<SrvRecord>),
    /// Each record's character strings, in wire order.
    Txt(Vec<Vec<String>>),
}

struct State {
    servers: Vec<SocketAddr>,
    resolver: Arc<TokioResolver>,
}

/// One-shot DNS queries, each bounded by the configured timeout.
///
/// The name server list is owned by this instance; changing it never
/// affects another resolver.
pub struct DnsResolver {
    timeout: Duration,
    opts: ResolverOpts,
    state: RwLock<State>,
}

impl fmt::Debug for DnsResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsResolver")
            .field("timeout", &self.timeout)
            .field("servers", &self.state.read().servers)
            .finish_non_exhaustive()
    }
}

impl DnsResolver {
    /// Creates a resolver using the system name servers.
    ///
    /// Falls back to Google Public DNS when the system
    /// configuration cannot be read.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let mut opts = ResolverOpts::default();
        // Left to the guard, which reports the timeout with the operation name.
        opts.timeout = timeout.saturating_mul(2);

        let resolver = match TokioResolver::builder(TokioConnectionProvider::default()) {
            Ok(builder) => builder.with_options(opts.clone()).build(),
            Err(err) => {
                internal!(
                    level = WARN,
                    "Unable to read system DNS configuration, using defaults: {err}"
                );
                TokioResolver::builder_with_config(
                    ResolverConfig::google(),
                    TokioConnectionProvider::default(),
                )
                .with_options(opts.clone())
                .build()
            }
        };

        let mut servers: Vec<SocketAddr> = Vec::new();
        for name_server in resolver.config().name_servers() {
            if !servers.contains(&name_server.socket_addr) {
                servers.push(name_server.socket_addr);
            }
        }

        Self {
            timeout,
            opts,
            state: RwLock::new(State {
                servers,
                resolver: Arc::new(resolver),
            }),
        }
    }

    fn resolver(&self) -> Arc<TokioResolver> {
        Arc::clone(&self.state.read().resolver)
    }

    /// Resolves `hostname` through the operating system and returns the
    /// first address of the requested family.
    ///
    /// # Errors
    ///
    /// [`ProbeError::InvalidArgument`] for an empty hostname,
    /// [`ProbeError::ResolverError`] when nothing matches and
    /// [`ProbeError::Timeout`] when the system resolver does not answer in
    /// time.
    pub async fn lookup(&self, hostname: &str, family: AddressFamily) -> Result<LookupAddress> {
        let hostname = required(hostname, "hostname")?;
        let mut addresses = self.lookup_all(hostname, family).await?;
        Ok(addresses.remove(0))
    }

    /// Like [`DnsResolver::lookup`] but returns every address, in the order
    /// the system resolver gave them. The result is never empty.
    ///
    /// # Errors
    ///
    /// See [`DnsResolver::lookup`].
    pub async fn lookup_all(
        &self,
        hostname: &str,
        family: AddressFamily,
    ) -> Result<Vec<LookupAddress>> {
        let hostname = required(hostname, "hostname")?;

        timeout::guard("lookup", self.timeout, async {
            let resolved = tokio::net::lookup_host((hostname, 0))
                .await
                .map_err(|err| ProbeError::os_resolver(hostname, &err))?;

            let mut addresses: Vec<LookupAddress> = Vec::new();
            for address in resolved.map(|socket| socket.ip()) {
                if family.admits(&address) && !addresses.iter().any(|a| a.address == address) {
                    addresses.push(address.into());
                }
            }

            if addresses.is_empty() {
                return Err(ProbeError::ResolverError {
                    code: ResolverCode::NotFound,
                    hostname: hostname.to_string(),
                    message: format!("no {family:?} address found"),
                });
            }

            internal!(level = DEBUG, "{hostname} resolved to {} address(es)", addresses.len());
            Ok(addresses)
        })
        .await
    }

    /// Finds the host name for `address` and the service name for `port`.
    ///
    /// Without a PTR record the numeric address is returned as the host
    /// name. Ports without a well-known service are returned as digits.
    ///
    /// # Errors
    ///
    /// [`ProbeError::InvalidArgument`] if `address` is not an IP address,
    /// [`ProbeError::ResolverError`] for resolver failures other than a
    /// missing record, and [`ProbeError::Timeout`].
    pub async fn lookup_service(&self, address: &str, port: u16) -> Result<ServiceName> {
        let ip = parse_ip(address)?;
        let resolver = self.resolver();

        timeout::guard("lookup service", self.timeout, async {
            let hostname = match resolver.reverse_lookup(ip).await {
                Ok(lookup) => lookup
                    .iter()
                    .next()
                    .map_or_else(|| ip.to_string(), |ptr| fqdn(&ptr.0)),
                Err(err) if err.is_nx_domain() || err.is_no_records_found() => ip.to_string(),
                Err(err) => return Err(ProbeError::resolver(address, &err)),
            };

            Ok(ServiceName {
                hostname,
                service: service_name(port),
            })
        })
        .await
    }

    /// Queries records of `record_type` for `hostname`.
    ///
    /// # Errors
    ///
    /// [`ProbeError::InvalidArgument`] for an empty hostname,
    /// [`ProbeError::ResolverError`] carrying the resolver's code and
    /// [`ProbeError::Timeout`].
    pub async fn resolve(&self, hostname: &str, record_type: RecordType) -> Result<Records> {
        let hostname = required(hostname, "hostname")?;

        match record_type {
            RecordType::A => self.resolve4(hostname).await.map(Records::A),
            RecordType::Aaaa => self.resolve6(hostname).await.map(Records::Aaaa),
            RecordType::Cname => self.resolve_cname(hostname).await.map(Records::Cname),
            RecordType::Mx => self.resolve_mx(hostname).await.map(Records::Mx),
            RecordType::Ns => self.resolve_ns(hostname).await.map(Records::Ns),
            RecordType::Ptr => self.resolve_ptr(hostname).await.map(Records::Ptr),
            RecordType::Soa => self.resolve_soa(hostname).await.map(Records::Soa),
            RecordType::Srv => self.resolve_srv(hostname).await.map(Records::Srv),
            RecordType::Txt => self.resolve_txt(hostname).await.map(Records::Txt),
        }
    }

    /// # Errors
    ///
    /// See [`DnsResolver::resolve`].
    pub async fn resolve4(&self, hostname: &str) -> Result<Vec<Ipv4Addr>> {
        let hostname = required(hostname, "hostname")?;
        self.query("resolve4", hostname, |resolver| async move {
            let lookup = resolver.ipv4_lookup(hostname).await?;
            Ok(lookup.iter().map(|a| a.0).collect())
        })
        .await
    }

    /// # Errors
    ///
    /// See [`DnsResolver::resolve`].
    pub async fn resolve6(&self, hostname: &str) -> Result<Vec<Ipv6Addr>> {
        let hostname = required(hostname, "hostname")?;
        self.query("resolve6", hostname, |resolver| async move {
            let lookup = resolver.ipv6_lookup(hostname).await?;
            Ok(lookup.iter().map(|aaaa| aaaa.0).collect())
        })
        .await
    }

    /// # Errors
    ///
    /// See [`DnsResolver::resolve`].
    pub async fn resolve_cname(&self, hostname: &str) -> Result<Vec<String>> {
        let hostname = required(hostname, "hostname")?;
        self.query("resolveCname", hostname, |resolver| async move {
            let lookup = resolver.lookup(hostname, WireType::CNAME).await?;
            Ok(lookup
                .iter()
                .filter_map(|rdata| match rdata {
                    RData::CNAME(cname) => Some(fqdn(&cname.0)),
                    _ => None,
                })
                .collect())
        })
        .await
    }

    /// Mail exchangers, most preferred first.
    ///
    /// # Errors
    ///
    /// See [`DnsResolver::resolve`].
    pub async fn resolve_mx(&self, hostname: &str) -> Result<Vec<MxRecord>> {
        let hostname = required(hostname, "hostname")?;
        self.query("resolveMx", hostname, |resolver| async move {
            let lookup = resolver.mx_lookup(hostname).await?;
            let mut records: Vec<MxRecord> = lookup
                .iter()
                .map(|mx| MxRecord {
                    exchange: fqdn(mx.exchange()),
                    priority: mx.preference(),
                })
                .collect();
            records.sort_by_key(|mx| mx.priority);
            Ok(records)
        })
        .await
    }

    /// # Errors
    ///
    /// See [`DnsResolver::resolve`].
    pub async fn resolve_ns(&self, hostname: &str) -> Result<Vec<String>> {
        let hostname = required(hostname, "hostname")?;
        self.query("resolveNs", hostname, |resolver| async move {
            let lookup = resolver.ns_lookup(hostname).await?;
            Ok(lookup.iter().map(|ns| fqdn(&ns.0)).collect())
        })
        .await
    }

    async fn resolve_ptr(&self, hostname: &str) -> Result<Vec<String>> {
        self.query("resolvePtr", hostname, |resolver| async move {
            let lookup = resolver.lookup(hostname, WireType::PTR).await?;
            Ok(lookup
                .iter()
                .filter_map(|rdata| match rdata {
                    RData::PTR(ptr) => Some(fqdn(&ptr.0)),
                    _ => None,
                })
                .collect())
        })
        .await
    }

    /// The zone's start of authority.
    ///
    /// # Errors
    ///
    /// See [`DnsResolver::resolve`]. An answer without a SOA record is a
    /// [`ResolverCode::NoData`] error.
    pub async fn resolve_soa(&self, hostname: &str) -> Result<SoaRecord> {
        let hostname = required(hostname, "hostname")?;
        let records = self
            .query("resolveSoa", hostname, |resolver| async move {
                let lookup = resolver.soa_lookup(hostname).await?;
                Ok(lookup
                    .iter()
                    .map(|soa| SoaRecord {
                        nsname: fqdn(soa.mname()),
                        hostmaster: fqdn(soa.rname()),
                        serial: soa.serial(),
                        refresh: soa.refresh(),
                        retry: soa.retry(),
                        expire: soa.expire(),
                        minttl: soa.minimum(),
                    })
                    .collect::<Vec<_>>())
            })
            .await?;

        records
            .into_iter()
            .next()
            .ok_or_else(|| ProbeError::ResolverError {
                code: ResolverCode::NoData,
                hostname: hostname.to_string(),
                message: "no SOA record in answer".to_string(),
            })
    }

    /// # Errors
    ///
    /// See [`DnsResolver::resolve`].
    pub async fn resolve_srv(&self, hostname: &str) -> Result<Vec<SrvRecord>> {
        let hostname = required(hostname, "hostname")?;
        self.query("resolveSrv", hostname, |resolver| async move {
            let lookup = resolver.srv_lookup(hostname).await?;
            Ok(lookup
                .iter()
                .map(|srv| SrvRecord {
                    name: fqdn(srv.target()),
                    port: srv.port(),
                    priority: srv.priority(),
                    weight: srv.weight(),
                })
                .collect())
        })
        .await
    }

    /// # Errors
    ///
    /// See [`DnsResolver::resolve`].
    pub async fn resolve_txt(&self, hostname: &str) -> Result<Vec<Vec<String>>> {
        let hostname = required(hostname, "hostname")?;
        self.query("resolveTxt", hostname, |resolver| async move {
            let lookup = resolver.txt_lookup(hostname).await?;
            Ok(lookup
                .iter()
                .map(|txt| {
                    txt.txt_data()
                        .iter()
                        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
                        .collect()
                })
                .collect())
        })
        .await
    }

    /// Host names pointing back at `address`.
    ///
    /// # Errors
    ///
    /// [`ProbeError::InvalidArgument`] if `address` is not an IP address,
    /// otherwise see [`DnsResolver::resolve`].
    pub async fn reverse(&self, address: &str) -> Result<Vec<String>> {
        let ip = parse_ip(address)?;
        self.query("reverse", address, |resolver| async move {
            let lookup = resolver.reverse_lookup(ip).await?;
            Ok(lookup.iter().map(|ptr| fqdn(&ptr.0)).collect())
        })
        .await
    }

    /// Replaces the name servers used by every query except
    /// [`DnsResolver::lookup`].
    ///
    /// Accepts `ip`, `ip:port` and `[ipv6]:port`. Nothing changes unless
    /// every entry parses.
    ///
    /// # Errors
    ///
    /// [`ProbeError::InvalidArgument`] for an empty list or a malformed entry.
    pub fn set_servers<S: AsRef<str>>(&self, servers: &[S]) -> Result<bool> {
        if servers.is_empty() {
            return Err(ProbeError::missing("name servers"));
        }

        let servers = servers
            .iter()
            .map(|server| parse_server(server.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let mut group = NameServerConfigGroup::new();
        for server in &servers {
            group.merge(NameServerConfigGroup::from_ips_clear(
                &[server.ip()],
                server.port(),
                true,
            ));
        }

        let resolver = TokioResolver::builder_with_config(
            ResolverConfig::from_parts(None, vec![], group),
            TokioConnectionProvider::default(),
        )
        .with_options(self.opts.clone())
        .build();

        internal!(level = DEBUG, "Using name servers {servers:?}");
        *self.state.write() = State {
            servers,
            resolver: Arc::new(resolver),
        };

        Ok(true)
    }

    /// The current name servers, formatted so they can be passed back to
    /// [`DnsResolver::set_servers`] unchanged.
    #[must_use]
    pub fn get_servers(&self) -> Vec<String> {
        self.state
            .read()
            .servers
            .iter()
            .map(|server| {
                if server.port() == DNS_PORT {
                    server.ip().to_string()
                } else {
                    server.to_string()
                }
            })
            .collect()
    }

    async fn query<'a, T, F, Fut>(&self, operation: &'static str, hostname: &'a str, run: F) -> Result<T>
    where
        F: FnOnce(Arc<TokioResolver>) -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, ResolveError>> + 'a,
    {
        let resolver = self.resolver();

        timeout::guard(operation, self.timeout, async {
            run(resolver).await.map_err(|err| {
                internal!(level = DEBUG, "{operation} {hostname} failed: {err}");
                ProbeError::resolver(hostname, &err)
            })
        })
        .await
    }
}

fn required<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        Err(ProbeError::missing(what))
    } else {
        Ok(value)
    }
}

fn parse_ip(address: &str) -> Result<IpAddr> {
    let address = required(address, "address")?;
    address
        .parse()
        .map_err(|_| ProbeError::InvalidArgument(format!("Not an IP address: {address}")))
}

fn parse_server(server: &str) -> Result<SocketAddr> {
    let server = required(server, "name server")?;

    if let Ok(ip) = server.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DNS_PORT));
    }

    server
        .parse::<SocketAddr>()
        .map_err(|_| ProbeError::InvalidArgument(format!("Invalid name server address: {server}")))
}

fn fqdn(name: &Name) -> String {
    let name = name.to_utf8();
    match name.strip_suffix('.') {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => name,
    }
}

fn service_name(port: u16) -> String {
    let known = match port {
        20 => "ftp-data",
        21 => "ftp",
        22 => "ssh",
        23 => "telnet",
        25 => "smtp",
        53 => "domain",
        80 => "http",
        110 => "pop3",
        143 => "imap",
        443 => "https",
        465 => "smtps",
        587 => "submission",
        993 => "imaps",
        995 => "pop3s",
        _ => return port.to_string(),
    };
    known.to_string()
}
