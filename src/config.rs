//! Probe configuration.
//!
//! A [`Config`] is built once, handed to [`MailProbe`](crate::MailProbe) and
//! never mutated afterwards. It deserializes from TOML with every field
//! optional:
//!
//! ```toml
//! timeout_ms = 20000
//!
//! [smtp]
//! host = "localhost"
//! port = 9025
//! listen_address = "127.0.0.1"
//! ```

use std::{
    net::{IpAddr, Ipv6Addr, SocketAddr},
    path::Path,
    time::Duration,
};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{ProbeError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Overall deadline for every operation, in milliseconds.
    ///
    /// Default: 20000
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub smtp: SmtpConfig,
}

/// Where the `HELO` handshake is performed, and where a transient listener
/// is provisioned when nothing answers there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Host the SMTP client connects to.
    ///
    /// Default: `localhost`
    #[serde(default = "defaults::smtp_host")]
    pub host: String,

    /// Port the SMTP client connects to, and the transient listener binds.
    ///
    /// Default: 9025
    #[serde(default = "defaults::smtp_port")]
    pub port: u16,

    /// Local address a transient listener binds to.
    ///
    /// Default: `127.0.0.1`
    #[serde(default = "defaults::listen_address")]
    pub listen_address: IpAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_ms: defaults::timeout_ms(),
            smtp: SmtpConfig::default(),
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: defaults::smtp_host(),
            port: defaults::smtp_port(),
            listen_address: defaults::listen_address(),
        }
    }
}

impl Config {
    /// Reads a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// parsed values fail [`Config::validate`].
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to read config file {}", path.display()))?;

        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Unable to parse config file {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants every operation relies on.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::InvalidArgument`] for a zero timeout, an empty
    /// SMTP host or port 0.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(ProbeError::InvalidArgument(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }

        if self.smtp.host.trim().is_empty() {
            return Err(ProbeError::InvalidArgument(
                "smtp.host must not be empty".to_string(),
            ));
        }

        if self.smtp.port == 0 {
            return Err(ProbeError::InvalidArgument(
                "smtp.port must be between 1 and 65535".to_string(),
            ));
        }

        Ok(())
    }

    /// The overall deadline as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The deadline for deciding whether an SMTP server already answers.
    #[must_use]
    pub const fn sub_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms / 4)
    }

    /// `host:port` of the SMTP endpoint, with IPv6 literals bracketed.
    #[must_use]
    pub fn smtp_address(&self) -> String {
        let host = self.smtp.host.trim();
        match host.parse::<Ipv6Addr>() {
            Ok(ip) => SocketAddr::from((ip, self.smtp.port)).to_string(),
            Err(_) => format!("{host}:{}", self.smtp.port),
        }
    }
}

mod defaults {
    use std::net::{IpAddr, Ipv4Addr};

    pub const fn timeout_ms() -> u64 {
        20_000
    }

    pub fn smtp_host() -> String {
        "localhost".to_string()
    }

    pub const fn smtp_port() -> u16 {
        9025
    }

    pub const fn listen_address() -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }
}
