//! Error types shared by every probe operation.

use std::{fmt, io, time::Duration};

use hickory_resolver::ResolveError;
use serde::Serialize;
use thiserror::Error;

/// Errors produced by [`MailProbe`](crate::MailProbe) operations.
///
/// A rejected `HELO` is not an error; see [`HeloOutcome`](crate::HeloOutcome).
#[derive(Debug, Error)]
pub enum ProbeError {
    /// A required input was empty or malformed. No network activity happened.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The configured deadline elapsed before the operation settled.
    #[error("Timeout limit reached: {operation} did not complete within {}ms", after.as_millis())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The probed host did not answer.
    #[error("Host unreachable: {0}")]
    HostUnreachable(String),

    /// The resolver answered with a failure.
    #[error("Resolver error {code} for {hostname}: {message}")]
    ResolverError {
        code: ResolverCode,
        hostname: String,
        message: String,
    },

    /// A client connection or listener could not be constructed.
    #[error("Connection error ({address}): {source}")]
    ConnectionError {
        address: String,
        #[source]
        source: io::Error,
    },
}

impl ProbeError {
    /// Returns `true` if the operation was abandoned because of its deadline.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// A short machine readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "EINVAL",
            Self::Timeout { .. } => "ETIMEOUT",
            Self::HostUnreachable(_) => "EHOSTUNREACH",
            Self::ResolverError { code, .. } => code.as_str(),
            Self::ConnectionError { .. } => "ECONNECTION",
        }
    }

    pub(crate) fn resolver(hostname: &str, err: &ResolveError) -> Self {
        Self::ResolverError {
            code: ResolverCode::from(err),
            hostname: hostname.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn os_resolver(hostname: &str, err: &io::Error) -> Self {
        Self::ResolverError {
            code: ResolverCode::from(err),
            hostname: hostname.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn connection(address: impl Into<String>, source: io::Error) -> Self {
        Self::ConnectionError {
            address: address.into(),
            source,
        }
    }

    pub(crate) fn missing(what: &str) -> Self {
        Self::InvalidArgument(format!("No {what} provided"))
    }
}

/// Resolver failure classes, rendered the way system resolvers name them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResolverCode {
    /// The name does not exist.
    NotFound,
    /// The name exists but holds no record of the requested type.
    NoData,
    /// The query itself was malformed.
    BadQuery,
    /// Anything else, including transport failures.
    Other,
}

impl ResolverCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "ENOTFOUND",
            Self::NoData => "ENODATA",
            Self::BadQuery => "EBADQUERY",
            Self::Other => "EOTHER",
        }
    }
}

impl fmt::Display for ResolverCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&ResolveError> for ResolverCode {
    fn from(err: &ResolveError) -> Self {
        if err.is_nx_domain() {
            Self::NotFound
        } else if err.is_no_records_found() {
            Self::NoData
        } else {
            Self::Other
        }
    }
}

impl From<&io::Error> for ResolverCode {
    fn from(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::InvalidInput => Self::BadQuery,
            _ => Self::NotFound,
        }
    }
}

/// Specialized `Result` type for probe operations.
pub type Result<T> = std::result::Result<T, ProbeError>;
