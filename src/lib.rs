//! Mail server reachability and identity diagnostics.
//!
//! [`MailProbe`] bundles a set of one-shot network checks behind a single
//! configuration: ICMP ping, OS and DNS lookups, and an SMTP `HELO`
//! handshake that provisions a throwaway local SMTP listener whenever no
//! server already answers on the configured port.
//!
//! ```no_run
//! use mxprobe::{Config, HeloOutcome, MailProbe};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let probe = MailProbe::new(Config::default())?;
//!
//! match probe.helo("mail.example.com").await? {
//!     HeloOutcome::Accepted(handshake) => println!("{} {:?}", handshake.code, handshake.lines),
//!     HeloOutcome::Rejected => println!("HELO rejected"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dns;
pub mod error;
pub mod logging;
pub mod ping;
pub mod probe;
pub mod smtp;
pub mod timeout;

pub use tracing;

pub use config::{Config, SmtpConfig};
pub use dns::{
    AddressFamily, DnsResolver, LookupAddress, MxRecord, RecordType, Records, ServiceName, SoaRecord,
    SrvRecord, DEFAULT_SERVICE_PORT,
};
pub use error::{ProbeError, ResolverCode, Result};
pub use ping::{Pinger, SystemPing};
pub use probe::MailProbe;
pub use smtp::{
    Endpoint, EndpointAcquirer, Handshake, HandshakeRunner, HeloOutcome, TcpTransport, Transport,
};

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!(target: "mxprobe", $level, $span);
        let _enter = span.enter();

        $crate::tracing::event!(target: "mxprobe", $level, $($msg),*)
    }};
}

#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "outgoing", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::outgoing!(level = TRACE, $($msg),*)
    };
}

#[macro_export]
macro_rules! incoming {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "incoming", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::incoming!(level = TRACE, $($msg),*)
    };
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = TRACE, $($msg),*)
    };
}
