//! SMTP endpoint acquisition and the `HELO` handshake.
//!
//! [`HandshakeRunner::helo`] first asks the [`EndpointAcquirer`] whether an
//! SMTP server already answers on the configured host and port. When none
//! does, a [`TransientServer`] is bound to that port for the duration of the
//! call. The handshake then runs against whatever answers, and any listener
//! provisioned along the way is released before the call returns.

pub mod client;
pub mod endpoint;
pub mod error;
pub mod handshake;
pub mod response;
pub mod server;
pub mod status;

pub use client::SmtpClient;
pub use endpoint::{Endpoint, EndpointAcquirer, TcpTransport, Transport};
pub use error::ClientError;
pub use handshake::{Handshake, HandshakeRunner, HeloOutcome};
pub use response::Response;
pub use server::TransientServer;
pub use status::Status;
