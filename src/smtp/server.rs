//! A throwaway SMTP listener.
//!
//! [`TransientServer`] answers just enough SMTP for a `HELO` handshake to
//! complete against it. It is started by the endpoint acquirer when nothing
//! else answers on the configured port and lives until it is released.

use std::{io, net::SocketAddr};

use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::oneshot,
    task::{JoinHandle, JoinSet},
};

use super::status::Status;
use crate::{incoming, internal, outgoing};

/// Longest command line a session accepts before hanging up.
const MAX_LINE_LENGTH: usize = 1024;

/// A provisioned SMTP listener and its accept loop.
///
/// Release it with [`TransientServer::release`]; dropping it unreleased
/// aborts the accept loop, which closes the listener once the runtime
/// reclaims the task.
#[derive(Debug)]
pub struct TransientServer {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl TransientServer {
    /// Starts serving SMTP sessions on `listener`, greeting clients as
    /// `hostname`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener has no local address.
    pub fn start(listener: TcpListener, hostname: impl Into<String>) -> io::Result<Self> {
        let local_addr = listener.local_addr()?;
        let hostname = hostname.into();
        let (shutdown, signal) = oneshot::channel();

        internal!(level = INFO, "Transient SMTP server listening on {local_addr}");
        let task = tokio::spawn(serve(listener, hostname, signal));

        Ok(Self {
            local_addr,
            shutdown: Some(shutdown),
            task: Some(task),
        })
    }

    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops the server. The listening socket is closed when this returns.
    pub async fn release(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                internal!(level = WARN, "Transient SMTP server task failed: {err}");
            }
        }

        internal!(level = INFO, "Transient SMTP server on {} released", self.local_addr);
    }
}

impl Drop for TransientServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            internal!(
                level = DEBUG,
                "Transient SMTP server on {} dropped without release",
                self.local_addr
            );
            task.abort();
        }
    }
}

async fn serve(listener: TcpListener, hostname: String, mut shutdown: oneshot::Receiver<()>) {
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut shutdown => break,

            connection = listener.accept() => match connection {
                Ok((stream, peer)) => {
                    internal!("Connection received from {peer}");
                    let hostname = hostname.clone();
                    sessions.spawn(async move {
                        if let Err(err) = session(stream, &hostname).await {
                            internal!(level = DEBUG, "Session with {peer} ended: {err}");
                        }
                    });
                }
                Err(err) => {
                    internal!(level = WARN, "Transient SMTP server accept failed: {err}");
                }
            },

            Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
        }
    }

    drop(listener);
    sessions.shutdown().await;
}

async fn session(stream: TcpStream, hostname: &str) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    reply(&mut writer, Status::ServiceReady, &format!("{hostname} ESMTP mxprobe")).await?;

    loop {
        line.clear();
        let read = (&mut reader)
            .take(MAX_LINE_LENGTH as u64)
            .read_line(&mut line)
            .await?;
        if read == 0 {
            return Ok(());
        }

        if read >= MAX_LINE_LENGTH && !line.ends_with('\n') {
            reply(&mut writer, Status::SyntaxError, "Line too long").await?;
            return writer.shutdown().await;
        }

        let command = line.trim_end_matches(['\r', '\n']);
        incoming!("{command}");

        let (verb, argument) = command
            .split_once(' ')
            .map_or((command, ""), |(verb, argument)| (verb, argument.trim()));

        match verb.to_ascii_uppercase().as_str() {
            "HELO" | "EHLO" if argument.is_empty() => {
                reply(&mut writer, Status::ParameterSyntaxError, "Syntax: HELO hostname").await?;
            }
            "HELO" | "EHLO" => reply(&mut writer, Status::Ok, argument).await?,
            "NOOP" | "RSET" => reply(&mut writer, Status::Ok, "OK").await?,
            "QUIT" => {
                reply(&mut writer, Status::GoodBye, "Bye").await?;
                return writer.shutdown().await;
            }
            _ => reply(&mut writer, Status::NotImplemented, "Command not implemented").await?,
        }
    }
}

async fn reply<W>(writer: &mut W, status: Status, text: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    outgoing!("{status} {text}");
    writer
        .write_all(format!("{status} {text}\r\n").as_bytes())
        .await?;
    writer.flush().await
}
