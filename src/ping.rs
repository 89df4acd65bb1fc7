//! ICMP reachability through the system `ping` utility.
//!
//! Raw ICMP sockets need elevated privileges on most systems, so the probe
//! shells out to `ping` the same way an operator would.

use std::{io, process::Stdio, time::Duration};

use async_trait::async_trait;
use tokio::{process::Command, time::Instant};

use crate::internal;

/// Something that can send a single echo request.
#[async_trait]
pub trait Pinger: Send + Sync {
    /// Sends one echo request to `host` and waits up to `wait` for the reply.
    ///
    /// Returns the round-trip time, or `None` when the host did not answer.
    ///
    /// # Errors
    ///
    /// Returns an error if the probe itself could not be run.
    async fn probe(&self, host: &str, wait: Duration) -> io::Result<Option<Duration>>;
}

/// [`Pinger`] backed by the `ping` binary on `PATH`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPing;

impl SystemPing {
    fn command(host: &str, wait: Duration) -> Command {
        let seconds = wait.as_secs().max(1).to_string();
        let mut cmd = Command::new("ping");

        #[cfg(windows)]
        cmd.args(["-n", "1", "-w", &wait.as_millis().max(1).to_string()]);
        #[cfg(target_os = "macos")]
        cmd.args(["-c", "1", "-t", &seconds]);
        #[cfg(not(any(windows, target_os = "macos")))]
        cmd.args(["-c", "1", "-W", &seconds]);

        cmd.arg(host)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Pinger for SystemPing {
    async fn probe(&self, host: &str, wait: Duration) -> io::Result<Option<Duration>> {
        let start = Instant::now();
        let output = Self::command(host, wait).output().await?;
        let elapsed = start.elapsed();

        if !output.status.success() {
            internal!(level = DEBUG, "ping {host} exited with {}", output.status);
            return Ok(None);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(Some(parse_round_trip(&stdout).unwrap_or(elapsed)))
    }
}

/// Extracts the round-trip time from `ping` output, e.g. `time=12.3 ms` or
/// `time<1ms`.
fn parse_round_trip(output: &str) -> Option<Duration> {
    output.lines().find_map(|line| {
        let (_, rest) = line
            .split_once("time=")
            .or_else(|| line.split_once("time<"))?;
        let number: String = rest
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();

        let (whole, fraction) = number.split_once('.').unwrap_or((number.as_str(), ""));
        let millis: u64 = whole.parse().ok()?;

        // Microsecond precision is all ping reports.
        let digits: String = fraction.chars().chain("000".chars()).take(3).collect();
        let micros: u64 = digits.parse().ok()?;

        Some(Duration::from_millis(millis) + Duration::from_micros(micros))
    })
}
