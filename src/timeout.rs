//! Deadlines for pending operations.
//!
//! Every probe operation is wrapped in [`guard`] (or [`guard_until`] when
//! several steps share one budget). The guard owns the deadline timer, so the
//! timer is gone as soon as the outcome is delivered, and the wrapped future
//! is dropped, never polled again, once the deadline fires first.

use std::{future::Future, time::Duration};

use tokio::time::Instant;

use crate::{
    error::{ProbeError, Result},
    internal,
};

/// Races `operation` against `after`.
///
/// # Errors
///
/// Returns the operation's own error if it settles first, otherwise
/// [`ProbeError::Timeout`].
pub async fn guard<T, F>(name: &'static str, after: Duration, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    guard_until(name, Instant::now() + after, operation).await
}

/// Races `operation` against an absolute `deadline`.
///
/// # Errors
///
/// Returns the operation's own error if it settles first, otherwise
/// [`ProbeError::Timeout`] carrying the budget that was available when the
/// guard was entered.
pub async fn guard_until<T, F>(name: &'static str, deadline: Instant, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let after = deadline.saturating_duration_since(Instant::now());

    if let Ok(outcome) = tokio::time::timeout_at(deadline, operation).await {
        outcome
    } else {
        internal!(level = DEBUG, "{name} abandoned after {}ms", after.as_millis());
        Err(ProbeError::Timeout {
            operation: name,
            after,
        })
    }
}
