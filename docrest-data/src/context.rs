//! Per-call deadline and cancellation.
//!
//! Every [`Storer`](crate::Storer) operation takes a [`Context`] as its first
//! argument. Backends check it before doing any I/O, turn the remaining time
//! into a server-side budget, and race their round trips against it with
//! [`Context::run`].

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::DataError;

/// Deadline + cancellation handle threaded through every data operation.
///
/// Cloning is cheap; clones share the same cancellation token.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl Context {
    /// A context that never expires and is only cancelled explicitly.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context expiring `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().with_deadline(Instant::now() + timeout)
    }

    /// Attach a deadline. An earlier existing deadline is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) if current <= deadline => current,
            _ => deadline,
        });
        self
    }

    /// Replace the cancellation token, e.g. with one owned by a request.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Derive a context with the same deadline whose cancellation does not
    /// propagate back to `self`.
    pub fn child(&self) -> Self {
        Self {
            deadline: self.deadline,
            cancel: self.cancel.child_token(),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// The context error if the context is done.
    pub fn err(&self) -> Option<DataError> {
        if self.cancel.is_cancelled() {
            return Some(DataError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(DataError::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn check(&self) -> Result<(), DataError> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Drive `fut` to completion unless the context is cancelled or its
    /// deadline passes first, in which case `fut` is dropped.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, DataError>
    where
        F: Future<Output = Result<T, DataError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DataError::Cancelled),
            _ = expired(self.deadline) => Err(DataError::DeadlineExceeded),
            res = fut => res,
        }
    }
}

async fn expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
