//! Caller-supplied cancellation and time budgets.

use crate::{RecoveryError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation and timeout settings for facade operations.
///
/// A context is threaded through authorization, the initial request and
/// every page advance of an operation. The timeout is a budget for the whole
/// operation, starting when the operation starts.
///
/// # Example
///
/// ```
/// use recoveryvault::CallContext;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// let token = CancellationToken::new();
/// let ctx = CallContext::new()
///     .with_cancellation(token.clone())
///     .with_timeout(Duration::from_secs(30));
///
/// // Later, from another task:
/// token.cancel();
/// assert!(ctx.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancellation: CancellationToken,
    timeout: Option<Duration>,
}

impl CallContext {
    /// Creates a context that is never cancelled and never times out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `token` to cancel operations run under this context.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Bounds each operation run under this context by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// The per-operation time budget, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether the token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Starts the clock for one operation.
    pub(crate) fn start(&self) -> OperationGuard {
        OperationGuard {
            cancellation: self.cancellation.clone(),
            budget: self.timeout.map(|t| (Instant::now() + t, t)),
        }
    }
}

/// Runs the steps of one operation under its context.
#[derive(Debug, Clone)]
pub(crate) struct OperationGuard {
    cancellation: CancellationToken,
    budget: Option<(Instant, Duration)>,
}

impl OperationGuard {
    /// Awaits `step`, failing early on cancellation or an exhausted budget.
    pub(crate) async fn run<T, F>(&self, step: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancellation.is_cancelled() {
            return Err(RecoveryError::Cancelled);
        }

        match self.budget {
            Some((deadline, timeout)) => tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => Err(RecoveryError::Cancelled),
                res = tokio::time::timeout_at(deadline, step) => {
                    res.map_err(|_| RecoveryError::TimedOut(timeout))?
                }
            },
            None => tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => Err(RecoveryError::Cancelled),
                res = step => res,
            },
        }
    }
}
