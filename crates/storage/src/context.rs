//! Per-request context threaded through every store operation.
//!
//! A [`RequestContext`] carries a cancellation token and an optional
//! deadline. Stores run each backend round trip through
//! [`RequestContext::run`], so a caller that cancels or times out gets an
//! error back promptly instead of waiting for the backend to give up.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{ContextError, StorageError, StorageResult};

/// Cancellation and deadline scope for one store call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
    request_id: Option<String>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}

impl RequestContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            timeout: None,
            request_id: None,
        }
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().timeout(timeout)
    }

    /// Sets the deadline to `timeout` from now.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self.timeout = Some(timeout);
        self
    }

    /// Uses `token` for cancellation.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Attaches a request identifier for log correlation.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Derives a context that is cancelled along with this one.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
            timeout: self.timeout,
            request_id: self.request_id.clone(),
        }
    }

    /// Returns the cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns the deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the request identifier, if any.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Cancels the context and every child derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Fails if the context is already cancelled or past its deadline.
    pub fn check(&self) -> StorageResult<()> {
        if self.token.is_cancelled() {
            return Err(ContextError::Cancelled.into());
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(self.deadline_exceeded());
            }
        }
        Ok(())
    }

    /// Runs `fut` until it completes, the context is cancelled, or the
    /// deadline passes. The future is dropped in the latter two cases.
    pub async fn run<F, T>(&self, fut: F) -> StorageResult<T>
    where
        F: Future<Output = StorageResult<T>>,
    {
        self.run_or_abort(fut, || {}).await
    }

    /// Like [`run`](Self::run), but invokes `abort` before returning when
    /// the context ends first. Used to interrupt work that keeps running
    /// after its future is dropped.
    pub async fn run_or_abort<F, T, A>(&self, fut: F, abort: A) -> StorageResult<T>
    where
        F: Future<Output = StorageResult<T>>,
        A: FnOnce(),
    {
        self.check()?;

        let outcome = match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    () = self.token.cancelled() => Err(ContextError::Cancelled.into()),
                    result = tokio::time::timeout_at(deadline, fut) => {
                        result.unwrap_or_else(|_| Err(self.deadline_exceeded()))
                    }
                }
            }
            None => {
                tokio::select! {
                    biased;
                    () = self.token.cancelled() => Err(ContextError::Cancelled.into()),
                    result = fut => result,
                }
            }
        };

        if matches!(outcome, Err(StorageError::Context(_))) {
            tracing::debug!(request_id = ?self.request_id, "request ended before backend returned");
            abort();
        }
        outcome
    }

    fn deadline_exceeded(&self) -> StorageError {
        let timeout_ms = self
            .timeout
            .map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default();
        ContextError::DeadlineExceeded { timeout_ms }.into()
    }
}
