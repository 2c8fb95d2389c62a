//! Cancellable, deadline-bound call context.
//!
//! Every registry operation runs its external calls through a [`CallContext`]
//! built at the HTTP boundary. The context's token is a child of the process
//! shutdown token, so draining the server cancels in-flight work.

use crate::errors::RoomError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation token plus optional deadline.
#[derive(Debug, Clone)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// Context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Context bound to `token` that expires `timeout` from now.
    pub fn with_timeout(token: CancellationToken, timeout: Duration) -> Self {
        Self {
            token,
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Context bound to `token` with no deadline.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Cancel this context (and any context derived from the same token).
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    #[cfg(test)]
    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail fast if the context is already done.
    pub fn check(&self, op: &'static str) -> Result<(), RoomError> {
        if self.token.is_cancelled() {
            return Err(RoomError::Cancelled(op));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(RoomError::DeadlineExceeded(op));
            }
        }
        Ok(())
    }

    /// Run `fut` until it completes, the context is cancelled, or the
    /// deadline passes. Cancellation wins ties.
    pub async fn run<F, T>(&self, op: &'static str, fut: F) -> Result<T, RoomError>
    where
        F: Future<Output = T>,
    {
        self.check(op)?;

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(RoomError::Cancelled(op)),
            _ = deadline => Err(RoomError::DeadlineExceeded(op)),
            out = fut => Ok(out),
        }
    }
}
