//! Per-event dispatch context.

use std::{future::Future, time::Duration};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::base::error::BotError;

/// Everything an observer needs to handle one event: a deadline, a
/// cancellation token, and the span that all of its logging belongs to.
///
/// A fresh context is created for every event and dropped with the task
/// that owns it.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    token: CancellationToken,
    deadline: Instant,
    span: Span,
}

impl DispatchContext {
    /// Creates a context that expires after `timeout`, or as soon as `parent` is cancelled.
    pub fn new(parent: &CancellationToken, timeout: Duration, span: Span) -> Self {
        Self {
            token: parent.child_token(),
            deadline: Instant::now() + timeout,
            span,
        }
    }

    /// Creates a context that isn't tied to any event loop.
    pub fn detached(timeout: Duration) -> Self {
        Self::new(&CancellationToken::new(), timeout, Span::current())
    }

    /// The event's span; work done for the event is logged under it.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Expires this context immediately.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled() || Instant::now() >= self.deadline
    }

    /// Runs `fut` until it completes or this context expires, whichever comes first.
    ///
    /// An expired context aborts the future in flight and yields [`BotError::Timeout`].
    pub async fn guard<F, T, E>(&self, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<BotError>,
    {
        if self.is_expired() {
            return Err(BotError::Timeout.into());
        }

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(BotError::Timeout.into()),
            _ = tokio::time::sleep_until(self.deadline) => Err(BotError::Timeout.into()),
            result = fut => result,
        }
    }
}
