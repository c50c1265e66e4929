//! Observers and the chain that runs them for each event.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{Instrument, debug, error, info_span, instrument};

use crate::base::types::{Event, Void};

use super::context::DispatchContext;

// Traits.

/// A low-level hook into the chat stream.
///
/// Observers are called with a [`DispatchContext`] for every event the
/// transport delivers, and must respect its deadline for any I/O they do.
#[async_trait]
pub trait Observer: Send + Sync + 'static {
    /// A short name used in logs.
    fn name(&self) -> &str;

    /// Handle a single event.
    async fn observe(&self, ctx: &DispatchContext, event: &Event) -> Void;
}

// Structs.

/// What happened while running a chain for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChainReport {
    /// Observers that were invoked.
    pub invoked: usize,
    /// Invoked observers that returned an error.
    pub failed: usize,
    /// Observers skipped because the context expired.
    pub skipped: usize,
}

/// The ordered set of observers that every event is handed to.
///
/// The chain is built once before the event loop starts and is read-only
/// afterwards.
#[derive(Clone, Default)]
pub struct ObserverChain {
    observers: Vec<Arc<dyn Observer>>,
}

impl ObserverChain {
    pub fn new(observers: Vec<Arc<dyn Observer>>) -> Self {
        Self { observers }
    }

    /// Hands the event to every observer, sequentially and in registration order.
    ///
    /// An observer error is logged and the chain moves on. Once the context
    /// has expired the remaining observers are skipped. Each observer runs in
    /// its own span under the context's event span.
    #[instrument(parent = ctx.span(), skip_all)]
    pub async fn observe(&self, ctx: &DispatchContext, event: &Event) -> ChainReport {
        let mut report = ChainReport::default();

        for (index, observer) in self.observers.iter().enumerate() {
            report.invoked += 1;

            let span = info_span!(parent: ctx.span(), "observer", name = observer.name());

            if let Err(err) = observer.observe(ctx, event).instrument(span.clone()).await {
                report.failed += 1;
                span.in_scope(|| error!(error = format!("{err:#}"), "error observing event"));
            }

            if ctx.is_expired() {
                report.skipped = self.observers.len() - index - 1;
                span.in_scope(|| error!(skipped = report.skipped, "timed out"));
                break;
            }
        }

        debug!(invoked = report.invoked, failed = report.failed, skipped = report.skipped, "chain complete");

        report
    }
}
