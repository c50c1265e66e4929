//! The main event loop.

use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, instrument};
use uuid::Uuid;

use crate::{
    base::{
        error::BotError,
        types::{Event, Void},
    },
    service::chat::ChatClient,
};

use super::{
    context::DispatchContext,
    observer::{ChainReport, ObserverChain},
};

/// Pulls events off the transport and hands each one to the observer chain
/// on its own task.
///
/// Events are handled concurrently with no ordering between them; each gets
/// a fresh [`DispatchContext`] that expires after the configured timeout.
#[derive(Clone)]
pub struct EventLoop {
    chat: ChatClient,
    chain: Arc<ObserverChain>,
    timeout: Duration,
    shutdown: CancellationToken,
}

impl EventLoop {
    pub fn new(chat: ChatClient, chain: ObserverChain, timeout: Duration) -> Self {
        Self {
            chat,
            chain: Arc::new(chain),
            timeout,
            shutdown: CancellationToken::new(),
        }
    }

    /// The root token every dispatch context derives from.
    ///
    /// Cancelling it stops the loop and expires every event in flight.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Consume the transport's events until it fails.
    ///
    /// This only ever returns an error: a transport error, the stream ending,
    /// or a shutdown are all fatal. In-flight events are cancelled on the way out.
    #[instrument(name = "EventLoop::run", skip_all)]
    pub async fn run(&self) -> Void {
        let mut events = self.chat.connect().await?;

        let fatal = loop {
            let next = tokio::select! {
                _ = self.shutdown.cancelled() => break BotError::Fatal("shutdown requested".to_string()),
                next = events.next() => next,
            };

            let Some(event) = next else {
                break BotError::Fatal("event stream closed".to_string());
            };

            match &event {
                Event::TransportError(reason) => {
                    error!(reason, "unhandled transport error");
                    break BotError::Fatal(reason.clone());
                }
                Event::Connected => info!("connected"),
                Event::LatencyReport(latency) => debug!(latency_ms = latency.as_millis() as u64, "latency report"),
                Event::Ping(id) => debug!(ping_id = id, "ping"),
                Event::Message(_) => {}
            }

            self.dispatch(event);
        };

        self.shutdown.cancel();

        Err(fatal.into())
    }

    /// Runs the observer chain for one event on a new task.
    ///
    /// The event's deadline starts now, not when the task is first polled.
    pub fn dispatch(&self, event: Event) -> JoinHandle<ChainReport> {
        let request_id = Uuid::new_v4();
        let span = info_span!("event", %request_id);
        let ctx = DispatchContext::new(&self.shutdown, self.timeout, span.clone());
        let chain = self.chain.clone();

        tokio::spawn(
            async move {
                let started = Instant::now();
                let report = chain.observe(&ctx, &event).await;
                debug!(elapsed_ms = started.elapsed().as_millis() as u64, "event handled");
                report
            }
            .instrument(span),
        )
    }
}
