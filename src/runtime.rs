//! Runtime services and shared state for pinbot.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::{
    base::{
        config::Config,
        error::BotResult,
        types::{Res, Void},
    },
    interaction::{
        commands::{Echo, List, Pin, Show},
        event_loop::EventLoop,
        observer::{Observer, ObserverChain},
        router::CommandRouter,
    },
    service::{
        chat::ChatClient,
        fetch::Fetcher,
        store::{BlobClient, ImageStore},
    },
};

/// Runtime service context that can be shared across the application.
///
/// This struct holds the chat client, the image store, the fetcher, and the
/// configuration. It is designed to be trivially cloneable, allowing it to be
/// passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The chat client instance.
    pub chat: ChatClient,
    /// The image store instance.
    pub store: ImageStore,
    /// The HTTP client used to download images.
    pub fetcher: Fetcher,
}

impl Runtime {
    /// Create a new runtime instance backed by Slack and S3.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<Self> {
        // Initialize the slack client.
        let chat = ChatClient::slack(&config).await?;

        // Initialize the blob backend.
        let blobs = BlobClient::s3(&config).await;

        Ok(Self::with_clients(config, chat, blobs)?)
    }

    /// Create a runtime from already-built clients.
    pub fn with_clients(config: Config, chat: ChatClient, blobs: BlobClient) -> BotResult<Self> {
        let store = ImageStore::new(&config, blobs);
        let fetcher = Fetcher::new()?;

        Ok(Self { config, chat, store, fetcher })
    }

    /// Build the command router with every command pinbot ships with.
    pub fn router(&self) -> BotResult<CommandRouter> {
        let prefix = self.config.command_prefix;
        let mut router = CommandRouter::new(self.chat.clone(), prefix)?;

        router.register("echo", Echo)?;
        router.register("pin", Pin::new(self.fetcher.clone(), self.store.clone(), self.config.img_max_size_bytes, prefix))?;
        router.register("show", Show::new(self.store.clone(), prefix))?;
        router.register("list", List::new(self.store.clone(), prefix))?;

        info!(commands = ?router.names().collect::<Vec<_>>(), "registered commands");

        Ok(router)
    }

    /// Build the event loop and the observer chain it feeds.
    pub fn event_loop(&self) -> BotResult<EventLoop> {
        let observers: Vec<Arc<dyn Observer>> = vec![Arc::new(self.router()?)];

        Ok(EventLoop::new(self.chat.clone(), ObserverChain::new(observers), self.config.message_timeout()))
    }

    /// Run the bot until the transport fails or the process is interrupted.
    ///
    /// This only returns with an error.
    pub async fn start(&self) -> Void {
        let event_loop = self.event_loop()?;
        let shutdown = event_loop.shutdown_token();

        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl-C, shutting down ...");
                shutdown.cancel();
            }
        });

        event_loop.run().await
    }
}
