pub mod slack;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::{EventStream, PostOptions, Res, Void};

// Traits.

/// Generic "chat" trait that transports must implement.
///
/// A transport owns the live connection to the chat platform: it delivers
/// the inbound event sequence and posts replies. Reconnection is its own
/// business; the event loop only sees the resulting events.
#[async_trait]
pub trait GenericChatClient: Send + Sync + 'static {
    /// Get the bot user ID.
    ///
    /// Messages authored by this user are never dispatched to commands.
    fn bot_user_id(&self) -> &str;

    /// Get the bot's display name.
    fn bot_name(&self) -> &str;

    /// Connect and start delivering events.
    ///
    /// The stream ends with an [`crate::base::types::Event::TransportError`]
    /// when the connection is lost for good.
    async fn connect(&self) -> Res<EventStream>;

    /// Post a message to a channel.
    async fn post_message(&self, channel_id: &str, text: &str, options: PostOptions) -> Void;
}

// Structs.

/// Chat client for the application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<dyn GenericChatClient>,
}

impl Deref for ChatClient {
    type Target = dyn GenericChatClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl ChatClient {
    pub fn new(inner: Arc<dyn GenericChatClient>) -> Self {
        Self { inner }
    }
}
