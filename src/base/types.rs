//! Shared types: result aliases, inbound events, and outbound message options.

use std::time::Duration;

use futures::stream::BoxStream;

/// Application-level error.
pub type Err = anyhow::Error;
/// Application-level result.
pub type Res<T> = Result<T, Err>;
/// Application-level result with no value.
pub type Void = Res<()>;

/// The sequence of events delivered by a chat transport.
pub type EventStream = BoxStream<'static, Event>;

/// An inbound event from the chat transport.
///
/// Every event is consumed exactly once by the event loop and then discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A text message posted to a channel.
    Message(MessageEvent),
    /// The transport (re)established its connection.
    Connected,
    /// Round-trip latency measured by the transport.
    LatencyReport(Duration),
    /// A keepalive ping.
    Ping(u64),
    /// The transport failed; this is fatal to the event loop.
    TransportError(String),
}

/// A text message seen in a channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageEvent {
    /// The channel the message was posted to, and where replies go.
    pub channel_id: String,
    /// The author's user id.
    pub user_id: String,
    /// The author's display name, when the transport knows it.
    pub username: String,
    /// The raw message text.
    pub text: String,
}

/// Formatting flags for an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostOptions {
    /// Let the chat service parse the text. When false, Slack gets
    /// `parse=none` and leaves names, channels and links as written.
    pub markdown: bool,
    /// Let the chat service expand previews for links.
    pub unfurl_links: bool,
    /// Let the chat service expand previews for images and video.
    pub unfurl_media: bool,
}

impl Default for PostOptions {
    fn default() -> Self {
        Self {
            markdown: true,
            unfurl_links: false,
            unfurl_media: true,
        }
    }
}
