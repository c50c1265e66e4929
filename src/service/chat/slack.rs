//! Slack transport for pinbot.
//!
//! Events arrive over socket mode and are forwarded into a channel that the
//! event loop consumes as a stream; replies go out through `chat.postMessage`.

use crate::base::{
    config::Config,
    types::{Event, EventStream, MessageEvent, PostOptions, Res, Void},
};
use anyhow::anyhow;
use async_trait::async_trait;
use futures::{StreamExt, channel::mpsc};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use slack_morphism::prelude::*;
use tracing::{debug, error, info, instrument, warn};

use std::sync::Arc;

use super::{ChatClient, GenericChatClient};

// Type aliases.

type FullClient = slack_morphism::SlackClient<SlackClientHyperConnector<HttpsConnector<HttpConnector>>>;

// Extra methods on `ChatClient` applied by the slack implementation.

impl ChatClient {
    /// Creates a new Slack chat client.
    pub async fn slack(config: &Config) -> Res<Self> {
        let client = SlackChatClient::new(config).await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Structs.

/// User state for the slack socket client.
struct SlackUserState {
    events: mpsc::UnboundedSender<Event>,
}

/// Slack client implementation.
#[derive(Clone)]
struct SlackChatClient {
    app_token: SlackApiToken,
    bot_token: SlackApiToken,
    bot_user_id: String,
    bot_name: String,
    client: Arc<FullClient>,
}

impl SlackChatClient {
    /// Create a new Slack chat client.
    ///
    /// This runs an auth test against Slack: the bot's user id and name come
    /// from the response, and a configured `bot_name` must match it.
    #[instrument(name = "SlackChatClient::new", skip_all)]
    pub async fn new(config: &Config) -> Res<Self> {
        // Initialize tokens.

        let app_token = SlackApiToken::new(SlackApiTokenValue(config.slack_app_token.clone()));
        let bot_token = SlackApiToken::new(SlackApiTokenValue(config.slack_bot_token.clone()));

        // Initialize the Slack client.

        let https_connector = HttpsConnector::<HttpConnector>::builder().with_native_roots()?.https_only().enable_all_versions().build();
        let connector = SlackClientHyperConnector::with_connector(https_connector);
        let client = Arc::new(slack_morphism::SlackClient::new(connector));

        // Test auth and learn who we are.

        let session = client.open_session(&bot_token);
        let auth = session.auth_test().await?;
        let bot_user_id = auth.user_id.0;
        let bot_name = auth.user.unwrap_or_default();

        if let Some(expected) = &config.bot_name
            && *expected != bot_name
        {
            return Err(anyhow!("testauth: configured and actual usernames differ: configured={expected:?} actual={bot_name:?}"));
        }

        info!("Slack bot user ID: {} ({})", bot_user_id, bot_name);

        Ok(Self {
            app_token,
            bot_token,
            bot_user_id,
            bot_name,
            client,
        })
    }
}

#[async_trait]
impl GenericChatClient for SlackChatClient {
    fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    fn bot_name(&self) -> &str {
        &self.bot_name
    }

    async fn connect(&self) -> Res<EventStream> {
        let (sender, receiver) = mpsc::unbounded();

        // Initialize the socket mode listener.

        let socket_mode_callbacks = SlackSocketModeListenerCallbacks::new().with_push_events(handle_push_event);

        let listener_environment = Arc::new(SlackClientEventsListenerEnvironment::new(self.client.clone()).with_user_state(SlackUserState { events: sender.clone() }));

        let socket_mode_listener = SlackClientSocketModeListener::new(&SlackClientSocketModeConfig::new(), listener_environment, socket_mode_callbacks);

        let app_token = self.app_token.clone();

        tokio::spawn(async move {
            // Register an app token to listen for events.
            if let Err(err) = socket_mode_listener.listen_for(&app_token).await {
                error!("Socket mode registration failed: {}", err);
                let _ = sender.unbounded_send(Event::TransportError(format!("socket mode registration failed: {err}")));
                return;
            }

            let _ = sender.unbounded_send(Event::Connected);

            // Serve until the listener shuts down (on Ctrl-C).
            socket_mode_listener.serve().await;

            let _ = sender.unbounded_send(Event::TransportError("socket mode listener stopped".to_string()));
        });

        Ok(receiver.boxed())
    }

    #[instrument(skip(self, text))]
    async fn post_message(&self, channel_id: &str, text: &str, options: PostOptions) -> Void {
        let request = post_request(channel_id, text, options);
        let session = self.client.open_session(&self.bot_token);

        let _ = session.chat_post_message(&request).await.map_err(|e| anyhow!("Failed to send message: {}", e))?;

        Ok(())
    }
}

/// Builds a `chat.postMessage` request.
///
/// Without `markdown`, Slack is told `parse=none`, so names, channels and
/// links are left exactly as written.
fn post_request(channel_id: &str, text: &str, options: PostOptions) -> SlackApiChatPostMessageRequest {
    let message = SlackMessageContent::new().with_text(text.to_string());

    let request = SlackApiChatPostMessageRequest::new(SlackChannelId(channel_id.to_string()), message)
        .with_unfurl_links(options.unfurl_links)
        .with_unfurl_media(options.unfurl_media);

    if options.markdown { request } else { request.with_parse("none".to_string()) }
}

/// Converts a Slack message into an [`MessageEvent`], if it carries text and a channel.
fn message_event(message: &SlackMessageEvent) -> Option<MessageEvent> {
    let channel_id = message.origin.channel.as_ref()?.0.clone();
    let text = message.content.as_ref()?.text.clone()?;

    Some(MessageEvent {
        channel_id,
        user_id: message.sender.user.as_ref().map(|user| user.0.clone()).unwrap_or_default(),
        username: message.sender.username.clone().unwrap_or_default(),
        text,
    })
}

// Socket mode listener callbacks for Slack.

/// Handles push events from Slack.
async fn handle_push_event(event_callback: SlackPushEventCallback, _client: Arc<SlackHyperClient>, states: SlackClientEventsUserState) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let states = states.read().await;
    let user_state = states.get_user_state::<SlackUserState>().ok_or(anyhow!("Failed to get user state"))?;

    match event_callback.event {
        SlackEventCallbackBody::Message(slack_message_event) => {
            let Some(event) = message_event(&slack_message_event) else {
                debug!("Skipping message event without a channel or text.");
                return Ok(());
            };

            user_state.events.unbounded_send(Event::Message(event)).map_err(|e| anyhow!("event loop is gone: {}", e))?;
        }
        _ => {
            warn!("Received unhandled push event.")
        }
    }

    Ok(())
}
