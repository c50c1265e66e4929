//! Prefix-triggered text commands.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use regex::Regex;
use tracing::{Instrument, debug, info_span, instrument, warn};

use crate::{
    base::{
        error::{BotError, BotResult},
        types::{Event, MessageEvent, PostOptions, Res, Void},
    },
    service::chat::ChatClient,
};

use super::{context::DispatchContext, observer::Observer};

/// The name of the built-in command that lists every other command.
pub const HELP_COMMAND: &str = "help";

// Traits.

/// A high-level handler that runs when a message starts with the command
/// prefix and the command's name.
#[async_trait]
pub trait Command: Send + Sync + 'static {
    /// A short description of this command.
    fn help(&self) -> String;

    /// Run the command.
    ///
    /// `text` is the message text with the prefix, the command name, and any
    /// whitespace after it removed. A non-empty reply is posted back to the
    /// channel the message came from.
    async fn run(&self, ctx: &DispatchContext, text: &str, message: &MessageEvent) -> Res<String>;
}

// Structs.

/// Muxes messages over a table of named [`Command`]s.
///
/// Commands are registered before the event loop starts; the table is
/// read-only after that.
pub struct CommandRouter {
    chat: ChatClient,
    prefix: char,
    trigger: Regex,
    commands: BTreeMap<String, Arc<dyn Command>>,
}

impl CommandRouter {
    /// Creates a router for messages that start with `prefix`.
    pub fn new(chat: ChatClient, prefix: char) -> BotResult<Self> {
        let pattern = format!(r"^{}([A-Za-z0-9_]+)\s*", regex::escape(&prefix.to_string()));
        let trigger = Regex::new(&pattern).map_err(|e| BotError::Configuration(format!("bad command prefix {prefix:?}: {e}")))?;

        Ok(Self {
            chat,
            prefix,
            trigger,
            commands: BTreeMap::new(),
        })
    }

    /// Registers `command` under `name`.
    ///
    /// Registering a name twice is a configuration error; the first command
    /// stays in place.
    pub fn register(&mut self, name: &str, command: impl Command) -> BotResult<()> {
        if name == HELP_COMMAND || self.commands.contains_key(name) {
            return Err(BotError::Configuration(format!("can't register the `{name}` command twice")));
        }

        self.commands.insert(name.to_string(), Arc::new(command));

        Ok(())
    }

    /// Names of every registered command, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    fn help(&self) -> String {
        self.commands.iter().map(|(name, command)| format!("{}{name} - {}", self.prefix, command.help())).collect::<Vec<_>>().join("\n")
    }

    fn is_own_message(&self, message: &MessageEvent) -> bool {
        message.user_id == self.chat.bot_user_id() || (!message.username.is_empty() && message.username == self.chat.bot_name())
    }

    async fn reply(&self, ctx: &DispatchContext, channel_id: &str, text: &str) -> Void {
        ctx.guard(self.chat.post_message(channel_id, text, PostOptions::default())).await
    }
}

#[async_trait]
impl Observer for CommandRouter {
    fn name(&self) -> &str {
        "commands"
    }

    #[instrument(name = "CommandRouter::observe", skip_all)]
    async fn observe(&self, ctx: &DispatchContext, event: &Event) -> Void {
        let Event::Message(message) = event else {
            return Ok(());
        };

        if self.is_own_message(message) {
            return Ok(());
        }

        let Some(captures) = self.trigger.captures(&message.text) else {
            debug!("message not matched");
            return Ok(());
        };

        let (Some(matched), Some(name)) = (captures.get(0), captures.get(1)) else {
            return Ok(());
        };
        let name = name.as_str();
        let text = &message.text[matched.end()..];

        let reply = if name == HELP_COMMAND {
            self.help()
        } else {
            let Some(command) = self.commands.get(name) else {
                debug!(cmd = name, "cmd not found");
                return Ok(());
            };

            debug!(cmd = name, remaining_ms = ctx.remaining().as_millis() as u64, "running command");

            match command.run(ctx, text, message).instrument(info_span!("command", cmd = name)).await {
                Ok(reply) => reply,
                Err(err) => {
                    if !ctx.is_expired()
                        && let Err(post_err) = self.reply(ctx, &message.channel_id, BotError::user_message_for(&err)).await
                    {
                        warn!(error = format!("{post_err:#}"), "failed to post error reply");
                    }

                    return Err(err.context(format!("cmd - {name}")));
                }
            }
        };

        if !reply.is_empty() {
            self.reply(ctx, &message.channel_id, &reply).await.map_err(|e| e.context("chat.post_message"))?;
        }

        Ok(())
    }
}
