//! The commands pinbot ships with.

use async_trait::async_trait;
use chrono::Utc;
use rand::seq::IndexedRandom;
use reqwest::Url;
use tracing::{debug, info};

use crate::{
    base::{
        error::BotError,
        types::{MessageEvent, Res},
    },
    service::{
        fetch::Fetcher,
        store::{ImageStore, Img, Metadata, key::{ImageId, is_valid_name}},
    },
};

use super::{context::DispatchContext, router::Command};

/// Reply when an identical image is already pinned under a name.
pub const ALREADY_PINNED: &str = "that pin already exists! pins are forever.";

/// Reply when a name has no images.
pub const NOTHING_THERE: &str = "there's nothing there :(";

/// Reply when a pin name has characters outside `[A-Za-z0-9_-]`.
pub const INVALID_NAME: &str = "you made an opps! that's not a valid pin name ^[A-Za-z0-9_-]+$.";

/// Reply when a pin link isn't an http(s) URL.
pub const INVALID_URL: &str = "you made an opps! that's not a valid URL.";

/// Reply after a successful pin.
pub const PINNED: &str = "k";

fn usage(prefix: char, example: &str) -> String {
    format!("opps! try `{prefix}{example}` instead.")
}

/// Parses a link the way chat clients send them: optionally wrapped in
/// `<…>`, optionally followed by `|label`.
fn parse_link(link: &str) -> Result<Url, BotError> {
    let link = link.strip_prefix('<').and_then(|link| link.strip_suffix('>')).unwrap_or(link);
    let link = link.split_once('|').map_or(link, |(url, _label)| url);

    let url = Url::parse(link).map_err(|e| BotError::validation(format!("`{link}` is not a url: {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(BotError::validation(format!("`{scheme}` links can't be pinned"))),
    }
}

/// Splits the command text into exactly `N` whitespace-separated arguments.
fn args<const N: usize>(text: &str) -> Option<[&str; N]> {
    let args: Vec<&str> = text.split_whitespace().collect();
    args.try_into().ok()
}

// Echo.

/// Echoes text back to the channel.
pub struct Echo;

#[async_trait]
impl Command for Echo {
    fn help(&self) -> String {
        "say something back".to_string()
    }

    async fn run(&self, _ctx: &DispatchContext, text: &str, _message: &MessageEvent) -> Res<String> {
        Ok(text.to_string())
    }
}

// Pin.

/// Downloads an image and pins it under a name.
pub struct Pin {
    fetcher: Fetcher,
    store: ImageStore,
    max_bytes: u64,
    prefix: char,
}

impl Pin {
    pub fn new(fetcher: Fetcher, store: ImageStore, max_bytes: u64, prefix: char) -> Self {
        Self { fetcher, store, max_bytes, prefix }
    }
}

#[async_trait]
impl Command for Pin {
    fn help(&self) -> String {
        "pin an image. forever.".to_string()
    }

    async fn run(&self, ctx: &DispatchContext, text: &str, message: &MessageEvent) -> Res<String> {
        let Some([link, name]) = args::<2>(text) else {
            return Ok(usage(self.prefix, "pin LINK NAME"));
        };

        let url = match parse_link(link) {
            Ok(url) => url,
            Err(err) => {
                debug!(error = %err, "bad link");
                return Ok(INVALID_URL.to_string());
            }
        };

        if !is_valid_name(name) {
            return Ok(INVALID_NAME.to_string());
        }

        let fetched = self.fetcher.fetch(ctx, &url, self.max_bytes).await?;

        let id = ImageId::for_content(&fetched.bytes);
        if self.store.contains(ctx, name, id, fetched.filetype).await? {
            debug!(%id, name, "already pinned");
            return Ok(ALREADY_PINNED.to_string());
        }

        let uploader = if message.username.is_empty() { &message.user_id } else { &message.username };
        let metadata = Metadata::from([
            ("uploaded-by".to_string(), uploader.clone()),
            ("uploaded-at".to_string(), Utc::now().to_rfc3339()),
            ("original-url".to_string(), url.to_string()),
        ]);

        let img = self.store.add(ctx, name, fetched.filetype, fetched.bytes, metadata).await?;
        info!(url = img.url(), name, "pinned");

        Ok(PINNED.to_string())
    }
}

// Show.

/// Shows a random image pinned under a name.
pub struct Show {
    store: ImageStore,
    prefix: char,
}

impl Show {
    pub fn new(store: ImageStore, prefix: char) -> Self {
        Self { store, prefix }
    }
}

#[async_trait]
impl Command for Show {
    fn help(&self) -> String {
        "show a pinned image".to_string()
    }

    async fn run(&self, ctx: &DispatchContext, text: &str, _message: &MessageEvent) -> Res<String> {
        let Some([name]) = args::<1>(text) else {
            return Ok(usage(self.prefix, "show NAME"));
        };

        if !is_valid_name(name) {
            return Ok(INVALID_NAME.to_string());
        }

        let imgs = self.store.list(ctx, name).await?;
        let chosen = imgs.choose(&mut rand::rng()).map(|img| img.url().to_string());

        Ok(chosen.unwrap_or_else(|| NOTHING_THERE.to_string()))
    }
}

// List.

/// Lists every image pinned under a name.
pub struct List {
    store: ImageStore,
    prefix: char,
}

impl List {
    pub fn new(store: ImageStore, prefix: char) -> Self {
        Self { store, prefix }
    }
}

#[async_trait]
impl Command for List {
    fn help(&self) -> String {
        "list every image pinned under a name".to_string()
    }

    async fn run(&self, ctx: &DispatchContext, text: &str, _message: &MessageEvent) -> Res<String> {
        let Some([name]) = args::<1>(text) else {
            return Ok(usage(self.prefix, "list NAME"));
        };

        if !is_valid_name(name) {
            return Ok(INVALID_NAME.to_string());
        }

        let imgs = self.store.list(ctx, name).await?;
        if imgs.is_empty() {
            return Ok(NOTHING_THERE.to_string());
        }

        let noun = if imgs.len() == 1 { "image" } else { "images" };
        let urls = imgs.iter().map(Img::url).collect::<Vec<_>>().join("\n");

        Ok(format!("{name} has {} {noun}:\n{urls}", imgs.len()))
    }
}
