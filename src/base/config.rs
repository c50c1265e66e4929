//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, sync::Arc, time::Duration};

use serde::Deserialize;

use super::{
    error::{BotError, BotResult},
    types::Res,
};

/// Default S3 domain used to build public image URLs.
fn default_img_public_domain() -> String {
    "s3.amazonaws.com".to_string()
}

/// Default time budget for handling a single event.
fn default_message_timeout_ms() -> u64 {
    2000
}

/// Default command trigger character.
fn default_command_prefix() -> char {
    '!'
}

/// Configuration for the pinbot application.
///
/// Constructed once at startup and handed to every component; it is never
/// mutated afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    /// The shared settings.
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// The settings themselves.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConfigInner {
    /// Slack app token used for socket mode (`PINBOT_SLACK_APP_TOKEN`).
    pub slack_app_token: String,
    /// Slack bot token (`PINBOT_SLACK_BOT_TOKEN`).
    pub slack_bot_token: String,
    /// Expected bot name; startup fails if Slack reports a different one (`PINBOT_BOT_NAME`).
    #[serde(default)]
    pub bot_name: Option<String>,
    /// The S3 bucket to store images in (`PINBOT_IMG_BUCKET`).
    pub img_bucket: String,
    /// The S3 prefix used to namespace images (`PINBOT_IMG_PREFIX`).
    pub img_prefix: String,
    /// The maximum allowed image size, in bytes (`PINBOT_IMG_MAX_SIZE_BYTES`).
    pub img_max_size_bytes: u64,
    /// Domain appended to the bucket name in public URLs (`PINBOT_IMG_PUBLIC_DOMAIN`).
    #[serde(default = "default_img_public_domain")]
    pub img_public_domain: String,
    /// AWS region override (`PINBOT_AWS_REGION`).
    #[serde(default)]
    pub aws_region: Option<String>,
    /// Custom S3 endpoint, for S3-compatible stores (`PINBOT_AWS_ENDPOINT`).
    #[serde(default)]
    pub aws_endpoint: Option<String>,
    /// The amount of time the bot may spend handling a single event (`PINBOT_MESSAGE_TIMEOUT_MS`).
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,
    /// The character that starts a command, e.g. `!` in `!pin` (`PINBOT_COMMAND_PREFIX`).
    #[serde(default = "default_command_prefix")]
    pub command_prefix: char,
}

impl Config {
    /// Loads settings from `PINBOT_*` environment variables and a TOML file,
    /// then validates them.
    ///
    /// The file is `explicit_path` when given, else `.hidden/config.toml` if it exists.
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(config::Environment::default().prefix("PINBOT"));

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        result.validate()?;

        Ok(result)
    }

    /// Checks the settings the bot cannot start without.
    pub fn validate(&self) -> BotResult<()> {
        if self.img_bucket.is_empty() || self.img_prefix.is_empty() {
            return Err(BotError::Configuration("an image bucket and prefix are both required".to_string()));
        }

        if self.img_prefix.starts_with('/') || self.img_prefix.ends_with('/') {
            return Err(BotError::Configuration("the image prefix must not start or end with `/`".to_string()));
        }

        if self.img_max_size_bytes == 0 {
            return Err(BotError::Configuration("the maximum image size must be greater than zero".to_string()));
        }

        if self.message_timeout_ms == 0 {
            return Err(BotError::Configuration("the message timeout must be greater than zero".to_string()));
        }

        if self.command_prefix.is_alphanumeric() || self.command_prefix == '_' || self.command_prefix.is_whitespace() {
            return Err(BotError::Configuration(format!("`{}` can't be used as a command prefix", self.command_prefix)));
        }

        Ok(())
    }

    /// The time budget for handling a single event.
    pub fn message_timeout(&self) -> Duration {
        Duration::from_millis(self.message_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ConfigInner {
        ConfigInner {
            img_bucket: "garf".to_string(),
            img_prefix: "lasagna".to_string(),
            img_max_size_bytes: 1024,
            img_public_domain: default_img_public_domain(),
            message_timeout_ms: default_message_timeout_ms(),
            command_prefix: default_command_prefix(),
            ..Default::default()
        }
    }

    fn config(inner: ConfigInner) -> Config {
        Config { inner: Arc::new(inner) }
    }

    #[test]
    fn accepts_a_complete_config() {
        let config = config(valid());
        assert!(config.validate().is_ok());
        assert_eq!(config.message_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn rejects_missing_bucket_settings() {
        let missing_bucket = config(ConfigInner { img_bucket: String::new(), ..valid() });
        let missing_size = config(ConfigInner { img_max_size_bytes: 0, ..valid() });

        assert!(matches!(missing_bucket.validate(), Err(BotError::Configuration(_))));
        assert!(matches!(missing_size.validate(), Err(BotError::Configuration(_))));
    }

    #[test]
    fn rejects_word_characters_as_prefix() {
        for prefix in ['a', '7', '_', ' '] {
            let config = config(ConfigInner { command_prefix: prefix, ..valid() });
            assert!(config.validate().is_err(), "prefix {prefix:?} should be rejected");
        }
    }
}
