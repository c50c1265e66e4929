//! Error taxonomy shared by the store, the fetcher, and the dispatch pipeline.

use std::error::Error as StdError;

use thiserror::Error;

/// Reply used when something failed on our side.
pub const GENERIC_ERROR_RESPONSE: &str = "opps. something went wrong.";

/// Errors with a well-defined meaning toward the user.
///
/// Detail stays in the `Display` output for logs; [`BotError::user_message`]
/// is the only text that ever goes back to the chat.
#[derive(Debug, Error)]
pub enum BotError {
    /// Missing or inconsistent settings; fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Bad user input: a malformed name, link, or filetype.
    #[error("validation error: {0}")]
    Validation(String),

    /// The blob backend failed.
    #[error("storage error: {context}: {source}")]
    Storage {
        /// The operation that failed.
        context: String,
        /// The backend's error.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// A network call failed.
    #[error("transport error: {context}: {source}")]
    Transport {
        /// The operation that failed.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// A download was larger than allowed.
    #[error("response exceeded the {limit} byte limit")]
    SizeExceeded {
        /// The limit, in bytes.
        limit: u64,
    },

    /// Downloaded content is not an image type we store.
    #[error("unsupported content type: {0}")]
    UnsupportedType(String),

    /// The event's time budget ran out.
    #[error("timed out")]
    Timeout,

    /// The transport is gone; the process should exit.
    #[error("fatal transport error: {0}")]
    Fatal(String),
}

impl BotError {
    /// Wraps a backend error.
    #[must_use]
    pub fn storage<E>(context: impl Into<String>, source: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self::Storage {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Wraps a network error.
    #[must_use]
    pub fn transport<E>(context: impl Into<String>, source: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self::Transport {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Rejects user input.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Returns a user-friendly message suitable for posting back to the channel.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            BotError::Validation(_) => "you made an opps! check that and try again.",
            BotError::SizeExceeded { .. } | BotError::UnsupportedType(_) => "you made an opps! i can't pin that.",
            BotError::Timeout => "opps. that took too long.",
            BotError::Configuration(_) | BotError::Storage { .. } | BotError::Transport { .. } | BotError::Fatal(_) => GENERIC_ERROR_RESPONSE,
        }
    }

    /// Finds the user-facing message for an arbitrary application error.
    #[must_use]
    pub fn user_message_for(err: &anyhow::Error) -> &'static str {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<BotError>())
            .map_or(GENERIC_ERROR_RESPONSE, BotError::user_message)
    }
}

/// Result for operations with a well-defined failure taxonomy.
pub type BotResult<T> = std::result::Result<T, BotError>;
