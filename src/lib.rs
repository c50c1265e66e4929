//! Library root for `pinbot`.
//!
//! Pinbot is a Slack bot that pins images under short names:
//! - `!pin LINK NAME` downloads an image and stores it forever
//! - `!show NAME` posts a random image pinned under a name
//! - `!list NAME` posts every image pinned under a name
//!
//! Images live in S3 under content-derived keys, so pinning the same image
//! twice is a no-op. The architecture is built around extensible traits that
//! allow for different implementations of the chat transport and the blob store.

#[deny(missing_docs)]
pub mod base;
pub mod interaction;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use rustls::crypto;
use tracing::{info, warn};

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the pinbot runtime:
/// - Initializes the crypto provider
/// - Creates the runtime context with chat, storage, and HTTP clients
/// - Runs the event loop until the transport fails
pub async fn start(config: Config) -> Void {
    info!("Starting pinbot ...");

    // Start the crypto provider.
    if crypto::aws_lc_rs::default_provider().install_default().is_err() {
        warn!("A crypto provider was already installed.");
    }

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config).await?;

    // Start the runtime.
    runtime.start().await
}
