//! Service integrations for external APIs and clients.
//!
//! This module contains implementations for the services pinbot talks to:
//! - Chat services (e.g., Slack)
//! - Blob storage for pinned images (e.g., S3)
//! - Plain HTTP for fetching images
//!
//! Chat and storage define both generic traits and concrete implementations,
//! allowing for extensibility and easy testing.

pub mod chat;
pub mod fetch;
pub mod store;
