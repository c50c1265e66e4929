//! Core components, types, and utilities for the pinbot.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - The error taxonomy and its user-facing messages.
//! - Common types and result handling.

pub mod config;
pub mod error;
pub mod types;
