//! Event handling and user interactions for pinbot.
//!
//! Events flow from the [`event_loop::EventLoop`] through the
//! [`observer::ObserverChain`] to observers such as the
//! [`router::CommandRouter`], which runs the [`commands`].

pub mod commands;
pub mod context;
pub mod event_loop;
pub mod observer;
pub mod router;
