//! Instagram posting integration.
//!
//! Implements [`interfaces::Publisher`] against the Graph-style content
//! publishing flow: resolve the account once (cached in a session file),
//! then publish each photo in two steps, creating a media container and
//! publishing the container.

pub mod client;
pub mod session;

pub use client::InstaClient;
pub use session::Session;
