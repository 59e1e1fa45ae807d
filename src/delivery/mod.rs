//! Response sinks.
//!
//! A [`ResponseSink`] hands a text response, optionally with one file
//! attached, back to whoever invoked the search.

pub mod discord;
pub mod local;

use crate::models::Attachment;
use anyhow::Result;
use async_trait::async_trait;

pub use discord::DiscordChannelSink;
pub use local::LocalSink;

/// Destination for search responses.
#[async_trait]
pub trait ResponseSink: Send + Sync {
    /// Deliver `text`, with `attachment` if one is given.
    async fn send(&self, text: &str, attachment: Option<Attachment>) -> Result<()>;
}
