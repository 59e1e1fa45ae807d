//! Channel history sources.
//!
//! A [`HistorySource`] yields the messages of one channel inside a time
//! window, oldest first, as a lazy stream. The search handler only sees
//! this trait; platform payloads are adapted into [`MessageRecord`]s by
//! the implementations.

pub mod discord;
pub mod export;

use crate::error::SearchError;
use crate::models::{ChannelRef, MessageRecord, TimeWindow};
use futures::stream::BoxStream;

pub use discord::{DiscordHistory, DiscordHistoryConfig};
pub use export::ExportHistory;

/// Stream of messages produced by a history fetch.
pub type MessageStream<'a> = BoxStream<'a, Result<MessageRecord, SearchError>>;

/// Something that can replay a channel's message history.
pub trait HistorySource: Send + Sync {
    /// Stream the messages of `channel` posted inside `window`, ordered by
    /// creation time. Each call starts a fresh fetch.
    fn fetch<'a>(&'a self, channel: &'a ChannelRef, window: TimeWindow) -> MessageStream<'a>;
}
