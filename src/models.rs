//! Data models for keyword tallies.
//!
//! This module contains the value types shared by the history sources,
//! the aggregator, the report renderers and the response sinks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single chat message, adapted from the platform at the edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Name the author is shown under in the channel.
    pub author_display_name: String,
    /// When the message was posted.
    pub created_at: DateTime<Utc>,
    /// Raw message text.
    pub content: String,
    /// Whether the author is a bot or webhook.
    #[serde(default)]
    pub is_automated: bool,
}

impl MessageRecord {
    /// Creates a message written by a human author.
    pub fn new(
        author: impl Into<String>,
        created_at: DateTime<Utc>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            author_display_name: author.into(),
            created_at,
            content: content.into(),
            is_automated: false,
        }
    }
}

/// One line of the ranking: an author and how many messages matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub author: String,
    pub count: usize,
}

/// Inclusive range of instants a search covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Returns true when `instant` lies in `[start, end]`.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }

    /// Returns true when no instant can satisfy the window.
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

/// A channel whose history is searched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    /// Platform channel id.
    pub id: String,
    /// Human-readable label used instead of a mention (e.g. an export file).
    pub label: Option<String>,
}

impl ChannelRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
        }
    }

    pub fn labeled(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: Some(label.into()),
        }
    }

    /// Returns the text used to point the reader at this channel.
    pub fn mention(&self) -> String {
        match self.label {
            Some(ref label) => label.clone(),
            None => format!("<#{}>", self.id),
        }
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mention())
    }
}

/// A file sent along with a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}
