//! Discord REST history source.
//!
//! Pages through `GET /channels/{id}/messages` with an `after` cursor,
//! starting at the snowflake that corresponds to the window start and
//! stopping at the first message posted after the window end.

use super::{HistorySource, MessageStream};
use crate::error::SearchError;
use crate::models::{ChannelRef, MessageRecord, TimeWindow};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// Milliseconds between the Unix epoch and the Discord epoch (2015-01-01).
pub const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;

/// Largest page the messages endpoint hands out.
pub const MAX_PAGE_SIZE: usize = 100;

/// Snowflakes keep the timestamp in their upper 42 bits.
const SNOWFLAKE_TIMESTAMP_BITS: u32 = 42;

/// Connection settings for the Discord API.
#[derive(Debug, Clone)]
pub struct DiscordHistoryConfig {
    pub api_base: String,
    pub bot_token: String,
    pub page_size: usize,
    pub timeout_seconds: u64,
}

/// Message history read from the Discord REST API.
pub struct DiscordHistory {
    config: DiscordHistoryConfig,
    http_client: reqwest::Client,
}

/// Message payload, reduced to the fields a search needs.
#[derive(Debug, Deserialize)]
struct DiscordMessage {
    id: String,
    #[serde(default)]
    content: String,
    timestamp: DateTime<Utc>,
    author: DiscordAuthor,
    #[serde(default)]
    member: Option<DiscordMember>,
    #[serde(default)]
    webhook_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscordAuthor {
    username: String,
    #[serde(default)]
    global_name: Option<String>,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct DiscordMember {
    #[serde(default)]
    nick: Option<String>,
}

impl DiscordMessage {
    fn snowflake(&self) -> Result<u64> {
        self.id
            .trim()
            .parse::<u64>()
            .with_context(|| format!("Invalid Discord message id: {}", self.id))
    }

    /// Adapt the payload into a platform-neutral record.
    ///
    /// The display name follows Discord's precedence: server nickname,
    /// then global name, then username. Channel history responses usually
    /// carry no `member` object, so the nickname only applies when the
    /// payload includes one.
    fn into_record(self) -> MessageRecord {
        let non_empty = |name: &String| !name.is_empty();
        let author_display_name = self
            .member
            .and_then(|m| m.nick)
            .filter(non_empty)
            .or(self.author.global_name.filter(non_empty))
            .unwrap_or(self.author.username);

        let mut record = MessageRecord::new(author_display_name, self.timestamp, self.content);
        record.is_automated = self.author.bot || self.webhook_id.is_some();
        record
    }
}

/// Pagination state between two page requests.
struct PageCursor {
    after: u64,
    exhausted: bool,
}

/// Largest snowflake strictly older than `instant`.
///
/// Used as an exclusive `after` cursor so that messages posted in the
/// same millisecond as `instant` are still returned. Returns `None` when
/// `instant` lies beyond the range a snowflake timestamp can encode.
pub fn snowflake_floor(instant: DateTime<Utc>) -> Option<u64> {
    let millis = instant.timestamp_millis() - DISCORD_EPOCH_MS;
    if millis <= 0 {
        return Some(0);
    }

    u64::try_from(millis)
        .ok()
        .filter(|millis| *millis < 1u64 << SNOWFLAKE_TIMESTAMP_BITS)
        .and_then(|millis| millis.checked_shl(22))
        .map(|floor| floor - 1)
}

impl DiscordHistory {
    /// Create a history source for the given API settings.
    pub fn new(config: DiscordHistoryConfig) -> Result<Self> {
        info!("Using Discord API at {}", config.api_base);

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Request one page of messages newer than `after`.
    async fn fetch_page(
        &self,
        channel_id: &str,
        after: u64,
    ) -> Result<Vec<DiscordMessage>, SearchError> {
        let url = format!(
            "{}/channels/{}/messages",
            self.config.api_base.trim_end_matches('/'),
            channel_id
        );
        debug!("GET {} after={}", url, after);

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("limit", self.config.page_size.to_string()),
                ("after", after.to_string()),
            ])
            .header("authorization", format!("Bot {}", self.config.bot_token))
            .send()
            .await
            .context("Failed to reach the Discord API")?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN || status == StatusCode::UNAUTHORIZED {
            return Err(SearchError::PermissionDenied {
                channel_id: channel_id.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Discord API returned {}: {}", status, body).into());
        }

        let page = response
            .json::<Vec<DiscordMessage>>()
            .await
            .context("Failed to parse Discord messages response")?;

        Ok(page)
    }

    /// Fetch the page after `cursor` and keep the records inside `window`.
    async fn next_page(
        &self,
        channel: &ChannelRef,
        window: TimeWindow,
        cursor: PageCursor,
    ) -> Result<Option<(Vec<MessageRecord>, PageCursor)>, SearchError> {
        if cursor.exhausted {
            return Ok(None);
        }

        let page = self.fetch_page(&channel.id, cursor.after).await?;
        if page.is_empty() {
            return Ok(None);
        }

        let short_page = page.len() < self.config.page_size;
        let mut keyed = page
            .into_iter()
            .map(|m| m.snowflake().map(|id| (id, m)))
            .collect::<Result<Vec<_>>>()?;
        // The API returns pages newest first
        keyed.sort_by_key(|(id, _)| *id);

        let last_id = keyed.last().map(|(id, _)| *id).unwrap_or(cursor.after);
        let mut past_end = false;
        let mut records = Vec::with_capacity(keyed.len());

        for (_, message) in keyed {
            let record = message.into_record();
            if record.created_at > window.end {
                past_end = true;
                break;
            }
            if window.contains(record.created_at) {
                records.push(record);
            }
        }

        debug!(
            "Fetched page after {}: {} messages in window",
            cursor.after,
            records.len()
        );

        Ok(Some((
            records,
            PageCursor {
                after: last_id,
                exhausted: short_page || past_end,
            },
        )))
    }
}

impl HistorySource for DiscordHistory {
    fn fetch<'a>(&'a self, channel: &'a ChannelRef, window: TimeWindow) -> MessageStream<'a> {
        if window.is_empty() {
            return stream::empty().boxed();
        }

        let Some(after) = snowflake_floor(window.start) else {
            debug!("Window starts after the last encodable snowflake");
            return stream::empty().boxed();
        };
        let cursor = PageCursor {
            after,
            exhausted: false,
        };

        stream::try_unfold(cursor, move |cursor| self.next_page(channel, window, cursor))
            .map_ok(|records| stream::iter(records.into_iter().map(Ok::<_, SearchError>)))
            .try_flatten()
            .boxed()
    }
}
