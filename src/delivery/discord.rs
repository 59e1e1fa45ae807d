//! Post responses into a Discord channel.

use super::ResponseSink;
use crate::models::Attachment;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Sends responses as messages in a channel via the bot API.
pub struct DiscordChannelSink {
    api_base: String,
    bot_token: String,
    channel_id: String,
    http_client: reqwest::Client,
}

impl DiscordChannelSink {
    pub fn new(
        api_base: String,
        bot_token: String,
        channel_id: String,
        timeout_seconds: u64,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_base,
            bot_token,
            channel_id,
            http_client,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/channels/{}/messages",
            self.api_base.trim_end_matches('/'),
            self.channel_id
        )
    }
}

/// Message body; mentions in search results must never ping anyone.
fn message_payload(text: &str, attachment: Option<&Attachment>) -> Value {
    let mut payload = json!({
        "content": text,
        "allowed_mentions": { "parse": [] },
    });

    if let Some(attachment) = attachment {
        payload["attachments"] = json!([{ "id": 0, "filename": attachment.filename }]);
    }

    payload
}

#[async_trait]
impl ResponseSink for DiscordChannelSink {
    async fn send(&self, text: &str, attachment: Option<Attachment>) -> Result<()> {
        let url = self.endpoint();
        let payload = message_payload(text, attachment.as_ref());
        let request = self
            .http_client
            .post(&url)
            .header("authorization", format!("Bot {}", self.bot_token));

        let request = match attachment {
            Some(attachment) => {
                debug!(
                    "Uploading {} ({} bytes)",
                    attachment.filename,
                    attachment.bytes.len()
                );
                let file = Part::bytes(attachment.bytes)
                    .file_name(attachment.filename)
                    .mime_str("text/csv")
                    .context("Failed to build attachment part")?;
                let form = Form::new()
                    .text("payload_json", payload.to_string())
                    .part("files[0]", file);
                request.multipart(form)
            }
            None => request.json(&payload),
        };

        let response = request
            .send()
            .await
            .context("Failed to reach the Discord API")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Discord API rejected the message ({}): {}", status, body);
        }

        info!("Posted response to channel {}", self.channel_id);
        Ok(())
    }
}
