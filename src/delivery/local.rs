//! Local delivery: print responses and save attachments to disk.

use super::ResponseSink;
use crate::models::Attachment;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

/// Prints responses to stdout and writes attachments into a directory.
#[derive(Debug, Clone)]
pub struct LocalSink {
    output_dir: PathBuf,
}

impl LocalSink {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    /// Path an attachment named `filename` is written to.
    pub fn attachment_path(&self, filename: &str) -> PathBuf {
        self.output_dir.join(filename)
    }
}

#[async_trait]
impl ResponseSink for LocalSink {
    async fn send(&self, text: &str, attachment: Option<Attachment>) -> Result<()> {
        println!("{}", text);

        if let Some(attachment) = attachment {
            tokio::fs::create_dir_all(&self.output_dir)
                .await
                .with_context(|| {
                    format!("Failed to create output directory {}", self.output_dir.display())
                })?;

            let path = self.attachment_path(&attachment.filename);
            tokio::fs::write(&path, &attachment.bytes)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;

            info!("Saved {} ({} bytes)", path.display(), attachment.bytes.len());
            println!("📎 {}", path.display());
        }

        Ok(())
    }
}
