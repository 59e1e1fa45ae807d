//! History replayed from a JSON export file.
//!
//! The export is a JSON array of [`MessageRecord`] objects, which lets a
//! search run offline against a saved channel dump.

use super::{HistorySource, MessageStream};
use crate::error::SearchError;
use crate::models::{ChannelRef, MessageRecord, TimeWindow};
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use std::path::Path;
use tracing::{debug, info};

/// In-memory history loaded from an export.
#[derive(Debug, Clone, Default)]
pub struct ExportHistory {
    records: Vec<MessageRecord>,
}

impl ExportHistory {
    /// Build a history from records in any order.
    pub fn new(mut records: Vec<MessageRecord>) -> Self {
        records.sort_by_key(|r| r.created_at);
        Self { records }
    }

    /// Load an export file.
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading message export from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read export file: {}", path.display()))?;

        let records: Vec<MessageRecord> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse export file: {}", path.display()))?;

        debug!("Loaded {} messages", records.len());
        Ok(Self::new(records))
    }
}

impl HistorySource for ExportHistory {
    fn fetch<'a>(&'a self, _channel: &'a ChannelRef, window: TimeWindow) -> MessageStream<'a> {
        stream::iter(
            self.records
                .iter()
                .filter(move |r| window.contains(r.created_at))
                .cloned()
                .map(Ok::<_, SearchError>),
        )
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use futures::TryStreamExt;
    use std::io::Write;

    #[tokio::test]
    async fn test_fetch_orders_and_bounds_records() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let history = ExportHistory::new(vec![
            MessageRecord::new("B", base + Duration::hours(5), "late"),
            MessageRecord::new("A", base + Duration::hours(1), "early"),
            MessageRecord::new("C", base + Duration::days(3), "outside"),
        ]);
        let channel = ChannelRef::new("1");
        let window = TimeWindow::new(base, base + Duration::days(1));

        let fetched: Vec<_> = history.fetch(&channel, window).try_collect().await.unwrap();

        let contents: Vec<_> = fetched.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["early", "late"]);
        assert_eq!(history.records.len(), 3);
    }

    #[test]
    fn test_load_export_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"author_display_name": "Alice", "created_at": "2024-01-03T11:00:00Z", "content": "bar"}},
                {{"author_display_name": "Bot", "created_at": "2024-01-01T10:00:00Z", "content": "bar", "is_automated": true}}
            ]"#
        )
        .unwrap();

        let history = ExportHistory::load(file.path()).unwrap();
        assert_eq!(history.records.len(), 2);
        assert_eq!(history.records[0].author_display_name, "Bot");
        assert!(history.records[0].is_automated);
    }

    #[test]
    fn test_load_rejects_malformed_export() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();

        let err = ExportHistory::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse export file"));
    }
}
