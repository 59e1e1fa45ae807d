//! The search command.
//!
//! Validates the requested dates, streams the channel history through the
//! keyword filter, and delivers the ranking plus CSV log. Every failure is
//! turned into a message for the invoker; only a failure to deliver that
//! message escapes to the caller.

use crate::analysis::{build_ranking, distinct_authors, filter_messages};
use crate::delivery::ResponseSink;
use crate::error::{ErrorKind, SearchError};
use crate::history::HistorySource;
use crate::models::{ChannelRef, MessageRecord, TimeWindow};
use crate::report::{render_detail_csv, render_ranking_text};
use anyhow::{anyhow, Context, Result};
use chrono::{FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use futures::TryStreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Messages are filtered in batches of this size while streaming.
const FILTER_BATCH_SIZE: usize = 500;

const DATE_FORMAT: &str = "%Y-%m-%d";

const MSG_INVALID_DATE: &str = "エラー: 日付は「YYYY-MM-DD」の形式で指定してください。";
const MSG_PERMISSION_DENIED: &str = "エラー: Botにこのチャンネルの履歴を読む権限がありません。";

/// A single search invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub keyword: String,
    /// Start date exactly as typed by the invoker.
    pub start_date: String,
    /// End date exactly as typed by the invoker.
    pub end_date: String,
    pub channel: ChannelRef,
}

/// Knobs for the handler that do not change between invocations.
#[derive(Debug, Clone)]
pub struct HandlerOptions {
    /// Offset calendar dates and CSV timestamps are interpreted in.
    pub utc_offset: FixedOffset,
    /// Send a notice before scanning starts.
    pub announce_start: bool,
    /// Draw a spinner while scanning.
    pub show_progress: bool,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            utc_offset: Utc.fix(),
            announce_start: true,
            show_progress: false,
        }
    }
}

/// What a search ended up telling the invoker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Ranking and CSV log were delivered.
    Delivered {
        matches: usize,
        authors: usize,
        filename: String,
    },
    /// Nothing in the range contained the keyword.
    NoMatches,
    /// The search failed and the invoker was told why.
    Failed(ErrorKind),
}

/// Runs searches against an injected history source and response sink.
pub struct SearchHandler<'a> {
    history: &'a dyn HistorySource,
    sink: &'a dyn ResponseSink,
    options: HandlerOptions,
}

/// Compute the inclusive window covering both calendar days.
///
/// The window runs from `start_date` 00:00:00 to `end_date`
/// 23:59:59.999999 in `offset`.
pub fn search_window(
    start_date: &str,
    end_date: &str,
    offset: FixedOffset,
) -> Result<TimeWindow, SearchError> {
    let start = parse_date(start_date)?;
    let end = parse_date(end_date)?;

    let start_local = start
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("Invalid start of day for {}", start))?;
    let end_local = end
        .and_hms_micro_opt(23, 59, 59, 999_999)
        .ok_or_else(|| anyhow!("Invalid end of day for {}", end))?;

    let start_utc = offset
        .from_local_datetime(&start_local)
        .single()
        .ok_or_else(|| anyhow!("Ambiguous local time {}", start_local))?
        .with_timezone(&Utc);
    let end_utc = offset
        .from_local_datetime(&end_local)
        .single()
        .ok_or_else(|| anyhow!("Ambiguous local time {}", end_local))?
        .with_timezone(&Utc);

    Ok(TimeWindow::new(start_utc, end_utc))
}

fn parse_date(input: &str) -> Result<NaiveDate, SearchError> {
    NaiveDate::parse_from_str(input, DATE_FORMAT).map_err(|_| SearchError::InvalidDate {
        input: input.to_string(),
    })
}

fn scan_spinner(show: bool) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {pos} messages scanned {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

impl<'a> SearchHandler<'a> {
    pub fn new(
        history: &'a dyn HistorySource,
        sink: &'a dyn ResponseSink,
        options: HandlerOptions,
    ) -> Self {
        Self {
            history,
            sink,
            options,
        }
    }

    /// Run one search and report the result to the invoker.
    ///
    /// Returns `Err` only when the sink cannot deliver the error message
    /// itself.
    pub async fn handle(&self, request: &SearchRequest) -> Result<Outcome> {
        match self.run(request).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                let text = match err {
                    SearchError::InvalidDate { ref input } => {
                        warn!("Rejected malformed date: {}", input);
                        MSG_INVALID_DATE.to_string()
                    }
                    SearchError::PermissionDenied { ref channel_id } => {
                        warn!("No permission to read history of channel {}", channel_id);
                        MSG_PERMISSION_DENIED.to_string()
                    }
                    SearchError::Other(ref e) => {
                        error!("An error occurred in search: {:#}", e);
                        format!("予期せぬエラーが発生しました: {}", e)
                    }
                };

                self.sink
                    .send(&text, None)
                    .await
                    .context("Failed to report search error")?;

                Ok(Outcome::Failed(err.kind()))
            }
        }
    }

    async fn run(&self, request: &SearchRequest) -> Result<Outcome, SearchError> {
        let window = search_window(
            &request.start_date,
            &request.end_date,
            self.options.utc_offset,
        )?;
        debug!("Search window: {} .. {}", window.start, window.end);

        if self.options.announce_start {
            self.sink
                .send(
                    &format!(
                        "集計を開始します。チャンネル: {}, 期間: {} ~ {}",
                        request.channel, request.start_date, request.end_date
                    ),
                    None,
                )
                .await?;
        }

        let matches = self.collect_matches(request, window).await?;

        if matches.is_empty() {
            info!("No messages contain '{}'", request.keyword);
            self.sink
                .send(
                    &format!(
                        "指定された期間内に、キーワード「{}」を含むメッセージは見つかりませんでした。",
                        request.keyword
                    ),
                    None,
                )
                .await?;
            return Ok(Outcome::NoMatches);
        }

        let ranking = build_ranking(&matches);
        let text = render_ranking_text(
            &ranking,
            &request.keyword,
            &request.start_date,
            &request.end_date,
        );
        let attachment = render_detail_csv(
            &matches,
            &request.keyword,
            &request.start_date,
            &request.end_date,
            self.options.utc_offset,
        )?;
        let filename = attachment.filename.clone();

        self.sink.send(&text, Some(attachment)).await?;

        Ok(Outcome::Delivered {
            matches: matches.len(),
            authors: distinct_authors(&matches),
            filename,
        })
    }

    /// Stream the channel history and keep the messages that match.
    async fn collect_matches(
        &self,
        request: &SearchRequest,
        window: TimeWindow,
    ) -> Result<Vec<MessageRecord>, SearchError> {
        let progress = scan_spinner(self.options.show_progress);
        let result = self.scan(request, window, &progress).await;
        progress.finish_and_clear();

        let matches = result?;
        info!(
            "Scanned {} messages, {} matched '{}'",
            progress.position(),
            matches.len(),
            request.keyword
        );
        Ok(matches)
    }

    async fn scan(
        &self,
        request: &SearchRequest,
        window: TimeWindow,
        progress: &ProgressBar,
    ) -> Result<Vec<MessageRecord>, SearchError> {
        let mut stream = self.history.fetch(&request.channel, window);
        let mut batch = Vec::with_capacity(FILTER_BATCH_SIZE);
        let mut matches = Vec::new();

        while let Some(record) = stream.try_next().await? {
            progress.inc(1);
            batch.push(record);

            if batch.len() >= FILTER_BATCH_SIZE {
                matches.extend(filter_messages(batch.drain(..), &request.keyword, &window));
                progress.set_message(format!("({} matches)", matches.len()));
            }
        }
        matches.extend(filter_messages(batch, &request.keyword, &window));

        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{ExportHistory, MessageStream};
    use crate::models::Attachment;
    use crate::report::TRUNCATION_NOTICE;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration};
    use futures::stream::{self, StreamExt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(String, Option<Attachment>)>>,
    }

    impl RecordingSink {
        fn sent(&self) -> Vec<(String, Option<Attachment>)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ResponseSink for RecordingSink {
        async fn send(&self, text: &str, attachment: Option<Attachment>) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((text.to_string(), attachment));
            Ok(())
        }
    }

    struct BrokenSink;

    #[async_trait]
    impl ResponseSink for BrokenSink {
        async fn send(&self, _text: &str, _attachment: Option<Attachment>) -> Result<()> {
            anyhow::bail!("connection reset")
        }
    }

    /// Counts fetches before delegating to an export.
    struct CountingHistory {
        inner: ExportHistory,
        fetches: AtomicUsize,
    }

    impl CountingHistory {
        fn new(records: Vec<MessageRecord>) -> Self {
            Self {
                inner: ExportHistory::new(records),
                fetches: AtomicUsize::new(0),
            }
        }
    }

    impl HistorySource for CountingHistory {
        fn fetch<'a>(&'a self, channel: &'a ChannelRef, window: TimeWindow) -> MessageStream<'a> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch(channel, window)
        }
    }

    /// Yields one message, then fails.
    struct FailingHistory {
        error: fn() -> SearchError,
    }

    impl HistorySource for FailingHistory {
        fn fetch<'a>(&'a self, _channel: &'a ChannelRef, window: TimeWindow) -> MessageStream<'a> {
            let first = MessageRecord::new("Alice", window.start, "bar");
            stream::iter(vec![Ok(first), Err((self.error)())]).boxed()
        }
    }

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn scenario() -> Vec<MessageRecord> {
        vec![
            MessageRecord::new("Alice", at("2024-01-01T10:00:00Z"), "foo bar"),
            MessageRecord::new("Bob", at("2024-01-02T09:00:00Z"), "bar baz"),
            MessageRecord::new("Alice", at("2024-01-03T11:00:00Z"), "bar"),
        ]
    }

    fn request(keyword: &str, start: &str, end: &str) -> SearchRequest {
        SearchRequest {
            keyword: keyword.to_string(),
            start_date: start.to_string(),
            end_date: end.to_string(),
            channel: ChannelRef::new("555"),
        }
    }

    fn csv_rows(attachment: &Attachment) -> Vec<Vec<String>> {
        csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(attachment.bytes.as_slice())
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect()
    }

    #[test]
    fn test_search_window_covers_whole_end_day() {
        let window =
            search_window("2024-01-01", "2024-01-31", FixedOffset::east_opt(0).unwrap()).unwrap();

        assert_eq!(window.start, at("2024-01-01T00:00:00Z"));
        assert_eq!(window.end, at("2024-01-31T23:59:59.999999Z"));
        assert!(window.contains(at("2024-01-31T23:59:59.999999Z")));
        let just_after = at("2024-01-31T23:59:59.999999Z") + Duration::microseconds(1);
        assert!(!window.contains(just_after));
    }

    #[test]
    fn test_search_window_applies_offset() {
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let window = search_window("2024-01-01", "2024-01-01", tokyo).unwrap();

        assert_eq!(window.start, at("2023-12-31T15:00:00Z"));
        assert_eq!(window.end, at("2024-01-01T14:59:59.999999Z"));
    }

    #[test]
    fn test_search_window_rejects_bad_dates() {
        let utc = FixedOffset::east_opt(0).unwrap();
        for bad in ["2024-13-01", "2024/01/01", "yesterday", "2024-02-30", ""] {
            let err = search_window(bad, "2024-01-31", utc).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{}", bad);
        }
        let err = search_window("2024-01-01", "2024-01-32", utc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_handle_scenario_delivers_ranking_and_log() {
        let history = CountingHistory::new(scenario());
        let sink = RecordingSink::default();
        let handler = SearchHandler::new(&history, &sink, HandlerOptions::default());

        let outcome = handler
            .handle(&request("bar", "2024-01-01", "2024-01-03"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            Outcome::Delivered {
                matches: 3,
                authors: 2,
                filename: "bar_log_sorted_by_user_2024-01-01_to_2024-01-03.csv".to_string(),
            }
        );

        let sent = sink.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(
            sent[0].0,
            "集計を開始します。チャンネル: <#555>, 期間: 2024-01-01 ~ 2024-01-03"
        );
        assert!(sent[0].1.is_none());

        let (text, attachment) = &sent[1];
        assert!(text.contains("1. Alice: 2件\n2. Bob: 1件\n"));
        assert!(!text.contains(TRUNCATION_NOTICE));

        let rows = csv_rows(attachment.as_ref().unwrap());
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[1][0..2], ["Alice", "2024-01-01"]);
        assert_eq!(rows[2][0..2], ["Alice", "2024-01-03"]);
        assert_eq!(rows[3][0], "Bob");
    }

    #[tokio::test]
    async fn test_handle_no_matches_sends_no_log() {
        let history = CountingHistory::new(scenario());
        let sink = RecordingSink::default();
        let options = HandlerOptions {
            announce_start: false,
            ..HandlerOptions::default()
        };
        let handler = SearchHandler::new(&history, &sink, options);

        let outcome = handler
            .handle(&request("qux", "2024-01-01", "2024-01-03"))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::NoMatches);
        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].0,
            "指定された期間内に、キーワード「qux」を含むメッセージは見つかりませんでした。"
        );
        assert!(sent[0].1.is_none());
    }

    #[tokio::test]
    async fn test_handle_invalid_date_skips_fetch() {
        let history = CountingHistory::new(scenario());
        let sink = RecordingSink::default();
        let handler = SearchHandler::new(&history, &sink, HandlerOptions::default());

        let outcome = handler
            .handle(&request("bar", "2024-13-01", "2024-01-03"))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Failed(ErrorKind::Validation));
        assert_eq!(history.fetches.load(Ordering::SeqCst), 0);

        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, MSG_INVALID_DATE);
    }

    #[tokio::test]
    async fn test_handle_end_date_is_inclusive() {
        let history = CountingHistory::new(vec![
            MessageRecord::new("Alice", at("2024-01-31T23:59:59.999999Z"), "bar"),
            MessageRecord::new("Bob", at("2024-02-01T00:00:00Z"), "bar"),
        ]);
        let sink = RecordingSink::default();
        let options = HandlerOptions {
            announce_start: false,
            ..HandlerOptions::default()
        };
        let handler = SearchHandler::new(&history, &sink, options);

        let outcome = handler
            .handle(&request("bar", "2024-01-31", "2024-01-31"))
            .await
            .unwrap();

        match outcome {
            Outcome::Delivered {
                matches, authors, ..
            } => {
                assert_eq!(matches, 1);
                assert_eq!(authors, 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(sink.sent()[0].0.contains("1. Alice: 1件"));
    }

    #[tokio::test]
    async fn test_handle_uses_offset_for_days_and_csv() {
        let history = CountingHistory::new(vec![
            // 2024-01-01 00:00 in +09:00
            MessageRecord::new("Alice", at("2023-12-31T15:00:00Z"), "bar"),
            // 2024-01-02 00:30 in +09:00
            MessageRecord::new("Bob", at("2024-01-01T15:30:00Z"), "bar"),
        ]);
        let sink = RecordingSink::default();
        let options = HandlerOptions {
            utc_offset: FixedOffset::east_opt(9 * 3600).unwrap(),
            announce_start: false,
            show_progress: false,
        };
        let handler = SearchHandler::new(&history, &sink, options);

        handler
            .handle(&request("bar", "2024-01-01", "2024-01-01"))
            .await
            .unwrap();

        let sent = sink.sent();
        let rows = csv_rows(sent[0].1.as_ref().unwrap());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec!["Alice", "2024-01-01", "00:00:00", "bar"]);
    }

    #[tokio::test]
    async fn test_handle_permission_denied() {
        let history = FailingHistory {
            error: || SearchError::PermissionDenied {
                channel_id: "555".to_string(),
            },
        };
        let sink = RecordingSink::default();
        let handler = SearchHandler::new(&history, &sink, HandlerOptions::default());

        let outcome = handler
            .handle(&request("bar", "2024-01-01", "2024-01-03"))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Failed(ErrorKind::Permission));
        let sent = sink.sent();
        // start notice, then the error; no partial ranking
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].0, MSG_PERMISSION_DENIED);
        assert!(sent.iter().all(|(_, attachment)| attachment.is_none()));
    }

    #[tokio::test]
    async fn test_handle_unexpected_error_reports_description() {
        let history = FailingHistory {
            error: || anyhow!("gateway timed out").into(),
        };
        let sink = RecordingSink::default();
        let options = HandlerOptions {
            announce_start: false,
            ..HandlerOptions::default()
        };
        let handler = SearchHandler::new(&history, &sink, options);

        let outcome = handler
            .handle(&request("bar", "2024-01-01", "2024-01-03"))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Failed(ErrorKind::Unclassified));
        assert_eq!(
            sink.sent()[0].0,
            "予期せぬエラーが発生しました: gateway timed out"
        );
    }

    #[tokio::test]
    async fn test_handle_propagates_undeliverable_error() {
        let history = CountingHistory::new(scenario());
        let handler = SearchHandler::new(&history, &BrokenSink, HandlerOptions::default());

        let result = handler
            .handle(&request("bar", "2024-13-01", "2024-01-03"))
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_handle_large_history_spans_batches() {
        let base = at("2024-01-01T00:00:00Z");
        let records: Vec<_> = (0..1234)
            .map(|i| {
                let content = if i % 3 == 0 { "bar" } else { "other" };
                MessageRecord::new(format!("user{}", i % 5), base + Duration::seconds(i), content)
            })
            .collect();
        let history = CountingHistory::new(records);
        let sink = RecordingSink::default();
        let options = HandlerOptions {
            announce_start: false,
            ..HandlerOptions::default()
        };
        let handler = SearchHandler::new(&history, &sink, options);

        let outcome = handler
            .handle(&request("bar", "2024-01-01", "2024-01-01"))
            .await
            .unwrap();

        match outcome {
            Outcome::Delivered { matches, .. } => assert_eq!(matches, 412),
            other => panic!("unexpected outcome: {:?}", other),
        }
        let rows = csv_rows(sink.sent()[0].1.as_ref().unwrap());
        assert_eq!(rows.len(), 413);
    }
}
