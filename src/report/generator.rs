//! Ranking text and CSV log generation.
//!
//! This module renders the two artifacts a search produces: the ranking
//! message posted to the channel and the detailed per-message CSV log.

use crate::models::{Attachment, MessageRecord, RankingEntry};
use anyhow::{Context, Result};
use chrono::FixedOffset;

/// Largest ranking message we post; keeps clear of the platform's 2000
/// character limit.
pub const RANKING_CHAR_BUDGET: usize = 1900;

/// Appended when the ranking does not fit into [`RANKING_CHAR_BUDGET`].
pub const TRUNCATION_NOTICE: &str = "（結果が多すぎるため、一部のみ表示しています）";

const RULE_LINE: &str = "----------------------------------";

/// Generate the ranking message for a search.
///
/// Lines are appended until the next one would push the message past
/// [`RANKING_CHAR_BUDGET`] characters; then [`TRUNCATION_NOTICE`] is
/// added and rendering stops. Ranks always reflect the full ranking.
pub fn render_ranking_text(
    ranking: &[RankingEntry],
    keyword: &str,
    start_date: &str,
    end_date: &str,
) -> String {
    let mut output = generate_ranking_header(keyword, start_date, end_date);
    let mut length = output.chars().count();

    for (i, entry) in ranking.iter().enumerate() {
        let line = ranking_line(i + 1, entry);
        let line_length = line.chars().count();

        if length + line_length > RANKING_CHAR_BUDGET {
            output.push_str(TRUNCATION_NOTICE);
            break;
        }

        output.push_str(&line);
        length += line_length;
    }

    output
}

fn ranking_line(rank: usize, entry: &RankingEntry) -> String {
    format!("{}. {}: {}件\n", rank, entry.author, entry.count)
}

/// Generate the header of the ranking message.
fn generate_ranking_header(keyword: &str, start_date: &str, end_date: &str) -> String {
    let mut header = String::new();

    header.push_str(&format!(
        "**「{}」検索結果ランキング** ({} ~ {})\n",
        keyword, start_date, end_date
    ));
    header.push_str(RULE_LINE);
    header.push('\n');

    header
}

/// Generate the detailed CSV log of matched messages.
///
/// Rows are ordered by author name, then by posting time. Dates and
/// times are rendered in `offset`.
pub fn render_detail_csv(
    records: &[MessageRecord],
    keyword: &str,
    start_date: &str,
    end_date: &str,
    offset: FixedOffset,
) -> Result<Attachment> {
    let mut sorted: Vec<&MessageRecord> = records.iter().collect();
    sorted.sort_by(|a, b| {
        a.author_display_name
            .cmp(&b.author_display_name)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());

    writer
        .write_record(["User", "Date", "Time", "Message"])
        .context("Failed to write CSV header")?;

    for record in sorted {
        let local = record.created_at.with_timezone(&offset);
        let date = local.format("%Y-%m-%d").to_string();
        let time = local.format("%H:%M:%S").to_string();
        writer
            .write_record([
                record.author_display_name.as_str(),
                date.as_str(),
                time.as_str(),
                record.content.as_str(),
            ])
            .context("Failed to write CSV row")?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV log: {}", e.error()))?;

    Ok(Attachment::new(
        detail_log_filename(keyword, start_date, end_date),
        bytes,
    ))
}

/// Build the CSV log filename for a search.
pub fn detail_log_filename(keyword: &str, start_date: &str, end_date: &str) -> String {
    format!(
        "{}_log_sorted_by_user_{}_to_{}.csv",
        sanitize_filename_component(keyword),
        sanitize_filename_component(start_date),
        sanitize_filename_component(end_date)
    )
}

/// Replace characters that are unsafe in file names with `_`.
pub fn sanitize_filename_component(component: &str) -> String {
    let sanitized: String = component
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    // A bare "." or ".." would still walk the directory tree
    if sanitized.chars().all(|c| c == '.') {
        sanitized.replace('.', "_")
    } else {
        sanitized
    }
}
