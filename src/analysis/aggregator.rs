//! Keyword matching and per-author tallies.
//!
//! This module turns a sequence of messages into the filtered set of
//! matches and the ranking of authors by how often they matched.

use crate::models::{MessageRecord, RankingEntry, TimeWindow};
use std::collections::HashMap;

/// Returns true when a message counts as a hit for `keyword`.
///
/// Automated authors never match. Containment is a case-sensitive literal
/// substring test.
pub fn matches_keyword(record: &MessageRecord, keyword: &str) -> bool {
    !record.is_automated && record.content.contains(keyword)
}

/// Keep the human-written messages inside `window` that contain `keyword`.
///
/// Relative order of the input is preserved.
pub fn filter_messages<I>(records: I, keyword: &str, window: &TimeWindow) -> Vec<MessageRecord>
where
    I: IntoIterator<Item = MessageRecord>,
{
    records
        .into_iter()
        .filter(|record| {
            window.contains(record.created_at) && matches_keyword(record, keyword)
        })
        .collect()
}

/// Count messages per author and order authors by count, highest first.
///
/// Authors with equal counts keep the order in which they first appear
/// in `records`.
pub fn build_ranking(records: &[MessageRecord]) -> Vec<RankingEntry> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut ranking: Vec<RankingEntry> = Vec::new();

    for record in records {
        let author = record.author_display_name.as_str();
        match positions.get(author) {
            Some(&index) => ranking[index].count += 1,
            None => {
                positions.insert(author, ranking.len());
                ranking.push(RankingEntry {
                    author: author.to_string(),
                    count: 1,
                });
            }
        }
    }

    // sort_by_key is stable, so first-occurrence order survives ties
    ranking.sort_by_key(|entry| std::cmp::Reverse(entry.count));
    ranking
}

/// Number of distinct authors among `records`.
pub fn distinct_authors(records: &[MessageRecord]) -> usize {
    records
        .iter()
        .map(|r| r.author_display_name.as_str())
        .collect::<std::collections::HashSet<_>>()
        .len()
}
