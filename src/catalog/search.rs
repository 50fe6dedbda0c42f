//! Fuzzy catalog search
//!
//! Matching is case- and diacritic-insensitive. A query matches a field when
//! its characters appear in order (not necessarily adjacent); tighter and
//! earlier matches rank higher.

use super::{Catalog, MergedCatalogItem};
use std::cmp::Reverse;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

const EXACT_SCORE: i64 = 10_000;
const PREFIX_SCORE: i64 = 8_000;
const SUBSTRING_SCORE: i64 = 6_000;
const SUBSEQUENCE_SCORE: i64 = 4_000;

/// Rank `catalog` against `query`. An empty query returns every item in
/// catalog order; otherwise non-matching items are dropped and ties fall back
/// to descending download count.
pub fn search<'a>(catalog: &'a Catalog, query: &str) -> Vec<&'a MergedCatalogItem> {
    let query = normalize(query.trim());
    if query.is_empty() {
        return catalog.items().iter().collect();
    }

    let mut hits: Vec<(i64, &MergedCatalogItem)> = catalog
        .items()
        .iter()
        .filter_map(|item| {
            let name = match_score(&query, &normalize(&item.record.name));
            let title = match_score(&query, &normalize(&item.record.title));
            name.max(title).map(|score| (score, item))
        })
        .collect();

    hits.sort_by_key(|(score, item)| (Reverse(*score), Reverse(item.record.downloads_count)));
    hits.into_iter().map(|(_, item)| item).collect()
}

/// Decompose, drop combining marks and lowercase.
pub fn normalize(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Higher is better; `None` when `query` is not a subsequence of `candidate`.
fn match_score(query: &str, candidate: &str) -> Option<i64> {
    if candidate.is_empty() {
        return None;
    }
    if candidate == query {
        return Some(EXACT_SCORE);
    }

    let candidate_len = candidate.chars().count() as i64;
    let query_len = query.chars().count() as i64;

    if candidate.starts_with(query) {
        return Some(PREFIX_SCORE - (candidate_len - query_len));
    }
    if let Some(byte_pos) = candidate.find(query) {
        let pos = candidate[..byte_pos].chars().count() as i64;
        return Some(SUBSTRING_SCORE - pos * 10 - (candidate_len - query_len));
    }

    let (start, end) = subsequence_span(query, candidate)?;
    let gaps = (end - start + 1) - query_len;
    Some((SUBSEQUENCE_SCORE - gaps * 20 - start * 5).max(1))
}

/// Char positions of the first and last matched character, greedy left to right.
fn subsequence_span(query: &str, candidate: &str) -> Option<(i64, i64)> {
    let mut wanted = query.chars().peekable();
    let mut start = None;
    let mut end = 0;

    for (i, c) in candidate.chars().enumerate() {
        match wanted.peek() {
            Some(&q) if q == c => {
                start.get_or_insert(i as i64);
                end = i as i64;
                wanted.next();
            }
            Some(_) => {}
            None => break,
        }
    }

    if wanted.peek().is_some() {
        return None;
    }
    start.map(|s| (s, end))
}
