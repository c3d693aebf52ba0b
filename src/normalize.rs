//! Record normalization.
//!
//! Turns raw rows into [`ReviewRecord`]s:
//! - ratings coerced to a 1..=5 star value (unparseable or out of range rows are dropped)
//! - review text trimmed (empty text drops the row)
//! - timestamps parsed permissively, failures become "unknown"
//! - exact duplicate texts collapsed, keeping the most recent one
//! - a rating-derived sentiment label attached to every record
//!
//! Dropping rows is data-quality filtering, not an error: nothing here fails.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::ingest::RawReview;

/// Three-way sentiment label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Negative,
    Neutral,
    Positive,
}

impl SentimentLabel {
    pub const ALL: [SentimentLabel; 3] = [
        SentimentLabel::Negative,
        SentimentLabel::Neutral,
        SentimentLabel::Positive,
    ];

    /// Rule-mode labeling: `<= 2` negative, `>= 4` positive, otherwise neutral.
    pub fn from_rating(rating: u8) -> Self {
        if rating <= 2 {
            SentimentLabel::Negative
        } else if rating >= 4 {
            SentimentLabel::Positive
        } else {
            SentimentLabel::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Positive => "positive",
        }
    }

    /// Dense index used by the classifiers.
    pub fn index(&self) -> usize {
        match self {
            SentimentLabel::Negative => 0,
            SentimentLabel::Neutral => 1,
            SentimentLabel::Positive => 2,
        }
    }

    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rating bounds applied during cleaning.
#[derive(Debug, Clone, Copy)]
pub struct CleanConfig {
    pub min_rating: u8,
    pub max_rating: u8,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            min_rating: 1,
            max_rating: 5,
        }
    }
}

/// A validated review. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewRecord {
    pub source: String,
    pub rating: u8,
    pub review_text: String,
    pub location: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub date: Option<NaiveDate>,
    /// Calendar month as `YYYY-MM`
    pub month_bucket: Option<String>,
    pub sentiment_label: SentimentLabel,
}

/// What happened to the input rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizeStats {
    pub rows_in: usize,
    pub missing_text: usize,
    pub invalid_rating: usize,
    pub out_of_range_rating: usize,
    pub duplicates_removed: usize,
    pub unknown_timestamps: usize,
    pub rows_out: usize,
}

enum RatingCheck {
    Valid(u8),
    Invalid,
    OutOfRange,
}

fn check_rating(raw: Option<&str>, cfg: &CleanConfig) -> RatingCheck {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return RatingCheck::Invalid;
    };
    let value = match raw.replace(',', ".").parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => return RatingCheck::Invalid,
    };
    if value < f64::from(cfg.min_rating) || value > f64::from(cfg.max_rating) {
        return RatingCheck::OutOfRange;
    }
    // f64::round rounds half away from zero
    RatingCheck::Valid(value.round() as u8)
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d-%m-%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%Y/%m/%d"];

/// Parse a timestamp in any of the accepted shapes, returning UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }
    None
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Normalize raw rows with the default rating bounds.
pub fn normalize(rows: Vec<RawReview>) -> (Vec<ReviewRecord>, NormalizeStats) {
    normalize_with(rows, &CleanConfig::default())
}

/// Normalize raw rows into deduplicated, labeled records.
pub fn normalize_with(rows: Vec<RawReview>, cfg: &CleanConfig) -> (Vec<ReviewRecord>, NormalizeStats) {
    let mut stats = NormalizeStats {
        rows_in: rows.len(),
        ..Default::default()
    };

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(text) = non_empty(row.review) else {
            stats.missing_text += 1;
            continue;
        };
        let rating = match check_rating(row.rating.as_deref(), cfg) {
            RatingCheck::Valid(r) => r,
            RatingCheck::Invalid => {
                stats.invalid_rating += 1;
                continue;
            }
            RatingCheck::OutOfRange => {
                stats.out_of_range_rating += 1;
                continue;
            }
        };
        let timestamp = row.timestamp.as_deref().and_then(parse_timestamp);
        if timestamp.is_none() {
            stats.unknown_timestamps += 1;
        }

        records.push(ReviewRecord {
            source: non_empty(row.source).unwrap_or_default(),
            rating,
            review_text: text,
            location: non_empty(row.location),
            date: timestamp.map(|ts| ts.date_naive()),
            month_bucket: timestamp.map(|ts| ts.format("%Y-%m").to_string()),
            timestamp,
            sentiment_label: SentimentLabel::from_rating(rating),
        });
    }

    // Known timestamps ascending, unknown ones after them; the sort is stable so
    // input order breaks ties.
    records.sort_by_key(|r| (r.timestamp.is_none(), r.timestamp));

    // Keep the last occurrence of each text: walk backwards, then restore order.
    let before = records.len();
    let mut seen: HashSet<String> = HashSet::with_capacity(records.len());
    let mut kept: Vec<ReviewRecord> = records
        .into_iter()
        .rev()
        .filter(|r| seen.insert(r.review_text.clone()))
        .collect();
    kept.reverse();
    stats.duplicates_removed = before - kept.len();
    stats.rows_out = kept.len();

    info!(
        "🧹 Normalized {} -> {} reviews (missing text: {}, bad rating: {}, out of range: {}, duplicates: {}, unknown timestamps: {})",
        stats.rows_in,
        stats.rows_out,
        stats.missing_text,
        stats.invalid_rating,
        stats.out_of_range_rating,
        stats.duplicates_removed,
        stats.unknown_timestamps
    );

    (kept, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(rating: &str, text: &str, ts: Option<&str>) -> RawReview {
        RawReview {
            source: Some("google".into()),
            rating: Some(rating.into()),
            review: Some(text.into()),
            location: None,
            timestamp: ts.map(String::from),
        }
    }

    #[test]
    fn test_rule_labels_for_every_star() {
        assert_eq!(SentimentLabel::from_rating(1), SentimentLabel::Negative);
        assert_eq!(SentimentLabel::from_rating(2), SentimentLabel::Negative);
        assert_eq!(SentimentLabel::from_rating(3), SentimentLabel::Neutral);
        assert_eq!(SentimentLabel::from_rating(4), SentimentLabel::Positive);
        assert_eq!(SentimentLabel::from_rating(5), SentimentLabel::Positive);
    }

    #[test]
    fn test_out_of_range_rows_are_dropped() {
        let (records, stats) = normalize(vec![
            raw("0", "te koud", None),
            raw("4", "prima", None),
            raw("6", "fantastisch", None),
            raw("2", "traag", None),
        ]);
        assert_eq!(records.len(), 2);
        assert_eq!(stats.out_of_range_rating, 2);
    }

    #[test]
    fn test_three_rows_one_invalid_yields_two() {
        let (records, _) = normalize(vec![
            raw("5", "a", None),
            raw("6", "b", None),
            raw("1", "c", None),
        ]);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_missing_text_or_rating_is_filtered() {
        let mut no_text = raw("4", "   ", None);
        no_text.review = Some("   ".into());
        let (records, stats) = normalize(vec![
            no_text,
            raw("vijf", "tekst", None),
            RawReview {
                review: Some("zonder rating".into()),
                ..Default::default()
            },
        ]);
        assert!(records.is_empty());
        assert_eq!(stats.missing_text, 1);
        assert_eq!(stats.invalid_rating, 2);
    }

    #[test]
    fn test_decimal_ratings_are_rounded() {
        let (records, _) = normalize(vec![raw("4,5", "x", None), raw(" 2.0 ", "y", None)]);
        assert_eq!(records[0].rating, 5);
        assert_eq!(records[1].rating, 2);
    }

    #[test]
    fn test_dedupe_keeps_latest_timestamp() {
        let (records, stats) = normalize(vec![
            raw("5", "Heerlijk", Some("2024-03-10 12:00:00")),
            raw("1", "Heerlijk", Some("2023-01-01")),
            raw("3", "Anders", Some("2024-01-01")),
        ]);
        assert_eq!(records.len(), 2);
        assert_eq!(stats.duplicates_removed, 1);
        let kept = records.iter().find(|r| r.review_text == "Heerlijk").unwrap();
        assert_eq!(kept.rating, 5);
        assert_eq!(kept.month_bucket.as_deref(), Some("2024-03"));
        // output is chronological
        assert_eq!(records[0].review_text, "Anders");
    }

    #[test]
    fn test_dedupe_with_unknown_timestamps_uses_input_order() {
        let (records, _) = normalize(vec![
            raw("1", "zelfde", None),
            raw("5", "zelfde", Some("kapot")),
        ]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].rating, 5);
        assert!(records[0].timestamp.is_none());
        assert!(records[0].month_bucket.is_none());
    }

    #[test]
    fn test_known_timestamp_beats_unknown_in_sort() {
        let (records, _) = normalize(vec![
            raw("2", "a", None),
            raw("4", "b", Some("2024-02-01")),
        ]);
        assert_eq!(records[0].review_text, "b");
        assert_eq!(records[1].review_text, "a");
    }

    #[test]
    fn test_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 17).unwrap();
        for raw in [
            "2024-05-17T10:00:00+02:00",
            "2024-05-17 10:00:00",
            "2024-05-17",
            "17-05-2024",
            "17/05/2024",
            "Fri, 17 May 2024 10:00:00 +0000",
        ] {
            let ts = parse_timestamp(raw).unwrap_or_else(|| panic!("failed on {raw}"));
            assert_eq!(ts.date_naive(), expected, "{raw}");
        }
        assert!(parse_timestamp("gisteren").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_empty_input() {
        let (records, stats) = normalize(Vec::new());
        assert!(records.is_empty());
        assert_eq!(stats.rows_out, 0);
    }
}
