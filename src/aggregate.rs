//! Corpus-level statistics for one run.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::complaints::{count_categories, CategoryCounts, ComplaintTags};
use crate::normalize::{ReviewRecord, SentimentLabel};
use crate::sentiment::TopTerms;
use crate::text::CleanedText;

/// Aggregate report. An empty input yields zero counts and `mean_rating: None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    pub total_reviews: usize,
    /// `None` when there are no reviews, never a numeric zero
    pub mean_rating: Option<f64>,
    /// Count per label; every label present
    pub sentiment_distribution: BTreeMap<SentimentLabel, usize>,
    pub negative_reviews: usize,
    /// Complaint counts over negative-labeled reviews only (pain points)
    pub negative_complaints: CategoryCounts,
    /// Complaint counts over every review
    pub all_review_complaints: CategoryCounts,
    /// Empty in rule mode
    pub top_terms: TopTerms,
    /// Count per star, 1 through 5
    pub rating_distribution: BTreeMap<u8, usize>,
    /// `YYYY-MM` → mean rating, reviews with unknown month excluded
    pub monthly_average_rating: BTreeMap<String, f64>,
    /// Reviews whose cleaned text came out empty
    pub empty_cleaned_reviews: usize,
}

/// Combine per-review results. All slices are aligned with `records`.
pub fn aggregate(
    records: &[ReviewRecord],
    cleaned: &[CleanedText],
    tags: &[ComplaintTags],
    labels: &[SentimentLabel],
    top_terms: TopTerms,
) -> AggregateReport {
    let total_reviews = records.len();
    let mean_rating = if total_reviews == 0 {
        None
    } else {
        let sum: f64 = records.iter().map(|r| f64::from(r.rating)).sum();
        Some(sum / total_reviews as f64)
    };

    let mut sentiment_distribution: BTreeMap<SentimentLabel, usize> =
        SentimentLabel::ALL.iter().map(|l| (*l, 0)).collect();
    for label in labels {
        *sentiment_distribution.entry(*label).or_insert(0) += 1;
    }

    let negative_tags: Vec<&ComplaintTags> = tags
        .iter()
        .zip(labels)
        .filter(|(_, label)| **label == SentimentLabel::Negative)
        .map(|(t, _)| t)
        .collect();

    let mut rating_distribution: BTreeMap<u8, usize> = (1..=5).map(|r| (r, 0)).collect();
    let mut monthly: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for record in records {
        *rating_distribution.entry(record.rating).or_insert(0) += 1;
        if let Some(month) = &record.month_bucket {
            let entry = monthly.entry(month.clone()).or_insert((0.0, 0));
            entry.0 += f64::from(record.rating);
            entry.1 += 1;
        }
    }

    AggregateReport {
        total_reviews,
        mean_rating,
        sentiment_distribution,
        negative_reviews: labels.iter().filter(|l| **l == SentimentLabel::Negative).count(),
        negative_complaints: count_categories(negative_tags),
        all_review_complaints: count_categories(tags.iter()),
        top_terms,
        rating_distribution,
        monthly_average_rating: monthly
            .into_iter()
            .map(|(month, (sum, n))| (month, sum / n as f64))
            .collect(),
        empty_cleaned_reviews: cleaned.iter().filter(|c| c.is_empty()).count(),
    }
}

impl AggregateReport {
    /// Negative complaint categories with at least one hit, most frequent first.
    pub fn ranked_pain_points(&self) -> Vec<(String, usize)> {
        let mut ranked: Vec<(String, usize)> = self
            .negative_complaints
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(c, n)| (c.to_string(), *n))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complaints::Category;

    fn record(rating: u8, month: Option<&str>) -> ReviewRecord {
        ReviewRecord {
            source: "google".to_string(),
            rating,
            review_text: format!("review {rating}"),
            location: None,
            timestamp: None,
            date: None,
            month_bucket: month.map(str::to_string),
            sentiment_label: SentimentLabel::from_rating(rating),
        }
    }

    #[test]
    fn test_five_review_scenario() {
        let records: Vec<ReviewRecord> = [1, 3, 5, 2, 4].iter().map(|r| record(*r, None)).collect();
        let labels: Vec<SentimentLabel> = records.iter().map(|r| r.sentiment_label).collect();
        let cleaned = vec![CleanedText::default(); 5];
        let tags = vec![ComplaintTags::new(); 5];
        let report = aggregate(&records, &cleaned, &tags, &labels, TopTerms::new());
        assert_eq!(report.total_reviews, 5);
        assert_eq!(report.mean_rating, Some(3.0));
        assert_eq!(report.sentiment_distribution[&SentimentLabel::Negative], 2);
        assert_eq!(report.sentiment_distribution[&SentimentLabel::Neutral], 1);
        assert_eq!(report.sentiment_distribution[&SentimentLabel::Positive], 2);
        assert!(report.top_terms.is_empty());
    }

    #[test]
    fn test_empty_input_is_well_formed() {
        let report = aggregate(&[], &[], &[], &[], TopTerms::new());
        assert_eq!(report.total_reviews, 0);
        assert_eq!(report.mean_rating, None);
        assert_eq!(report.sentiment_distribution.len(), 3);
        assert!(report.sentiment_distribution.values().all(|n| *n == 0));
        assert_eq!(report.negative_complaints.len(), Category::ALL.len());
        assert!(report.ranked_pain_points().is_empty());
    }

    #[test]
    fn test_negative_only_complaints() {
        let records = vec![record(1, Some("2024-01")), record(5, Some("2024-01")), record(2, Some("2024-02"))];
        let labels: Vec<SentimentLabel> = records.iter().map(|r| r.sentiment_label).collect();
        let tags: Vec<ComplaintTags> = vec![
            [Category::WaitTime, Category::Cleanliness].into_iter().collect(),
            [Category::WaitTime].into_iter().collect(),
            [Category::Service].into_iter().collect(),
        ];
        let cleaned = vec![CleanedText::default(); 3];
        let report = aggregate(&records, &cleaned, &tags, &labels, TopTerms::new());

        assert_eq!(report.negative_reviews, 2);
        assert_eq!(report.negative_complaints[&Category::WaitTime], 1);
        assert_eq!(report.all_review_complaints[&Category::WaitTime], 2);
        let total_negative: usize = report.negative_complaints.values().sum();
        assert!(total_negative <= report.negative_reviews * Category::ALL.len());
        assert_eq!(report.monthly_average_rating["2024-01"], 3.0);
        assert_eq!(report.monthly_average_rating["2024-02"], 2.0);
        assert_eq!(report.rating_distribution[&1], 1);
        assert_eq!(report.rating_distribution[&3], 0);
        assert_eq!(
            report.ranked_pain_points(),
            vec![
                ("cleanliness".to_string(), 1),
                ("service".to_string(), 1),
                ("wait_time".to_string(), 1)
            ]
        );
    }
}
