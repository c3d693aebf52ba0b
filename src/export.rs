//! Report files.
//!
//! Flat CSV tables for spreadsheets plus one `summary.json` with everything the
//! run knows. Complaint tags are written as one semicolon-joined column.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::aggregate::AggregateReport;
use crate::config::{SentimentMode, Settings};
use crate::normalize::NormalizeStats;
use crate::pipeline::ReviewAnalysis;
use crate::sentiment::{ModelReport, TopTerms};
use crate::suggestions::SuggestionReport;
use crate::text::TextCleaner;

#[derive(Debug, Serialize)]
struct EnrichedRow<'a> {
    source: &'a str,
    rating: u8,
    location: &'a str,
    month: &'a str,
    sentiment: &'a str,
    cleaned_review: &'a str,
    complaints: String,
    ml_keywords: &'a str,
}

#[derive(Debug, Serialize)]
struct CountRow<'a> {
    name: &'a str,
    count: usize,
}

#[derive(Debug, Serialize)]
struct SuggestionRow<'a> {
    suggestion: &'a str,
    source: &'a str,
    model: Option<&'a str>,
    generated_at: &'a str,
}

#[derive(Debug, Serialize)]
struct Summary<'a> {
    run_id: Uuid,
    generated_at: String,
    normalizer_version: &'static str,
    settings: &'a Settings,
    mode_used: SentimentMode,
    normalize: &'a NormalizeStats,
    report: &'a AggregateReport,
    published_top_terms: &'a TopTerms,
    model: Option<&'a ModelReport>,
    suggestions: &'a SuggestionReport,
}

fn write_csv<T: Serialize>(path: &Path, header: &[&str], rows: impl IntoIterator<Item = T>) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    // Explicit header so empty tables still carry one
    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush().with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Write every report file into `dir` (created if needed) and return their paths.
pub fn write_report(
    dir: &Path,
    settings: &Settings,
    analysis: &ReviewAnalysis,
    top_terms: &TopTerms,
    suggestions: &SuggestionReport,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("creating output dir {}", dir.display()))?;
    let mut written = Vec::new();

    let path = dir.join("reviews_enriched.csv");
    let rows = analysis
        .records
        .iter()
        .zip(&analysis.cleaned)
        .zip(&analysis.tags)
        .zip(&analysis.keywords)
        .zip(&analysis.labels)
        .map(|((((record, cleaned), tags), keywords), label)| EnrichedRow {
            source: &record.source,
            rating: record.rating,
            location: record.location.as_deref().unwrap_or(""),
            month: record.month_bucket.as_deref().unwrap_or(""),
            sentiment: label.as_str(),
            cleaned_review: cleaned.as_str(),
            complaints: tags.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(";"),
            ml_keywords: keywords,
        });
    write_csv(
        &path,
        &["source", "rating", "location", "month", "sentiment", "cleaned_review", "complaints", "ml_keywords"],
        rows,
    )?;
    written.push(path);

    let report = &analysis.report;
    let pain_points = report.ranked_pain_points();
    let path = dir.join("pain_points.csv");
    write_csv(
        &path,
        &["category", "count"],
        pain_points.iter().map(|(name, count)| CountRow { name, count: *count }),
    )?;
    written.push(path);

    let path = dir.join("complaints_all_reviews.csv");
    write_csv(
        &path,
        &["category", "count"],
        report
            .all_review_complaints
            .iter()
            .map(|(c, n)| CountRow { name: c.as_str(), count: *n }),
    )?;
    written.push(path);

    let path = dir.join("sentiment_distribution.csv");
    write_csv(
        &path,
        &["sentiment", "count"],
        report
            .sentiment_distribution
            .iter()
            .map(|(label, n)| CountRow { name: label.as_str(), count: *n }),
    )?;
    written.push(path);

    // Empty cell rather than 0 when there is nothing to average
    let path = dir.join("average_rating.csv");
    let mean = report.mean_rating.map(|m| format!("{m:.4}")).unwrap_or_default();
    let total = report.total_reviews.to_string();
    write_csv(
        &path,
        &["metric", "value"],
        [("average_rating", mean.as_str()), ("total_reviews", total.as_str())],
    )?;
    written.push(path);

    let path = dir.join("business_suggestions.csv");
    write_csv(
        &path,
        &["suggestion", "source", "model", "generated_at"],
        suggestions.suggestions.iter().map(|s| SuggestionRow {
            suggestion: s,
            source: suggestions.source.as_str(),
            model: suggestions.model.as_deref(),
            generated_at: &suggestions.generated_at,
        }),
    )?;
    written.push(path);

    let path = dir.join("business_suggestions.txt");
    fs::write(&path, suggestions.render_text()).with_context(|| format!("writing {}", path.display()))?;
    written.push(path);

    let summary = Summary {
        run_id: Uuid::new_v4(),
        generated_at: suggestions.generated_at.clone(),
        normalizer_version: TextCleaner::NORMALIZER_VERSION,
        settings,
        mode_used: analysis.mode_used,
        normalize: &analysis.stats,
        report,
        published_top_terms: top_terms,
        model: analysis.model.as_ref(),
        suggestions,
    };
    let path = dir.join("summary.json");
    let json = serde_json::to_string_pretty(&summary).context("serializing summary")?;
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    written.push(path);

    info!(
        "💾 Wrote {} report files to {} ({})",
        written.len(),
        dir.display(),
        Utc::now().format("%Y-%m-%d %H:%M:%S")
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Language;
    use crate::ingest::RawReview;
    use crate::pipeline::Pipeline;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("review-insights-{}", Uuid::new_v4()))
    }

    fn analysis(rows: Vec<RawReview>) -> (Settings, ReviewAnalysis) {
        let settings = Settings {
            language: Language::English,
            ..Settings::default()
        };
        let analysis = Pipeline::from_settings(&settings).unwrap().analyze(rows);
        (settings, analysis)
    }

    fn empty_suggestions() -> SuggestionReport {
        SuggestionReport::build(vec![], vec![], None, Language::English, Utc::now())
    }

    #[test]
    fn test_writes_every_file() {
        let rows = vec![
            RawReview {
                source: Some("google".into()),
                rating: Some("1".into()),
                review: Some("Long wait and dirty tables".into()),
                location: None,
                timestamp: Some("2024-03-01".into()),
            },
            RawReview {
                source: Some("tripadvisor".into()),
                rating: Some("5".into()),
                review: Some("Great staff".into()),
                location: Some("Utrecht".into()),
                timestamp: None,
            },
        ];
        let (settings, analysis) = analysis(rows);
        let dir = temp_dir();
        let written = write_report(&dir, &settings, &analysis, &TopTerms::new(), &empty_suggestions()).unwrap();
        assert_eq!(written.len(), 8);
        assert!(written.iter().all(|p| p.exists()));

        let enriched = fs::read_to_string(dir.join("reviews_enriched.csv")).unwrap();
        let header = enriched.lines().next().unwrap();
        assert_eq!(
            header,
            "source,rating,location,month,sentiment,cleaned_review,complaints,ml_keywords"
        );
        assert!(enriched.contains("wait_time;cleanliness"));

        let pain = fs::read_to_string(dir.join("pain_points.csv")).unwrap();
        assert!(pain.starts_with("category,count\n"));
        assert!(pain.contains("wait_time,1"));

        let txt = fs::read_to_string(dir.join("business_suggestions.txt")).unwrap();
        assert!(txt.starts_with("No strong"));

        let summary: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join("summary.json")).unwrap()).unwrap();
        assert_eq!(summary["report"]["total_reviews"], 2);
        assert_eq!(summary["suggestions"]["source"], "none");
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_empty_run_still_writes_report() {
        let (settings, analysis) = analysis(Vec::new());
        let dir = temp_dir();
        write_report(&dir, &settings, &analysis, &TopTerms::new(), &empty_suggestions()).unwrap();
        let avg = fs::read_to_string(dir.join("average_rating.csv")).unwrap();
        assert!(avg.contains("average_rating,\n"));
        assert!(avg.contains("total_reviews,0"));
        let summary: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join("summary.json")).unwrap()).unwrap();
        assert!(summary["report"]["mean_rating"].is_null());
        fs::remove_dir_all(&dir).ok();
    }
}
