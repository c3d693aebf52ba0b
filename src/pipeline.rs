//! End-to-end run: raw rows → records → cleaned text → {tags, labels} → report.
//!
//! The analysis itself is synchronous and single-pass. Only the suggestion step
//! is async, because it may talk to a remote generator.

use chrono::Utc;
use tracing::info;

use crate::aggregate::{aggregate, AggregateReport};
use crate::complaints::{ComplaintTags, ComplaintTaxonomy};
use crate::config::{SentimentMode, Settings};
use crate::errors::ConfigError;
use crate::ingest::RawReview;
use crate::keywords::KeywordVocabulary;
use crate::normalize::{normalize, NormalizeStats, ReviewRecord, SentimentLabel};
use crate::sentiment::{MlSettings, ModelReport, SentimentLabeler, TopTerms};
use crate::suggestions::{
    prefilter_top_terms, refine_top_terms, rule_suggestions, SuggestionGenerator,
    SuggestionReport, SuggestionRequest,
};
use crate::text::{CleanedText, TextCleaner};

/// Per-review and corpus-level results of one run. Every per-review vector is
/// aligned with `records`.
#[derive(Debug, Clone)]
pub struct ReviewAnalysis {
    pub records: Vec<ReviewRecord>,
    pub cleaned: Vec<CleanedText>,
    pub tags: Vec<ComplaintTags>,
    /// Comma-joined controlled keywords
    pub keywords: Vec<String>,
    pub labels: Vec<SentimentLabel>,
    pub mode_used: SentimentMode,
    pub model: Option<ModelReport>,
    pub stats: NormalizeStats,
    pub report: AggregateReport,
}

impl ReviewAnalysis {
    /// Cleaned text of the first `max` negative reviews.
    pub fn negative_review_sample(&self, max: usize) -> Vec<String> {
        self.cleaned
            .iter()
            .zip(&self.labels)
            .filter(|(_, label)| **label == SentimentLabel::Negative)
            .map(|(cleaned, _)| cleaned.to_string())
            .take(max)
            .collect()
    }
}

/// Read-only components shared by every review of a run.
#[derive(Debug)]
pub struct Pipeline {
    cleaner: TextCleaner,
    taxonomy: ComplaintTaxonomy,
    vocabulary: KeywordVocabulary,
    labeler: SentimentLabeler,
}

impl Pipeline {
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let ml = MlSettings {
            test_size: settings.test_size,
            seed: settings.seed,
            top_terms: settings.top_terms,
        };
        Ok(Self {
            cleaner: TextCleaner::new(settings.language),
            taxonomy: ComplaintTaxonomy::for_language(settings.language)?,
            vocabulary: KeywordVocabulary::for_language(settings.language)?,
            labeler: SentimentLabeler::from_mode(settings.sentiment_mode, ml),
        })
    }

    pub fn cleaner(&self) -> &TextCleaner {
        &self.cleaner
    }

    pub fn taxonomy(&self) -> &ComplaintTaxonomy {
        &self.taxonomy
    }

    pub fn vocabulary(&self) -> &KeywordVocabulary {
        &self.vocabulary
    }

    /// Run every deterministic stage. Never fails; zero rows give an empty report.
    pub fn analyze(&self, rows: Vec<RawReview>) -> ReviewAnalysis {
        let (records, stats) = normalize(rows);
        let texts: Vec<&str> = records.iter().map(|r| r.review_text.as_str()).collect();
        let cleaned = self.cleaner.clean_all(&texts);
        let tagged = self.taxonomy.tag_all(&cleaned);
        let keywords = self.vocabulary.extract_controlled(&cleaned);

        let outcome = self.labeler.label(&records, &cleaned);
        let report = aggregate(&records, &cleaned, &tagged.per_text, &outcome.labels, outcome.top_terms());
        info!(
            "📊 Analyzed {} reviews ({:?} mode, {} negative)",
            report.total_reviews, outcome.mode_used, report.negative_reviews
        );

        ReviewAnalysis {
            records,
            cleaned,
            tags: tagged.per_text,
            keywords,
            labels: outcome.labels,
            mode_used: outcome.mode_used,
            model: outcome.model,
            stats,
            report,
        }
    }
}

/// Top terms as published: refined through the generator when asked, else as fitted.
pub async fn published_top_terms(
    analysis: &ReviewAnalysis,
    settings: &Settings,
    generator: Option<&dyn SuggestionGenerator>,
) -> TopTerms {
    let terms = &analysis.report.top_terms;
    if terms.is_empty() || !settings.refine_top_terms {
        return terms.clone();
    }
    match generator {
        Some(generator) => refine_top_terms(generator, terms).await,
        None => prefilter_top_terms(terms),
    }
}

/// Build the suggestion report. Generator failures yield `source = none` (or
/// rule suggestions when enabled); this never fails.
pub async fn build_suggestions(
    analysis: &ReviewAnalysis,
    settings: &Settings,
    generator: Option<&dyn SuggestionGenerator>,
    top_terms: &TopTerms,
) -> SuggestionReport {
    let negative = &analysis.report.negative_complaints;
    let rules = if settings.rule_suggestions {
        rule_suggestions(negative, settings.language)
    } else {
        Vec::new()
    };

    let mut generated = Vec::new();
    let mut model_name = None;
    if let Some(generator) = generator.filter(|_| settings.use_llm_suggestions) {
        let sample = analysis.negative_review_sample(settings.llm.max_negative_samples);
        if sample.is_empty() {
            info!("💡 No negative reviews, skipping suggestion generator");
        } else {
            info!("💡 Asking {} for suggestions ({} reviews)", generator.model_name(), sample.len());
            let request = SuggestionRequest::new(settings.language, sample, negative, top_terms.clone());
            generated = generator.suggest(&request).await;
            model_name = Some(generator.model_name());
        }
    }

    SuggestionReport::build(generated, rules, model_name, settings.language, Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::config::Language;
    use crate::suggestions::SuggestionSource;

    fn raw(rating: &str, text: &str, ts: &str) -> RawReview {
        RawReview {
            source: Some("google".to_string()),
            rating: Some(rating.to_string()),
            review: Some(text.to_string()),
            location: Some("Utrecht".to_string()),
            timestamp: Some(ts.to_string()),
        }
    }

    fn english_settings() -> Settings {
        Settings {
            language: Language::English,
            ..Settings::default()
        }
    }

    fn five_reviews() -> Vec<RawReview> {
        vec![
            raw("1", "We had to wait an hour and the table was dirty", "2024-01-05"),
            raw("3", "Average pasta, nothing special", "2024-01-06"),
            raw("5", "Lovely dinner, friendly staff", "2024-02-01"),
            raw("2", "Cold soup and rude waiter", "2024-02-03"),
            raw("4", "Nice terrace and good wine", "2024-02-10"),
        ]
    }

    struct FailingGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SuggestionGenerator for FailingGenerator {
        fn model_name(&self) -> String {
            "stub:failing".to_string()
        }

        async fn suggest(&self, _request: &SuggestionRequest) -> Vec<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Malformed output parses to nothing
            crate::suggestions::parse_suggestions("{ not json")
        }
    }

    struct EchoGenerator;

    #[async_trait]
    impl SuggestionGenerator for EchoGenerator {
        fn model_name(&self) -> String {
            "stub:echo".to_string()
        }

        async fn suggest(&self, request: &SuggestionRequest) -> Vec<String> {
            request
                .complaint_counts
                .keys()
                .map(|k| format!("Fix {k} issues"))
                .collect()
        }
    }

    #[test]
    fn test_end_to_end_five_reviews() {
        let settings = english_settings();
        let pipeline = Pipeline::from_settings(&settings).unwrap();
        let analysis = pipeline.analyze(five_reviews());

        assert_eq!(analysis.records.len(), 5);
        assert_eq!(analysis.cleaned.len(), 5);
        assert_eq!(analysis.tags.len(), 5);
        assert_eq!(analysis.keywords.len(), 5);
        let report = &analysis.report;
        assert_eq!(report.mean_rating, Some(3.0));
        assert_eq!(report.sentiment_distribution[&SentimentLabel::Negative], 2);
        assert_eq!(report.sentiment_distribution[&SentimentLabel::Neutral], 1);
        assert_eq!(report.sentiment_distribution[&SentimentLabel::Positive], 2);
        assert!(report.top_terms.is_empty());
        assert_eq!(report.monthly_average_rating.len(), 2);
    }

    #[test]
    fn test_zero_rows_give_empty_report() {
        let pipeline = Pipeline::from_settings(&Settings::default()).unwrap();
        let analysis = pipeline.analyze(Vec::new());
        assert_eq!(analysis.report.total_reviews, 0);
        assert_eq!(analysis.report.mean_rating, None);
        assert!(analysis.negative_review_sample(10).is_empty());
    }

    #[test]
    fn test_ml_mode_on_tiny_data_falls_back_to_rule() {
        let settings = Settings {
            sentiment_mode: SentimentMode::Ml,
            ..english_settings()
        };
        let pipeline = Pipeline::from_settings(&settings).unwrap();
        let analysis = pipeline.analyze(five_reviews());
        // neutral has a single example
        assert_eq!(analysis.mode_used, SentimentMode::Rule);
        assert!(analysis.model.is_none());
    }

    #[tokio::test]
    async fn test_failing_generator_yields_source_none() {
        let settings = Settings {
            use_llm_suggestions: true,
            ..english_settings()
        };
        let pipeline = Pipeline::from_settings(&settings).unwrap();
        let analysis = pipeline.analyze(five_reviews());
        let generator = FailingGenerator {
            calls: AtomicUsize::new(0),
        };
        let report = build_suggestions(&analysis, &settings, Some(&generator), &TopTerms::new()).await;
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.source, SuggestionSource::None);
        assert!(report.suggestions.is_empty());
        assert!(report.model.is_none());
        assert!(report.fallback_message.is_some());
        assert!(report.generated_at.ends_with('Z'));
    }

    #[tokio::test]
    async fn test_generator_output_wins_over_rules() {
        let settings = Settings {
            use_llm_suggestions: true,
            rule_suggestions: true,
            ..english_settings()
        };
        let pipeline = Pipeline::from_settings(&settings).unwrap();
        let analysis = pipeline.analyze(five_reviews());
        let report = build_suggestions(&analysis, &settings, Some(&EchoGenerator), &TopTerms::new()).await;
        assert_eq!(report.source, SuggestionSource::Llm);
        assert_eq!(report.model.as_deref(), Some("stub:echo"));
        assert!(report.suggestions.iter().any(|s| s == "Fix wait_time issues"));

        let no_llm = Settings {
            use_llm_suggestions: false,
            ..settings
        };
        let report = build_suggestions(&analysis, &no_llm, Some(&EchoGenerator), &TopTerms::new()).await;
        assert_eq!(report.source, SuggestionSource::Rule);
        assert!(!report.suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_rule_mode_top_terms_stay_empty() {
        let settings = Settings {
            refine_top_terms: true,
            ..english_settings()
        };
        let pipeline = Pipeline::from_settings(&settings).unwrap();
        let analysis = pipeline.analyze(five_reviews());
        assert!(published_top_terms(&analysis, &settings, None).await.is_empty());
    }
}
