//! Sentiment labeling.
//!
//! One capability, two strategies:
//! - `Rule`: the rating-derived label attached during normalization
//! - `Ml`: a TF-IDF + linear classifier trained on a stratified split of the
//!   cleaned texts against the rating labels, selected by cross-validated macro-F1
//!
//! ML mode never fails the run. When the class counts make training infeasible
//! it logs a warning and hands back the rule labels.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::SentimentMode;
use crate::errors::MlError;
use crate::features::{CombinedTfidf, SparseVec};
use crate::model::{self, candidate_grid, ModelKind};
use crate::normalize::{ReviewRecord, SentimentLabel};
use crate::text::{CleanedText, TextCleaner};

/// Indicative terms per sentiment class.
pub type TopTerms = BTreeMap<SentimentLabel, Vec<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MlSettings {
    pub test_size: f64,
    pub seed: u64,
    pub top_terms: usize,
}

impl Default for MlSettings {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            seed: 42,
            top_terms: 15,
        }
    }
}

/// Held-out metrics for one class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassReport {
    pub label: SentimentLabel,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Everything worth knowing about the trained model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelReport {
    pub candidate: String,
    pub kind: ModelKind,
    pub c: f64,
    pub cv_score: Option<f64>,
    pub cv_scores: Vec<(String, f64)>,
    pub fallback_used: bool,
    pub n_train: usize,
    pub n_test: usize,
    pub n_features: usize,
    pub accuracy: f64,
    pub macro_f1: f64,
    pub per_class: Vec<ClassReport>,
    /// Rows are true labels, columns predicted, both in negative/neutral/positive order
    pub confusion_matrix: Vec<Vec<usize>>,
    pub top_terms: TopTerms,
    pub normalizer_version: &'static str,
}

/// Labels for every record plus how they were produced.
#[derive(Debug, Clone)]
pub struct LabelingOutcome {
    pub labels: Vec<SentimentLabel>,
    pub mode_used: SentimentMode,
    pub model: Option<ModelReport>,
}

impl LabelingOutcome {
    pub fn top_terms(&self) -> TopTerms {
        self.model
            .as_ref()
            .map(|m| m.top_terms.clone())
            .unwrap_or_default()
    }
}

/// Selected labeling strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SentimentLabeler {
    Rule,
    Ml(MlSettings),
}

impl SentimentLabeler {
    pub fn from_mode(mode: SentimentMode, settings: MlSettings) -> Self {
        match mode {
            SentimentMode::Rule => SentimentLabeler::Rule,
            SentimentMode::Ml => SentimentLabeler::Ml(settings),
        }
    }

    pub fn mode(&self) -> SentimentMode {
        match self {
            SentimentLabeler::Rule => SentimentMode::Rule,
            SentimentLabeler::Ml(_) => SentimentMode::Ml,
        }
    }

    /// Label every record. `cleaned` is aligned with `records`.
    pub fn label(&self, records: &[ReviewRecord], cleaned: &[CleanedText]) -> LabelingOutcome {
        let rule_labels: Vec<SentimentLabel> = records.iter().map(|r| r.sentiment_label).collect();
        match self {
            SentimentLabeler::Rule => LabelingOutcome {
                labels: rule_labels,
                mode_used: SentimentMode::Rule,
                model: None,
            },
            SentimentLabeler::Ml(settings) => match train_and_predict(cleaned, &rule_labels, settings) {
                Ok((labels, report)) => LabelingOutcome {
                    labels,
                    mode_used: SentimentMode::Ml,
                    model: Some(report),
                },
                Err(e) => {
                    warn!("⚠️ ML sentiment infeasible ({}); falling back to rule labels", e);
                    LabelingOutcome {
                        labels: rule_labels,
                        mode_used: SentimentMode::Rule,
                        model: None,
                    }
                }
            },
        }
    }
}

/// Fail unless there are two classes or more, each with at least two examples.
pub fn check_trainable(labels: &[SentimentLabel]) -> Result<(), MlError> {
    let mut counts: BTreeMap<SentimentLabel, usize> = BTreeMap::new();
    for label in labels {
        *counts.entry(*label).or_insert(0) += 1;
    }
    if counts.len() < 2 {
        return Err(MlError::TooFewClasses(counts.len()));
    }
    if let Some((label, count)) = counts.iter().find(|(_, c)| **c < 2) {
        return Err(MlError::ClassTooSmall {
            label: label.to_string(),
            count: *count,
        });
    }
    Ok(())
}

fn pick<T: Clone>(items: &[T], idx: &[usize]) -> Vec<T> {
    idx.iter().map(|i| items[*i].clone()).collect()
}

/// Train on a stratified split, evaluate on the held-out part and label every text.
pub fn train_and_predict(
    cleaned: &[CleanedText],
    labels: &[SentimentLabel],
    settings: &MlSettings,
) -> Result<(Vec<SentimentLabel>, ModelReport), MlError> {
    if cleaned.len() != labels.len() {
        return Err(MlError::LengthMismatch {
            texts: cleaned.len(),
            labels: labels.len(),
        });
    }
    check_trainable(labels)?;

    let texts: Vec<&str> = cleaned.iter().map(CleanedText::as_str).collect();
    let y: Vec<usize> = labels.iter().map(SentimentLabel::index).collect();
    let (train_idx, test_idx) = model::stratified_split(&y, settings.test_size, settings.seed);

    let train_texts = pick(&texts, &train_idx);
    let y_train = pick(&y, &train_idx);
    let mut tfidf = CombinedTfidf::new();
    let x_train: Vec<SparseVec> = tfidf.fit_transform(&train_texts);
    let n_features = tfidf.n_features();

    let grid = candidate_grid();
    let Some(selection) = model::select_model(&grid, &x_train, &y_train, n_features, settings.seed)
    else {
        return Err(MlError::TooFewClasses(0));
    };
    info!(
        "🧠 Selected {} (cv macro-F1 {}) on {} training rows, {} features",
        selection.candidate.name,
        selection
            .cv_score
            .map(|s| format!("{s:.4}"))
            .unwrap_or_else(|| "n/a".to_string()),
        train_idx.len(),
        n_features
    );

    let x_test = tfidf.transform(&pick(&texts, &test_idx));
    let y_test = pick(&y, &test_idx);
    let y_pred = selection.model.predict(&x_test);

    let mut confusion = vec![vec![0usize; SentimentLabel::ALL.len()]; SentimentLabel::ALL.len()];
    for (t, p) in y_test.iter().zip(&y_pred) {
        confusion[*t][*p] += 1;
    }
    let per_class = model::class_scores(&y_test, &y_pred)
        .into_iter()
        .filter_map(|s| {
            SentimentLabel::from_index(s.label).map(|label| ClassReport {
                label,
                precision: s.precision,
                recall: s.recall,
                f1: s.f1,
                support: s.support,
            })
        })
        .collect();

    let feature_names = tfidf.feature_names();
    let top_terms: TopTerms = selection
        .model
        .top_features(&feature_names, settings.top_terms)
        .into_iter()
        .filter_map(|(idx, terms)| SentimentLabel::from_index(idx).map(|label| (label, terms)))
        .collect();

    let predicted: Vec<SentimentLabel> = selection
        .model
        .predict(&tfidf.transform(&texts))
        .into_iter()
        .map(|idx| SentimentLabel::from_index(idx).unwrap_or(SentimentLabel::Neutral))
        .collect();

    let report = ModelReport {
        candidate: selection.candidate.name.clone(),
        kind: selection.candidate.kind,
        c: selection.candidate.c,
        cv_score: selection.cv_score,
        cv_scores: selection.cv_scores.clone(),
        fallback_used: selection.fallback_used,
        n_train: train_idx.len(),
        n_test: test_idx.len(),
        n_features,
        accuracy: model::accuracy(&y_test, &y_pred),
        macro_f1: model::macro_f1(&y_test, &y_pred),
        per_class,
        confusion_matrix: confusion,
        top_terms,
        normalizer_version: TextCleaner::NORMALIZER_VERSION,
    };
    Ok((predicted, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(rating: u8, text: &str) -> ReviewRecord {
        ReviewRecord {
            source: "test".to_string(),
            rating,
            review_text: text.to_string(),
            location: None,
            timestamp: None,
            date: None,
            month_bucket: None,
            sentiment_label: SentimentLabel::from_rating(rating),
        }
    }

    fn tokens(text: &str) -> CleanedText {
        CleanedText::from_tokens(text.split_whitespace().map(str::to_string).collect())
    }

    fn corpus() -> (Vec<ReviewRecord>, Vec<CleanedText>) {
        let by_rating = [
            (1, ["cold dirti slow", "rude slow cold", "dirti rude wait"]),
            (3, ["okai averag fine", "averag decent okai", "fine decent averag"]),
            (5, ["great tasti love", "love friend great", "tasti friend love"]),
        ];
        let mut records = Vec::new();
        let mut cleaned = Vec::new();
        for round in 0..4 {
            for (rating, texts) in &by_rating {
                for text in texts {
                    let text = format!("{text} batch{round}");
                    records.push(record(*rating, &text));
                    cleaned.push(tokens(&text));
                }
            }
        }
        (records, cleaned)
    }

    #[test]
    fn test_rule_mode_is_identity_on_ratings() {
        let records: Vec<ReviewRecord> = [1, 3, 5, 2, 4].iter().map(|r| record(*r, "x")).collect();
        let cleaned = vec![CleanedText::default(); records.len()];
        let outcome = SentimentLabeler::Rule.label(&records, &cleaned);
        assert_eq!(outcome.mode_used, SentimentMode::Rule);
        assert!(outcome.model.is_none());
        assert!(outcome.top_terms().is_empty());
        assert_eq!(
            outcome.labels,
            vec![
                SentimentLabel::Negative,
                SentimentLabel::Neutral,
                SentimentLabel::Positive,
                SentimentLabel::Negative,
                SentimentLabel::Positive,
            ]
        );
    }

    #[test]
    fn test_check_trainable() {
        use SentimentLabel::*;
        assert_eq!(check_trainable(&[Negative, Negative]), Err(MlError::TooFewClasses(1)));
        assert!(matches!(
            check_trainable(&[Negative, Negative, Positive]),
            Err(MlError::ClassTooSmall { count: 1, .. })
        ));
        assert!(check_trainable(&[Negative, Negative, Positive, Positive]).is_ok());
    }

    #[test]
    fn test_ml_mode_falls_back_when_infeasible() {
        let records = vec![record(1, "a"), record(1, "b"), record(5, "c")];
        let cleaned = vec![tokens("slow"), tokens("cold"), tokens("great")];
        let labeler = SentimentLabeler::Ml(MlSettings::default());
        let outcome = labeler.label(&records, &cleaned);
        assert_eq!(outcome.mode_used, SentimentMode::Rule);
        assert!(outcome.model.is_none());
        assert_eq!(outcome.labels[2], SentimentLabel::Positive);
    }

    #[test]
    fn test_ml_mode_trains_and_reports() {
        let (records, cleaned) = corpus();
        let labeler = SentimentLabeler::from_mode(SentimentMode::Ml, MlSettings::default());
        let outcome = labeler.label(&records, &cleaned);
        assert_eq!(outcome.mode_used, SentimentMode::Ml);
        assert_eq!(outcome.labels.len(), records.len());

        let report = outcome.model.as_ref().unwrap();
        assert!(candidate_grid().iter().any(|c| c.name == report.candidate));
        assert_eq!(report.n_train + report.n_test, records.len());
        assert_eq!(report.per_class.len(), 3);
        assert!(report.macro_f1 > 0.5);
        assert_eq!(report.top_terms.len(), 3);
        let total: usize = report.confusion_matrix.iter().flatten().sum();
        assert_eq!(total, report.n_test);
    }

    #[test]
    fn test_length_mismatch_is_error() {
        let err = train_and_predict(&[], &[SentimentLabel::Negative], &MlSettings::default())
            .unwrap_err();
        assert_eq!(err, MlError::LengthMismatch { texts: 0, labels: 1 });
    }
}
