//! TF-IDF features for the sentiment classifier.
//!
//! Two analyzers are fitted side by side and stacked horizontally:
//! - word unigrams + bigrams over the cleaned tokens
//! - character 3..=5-grams over the cleaned string (spaces included)
//!
//! Both keep terms seen in at least 2 documents and at most 90% of documents,
//! use smoothed idf `ln((1 + n) / (1 + df)) + 1` and L2-normalise each row.

use std::collections::{BTreeMap, HashMap, HashSet};

/// Sparse row: `(feature index, value)` pairs sorted by index.
pub type SparseVec = Vec<(usize, f64)>;

pub fn dot(row: &SparseVec, dense: &[f64]) -> f64 {
    row.iter().map(|(i, v)| dense[*i] * v).sum()
}

pub fn squared_norm(row: &SparseVec) -> f64 {
    row.iter().map(|(_, v)| v * v).sum()
}

/// How documents are split into terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Analyzer {
    Word { min_n: usize, max_n: usize },
    Char { min_n: usize, max_n: usize },
}

impl Analyzer {
    pub fn terms(&self, text: &str) -> Vec<String> {
        match *self {
            Analyzer::Word { min_n, max_n } => {
                let tokens: Vec<&str> = text.split_whitespace().collect();
                let mut out = Vec::new();
                for n in min_n..=max_n {
                    if n == 0 || tokens.len() < n {
                        continue;
                    }
                    out.extend(tokens.windows(n).map(|w| w.join(" ")));
                }
                out
            }
            Analyzer::Char { min_n, max_n } => {
                let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
                let chars: Vec<char> = normalized.chars().collect();
                let mut out = Vec::new();
                for n in min_n..=max_n {
                    if n == 0 || chars.len() < n {
                        continue;
                    }
                    out.extend(chars.windows(n).map(|w| w.iter().collect::<String>()));
                }
                out
            }
        }
    }
}

/// Single-analyzer TF-IDF vectorizer.
#[derive(Debug, Clone)]
pub struct TfidfVectorizer {
    analyzer: Analyzer,
    min_df: usize,
    max_df: f64,
    max_features: Option<usize>,
    vocabulary: HashMap<String, usize>,
    feature_names: Vec<String>,
    idf: Vec<f64>,
}

impl TfidfVectorizer {
    pub fn new(analyzer: Analyzer) -> Self {
        Self {
            analyzer,
            min_df: 2,
            max_df: 0.9,
            max_features: None,
            vocabulary: HashMap::new(),
            feature_names: Vec::new(),
            idf: Vec::new(),
        }
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features);
        self
    }

    pub fn with_df_bounds(mut self, min_df: usize, max_df: f64) -> Self {
        self.min_df = min_df;
        self.max_df = max_df;
        self
    }

    pub fn vocabulary_size(&self) -> usize {
        self.feature_names.len()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Learn vocabulary and idf weights.
    pub fn fit<S: AsRef<str>>(&mut self, documents: &[S]) {
        let n_documents = documents.len();
        let mut document_frequency: BTreeMap<String, usize> = BTreeMap::new();
        let mut term_frequency: HashMap<String, usize> = HashMap::new();

        for doc in documents {
            let terms = self.analyzer.terms(doc.as_ref());
            let unique: HashSet<&String> = terms.iter().collect();
            for term in unique {
                *document_frequency.entry(term.clone()).or_insert(0) += 1;
            }
            for term in terms {
                *term_frequency.entry(term).or_insert(0) += 1;
            }
        }

        let max_doc_count = self.max_df * n_documents as f64;
        let mut kept: Vec<(String, usize)> = document_frequency
            .into_iter()
            .filter(|(_, df)| *df >= self.min_df && (*df as f64) <= max_doc_count)
            .collect();

        if let Some(limit) = self.max_features {
            if kept.len() > limit {
                // Most frequent terms first, alphabetical among equals
                kept.sort_by(|a, b| {
                    let fa = term_frequency.get(&a.0).copied().unwrap_or(0);
                    let fb = term_frequency.get(&b.0).copied().unwrap_or(0);
                    fb.cmp(&fa).then_with(|| a.0.cmp(&b.0))
                });
                kept.truncate(limit);
                kept.sort_by(|a, b| a.0.cmp(&b.0));
            }
        }

        self.vocabulary = kept
            .iter()
            .enumerate()
            .map(|(idx, (term, _))| (term.clone(), idx))
            .collect();
        self.idf = kept
            .iter()
            .map(|(_, df)| ((n_documents as f64 + 1.0) / (*df as f64 + 1.0)).ln() + 1.0)
            .collect();
        self.feature_names = kept.into_iter().map(|(term, _)| term).collect();
    }

    /// Transform one document into an L2-normalised tf-idf row.
    pub fn transform_one(&self, document: &str) -> SparseVec {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for term in self.analyzer.terms(document) {
            if let Some(&idx) = self.vocabulary.get(&term) {
                *counts.entry(idx).or_insert(0.0) += 1.0;
            }
        }
        let mut row: SparseVec = counts
            .into_iter()
            .map(|(idx, tf)| (idx, tf * self.idf[idx]))
            .collect();
        let norm = squared_norm(&row).sqrt();
        if norm > 0.0 {
            for (_, v) in row.iter_mut() {
                *v /= norm;
            }
        }
        row
    }

    pub fn transform<S: AsRef<str>>(&self, documents: &[S]) -> Vec<SparseVec> {
        documents.iter().map(|d| self.transform_one(d.as_ref())).collect()
    }
}

/// Word + character TF-IDF, stacked word-first.
#[derive(Debug, Clone)]
pub struct CombinedTfidf {
    word: TfidfVectorizer,
    char: TfidfVectorizer,
}

impl Default for CombinedTfidf {
    fn default() -> Self {
        Self::new()
    }
}

impl CombinedTfidf {
    pub fn new() -> Self {
        Self {
            word: TfidfVectorizer::new(Analyzer::Word { min_n: 1, max_n: 2 })
                .with_max_features(40_000),
            char: TfidfVectorizer::new(Analyzer::Char { min_n: 3, max_n: 5 }),
        }
    }

    pub fn n_features(&self) -> usize {
        self.word.vocabulary_size() + self.char.vocabulary_size()
    }

    pub fn fit<S: AsRef<str>>(&mut self, documents: &[S]) {
        self.word.fit(documents);
        self.char.fit(documents);
    }

    pub fn fit_transform<S: AsRef<str>>(&mut self, documents: &[S]) -> Vec<SparseVec> {
        self.fit(documents);
        self.transform(documents)
    }

    pub fn transform_one(&self, document: &str) -> SparseVec {
        let offset = self.word.vocabulary_size();
        let mut row = self.word.transform_one(document);
        row.extend(
            self.char
                .transform_one(document)
                .into_iter()
                .map(|(idx, v)| (idx + offset, v)),
        );
        row
    }

    pub fn transform<S: AsRef<str>>(&self, documents: &[S]) -> Vec<SparseVec> {
        documents.iter().map(|d| self.transform_one(d.as_ref())).collect()
    }

    /// Feature names in column order.
    pub fn feature_names(&self) -> Vec<String> {
        self.word
            .feature_names()
            .iter()
            .chain(self.char.feature_names().iter())
            .cloned()
            .collect()
    }
}
