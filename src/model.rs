//! Linear text classifiers, metrics and cross-validated model selection.
//!
//! Two model families are supported, both L2-regularised with strength `1/C`
//! and class-balanced sample weights `n / (k * n_c)`:
//! - multinomial logistic regression (softmax cross-entropy)
//! - one-vs-rest linear SVC (squared hinge)
//!
//! Fitting is deterministic full-batch accelerated gradient descent with
//! momentum restarts; the step size comes from a Lipschitz bound of the loss on
//! the given rows. Grid candidates are cross-validated on scoped threads.

use std::collections::{BTreeMap, BTreeSet};
use std::thread;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use tracing::debug;

use crate::features::{dot, squared_norm, SparseVec};

// Stop once the gradient norm falls this far below its first value
const RELATIVE_TOLERANCE: f64 = 1e-3;
const ABSOLUTE_TOLERANCE: f64 = 1e-8;

/// Model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    LogisticRegression,
    LinearSvc,
}

/// One entry of the selection grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub name: String,
    pub kind: ModelKind,
    pub c: f64,
    pub max_iter: usize,
}

impl Candidate {
    pub fn logistic(c: f64) -> Self {
        Self {
            name: format!("logreg_C={c}"),
            kind: ModelKind::LogisticRegression,
            c,
            max_iter: 200,
        }
    }

    pub fn linear_svc(c: f64) -> Self {
        Self {
            name: format!("linsvc_C={c}"),
            kind: ModelKind::LinearSvc,
            c,
            max_iter: 300,
        }
    }
}

/// Default grid. The first entry is the fallback when cross-validation cannot run.
pub fn candidate_grid() -> Vec<Candidate> {
    let mut grid: Vec<Candidate> = [0.1, 0.5, 1.0, 3.0, 10.0]
        .into_iter()
        .map(Candidate::logistic)
        .collect();
    grid.extend([0.5, 1.0, 3.0, 10.0].into_iter().map(Candidate::linear_svc));
    grid
}

/// Fitted linear decision function over label indices.
#[derive(Debug, Clone)]
pub struct LinearModel {
    pub kind: ModelKind,
    /// Label index of each weight row
    pub classes: Vec<usize>,
    pub weights: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

fn balanced_weights(y: &[usize], classes: &[usize]) -> Vec<f64> {
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for label in y {
        *counts.entry(*label).or_insert(0) += 1;
    }
    let n = y.len() as f64;
    let k = classes.len() as f64;
    y.iter()
        .map(|label| n / (k * counts[label] as f64))
        .collect()
}

impl LinearModel {
    /// Fit a candidate on rows `x` (with `n_features` columns) and label indices `y`.
    pub fn fit(candidate: &Candidate, x: &[SparseVec], y: &[usize], n_features: usize) -> Self {
        let classes: Vec<usize> = y.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let k = classes.len();
        let n = n_features;
        let mut model = LinearModel {
            kind: candidate.kind,
            classes: classes.clone(),
            weights: vec![vec![0.0; n]; k],
            intercepts: vec![0.0; k],
        };
        if k < 2 || x.is_empty() {
            return model;
        }

        let class_pos: BTreeMap<usize, usize> =
            classes.iter().enumerate().map(|(pos, c)| (*c, pos)).collect();
        let sample_weights = balanced_weights(y, &classes);
        let weight_sum: f64 = sample_weights.iter().sum();
        let problem = Problem {
            kind: candidate.kind,
            x,
            targets: y.iter().map(|label| class_pos[label]).collect(),
            row_scale: sample_weights.iter().map(|w| w / weight_sum).collect(),
            lambda: 1.0 / (candidate.c * weight_sum),
            k,
            n,
        };

        let max_norm = x.iter().map(squared_norm).fold(0.0, f64::max) + 1.0;
        let curvature = match candidate.kind {
            ModelKind::LogisticRegression => 0.5,
            ModelKind::LinearSvc => 2.0,
        };
        let step = 1.0 / (curvature * max_norm + problem.lambda);

        // Flat class-major buffers, reused across iterations
        let mut params = vec![0.0; k * n + k];
        let mut prev = params.clone();
        let mut look = params.clone();
        let mut grad = params.clone();
        let mut scores = vec![0.0; k];

        let mut t = 1.0_f64;
        let mut stop_below = None;
        for iter in 0..candidate.max_iter {
            let t_next = (1.0 + (1.0 + 4.0 * t * t).sqrt()) / 2.0;
            let momentum = (t - 1.0) / t_next;
            for ((l, cur), old) in look.iter_mut().zip(&params).zip(&prev) {
                *l = cur + momentum * (cur - old);
            }

            problem.gradient(&look, &mut grad, &mut scores);
            let grad_norm = grad.iter().map(|g| g * g).sum::<f64>().sqrt();

            std::mem::swap(&mut prev, &mut params);
            let mut uphill = 0.0;
            for (((p, l), g), old) in params.iter_mut().zip(&look).zip(&grad).zip(&prev) {
                *p = l - step * g;
                uphill += g * (*p - old);
            }
            // Momentum restart when the step moves against the gradient
            t = if uphill > 0.0 { 1.0 } else { t_next };

            let threshold =
                *stop_below.get_or_insert((RELATIVE_TOLERANCE * grad_norm).max(ABSOLUTE_TOLERANCE));
            if grad_norm <= threshold {
                debug!("{} converged after {} iterations", candidate.name, iter + 1);
                break;
            }
        }

        model.weights = (0..k).map(|c| params[c * n..(c + 1) * n].to_vec()).collect();
        model.intercepts = params[k * n..].to_vec();
        model
    }

    /// Raw decision value per class row.
    pub fn decision_function(&self, row: &SparseVec) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.intercepts)
            .map(|(w, b)| dot(row, w) + b)
            .collect()
    }

    /// Predicted label index (first class wins ties).
    pub fn predict_one(&self, row: &SparseVec) -> usize {
        let scores = self.decision_function(row);
        let mut best = 0;
        for (pos, score) in scores.iter().enumerate() {
            if *score > scores[best] {
                best = pos;
            }
        }
        self.classes.get(best).copied().unwrap_or(0)
    }

    pub fn predict(&self, x: &[SparseVec]) -> Vec<usize> {
        x.iter().map(|row| self.predict_one(row)).collect()
    }

    /// Features with the largest absolute weight per class, strongest first.
    pub fn top_features(&self, feature_names: &[String], n: usize) -> Vec<(usize, Vec<String>)> {
        self.classes
            .iter()
            .zip(&self.weights)
            .map(|(label, weights)| {
                let mut order: Vec<usize> = (0..weights.len().min(feature_names.len())).collect();
                order.sort_by(|a, b| {
                    weights[*b]
                        .abs()
                        .partial_cmp(&weights[*a].abs())
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.cmp(b))
                });
                let terms = order
                    .into_iter()
                    .filter(|idx| weights[*idx] != 0.0)
                    .take(n)
                    .map(|idx| feature_names[idx].clone())
                    .collect();
                (*label, terms)
            })
            .collect()
    }
}

/// Regularised weighted-mean loss over one training set.
struct Problem<'a> {
    kind: ModelKind,
    x: &'a [SparseVec],
    targets: Vec<usize>,
    /// Sample weight divided by the weight total
    row_scale: Vec<f64>,
    lambda: f64,
    k: usize,
    n: usize,
}

impl Problem<'_> {
    /// Gradient at `params` (class-major weights then intercepts) into `grad`.
    fn gradient(&self, params: &[f64], grad: &mut [f64], scores: &mut [f64]) {
        let (k, n) = (self.k, self.n);
        let (weights, intercepts) = params.split_at(k * n);
        let (grad_w, grad_b) = grad.split_at_mut(k * n);
        for (g, w) in grad_w.iter_mut().zip(weights) {
            *g = self.lambda * w;
        }
        grad_b.iter_mut().for_each(|g| *g = 0.0);

        for ((row, target), scale) in self.x.iter().zip(&self.targets).zip(&self.row_scale) {
            for (c, score) in scores.iter_mut().enumerate() {
                *score = dot(row, &weights[c * n..(c + 1) * n]) + intercepts[c];
            }

            match self.kind {
                ModelKind::LogisticRegression => {
                    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                    let mut total = 0.0;
                    for s in scores.iter_mut() {
                        *s = (*s - max).exp();
                        total += *s;
                    }
                    for (c, s) in scores.iter_mut().enumerate() {
                        *s = *s / total - if c == *target { 1.0 } else { 0.0 };
                    }
                }
                ModelKind::LinearSvc => {
                    for (c, s) in scores.iter_mut().enumerate() {
                        let sign = if c == *target { 1.0 } else { -1.0 };
                        let slack = 1.0 - sign * *s;
                        *s = if slack > 0.0 { -2.0 * sign * slack } else { 0.0 };
                    }
                }
            }

            for (c, residual) in scores.iter().enumerate() {
                if *residual == 0.0 {
                    continue;
                }
                let coef = scale * residual;
                let class_grad = &mut grad_w[c * n..(c + 1) * n];
                for (idx, v) in row {
                    class_grad[*idx] += coef * v;
                }
                grad_b[c] += coef;
            }
        }
    }
}

/// Per-class precision / recall / F1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassScore {
    pub label: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Scores for every label in the union of true and predicted labels.
pub fn class_scores(y_true: &[usize], y_pred: &[usize]) -> Vec<ClassScore> {
    let labels: BTreeSet<usize> = y_true.iter().chain(y_pred.iter()).copied().collect();
    labels
        .into_iter()
        .map(|label| {
            let tp = y_true
                .iter()
                .zip(y_pred)
                .filter(|(t, p)| **t == label && **p == label)
                .count() as f64;
            let predicted = y_pred.iter().filter(|p| **p == label).count() as f64;
            let support = y_true.iter().filter(|t| **t == label).count();
            let precision = if predicted > 0.0 { tp / predicted } else { 0.0 };
            let recall = if support > 0 { tp / support as f64 } else { 0.0 };
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            ClassScore {
                label,
                precision,
                recall,
                f1,
                support,
            }
        })
        .collect()
}

/// Unweighted mean of per-class F1. Empty input scores 0.
pub fn macro_f1(y_true: &[usize], y_pred: &[usize]) -> f64 {
    let scores = class_scores(y_true, y_pred);
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().map(|s| s.f1).sum::<f64>() / scores.len() as f64
}

pub fn accuracy(y_true: &[usize], y_pred: &[usize]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let hits = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    hits as f64 / y_true.len() as f64
}

fn indices_by_class(y: &[usize]) -> BTreeMap<usize, Vec<usize>> {
    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (idx, label) in y.iter().enumerate() {
        by_class.entry(*label).or_default().push(idx);
    }
    by_class
}

/// Stratified k folds as `(train, test)` index lists. Each class is shuffled
/// with the seed and dealt round-robin over the folds.
pub fn stratified_kfold(y: &[usize], k: usize, seed: u64) -> Vec<(Vec<usize>, Vec<usize>)> {
    let k = k.max(1);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut fold_of = vec![0usize; y.len()];
    for (_, mut members) in indices_by_class(y) {
        members.shuffle(&mut rng);
        for (pos, idx) in members.into_iter().enumerate() {
            fold_of[idx] = pos % k;
        }
    }
    (0..k)
        .map(|fold| {
            let (test, train): (Vec<usize>, Vec<usize>) =
                (0..y.len()).partition(|idx| fold_of[*idx] == fold);
            (train, test)
        })
        .collect()
}

/// Stratified train/test split. Every class with at least two members lands on
/// both sides.
pub fn stratified_split(y: &[usize], test_size: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();
    for (_, mut members) in indices_by_class(y) {
        members.shuffle(&mut rng);
        let n = members.len();
        let n_test = if n < 2 {
            0
        } else {
            ((n as f64 * test_size).round() as usize).clamp(1, n - 1)
        };
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

/// Outcome of model selection.
#[derive(Debug, Clone)]
pub struct Selection {
    pub candidate: Candidate,
    /// Mean CV macro-F1 of the chosen candidate; `None` on fallback
    pub cv_score: Option<f64>,
    /// Mean CV macro-F1 per evaluated candidate, grid order
    pub cv_scores: Vec<(String, f64)>,
    pub fallback_used: bool,
    pub model: LinearModel,
}

fn subset<T: Clone>(items: &[T], idx: &[usize]) -> Vec<T> {
    idx.iter().map(|i| items[*i].clone()).collect()
}

struct Fold {
    x_train: Vec<SparseVec>,
    y_train: Vec<usize>,
    x_test: Vec<SparseVec>,
    y_test: Vec<usize>,
}

/// Mean macro-F1 over the folds, ignoring non-finite fold scores.
fn cross_validate(candidate: &Candidate, folds: &[Fold], n_features: usize) -> Option<f64> {
    let scores: Vec<f64> = folds
        .iter()
        .map(|fold| {
            let model = LinearModel::fit(candidate, &fold.x_train, &fold.y_train, n_features);
            macro_f1(&fold.y_test, &model.predict(&fold.x_test))
        })
        .filter(|s| s.is_finite())
        .collect();
    (!scores.is_empty()).then(|| scores.iter().sum::<f64>() / scores.len() as f64)
}

/// Pick the grid candidate with the best mean CV macro-F1 and refit it on all rows.
///
/// Folds: `clamp(smallest class count, 2, 3)`. With fewer than two classes or a
/// class of a single example the first candidate is used without CV.
pub fn select_model(
    grid: &[Candidate],
    x: &[SparseVec],
    y: &[usize],
    n_features: usize,
    seed: u64,
) -> Option<Selection> {
    let first = grid.first()?.clone();
    let counts = indices_by_class(y);
    let min_count = counts.values().map(Vec::len).min().unwrap_or(0);

    let mut best: Option<(usize, f64)> = None;
    let mut cv_scores = Vec::new();
    if counts.len() >= 2 && min_count >= 2 {
        let n_splits = min_count.clamp(2, 3);
        let folds: Vec<Fold> = stratified_kfold(y, n_splits, seed)
            .into_iter()
            .map(|(train, test)| Fold {
                x_train: subset(x, &train),
                y_train: subset(y, &train),
                x_test: subset(x, &test),
                y_test: subset(y, &test),
            })
            .collect();

        // Candidates are independent; fit them side by side, read back in grid order
        let means: Vec<Option<f64>> = thread::scope(|scope| {
            let handles: Vec<_> = grid
                .iter()
                .map(|candidate| {
                    let folds = &folds;
                    scope.spawn(move || cross_validate(candidate, folds, n_features))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().ok().flatten())
                .collect()
        });

        for (pos, (candidate, mean)) in grid.iter().zip(means).enumerate() {
            let Some(mean) = mean else {
                continue;
            };
            debug!("📊 {} cv macro-F1 {:.4}", candidate.name, mean);
            cv_scores.push((candidate.name.clone(), mean));
            if best.map_or(true, |(_, score)| mean > score) {
                best = Some((pos, mean));
            }
        }
    }

    let (candidate, cv_score, fallback_used) = match best {
        Some((pos, score)) => (grid[pos].clone(), Some(score), false),
        None => (first, None, true),
    };
    let model = LinearModel::fit(&candidate, x, y, n_features);
    Some(Selection {
        candidate,
        cv_score,
        cv_scores,
        fallback_used,
        model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::CombinedTfidf;
    use rand::Rng;
    use std::time::{Duration, Instant};

    fn separable() -> (Vec<String>, Vec<usize>) {
        let positive = ["great tasti love", "love great friend", "tasti friend great", "love tasti"];
        let negative = ["cold dirti slow", "slow rude cold", "dirti rude slow", "cold rude"];
        let mut texts = Vec::new();
        let mut labels = Vec::new();
        for round in 0..3 {
            for p in positive {
                texts.push(format!("{p} extra{round}"));
                labels.push(2);
            }
            for n in negative {
                texts.push(format!("{n} extra{round}"));
                labels.push(0);
            }
        }
        (texts, labels)
    }

    #[test]
    fn test_macro_f1_and_accuracy() {
        let y_true = [0, 0, 1, 1];
        let y_pred = [0, 1, 1, 1];
        // class 0: p=1 r=.5 f1=.667; class 1: p=.667 r=1 f1=.8
        assert!((macro_f1(&y_true, &y_pred) - (2.0 / 3.0 + 0.8) / 2.0).abs() < 1e-9);
        assert!((accuracy(&y_true, &y_pred) - 0.75).abs() < 1e-9);
        assert_eq!(macro_f1(&[], &[]), 0.0);
    }

    #[test]
    fn test_stratified_kfold_covers_every_class() {
        let y = [0, 0, 0, 1, 1, 1, 2, 2, 2];
        let folds = stratified_kfold(&y, 3, 42);
        assert_eq!(folds.len(), 3);
        for (train, test) in &folds {
            assert_eq!(train.len() + test.len(), y.len());
            let test_classes: BTreeSet<usize> = test.iter().map(|i| y[*i]).collect();
            assert_eq!(test_classes.len(), 3);
        }
    }

    #[test]
    fn test_stratified_split_keeps_minority_on_both_sides() {
        let mut y = vec![2; 40];
        y.extend([0, 0, 1, 1, 1]);
        let (train, test) = stratified_split(&y, 0.2, 7);
        assert_eq!(train.len() + test.len(), y.len());
        for class in [0, 1, 2] {
            assert!(train.iter().any(|i| y[*i] == class));
            assert!(test.iter().any(|i| y[*i] == class));
        }
        assert_eq!(stratified_split(&y, 0.2, 7), (train, test));
    }

    #[test]
    fn test_selection_stays_in_grid_and_beats_majority() {
        let (texts, labels) = separable();
        let mut tfidf = CombinedTfidf::new();
        let x = tfidf.fit_transform(&texts);
        let grid = candidate_grid();
        let selection = select_model(&grid, &x, &labels, tfidf.n_features(), 42).unwrap();
        assert!(grid.contains(&selection.candidate));
        assert!(!selection.fallback_used);
        let majority_baseline = macro_f1(&labels, &vec![labels[0]; labels.len()]);
        assert!(selection.cv_score.unwrap() > majority_baseline);
        assert_eq!(selection.model.predict(&x), labels);
    }

    #[test]
    fn test_degenerate_counts_fall_back_to_first_candidate() {
        let x: Vec<SparseVec> = vec![vec![(0, 1.0)], vec![(1, 1.0)], vec![(1, 1.0)]];
        let y = [0, 2, 2];
        let grid = candidate_grid();
        let selection = select_model(&grid, &x, &y, 2, 42).unwrap();
        assert!(selection.fallback_used);
        assert_eq!(selection.candidate, grid[0]);
        assert!(selection.cv_score.is_none());
        assert!(select_model(&[], &x, &y, 2, 42).is_none());
    }

    #[test]
    fn test_svc_and_logreg_separate_simple_data() {
        let x: Vec<SparseVec> = vec![
            vec![(0, 1.0)],
            vec![(0, 0.9), (2, 0.1)],
            vec![(1, 1.0)],
            vec![(1, 0.8), (2, 0.2)],
        ];
        let y = [0, 0, 2, 2];
        for candidate in [Candidate::logistic(10.0), Candidate::linear_svc(1.0)] {
            let model = LinearModel::fit(&candidate, &x, &y, 3);
            assert_eq!(model.predict(&x), y.to_vec(), "{}", candidate.name);
            let top = model.top_features(&["a".into(), "b".into(), "c".into()], 1);
            assert_eq!(top.len(), 2);
        }
    }

    #[test]
    fn test_single_class_model_predicts_that_class() {
        let x: Vec<SparseVec> = vec![vec![(0, 1.0)], vec![(0, 0.5)]];
        let model = LinearModel::fit(&Candidate::logistic(1.0), &x, &[1, 1], 1);
        assert_eq!(model.predict(&x), vec![1, 1]);
    }

    #[test]
    fn test_selection_on_two_thousand_reviews_stays_fast() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut texts = Vec::new();
        let mut labels = Vec::new();
        for i in 0..2000 {
            let label = [0usize, 1, 2][i % 3];
            let mut words: Vec<String> = (0..2)
                .map(|_| format!("c{}w{}", label, rng.gen_range(0..25)))
                .collect();
            words.extend((0..2).map(|_| format!("s{}", rng.gen_range(0..300))));
            texts.push(words.join(" "));
            labels.push(label);
        }
        let mut tfidf = CombinedTfidf::new();
        let x = tfidf.fit_transform(&texts);

        let started = Instant::now();
        let selection = select_model(&candidate_grid(), &x, &labels, tfidf.n_features(), 42).unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed < Duration::from_secs(120), "selection took {elapsed:?}");
        assert!(!selection.fallback_used);
        assert!(selection.cv_score.unwrap() > 0.9);
    }
}
