//! Classification metrics and the evaluation report

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::classifier::Classifier;
use super::dataset::{Label, Table};
use crate::domain::DomainError;

/// Metric name to value
pub type MetricMap = BTreeMap<String, f64>;

pub const ACCURACY: &str = "accuracy";
pub const PRECISION: &str = "precision";
pub const RECALL: &str = "recall";
pub const F1_SCORE: &str = "f1_score";
pub const ROC_AUC: &str = "roc_auc";

/// Why ROC-AUC was not computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RocAucUnavailable {
    /// The classifier has no probability output
    NoProbabilities,
    /// The test target does not have exactly two distinct labels
    NotBinary { distinct_labels: usize },
    /// The classifier never saw the positive test label during fitting
    MissingPositiveClass,
}

/// ROC-AUC outcome, always present in a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RocAuc {
    Computed { value: f64 },
    Unavailable { reason: RocAucUnavailable },
}

impl RocAuc {
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Computed { value } => Some(*value),
            Self::Unavailable { .. } => None,
        }
    }
}

/// Metrics computed on a held-out set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub roc_auc: RocAuc,
}

impl EvaluationReport {
    /// Flat mapping; `roc_auc` is included only when it was computed
    pub fn metrics(&self) -> MetricMap {
        let mut map = MetricMap::new();
        map.insert(ACCURACY.to_string(), self.accuracy);
        map.insert(PRECISION.to_string(), self.precision);
        map.insert(RECALL.to_string(), self.recall);
        map.insert(F1_SCORE.to_string(), self.f1_score);

        if let Some(value) = self.roc_auc.value() {
            map.insert(ROC_AUC.to_string(), value);
        }

        map
    }
}

/// Score a classifier on a labelled test set
pub fn evaluate_classifier(
    classifier: &dyn Classifier,
    x_test: &Table,
    y_test: &[Label],
) -> Result<EvaluationReport, DomainError> {
    if y_test.is_empty() {
        return Err(DomainError::data("Test set is empty"));
    }

    if x_test.len() != y_test.len() {
        return Err(DomainError::data(format!(
            "Test rows ({}) and labels ({}) differ in length",
            x_test.len(),
            y_test.len()
        )));
    }

    let y_pred = classifier.predict(x_test)?;
    let (precision, recall, f1_score) = weighted_precision_recall_f1(y_test, &y_pred);

    Ok(EvaluationReport {
        accuracy: accuracy(y_test, &y_pred),
        precision,
        recall,
        f1_score,
        roc_auc: binary_roc_auc(classifier, x_test, y_test)?,
    })
}

fn binary_roc_auc(
    classifier: &dyn Classifier,
    x_test: &Table,
    y_test: &[Label],
) -> Result<RocAuc, DomainError> {
    let Some(proba) = classifier.predict_proba(x_test)? else {
        return Ok(RocAuc::Unavailable {
            reason: RocAucUnavailable::NoProbabilities,
        });
    };

    let distinct: BTreeSet<Label> = y_test.iter().copied().collect();
    if distinct.len() != 2 {
        return Ok(RocAuc::Unavailable {
            reason: RocAucUnavailable::NotBinary {
                distinct_labels: distinct.len(),
            },
        });
    }

    // Larger label is the positive class
    let positive = *distinct.iter().next_back().unwrap_or(&1);
    let Some(column) = classifier.classes().iter().position(|&c| c == positive) else {
        return Ok(RocAuc::Unavailable {
            reason: RocAucUnavailable::MissingPositiveClass,
        });
    };

    let scores: Vec<f64> = proba.iter().map(|row| row[column]).collect();
    let truth: Vec<bool> = y_test.iter().map(|&y| y == positive).collect();

    Ok(RocAuc::Computed {
        value: roc_auc_score(&truth, &scores),
    })
}

/// Fraction of exact matches
pub fn accuracy(y_true: &[Label], y_pred: &[Label]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }

    let correct = y_true
        .iter()
        .zip(y_pred)
        .filter(|(t, p)| t == p)
        .count();

    correct as f64 / y_true.len() as f64
}

/// Support-weighted precision, recall and F1; undefined ratios count as zero
pub fn weighted_precision_recall_f1(y_true: &[Label], y_pred: &[Label]) -> (f64, f64, f64) {
    let labels: BTreeSet<Label> = y_true.iter().chain(y_pred).copied().collect();
    let total = y_true.len() as f64;

    if total == 0.0 {
        return (0.0, 0.0, 0.0);
    }

    let mut precision = 0.0;
    let mut recall = 0.0;
    let mut f1 = 0.0;

    for label in labels {
        let mut tp = 0usize;
        let mut fp = 0usize;
        let mut fn_ = 0usize;

        for (&t, &p) in y_true.iter().zip(y_pred) {
            match (t == label, p == label) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (true, false) => fn_ += 1,
                (false, false) => {}
            }
        }

        let support = (tp + fn_) as f64;
        let p = ratio(tp, tp + fp);
        let r = ratio(tp, tp + fn_);
        let f = if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };

        precision += p * support;
        recall += r * support;
        f1 += f * support;
    }

    (precision / total, recall / total, f1 / total)
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Area under the ROC curve via the rank statistic, ties get average ranks
pub fn roc_auc_score(truth: &[bool], scores: &[f64]) -> f64 {
    let n_pos = truth.iter().filter(|&&t| t).count();
    let n_neg = truth.len() - n_pos;

    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }

        let average_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = average_rank;
        }
        i = j + 1;
    }

    let positive_rank_sum: f64 = ranks
        .iter()
        .zip(truth)
        .filter(|(_, t)| **t)
        .map(|(r, _)| r)
        .sum();

    let n_pos = n_pos as f64;
    (positive_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_accuracy() {
        assert!(approx(accuracy(&[0, 1, 1, 0], &[0, 1, 0, 0]), 0.75));
    }

    #[test]
    fn test_weighted_metrics() {
        // label 0: tp=2 fp=1 fn=0 support=2 -> p=2/3 r=1 f=0.8
        // label 1: tp=1 fp=0 fn=1 support=2 -> p=1 r=0.5 f=2/3
        let (p, r, f) = weighted_precision_recall_f1(&[0, 1, 1, 0], &[0, 1, 0, 0]);
        assert!(approx(p, (2.0 / 3.0 + 1.0) / 2.0));
        assert!(approx(r, 0.75));
        assert!(approx(f, (0.8 + 2.0 / 3.0) / 2.0));
    }

    #[test]
    fn test_weighted_metrics_zero_division() {
        // never predicts 1 -> precision of label 1 is 0, not NaN
        let (p, _, f) = weighted_precision_recall_f1(&[0, 1], &[0, 0]);
        assert!(p.is_finite());
        assert!(f.is_finite());
        assert!(approx(p, 0.25));
    }

    #[test]
    fn test_roc_auc_perfect_and_inverted() {
        let truth = [false, false, true, true];
        assert!(approx(roc_auc_score(&truth, &[0.1, 0.2, 0.8, 0.9]), 1.0));
        assert!(approx(roc_auc_score(&truth, &[0.9, 0.8, 0.2, 0.1]), 0.0));
    }

    #[test]
    fn test_roc_auc_with_ties() {
        let truth = [false, true, false, true];
        assert!(approx(roc_auc_score(&truth, &[0.5, 0.5, 0.5, 0.5]), 0.5));
        // sklearn: roc_auc_score([0,0,1,1],[0.1,0.4,0.35,0.8]) == 0.75
        assert!(approx(
            roc_auc_score(&[false, false, true, true], &[0.1, 0.4, 0.35, 0.8]),
            0.75
        ));
    }

    #[test]
    fn test_report_metric_map_omits_unavailable_auc() {
        let report = EvaluationReport {
            accuracy: 0.5,
            precision: 0.5,
            recall: 0.5,
            f1_score: 0.5,
            roc_auc: RocAuc::Unavailable {
                reason: RocAucUnavailable::NotBinary { distinct_labels: 3 },
            },
        };

        let metrics = report.metrics();
        assert_eq!(metrics.len(), 4);
        assert!(!metrics.contains_key(ROC_AUC));

        let json = serde_json::to_value(&report.roc_auc).unwrap();
        assert_eq!(json["status"], "unavailable");
        assert_eq!(json["reason"]["kind"], "not_binary");
    }
}
