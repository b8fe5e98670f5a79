//! Bagged random forest classifier

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::params::ForestParams;
use super::tree::DecisionTree;
use crate::domain::{Classifier, DomainError, Label, Table};

/// Model kind recorded in metadata and artifacts
pub const RANDOM_FOREST_MODEL_TYPE: &str = "RandomForestClassifier";

/// Ensemble of decision trees fitted on bootstrap samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    params: ForestParams,
    classes: Vec<Label>,
    features: Vec<String>,
    trees: Vec<DecisionTree>,
}

impl RandomForestClassifier {
    /// Fit a forest; deterministic for a given `params.random_state`
    pub fn fit(x: &Table, y: &[Label], params: ForestParams) -> Result<Self, DomainError> {
        if x.is_empty() {
            return Err(DomainError::data("Cannot fit on an empty dataset"));
        }

        if x.len() != y.len() {
            return Err(DomainError::data(format!(
                "Feature rows ({}) and labels ({}) differ in length",
                x.len(),
                y.len()
            )));
        }

        if x.width() == 0 {
            return Err(DomainError::data("Cannot fit without feature columns"));
        }

        if let Some(idx) = x.rows().iter().position(|row| row.iter().any(|v| !v.is_finite())) {
            return Err(DomainError::data(format!(
                "Row {} contains a missing or non-finite value",
                idx
            )));
        }

        let classes: Vec<Label> = y.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let y_idx: Vec<usize> = y
            .iter()
            .map(|label| classes.binary_search(label).unwrap_or_default())
            .collect();

        let n = x.len();
        let max_features = params.max_features.resolve(x.width());
        let mut rng = StdRng::seed_from_u64(params.random_state);

        let trees = (0..params.n_estimators)
            .map(|_| {
                let mut tree_rng = StdRng::seed_from_u64(rng.r#gen());
                let indices = if params.bootstrap {
                    (0..n).map(|_| tree_rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };

                DecisionTree::fit(
                    x.rows(),
                    &y_idx,
                    classes.len(),
                    indices,
                    &params,
                    max_features,
                    &mut tree_rng,
                )
            })
            .collect();

        debug!(
            n_estimators = params.n_estimators,
            n_rows = n,
            n_features = x.width(),
            n_classes = classes.len(),
            "Random forest fitted"
        );

        Ok(Self {
            params,
            classes,
            features: x.columns().to_vec(),
            trees,
        })
    }

    /// Restore a forest from its serialized payload
    pub fn from_json(value: serde_json::Value) -> Result<Self, DomainError> {
        serde_json::from_value(value)
            .map_err(|e| DomainError::data(format!("Malformed random forest payload: {}", e)))
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Rows reordered to the fitted feature order
    fn aligned_rows(&self, x: &Table) -> Result<Table, DomainError> {
        if x.columns() == self.features.as_slice() {
            Ok(x.clone())
        } else {
            x.select(&self.features)
        }
    }

    fn average_proba(&self, x: &Table) -> Result<Vec<Vec<f64>>, DomainError> {
        let x = self.aligned_rows(x)?;
        let n_trees = self.trees.len().max(1) as f64;

        Ok(x.rows()
            .iter()
            .map(|row| {
                let mut acc = vec![0.0; self.classes.len()];
                for tree in &self.trees {
                    for (a, p) in acc.iter_mut().zip(tree.predict_row(row)) {
                        *a += p;
                    }
                }
                acc.iter().map(|a| a / n_trees).collect()
            })
            .collect())
    }
}

impl Classifier for RandomForestClassifier {
    fn model_type(&self) -> &'static str {
        RANDOM_FOREST_MODEL_TYPE
    }

    fn classes(&self) -> &[Label] {
        &self.classes
    }

    fn feature_names(&self) -> &[String] {
        &self.features
    }

    fn predict(&self, x: &Table) -> Result<Vec<Label>, DomainError> {
        Ok(self
            .average_proba(x)?
            .iter()
            .map(|proba| {
                // first maximum wins on ties
                let best = proba
                    .iter()
                    .enumerate()
                    .fold(0, |best, (i, p)| if *p > proba[best] { i } else { best });
                self.classes[best]
            })
            .collect())
    }

    fn predict_proba(&self, x: &Table) -> Result<Option<Vec<Vec<f64>>>, DomainError> {
        self.average_proba(x).map(Some)
    }

    fn to_json(&self) -> Result<serde_json::Value, DomainError> {
        serde_json::to_value(self)
            .map_err(|e| DomainError::data(format!("Failed to serialize random forest: {}", e)))
    }
}
