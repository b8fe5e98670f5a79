//! Tabular data types and the train/test split

use std::collections::{BTreeMap, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::domain::DomainError;

/// Class label of a classification target
pub type Label = i64;

/// A single feature record keyed by column name
pub type FeatureRecord = BTreeMap<String, f64>;

/// Default fraction of rows held out for evaluation
pub const DEFAULT_TEST_SIZE: f64 = 0.2;

/// Default seed for the train/test shuffle
pub const DEFAULT_SPLIT_SEED: u64 = 42;

/// Row-major numeric table with named columns
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl Table {
    /// Create a table, checking column uniqueness and row widths
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self, DomainError> {
        let mut seen = HashSet::new();

        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(DomainError::data(format!("Duplicate column '{}'", column)));
            }
        }

        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(DomainError::data(format!(
                "Row {} has {} values, expected {}",
                idx,
                row.len(),
                columns.len()
            )));
        }

        Ok(Self { columns, rows })
    }

    /// Build a one-row table from a feature record, ordered by `columns`
    pub fn from_record(record: &FeatureRecord, columns: &[String]) -> Result<Self, DomainError> {
        let row = columns
            .iter()
            .map(|name| {
                record
                    .get(name)
                    .copied()
                    .ok_or_else(|| DomainError::data(format!("Missing feature '{}'", name)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(columns.to_vec(), vec![row])
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Values of a single column
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[idx]).collect())
    }

    /// Project the table onto `names`, in that order
    pub fn select(&self, names: &[String]) -> Result<Self, DomainError> {
        let indices = names
            .iter()
            .map(|name| {
                self.column_index(name)
                    .ok_or_else(|| DomainError::data(format!("Column '{}' not found", name)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i]).collect())
            .collect();

        Self::new(names.to_vec(), rows)
    }

    /// All columns except `name`
    pub fn drop_column(&self, name: &str) -> Result<Self, DomainError> {
        if !self.has_column(name) {
            return Err(DomainError::data(format!("Column '{}' not found", name)));
        }

        let keep: Vec<String> = self
            .columns
            .iter()
            .filter(|c| c.as_str() != name)
            .cloned()
            .collect();

        self.select(&keep)
    }

    /// Rows at `indices`, in that order
    pub fn take(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }
}

/// Convert a numeric target column into class labels
pub fn labels_from_values(values: &[f64]) -> Result<Vec<Label>, DomainError> {
    values
        .iter()
        .enumerate()
        .map(|(idx, &value)| {
            if value.is_finite() && value.fract() == 0.0 {
                Ok(value as Label)
            } else {
                Err(DomainError::data(format!(
                    "Target value {} at row {} is not a class label",
                    value, idx
                )))
            }
        })
        .collect()
}

/// Split a dataset into features and target.
///
/// When `features` is empty every column except the target is used.
pub fn features_and_target(
    data: &Table,
    target: &str,
    features: &[String],
) -> Result<(Table, Vec<Label>), DomainError> {
    if data.is_empty() {
        return Err(DomainError::data("Dataset is empty"));
    }

    let values = data.column(target).ok_or_else(|| {
        DomainError::data(format!(
            "Target column '{}' not found, available columns: {:?}",
            target,
            data.columns()
        ))
    })?;

    let x = if features.is_empty() {
        data.drop_column(target)?
    } else {
        data.select(features)?
    };

    if x.width() == 0 {
        return Err(DomainError::data("Dataset has no feature columns"));
    }

    Ok((x, labels_from_values(&values)?))
}

/// Train/test partition of a labelled dataset
#[derive(Debug, Clone)]
pub struct Split {
    pub x_train: Table,
    pub x_test: Table,
    pub y_train: Vec<Label>,
    pub y_test: Vec<Label>,
}

/// Shuffle with a fixed seed and hold out `ceil(test_size * n)` rows
pub fn train_test_split(
    x: &Table,
    y: &[Label],
    test_size: f64,
    seed: u64,
) -> Result<Split, DomainError> {
    if x.len() != y.len() {
        return Err(DomainError::data(format!(
            "Feature rows ({}) and labels ({}) differ in length",
            x.len(),
            y.len()
        )));
    }

    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(DomainError::data(format!(
            "test_size must be in (0, 1), got {}",
            test_size
        )));
    }

    let n = x.len();
    let n_test = (test_size * n as f64).ceil() as usize;

    if n_test == 0 || n_test >= n {
        return Err(DomainError::data(format!(
            "Cannot split {} rows with test_size {}",
            n, test_size
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let (test_idx, train_idx) = indices.split_at(n_test);

    Ok(Split {
        x_train: x.take(train_idx),
        x_test: x.take(test_idx),
        y_train: train_idx.iter().map(|&i| y[i]).collect(),
        y_test: test_idx.iter().map(|&i| y[i]).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> Table {
        Table::new(
            vec!["a".to_string(), "b".to_string(), "target".to_string()],
            (0..10)
                .map(|i| vec![i as f64, (i * 2) as f64, (i % 2) as f64])
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let result = Table::new(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![1.0, 2.0], vec![3.0]],
        );
        assert!(matches!(result, Err(DomainError::Data { .. })));
    }

    #[test]
    fn test_rejects_duplicate_columns() {
        let result = Table::new(vec!["a".to_string(), "a".to_string()], vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn test_features_and_target_uses_remaining_columns() {
        let (x, y) = features_and_target(&sample_table(), "target", &[]).unwrap();
        assert_eq!(x.columns(), &["a".to_string(), "b".to_string()]);
        assert_eq!(y, vec![0, 1, 0, 1, 0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_features_and_target_missing_target() {
        let result = features_and_target(&sample_table(), "label", &[]);
        assert!(matches!(result, Err(DomainError::Data { .. })));
    }

    #[test]
    fn test_features_and_target_empty_dataset() {
        let empty = Table::new(vec!["a".to_string(), "target".to_string()], vec![]).unwrap();
        let result = features_and_target(&empty, "target", &[]);
        assert!(matches!(result, Err(DomainError::Data { .. })));
    }

    #[test]
    fn test_labels_reject_fractional_values() {
        assert!(labels_from_values(&[0.0, 1.0, 2.0]).is_ok());
        assert!(labels_from_values(&[0.5]).is_err());
        assert!(labels_from_values(&[f64::NAN]).is_err());
    }

    #[test]
    fn test_split_sizes_and_determinism() {
        let (x, y) = features_and_target(&sample_table(), "target", &[]).unwrap();

        let first = train_test_split(&x, &y, 0.2, 42).unwrap();
        let second = train_test_split(&x, &y, 0.2, 42).unwrap();

        assert_eq!(first.x_train.len(), 8);
        assert_eq!(first.x_test.len(), 2);
        assert_eq!(first.y_test.len(), 2);
        assert_eq!(first.x_test, second.x_test);
        assert_eq!(first.y_train, second.y_train);
    }

    #[test]
    fn test_from_record_orders_by_columns() {
        let mut record = FeatureRecord::new();
        record.insert("feature2".to_string(), -0.2);
        record.insert("feature1".to_string(), 0.1);

        let columns = vec!["feature1".to_string(), "feature2".to_string()];
        let table = Table::from_record(&record, &columns).unwrap();
        assert_eq!(table.rows(), &[vec![0.1, -0.2]]);

        let missing = Table::from_record(&record, &["feature3".to_string()]);
        assert!(missing.is_err());
    }
}
