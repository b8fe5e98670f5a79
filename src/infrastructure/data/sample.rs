//! Synthetic dataset for exercising the pipeline

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use tracing::info;

use super::csv_file::write_csv;
use crate::domain::{DomainError, Table};

pub const SAMPLE_ROWS: usize = 1000;
pub const SAMPLE_SEED: u64 = 42;
pub const SAMPLE_TRAIN_FRACTION: f64 = 0.8;

/// Columns of the synthetic dataset, target last
pub const SAMPLE_COLUMNS: [&str; 4] = ["feature1", "feature2", "feature3", "target"];

/// Three standard-normal features and an independent binary target
pub fn generate_sample_data(n_rows: usize, seed: u64) -> Result<Table, DomainError> {
    let mut rng = StdRng::seed_from_u64(seed);

    let rows = (0..n_rows)
        .map(|_| {
            let f1: f64 = rng.sample(StandardNormal);
            let f2: f64 = rng.sample(StandardNormal);
            let f3: f64 = rng.sample(StandardNormal);
            let target = rng.gen_range(0..2) as f64;
            vec![f1, f2, f3, target]
        })
        .collect();

    Table::new(SAMPLE_COLUMNS.iter().map(|c| c.to_string()).collect(), rows)
}

/// Paths of the generated train and test files
#[derive(Debug, Clone)]
pub struct SampleFiles {
    pub train: PathBuf,
    pub test: PathBuf,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// Generate the sample dataset and write `train.csv` / `test.csv` under `dir`
pub fn write_sample_datasets(
    dir: impl AsRef<Path>,
    n_rows: usize,
    seed: u64,
) -> Result<SampleFiles, DomainError> {
    let dir = dir.as_ref();
    let data = generate_sample_data(n_rows, seed)?;

    let mut indices: Vec<usize> = (0..data.len()).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));

    let n_train = (SAMPLE_TRAIN_FRACTION * data.len() as f64).round() as usize;
    let (train_idx, test_idx) = indices.split_at(n_train);

    let files = SampleFiles {
        train: dir.join("train.csv"),
        test: dir.join("test.csv"),
        train_rows: train_idx.len(),
        test_rows: test_idx.len(),
    };

    write_csv(&files.train, &data.take(train_idx))?;
    write_csv(&files.test, &data.take(test_idx))?;

    info!(
        train = %files.train.display(),
        test = %files.test.display(),
        train_rows = files.train_rows,
        test_rows = files.test_rows,
        "Created sample datasets"
    );

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::data::load_csv;

    #[test]
    fn test_generate_is_deterministic() {
        let a = generate_sample_data(50, SAMPLE_SEED).unwrap();
        let b = generate_sample_data(50, SAMPLE_SEED).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.columns().len(), 4);

        let targets = a.column("target").unwrap();
        assert!(targets.iter().all(|&t| t == 0.0 || t == 1.0));
    }

    #[test]
    fn test_write_sample_datasets_splits_80_20() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_sample_datasets(dir.path(), SAMPLE_ROWS, SAMPLE_SEED).unwrap();

        assert_eq!(files.train_rows, 800);
        assert_eq!(files.test_rows, 200);
        assert_eq!(load_csv(&files.train).unwrap().len(), 800);
        assert_eq!(load_csv(&files.test).unwrap().len(), 200);
    }
}
