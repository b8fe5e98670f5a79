//! Sample dataset command

use std::path::PathBuf;

use clap::Args;

use super::bootstrap;
use crate::infrastructure::data::{write_sample_datasets, SAMPLE_ROWS, SAMPLE_SEED};

#[derive(Args, Clone)]
pub struct SampleDataArgs {
    /// Directory receiving train.csv and test.csv
    #[arg(long, default_value = "data/processed")]
    pub out_dir: PathBuf,

    #[arg(long, default_value_t = SAMPLE_ROWS)]
    pub rows: usize,

    #[arg(long, default_value_t = SAMPLE_SEED)]
    pub seed: u64,
}

pub async fn run(args: SampleDataArgs) -> anyhow::Result<()> {
    bootstrap();

    let files = write_sample_datasets(&args.out_dir, args.rows, args.seed)?;

    println!("Created sample data:");
    println!("  Train: {} ({} rows)", files.train.display(), files.train_rows);
    println!("  Test:  {} ({} rows)", files.test.display(), files.test_rows);
    Ok(())
}
