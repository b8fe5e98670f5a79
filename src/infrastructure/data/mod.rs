//! Tabular data files

mod csv_file;
mod sample;

pub use csv_file::{load_csv, write_csv};
pub use sample::{
    generate_sample_data, write_sample_datasets, SampleFiles, SAMPLE_COLUMNS, SAMPLE_ROWS,
    SAMPLE_SEED,
};
