//! CSV reading and writing for numeric tables

use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use csv::{ReaderBuilder, Trim, WriterBuilder};
use tracing::{debug, info};

use crate::domain::{DomainError, Table};

/// Load a headered CSV file of numeric columns; empty cells become NaN
pub fn load_csv(path: impl AsRef<Path>) -> Result<Table, DomainError> {
    let path = path.as_ref();
    info!(path = %path.display(), "Loading data");

    let file = File::open(path)
        .map_err(|e| DomainError::data(format!("Failed to open {}: {}", path.display(), e)))?;

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(BufReader::new(file));

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| DomainError::data(format!("Failed to read CSV header: {}", e)))?
        .iter()
        .map(str::to_string)
        .collect();

    debug!(?columns, "CSV header");

    let mut rows = Vec::new();

    for (row_idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| {
            DomainError::data(format!("Failed to read CSV row {}: {}", row_idx + 1, e))
        })?;

        let row = record
            .iter()
            .zip(&columns)
            .map(|(field, column)| parse_field(field, column, row_idx + 1))
            .collect::<Result<Vec<_>, _>>()?;

        rows.push(row);
    }

    let table = Table::new(columns, rows)?;
    info!(rows = table.len(), columns = table.width(), "Loaded data");

    Ok(table)
}

/// Write a table as headered CSV, creating parent directories
pub fn write_csv(path: impl AsRef<Path>, table: &Table) -> Result<(), DomainError> {
    let path = path.as_ref();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            DomainError::data(format!("Failed to create {}: {}", parent.display(), e))
        })?;
    }

    let write_err = |e: csv::Error| {
        DomainError::data(format!("Failed to write {}: {}", path.display(), e))
    };

    let mut writer = WriterBuilder::new().from_path(path).map_err(write_err)?;
    writer.write_record(table.columns()).map_err(write_err)?;

    for row in table.rows() {
        writer
            .write_record(row.iter().map(|v| v.to_string()))
            .map_err(write_err)?;
    }

    writer
        .flush()
        .map_err(|e| DomainError::data(format!("Failed to flush {}: {}", path.display(), e)))?;

    debug!(path = %path.display(), rows = table.len(), "Wrote CSV");
    Ok(())
}

fn parse_field(field: &str, column: &str, row: usize) -> Result<f64, DomainError> {
    if field.is_empty() {
        return Ok(f64::NAN);
    }

    field.parse::<f64>().map_err(|_| {
        DomainError::data(format!(
            "Non-numeric value '{}' in column '{}' at row {}",
            field, column, row
        ))
    })
}
