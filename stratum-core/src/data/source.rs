//! Data source abstraction for loading tables.

use crate::data::table::Table;
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Where a table was loaded from, for logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceInfo {
    pub source_type: String,
    pub location: String,
}

/// Trait for loading a table from a source.
pub trait DataSource {
    /// Load data from this source, optionally limiting the number of rows.
    fn load(&self, limit: Option<usize>) -> Result<Table, PipelineError>;

    /// Return metadata about this source.
    fn source_info(&self) -> DataSourceInfo;
}

/// CSV file data source.
///
/// The first record is the header. Cells are typed individually (empty ->
/// null, integer, float, boolean, otherwise text) and the schema is inferred
/// over every loaded row, so ISO dates surface as `DateTime` columns.
#[derive(Debug, Clone)]
pub struct CsvSource {
    pub path: PathBuf,
    pub delimiter: u8,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

impl DataSource for CsvSource {
    fn load(&self, limit: Option<usize>) -> Result<Table, PipelineError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| {
                PipelineError::extract(format!("cannot open {}: {e}", self.path.display()))
            })?;

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if columns.is_empty() || columns.iter().all(String::is_empty) {
            return Err(PipelineError::extract(format!(
                "empty CSV header in {}",
                self.path.display()
            )));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            if limit.is_some_and(|max| rows.len() >= max) {
                break;
            }
            let record = record?;
            rows.push(record.iter().map(parse_cell).collect::<Vec<_>>());
        }

        tracing::debug!(
            path = %self.path.display(),
            columns = columns.len(),
            rows = rows.len(),
            "Loaded CSV"
        );
        Ok(Table::from_rows(columns, rows))
    }

    fn source_info(&self) -> DataSourceInfo {
        DataSourceInfo {
            source_type: "csv".to_string(),
            location: self.path.display().to_string(),
        }
    }
}

/// Type one CSV cell.
pub fn parse_cell(raw: &str) -> Value {
    let s = raw.trim();
    if s.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = s.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    match s {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(s.to_string()),
    }
}
