//! Serialization formats for persisted tables.
//!
//! The set of formats is closed: a name either resolves to a [`WriteFormat`]
//! or fails with [`PipelineError::UnsupportedFormat`], and that resolution is
//! the only place format names are interpreted.

use crate::data::schema::{
    ColumnSchema, ColumnType, SchemaDefinition, format_datetime, parse_datetime,
};
use crate::data::source::{CsvSource, DataSource};
use crate::data::table::Table;
use crate::error::PipelineError;
use arrow_array::cast::AsArray;
use arrow_array::types::{Float64Type, Int64Type, TimestampMicrosecondType};
use arrow_array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, RecordBatch, StringArray,
    TimestampMicrosecondArray,
};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fs::File;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Supported on-disk formats for a dataset version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteFormat {
    /// Apache Parquet, snappy-compressed.
    Parquet,
    /// Comma-separated text with a header row.
    Csv,
}

impl WriteFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            WriteFormat::Parquet => "parquet",
            WriteFormat::Csv => "csv",
        }
    }

    /// Data file name inside a version directory.
    pub fn file_name(&self) -> String {
        format!("data.{}", self.extension())
    }

    /// Resolve the format of an existing data file from its extension.
    pub fn from_path(path: &Path) -> Result<Self, PipelineError> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        ext.parse()
    }

    /// Serialize `table` into an open file.
    pub fn encode(&self, table: &Table, file: &mut File) -> Result<(), PipelineError> {
        match self {
            WriteFormat::Parquet => write_parquet(table, file),
            WriteFormat::Csv => write_csv(table, file),
        }
    }
}

impl FromStr for WriteFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "parquet" => Ok(WriteFormat::Parquet),
            "csv" => Ok(WriteFormat::Csv),
            _ => Err(PipelineError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl std::fmt::Display for WriteFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Read a persisted data file back into a table.
pub fn read_table(path: &Path) -> Result<Table, PipelineError> {
    match WriteFormat::from_path(path)? {
        WriteFormat::Parquet => read_parquet(path),
        WriteFormat::Csv => CsvSource::new(path).load(None),
    }
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

fn arrow_type(dtype: ColumnType) -> DataType {
    match dtype {
        ColumnType::Integer => DataType::Int64,
        ColumnType::Float => DataType::Float64,
        ColumnType::Boolean => DataType::Boolean,
        ColumnType::DateTime => DataType::Timestamp(TimeUnit::Microsecond, None),
        // All-null columns are stored as nullable text.
        ColumnType::String | ColumnType::Null => DataType::Utf8,
    }
}

fn column_type(field: &Field) -> Result<ColumnType, PipelineError> {
    match field.data_type() {
        DataType::Int64 => Ok(ColumnType::Integer),
        DataType::Float64 => Ok(ColumnType::Float),
        DataType::Boolean => Ok(ColumnType::Boolean),
        DataType::Timestamp(TimeUnit::Microsecond, _) => Ok(ColumnType::DateTime),
        DataType::Utf8 => Ok(ColumnType::String),
        other => Err(PipelineError::invalid_input(format!(
            "unsupported parquet column type {other} for '{}'",
            field.name()
        ))),
    }
}

fn cell_error(column: &ColumnSchema, row: usize, value: &Value) -> PipelineError {
    PipelineError::invalid_input(format!(
        "row {row}: value {value} does not fit {} column '{}'",
        column.dtype, column.name
    ))
}

fn build_array(table: &Table, idx: usize) -> Result<ArrayRef, PipelineError> {
    let column = &table.schema.columns[idx];
    let cells = table.rows.iter().map(|row| &row[idx]).enumerate();

    let array: ArrayRef = match column.dtype {
        ColumnType::Integer => Arc::new(Int64Array::from(
            cells
                .map(|(i, v)| match v {
                    Value::Null => Ok(None),
                    v => v.as_i64().map(Some).ok_or_else(|| cell_error(column, i, v)),
                })
                .collect::<Result<Vec<_>, _>>()?,
        )),
        ColumnType::Float => Arc::new(Float64Array::from(
            cells
                .map(|(i, v)| match v {
                    Value::Null => Ok(None),
                    v => v.as_f64().map(Some).ok_or_else(|| cell_error(column, i, v)),
                })
                .collect::<Result<Vec<_>, _>>()?,
        )),
        ColumnType::Boolean => Arc::new(BooleanArray::from(
            cells
                .map(|(i, v)| match v {
                    Value::Null => Ok(None),
                    v => v.as_bool().map(Some).ok_or_else(|| cell_error(column, i, v)),
                })
                .collect::<Result<Vec<_>, _>>()?,
        )),
        ColumnType::DateTime => Arc::new(TimestampMicrosecondArray::from(
            cells
                .map(|(i, v)| match v {
                    Value::Null => Ok(None),
                    v => v
                        .as_str()
                        .and_then(parse_datetime)
                        .map(|dt| Some(dt.and_utc().timestamp_micros()))
                        .ok_or_else(|| cell_error(column, i, v)),
                })
                .collect::<Result<Vec<_>, _>>()?,
        )),
        ColumnType::String | ColumnType::Null => Arc::new(StringArray::from(
            cells.map(|(_, v)| cell_text(v)).collect::<Vec<_>>(),
        )),
    };
    Ok(array)
}

/// Convert a validated table into a single Arrow record batch.
pub fn to_record_batch(table: &Table) -> Result<RecordBatch, PipelineError> {
    table.validate()?;
    let fields: Vec<Field> = table
        .schema
        .columns
        .iter()
        .map(|c| Field::new(&c.name, arrow_type(c.dtype), c.nullable))
        .collect();
    let arrays = (0..table.column_count())
        .map(|idx| build_array(table, idx))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

fn write_parquet(table: &Table, file: &mut File) -> Result<(), PipelineError> {
    let batch = to_record_batch(table)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn read_parquet(path: &Path) -> Result<Table, PipelineError> {
    let file = File::open(path).map_err(|e| PipelineError::storage(path, e))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

    let columns = builder
        .schema()
        .fields()
        .iter()
        .map(|field| {
            Ok(ColumnSchema {
                name: field.name().clone(),
                dtype: column_type(field)?,
                nullable: field.is_nullable(),
            })
        })
        .collect::<Result<Vec<_>, PipelineError>>()?;
    let schema = SchemaDefinition::new(columns);

    let mut rows = Vec::new();
    for batch in builder.build()? {
        let batch = batch?;
        let start = rows.len();
        rows.extend((0..batch.num_rows()).map(|_| Vec::with_capacity(schema.len())));
        for (idx, column) in schema.columns.iter().enumerate() {
            let array = batch.column(idx);
            for (offset, row) in rows[start..].iter_mut().enumerate() {
                row.push(array_value(array, column.dtype, offset));
            }
        }
    }

    Ok(Table::new(schema, rows))
}

fn array_value(array: &ArrayRef, dtype: ColumnType, row: usize) -> Value {
    if array.is_null(row) {
        return Value::Null;
    }
    match dtype {
        ColumnType::Integer => Value::Number(array.as_primitive::<Int64Type>().value(row).into()),
        ColumnType::Float => Number::from_f64(array.as_primitive::<Float64Type>().value(row))
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ColumnType::Boolean => Value::Bool(array.as_boolean().value(row)),
        ColumnType::DateTime => {
            let micros = array.as_primitive::<TimestampMicrosecondType>().value(row);
            chrono::DateTime::from_timestamp_micros(micros)
                .map(|dt| Value::String(format_datetime(&dt.naive_utc())))
                .unwrap_or(Value::Null)
        }
        ColumnType::String | ColumnType::Null => {
            Value::String(array.as_string::<i32>().value(row).to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Write a table as CSV with a header row; nulls become empty fields.
pub fn write_csv<W: std::io::Write>(table: &Table, out: W) -> Result<(), PipelineError> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(table.schema.names())?;
    for row in &table.rows {
        writer.write_record(row.iter().map(|v| cell_text(v).unwrap_or_default()))?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample() -> Table {
        Table::from_rows(
            vec![
                "date".into(),
                "customer_id".into(),
                "amount_eur".into(),
                "country".into(),
                "vip".into(),
            ],
            vec![
                vec![
                    json!("2026-01-01T00:00:00"),
                    json!(1),
                    json!(10.5),
                    json!("ES"),
                    json!(false),
                ],
                vec![
                    json!("2026-01-01T01:00:00"),
                    json!(2),
                    json!(120.0),
                    Value::Null,
                    json!(true),
                ],
            ],
        )
    }

    fn write_with(format: WriteFormat, dir: &TempDir, table: &Table) -> std::path::PathBuf {
        let path = dir.path().join(format.file_name());
        let mut file = File::create(&path).unwrap();
        format.encode(table, &mut file).unwrap();
        path
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("parquet".parse::<WriteFormat>().unwrap(), WriteFormat::Parquet);
        assert_eq!(" CSV ".parse::<WriteFormat>().unwrap(), WriteFormat::Csv);
        let err = "orc".parse::<WriteFormat>().unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat(ref f) if f == "orc"));
    }

    #[test]
    fn test_format_file_names() {
        assert_eq!(WriteFormat::Parquet.file_name(), "data.parquet");
        assert_eq!(WriteFormat::Csv.file_name(), "data.csv");
        assert_eq!(
            WriteFormat::from_path(Path::new("/r/v/data.parquet")).unwrap(),
            WriteFormat::Parquet
        );
        assert!(WriteFormat::from_path(Path::new("/r/v/data")).is_err());
    }

    #[test]
    fn test_parquet_preserves_values_and_types() {
        let dir = TempDir::new().unwrap();
        let table = sample();
        let path = write_with(WriteFormat::Parquet, &dir, &table);

        let read = read_table(&path).unwrap();
        assert_eq!(read.schema, table.schema);
        assert_eq!(read.rows, table.rows);
    }

    #[test]
    fn test_csv_preserves_values() {
        let dir = TempDir::new().unwrap();
        let table = sample();
        let path = write_with(WriteFormat::Csv, &dir, &table);

        let read = read_table(&path).unwrap();
        assert_eq!(read.row_count(), 2);
        assert_eq!(read.rows[1][3], Value::Null);
        assert_eq!(read.rows[0][2], json!(10.5));
        assert_eq!(read.schema.columns[0].dtype, ColumnType::DateTime);
    }

    #[test]
    fn test_record_batch_rejects_mistyped_cell() {
        let mut table = sample();
        table.rows[0][1] = json!("one");
        assert!(to_record_batch(&table).is_err());
    }

    #[test]
    fn test_empty_table_writes_schema_only() {
        let dir = TempDir::new().unwrap();
        let mut table = sample();
        table.rows.clear();
        let path = write_with(WriteFormat::Parquet, &dir, &table);
        let read = read_table(&path).unwrap();
        assert_eq!(read.row_count(), 0);
        assert_eq!(read.column_count(), 5);
    }
}
