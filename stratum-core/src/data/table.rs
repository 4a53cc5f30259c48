//! Materialized in-memory tables.

use crate::data::schema::{
    ColumnSchema, ColumnType, SchemaDefinition, infer_schema, parse_datetime,
};
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A fully materialized, row-oriented table with a fixed schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub schema: SchemaDefinition,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(schema: SchemaDefinition, rows: Vec<Vec<Value>>) -> Self {
        Self { schema, rows }
    }

    /// Build a table, inferring the schema from the cell values.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let schema = infer_schema(&columns, &rows);
        Self { schema, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.schema.len()
    }

    /// Index of a column, or a transform error naming the missing column.
    pub fn require_column(&self, name: &str) -> Result<usize, PipelineError> {
        self.schema
            .index_of(name)
            .ok_or_else(|| PipelineError::transform(format!("column not found: {name}")))
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.schema.index_of(name)?;
        Some(self.rows.iter().filter_map(|row| row.get(idx)).collect())
    }

    /// Set a column from per-row values, appending it if absent.
    pub fn upsert_column(&mut self, column: ColumnSchema, values: Vec<Value>) {
        debug_assert_eq!(values.len(), self.rows.len());
        match self.schema.index_of(&column.name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    if let Some(cell) = row.get_mut(idx) {
                        *cell = value;
                    }
                }
                self.schema.columns[idx] = column;
            }
            None => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
                self.schema.columns.push(column);
            }
        }
    }

    /// Check that every row matches the schema width and that typed cells fit
    /// their column type.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.schema.is_empty() {
            return Err(PipelineError::invalid_input("table has no columns"));
        }
        let width = self.schema.len();
        for (i, row) in self.rows.iter().enumerate() {
            if row.len() != width {
                return Err(PipelineError::invalid_input(format!(
                    "row {i} has {} cells, schema has {width} columns",
                    row.len()
                )));
            }
            for (cell, column) in row.iter().zip(&self.schema.columns) {
                if !cell_fits(cell, column.dtype) {
                    return Err(PipelineError::invalid_input(format!(
                        "row {i}: value {cell} does not fit {} column '{}'",
                        column.dtype, column.name
                    )));
                }
                if cell.is_null() && !column.nullable {
                    return Err(PipelineError::invalid_input(format!(
                        "row {i}: null in non-nullable column '{}'",
                        column.name
                    )));
                }
            }
        }
        Ok(())
    }
}

fn cell_fits(cell: &Value, dtype: ColumnType) -> bool {
    match (cell, dtype) {
        (Value::Null, _) => true,
        (_, ColumnType::String) => true,
        (Value::Number(n), ColumnType::Integer) => n.is_i64() || n.is_u64(),
        (Value::Number(_), ColumnType::Float) => true,
        (Value::Bool(_), ColumnType::Boolean) => true,
        (Value::String(s), ColumnType::DateTime) => parse_datetime(s).is_some(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Table {
        Table::from_rows(
            vec!["amount".into(), "country".into()],
            vec![
                vec![json!(10), json!("ES")],
                vec![json!(-5), json!("FR")],
            ],
        )
    }

    #[test]
    fn test_from_rows_infers_schema() {
        let table = sample();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_count(), 2);
        assert_eq!(table.schema.columns[0].dtype, ColumnType::Integer);
        assert!(table.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_ragged_rows() {
        let mut table = sample();
        table.rows[1].pop();
        let err = table.validate().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[test]
    fn test_validate_rejects_mistyped_cell() {
        let mut table = sample();
        table.rows[0][0] = json!("ten");
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_schema() {
        assert!(Table::new(SchemaDefinition::default(), Vec::new()).validate().is_err());
    }

    #[test]
    fn test_upsert_column_appends_then_replaces() {
        let mut table = sample();
        table.upsert_column(
            ColumnSchema::new("flag", ColumnType::Boolean),
            vec![json!(true), json!(false)],
        );
        assert_eq!(table.column_count(), 3);
        table.upsert_column(
            ColumnSchema::new("flag", ColumnType::Boolean),
            vec![json!(false), json!(false)],
        );
        assert_eq!(table.column_count(), 3);
        assert_eq!(table.rows[0][2], json!(false));
    }

    #[test]
    fn test_require_column_missing() {
        let table = sample();
        assert!(table.require_column("missing").is_err());
        assert_eq!(table.require_column("country").unwrap(), 1);
    }
}
