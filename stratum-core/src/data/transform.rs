//! Data transformation pipeline.

use crate::config::FeaturesConfig;
use crate::data::schema::{ColumnSchema, ColumnType, format_datetime, parse_datetime};
use crate::data::table::Table;
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Column the sales transform filters and derives from.
pub const AMOUNT_COLUMN: &str = "amount";
/// Float copy of [`AMOUNT_COLUMN`].
pub const AMOUNT_EUR_COLUMN: &str = "amount_eur";
/// Derived spend bucket.
pub const AMOUNT_BUCKET_COLUMN: &str = "amount_bucket";

/// A transformation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformStep {
    /// Keep rows whose value is numeric and `>= 0`.
    FilterNonNegative { column: String },
    /// Coerce a column, writing into `alias` (or in place when `None`).
    Cast {
        column: String,
        to: ColumnType,
        #[serde(default)]
        alias: Option<String>,
    },
    /// Label each numeric value with the first bound it falls under; values
    /// under no bound (nulls included) get `otherwise`.
    Bucket {
        column: String,
        alias: String,
        bounds: Vec<BucketBound>,
        otherwise: String,
    },
    /// Keep the first `rows` rows.
    Limit { rows: usize },
}

/// Exclusive upper bound of a bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketBound {
    pub upper: f64,
    pub label: String,
}

impl BucketBound {
    pub fn new(upper: f64, label: impl Into<String>) -> Self {
        Self {
            upper,
            label: label.into(),
        }
    }
}

/// A pipeline of transformation steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformPipeline {
    pub steps: Vec<TransformStep>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn add_step(mut self, step: TransformStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Apply the pipeline to a table.
    pub fn apply(&self, table: Table) -> Result<Table, PipelineError> {
        self.apply_recorded(table).map(|(table, _)| table)
    }

    /// Apply the pipeline, returning a record per step.
    pub fn apply_recorded(
        &self,
        mut table: Table,
    ) -> Result<(Table, Vec<TransformRecord>), PipelineError> {
        let width = table.column_count();
        if let Some(i) = table.rows.iter().position(|row| row.len() != width) {
            return Err(PipelineError::invalid_input(format!(
                "row {i} does not match the {width}-column schema"
            )));
        }

        let mut records = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let rows_before = table.row_count();
            table = apply_step(table, step)?;
            let record = TransformRecord {
                step: step.clone(),
                applied_at: chrono::Utc::now(),
                rows_before,
                rows_after: table.row_count(),
            };
            tracing::debug!(
                step = ?record.step,
                rows_before = record.rows_before,
                rows_after = record.rows_after,
                "Applied transform step"
            );
            records.push(record);
        }
        Ok((table, records))
    }
}

/// The sales transform, shaped by feature flags.
///
/// Negative amounts are dropped when enabled, `amount` is always cast to a
/// float `amount_eur`, and the new metric adds `amount_bucket`
/// (`low` < 20 <= `mid` < 50 <= `high` < 100 <= `vip`).
pub fn sales_pipeline(features: &FeaturesConfig) -> TransformPipeline {
    let mut pipeline = TransformPipeline::new();
    if features.drop_negative_amounts {
        pipeline = pipeline.add_step(TransformStep::FilterNonNegative {
            column: AMOUNT_COLUMN.to_string(),
        });
    }
    pipeline = pipeline.add_step(TransformStep::Cast {
        column: AMOUNT_COLUMN.to_string(),
        to: ColumnType::Float,
        alias: Some(AMOUNT_EUR_COLUMN.to_string()),
    });
    if features.enable_new_metric {
        pipeline = pipeline.add_step(TransformStep::Bucket {
            column: AMOUNT_EUR_COLUMN.to_string(),
            alias: AMOUNT_BUCKET_COLUMN.to_string(),
            bounds: vec![
                BucketBound::new(20.0, "low"),
                BucketBound::new(50.0, "mid"),
                BucketBound::new(100.0, "high"),
            ],
            otherwise: "vip".to_string(),
        });
    }
    pipeline
}

fn apply_step(mut table: Table, step: &TransformStep) -> Result<Table, PipelineError> {
    match step {
        TransformStep::FilterNonNegative { column } => {
            let idx = table.require_column(column)?;
            table
                .rows
                .retain(|row| row.get(idx).and_then(Value::as_f64).is_some_and(|v| v >= 0.0));
            Ok(table)
        }
        TransformStep::Cast { column, to, alias } => {
            let idx = table.require_column(column)?;
            let values = table
                .rows
                .iter()
                .enumerate()
                .map(|(i, row)| {
                    cast_value(&row[idx], *to).map_err(|reason| {
                        PipelineError::transform(format!(
                            "cannot cast '{column}' row {i} to {to}: {reason}"
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let target = alias.as_deref().unwrap_or(column);
            let nullable = values.iter().any(Value::is_null);
            table.upsert_column(
                ColumnSchema {
                    name: target.to_string(),
                    dtype: *to,
                    nullable,
                },
                values,
            );
            Ok(table)
        }
        TransformStep::Bucket {
            column,
            alias,
            bounds,
            otherwise,
        } => {
            let idx = table.require_column(column)?;
            let values = table
                .rows
                .iter()
                .map(|row| match &row[idx] {
                    // A null never falls under a bound.
                    Value::Null => Ok(Value::String(otherwise.clone())),
                    value => value
                        .as_f64()
                        .map(|v| Value::String(bucket_label(v, bounds, otherwise).to_string()))
                        .ok_or_else(|| {
                            PipelineError::transform(format!(
                                "cannot bucket non-numeric value {value} in '{column}'"
                            ))
                        }),
                })
                .collect::<Result<Vec<_>, _>>()?;
            let nullable = values.iter().any(Value::is_null);
            table.upsert_column(
                ColumnSchema {
                    name: alias.clone(),
                    dtype: ColumnType::String,
                    nullable,
                },
                values,
            );
            Ok(table)
        }
        TransformStep::Limit { rows } => {
            table.rows.truncate(*rows);
            Ok(table)
        }
    }
}

fn bucket_label<'a>(value: f64, bounds: &'a [BucketBound], otherwise: &'a str) -> &'a str {
    bounds
        .iter()
        .find(|b| value < b.upper)
        .map(|b| b.label.as_str())
        .unwrap_or(otherwise)
}

fn cast_value(value: &Value, to: ColumnType) -> Result<Value, String> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match to {
        ColumnType::Float => {
            let f = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }
            .ok_or_else(|| format!("{value} is not numeric"))?;
            Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| format!("{f} is not finite"))
        }
        ColumnType::Integer => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            Value::Number(n) => n
                .as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| Value::Number((f.trunc() as i64).into()))
                .ok_or_else(|| format!("{value} is out of integer range")),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(|i| Value::Number(i.into()))
                .map_err(|e| e.to_string()),
            _ => Err(format!("{value} is not an integer")),
        },
        ColumnType::String => Ok(match value {
            Value::String(_) => value.clone(),
            other => Value::String(other.to_string()),
        }),
        ColumnType::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) if s == "true" || s == "false" => Ok(Value::Bool(s == "true")),
            _ => Err(format!("{value} is not a boolean")),
        },
        ColumnType::DateTime => value
            .as_str()
            .and_then(parse_datetime)
            .map(|dt| Value::String(format_datetime(&dt)))
            .ok_or_else(|| format!("{value} is not a datetime")),
        ColumnType::Null => Ok(Value::Null),
    }
}

/// Record of a transform applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformRecord {
    pub step: TransformStep,
    pub applied_at: chrono::DateTime<chrono::Utc>,
    pub rows_before: usize,
    pub rows_after: usize,
}
