//! Synthetic sales input for local runs and smoke tests.

use crate::data::format::write_csv;
use crate::data::schema::format_datetime;
use crate::data::table::Table;
use crate::error::PipelineError;
use crate::persistence;
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::path::Path;

const COUNTRIES: [&str; 4] = ["ES", "FR", "DE", "IT"];
const NEGATIVE_ROWS: usize = 50;

/// Deterministic sales table: hourly `date` from 2026-01-01, `customer_id` in
/// `1..200`, `amount` ~ N(50, 30) rounded to cents and `country`. Fifty
/// distinct rows (or all of them, for small tables) get their amount negated.
pub fn generate_sales(rows: usize, seed: u64) -> Table {
    let mut rng = StdRng::seed_from_u64(seed);
    let start = NaiveDate::from_ymd_opt(2026, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();

    let mut amounts: Vec<f64> = (0..rows)
        .map(|_| (normal(&mut rng, 50.0, 30.0) * 100.0).round() / 100.0)
        .collect();
    for idx in rand::seq::index::sample(&mut rng, rows, NEGATIVE_ROWS.min(rows)) {
        amounts[idx] = -amounts[idx];
    }

    let data = amounts
        .into_iter()
        .enumerate()
        .map(|(i, amount)| {
            let date = start + Duration::hours(i as i64);
            vec![
                json!(format_datetime(&date)),
                json!(rng.gen_range(1..200)),
                json!(amount),
                json!(COUNTRIES[rng.gen_range(0..COUNTRIES.len())]),
            ]
        })
        .collect();

    Table::from_rows(
        vec![
            "date".into(),
            "customer_id".into(),
            "amount".into(),
            "country".into(),
        ],
        data,
    )
}

/// Write a generated table as CSV, creating parent directories.
pub fn write_sales_csv(table: &Table, path: &Path) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::storage(parent, e))?;
    }
    persistence::atomic_write_with(path, |file| write_csv(table, file))?;
    tracing::info!(path = %path.display(), rows = table.row_count(), "Generated input");
    Ok(())
}

// Box-Muller; `u1` is kept off zero so `ln` stays finite.
fn normal(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}
