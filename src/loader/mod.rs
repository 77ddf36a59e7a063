//! CSV loading.
//!
//! Reads a headed CSV file into a typed [`Dataset`]. Columns the dashboard
//! variant depends on are typed by the variant schema; any other column is
//! inferred from its cells.

use crate::dashboard::Variant;
use crate::models::{Column, ColumnKind, Dataset, Record, Schema, Value};
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use csv::StringRecord;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Date layouts accepted in dataset cells, tried in order.
pub const DATASET_DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%Y-%m-%d", "%d/%m/%Y"];

/// Options for loading a dataset.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Show a spinner while reading
    pub show_progress: bool,
}

/// Load a CSV file for the given dashboard variant.
pub fn load_dataset(path: &Path, variant: Variant, options: &LoadOptions) -> Result<Dataset> {
    info!("Loading dataset: {}", path.display());

    let file = File::open(path)
        .with_context(|| format!("Failed to open dataset: {}", path.display()))?;

    let spinner = if options.show_progress {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("Reading {}", path.display()));
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    } else {
        None
    };

    let dataset = read_dataset(file, variant)
        .with_context(|| format!("Failed to read dataset: {}", path.display()));

    if let Some(pb) = spinner {
        match &dataset {
            Ok(d) => pb.finish_with_message(format!("Loaded {} rows", d.len())),
            Err(_) => pb.finish_and_clear(),
        }
    }

    dataset
}

/// Parse CSV from any reader.
pub fn read_dataset<R: Read>(reader: R, variant: Variant) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read CSV headers")?
        .iter()
        .map(normalize_header)
        .collect();

    let required = variant.required_columns();
    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        // Line numbers are 1-based and the header takes the first line.
        let record = result.with_context(|| format!("CSV parse error on line {}", idx + 2))?;
        rows.push(record);
    }
    debug!("Read {} CSV rows", rows.len());

    let columns: Vec<Column> = headers
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let kind = required
                .iter()
                .find(|c| &c.name == name)
                .map(|c| c.kind)
                .unwrap_or_else(|| infer_kind(&rows, idx));
            Column::new(name.clone(), kind)
        })
        .collect();
    let schema = Schema::new(columns);

    let missing: Vec<&str> = required
        .iter()
        .filter(|c| !schema.contains(&c.name))
        .map(|c| c.name.as_str())
        .collect();
    if !missing.is_empty() {
        bail!(
            "Dataset is missing required columns for the {} dashboard: {}",
            variant,
            missing.join(", ")
        );
    }

    let mut bad_cells = 0usize;
    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut values = Vec::with_capacity(schema.len());
        for (idx, column) in schema.columns.iter().enumerate() {
            let cell = row.get(idx).unwrap_or("");
            match parse_cell(cell, column.kind) {
                Some(value) => values.push(value),
                None => {
                    bad_cells += 1;
                    debug!("Unparseable {} cell '{}' in '{}'", column.kind, cell, column.name);
                    values.push(Value::Missing);
                }
            }
        }
        records.push(Record::new(values));
    }

    if bad_cells > 0 {
        warn!("{} cells could not be parsed and are treated as missing", bad_cells);
    }

    info!("Loaded {} rows with {} columns", records.len(), schema.len());
    Ok(Dataset::new(schema, records))
}

/// Strip a UTF-8 byte order mark and surrounding whitespace.
fn normalize_header(name: &str) -> String {
    name.trim().trim_start_matches('\u{feff}').to_string()
}

/// Number when every non-empty cell parses as one, otherwise text.
fn infer_kind(rows: &[StringRecord], idx: usize) -> ColumnKind {
    let mut cells = rows
        .iter()
        .filter_map(|r| r.get(idx))
        .filter(|c| !c.is_empty())
        .peekable();

    if cells.peek().is_none() {
        return ColumnKind::Text;
    }

    if cells.all(|c| parse_number(c).is_some()) {
        ColumnKind::Number
    } else {
        ColumnKind::Text
    }
}

/// Parse one cell. Empty cells are missing; `None` means the cell is not
/// valid for the column type.
fn parse_cell(cell: &str, kind: ColumnKind) -> Option<Value> {
    if cell.is_empty() {
        return Some(Value::Missing);
    }

    match kind {
        ColumnKind::Text => Some(Value::Text(cell.to_string())),
        ColumnKind::Number => parse_number(cell).map(Value::Number),
        ColumnKind::Date => parse_dataset_date(cell).map(Value::Date),
    }
}

/// Finite numbers only; `NaN` and `inf` are not data.
fn parse_number(cell: &str) -> Option<f64> {
    cell.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Parse a date cell, ignoring any time-of-day suffix.
pub fn parse_dataset_date(cell: &str) -> Option<NaiveDate> {
    let date_part = cell.split_whitespace().next()?;
    DATASET_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

/// Human-readable column listing for `--dry-run`.
pub fn describe_schema(dataset: &Dataset) -> String {
    let mut lines = vec![format!(
        "{} rows, {} columns",
        dataset.len(),
        dataset.schema.len()
    )];

    for (idx, column) in dataset.schema.columns.iter().enumerate() {
        let missing = dataset
            .records
            .iter()
            .filter(|r| r.get(idx).is_missing())
            .count();
        if missing > 0 {
            lines.push(format!("  {} ({}, {} missing)", column.name, column.kind, missing));
        } else {
            lines.push(format!("  {} ({})", column.name, column.kind));
        }
    }

    lines.join("\n")
}
