//! Row filtering.
//!
//! A [`FilterSpec`] maps column names to constraints. Filtering keeps the
//! records that satisfy every constraint; columns without a constraint are
//! unconstrained.

use super::error::{PipelineError, Result};
use crate::models::{format_number, ColumnKind, Dataset, Record, Schema, Value};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Format accepted by free-text date filters.
pub const FILTER_DATE_FORMAT: &str = "%d/%m/%Y";

/// A constraint on one column.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Accepted labels. An empty set accepts nothing.
    OneOf(BTreeSet<String>),
    /// Inclusive numeric range.
    Range { min: f64, max: f64 },
    /// Inclusive date range; a `None` bound is open.
    DateRange {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
}

impl Constraint {
    /// Whether a cell satisfies this constraint. Missing cells never do.
    pub fn matches(&self, value: &Value) -> bool {
        if value.is_missing() {
            return false;
        }

        match self {
            Constraint::OneOf(accepted) => accepted.contains(&value.label()),
            Constraint::Range { min, max } => value
                .as_number()
                .map_or(false, |n| n >= *min && n <= *max),
            Constraint::DateRange { from, to } => value.as_date().map_or(false, |d| {
                from.map_or(true, |f| d >= f) && to.map_or(true, |t| d <= t)
            }),
        }
    }

    /// Column type this constraint needs, `None` if any type works.
    fn expected_kind(&self) -> Option<ColumnKind> {
        match self {
            Constraint::OneOf(_) => None,
            Constraint::Range { .. } => Some(ColumnKind::Number),
            Constraint::DateRange { .. } => Some(ColumnKind::Date),
        }
    }

    fn describe(&self) -> String {
        match self {
            Constraint::OneOf(accepted) if accepted.is_empty() => "none selected".to_string(),
            Constraint::OneOf(accepted) => accepted.iter().cloned().collect::<Vec<_>>().join(", "),
            Constraint::Range { min, max } => {
                format!("{} to {}", format_number(*min), format_number(*max))
            }
            Constraint::DateRange { from, to } => {
                let fmt = |d: &Option<NaiveDate>| {
                    d.map(|d| d.format(FILTER_DATE_FORMAT).to_string())
                        .unwrap_or_else(|| "…".to_string())
                };
                format!("{} to {}", fmt(from), fmt(to))
            }
        }
    }
}

/// The set of active constraints, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    constraints: BTreeMap<String, Constraint>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept only the given labels for a column.
    pub fn select<I, S>(mut self, dimension: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set(
            dimension,
            Constraint::OneOf(values.into_iter().map(Into::into).collect()),
        );
        self
    }

    /// Accept numbers within `min..=max`.
    pub fn range(mut self, dimension: &str, min: f64, max: f64) -> Self {
        self.set(dimension, Constraint::Range { min, max });
        self
    }

    /// Accept dates within `from..=to`; a `None` bound is open.
    pub fn date_range(
        mut self,
        dimension: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Self {
        self.set(dimension, Constraint::DateRange { from, to });
        self
    }

    /// Insert or replace the constraint for a column.
    pub fn set(&mut self, dimension: &str, constraint: Constraint) {
        self.constraints.insert(dimension.to_string(), constraint);
    }

    pub fn get(&self, dimension: &str) -> Option<&Constraint> {
        self.constraints.get(dimension)
    }

    pub fn constraints(&self) -> impl Iterator<Item = (&String, &Constraint)> {
        self.constraints.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Accepted labels of a column, `None` unless it has a categorical selection.
    pub fn selection(&self, dimension: &str) -> Option<&BTreeSet<String>> {
        match self.get(dimension) {
            Some(Constraint::OneOf(accepted)) => Some(accepted),
            _ => None,
        }
    }

    /// True when the column has a categorical selection with no values.
    pub fn is_empty_selection(&self, dimension: &str) -> bool {
        self.selection(dimension).map_or(false, BTreeSet::is_empty)
    }

    /// Check every constrained column exists and has a compatible type.
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        for (dimension, constraint) in self.constraints() {
            let column = schema
                .column(dimension)
                .ok_or_else(|| PipelineError::InvalidDimension(dimension.clone()))?;

            if let Some(expected) = constraint.expected_kind() {
                if column.kind != expected {
                    return Err(PipelineError::KindMismatch {
                        dimension: dimension.clone(),
                        expected,
                        actual: column.kind,
                    });
                }
            }
        }
        Ok(())
    }

    /// One line per constraint, e.g. `Branch: A, B`.
    pub fn describe(&self) -> Vec<String> {
        self.constraints()
            .map(|(dim, c)| format!("{}: {}", dim, c.describe()))
            .collect()
    }
}

/// Keep the records that satisfy every constraint of `spec`.
///
/// Never fails: a constraint on a column the schema lacks matches no rows.
pub fn filter(dataset: &Dataset, spec: &FilterSpec) -> Dataset {
    let mut resolved = Vec::new();
    for (dimension, constraint) in spec.constraints() {
        match dataset.schema.index_of(dimension) {
            Some(idx) => resolved.push((idx, constraint)),
            None => {
                warn!("Filter on unknown column '{}' matches no rows", dimension);
                return Dataset::new(dataset.schema.clone(), Vec::new());
            }
        }
    }

    let records: Vec<Record> = dataset
        .records
        .iter()
        .filter(|record| resolved.iter().all(|(idx, c)| c.matches(record.get(*idx))))
        .cloned()
        .collect();

    debug!(
        "Filter kept {} of {} rows ({} constraints)",
        records.len(),
        dataset.len(),
        resolved.len()
    );

    Dataset::new(dataset.schema.clone(), records)
}

/// Parse a free-text `dd/mm/yyyy` date.
///
/// The year must have four digits and the date must exist on the calendar.
pub fn parse_filter_date(text: &str) -> Result<NaiveDate> {
    let trimmed = text.trim();
    let parts: Vec<&str> = trimmed.split('/').collect();

    let well_formed = parts.len() == 3
        && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
        && parts[0].len() <= 2
        && parts[1].len() <= 2
        && parts[2].len() == 4;

    if !well_formed {
        return Err(PipelineError::UnparseableDate(text.to_string()));
    }

    NaiveDate::parse_from_str(trimmed, FILTER_DATE_FORMAT)
        .map_err(|_| PipelineError::UnparseableDate(text.to_string()))
}

/// Add a date-range constraint built from free-text bounds.
///
/// A bound that fails to parse is left open and its error is returned so
/// the caller can surface a notice; the rest of the filter stays active.
/// When neither bound is usable no constraint is added.
pub fn apply_date_text(
    spec: &mut FilterSpec,
    column: &str,
    from: Option<&str>,
    to: Option<&str>,
) -> Vec<PipelineError> {
    let mut errors = Vec::new();
    let mut parse = |text: Option<&str>| match text.map(parse_filter_date) {
        Some(Ok(date)) => Some(date),
        Some(Err(e)) => {
            warn!("Ignoring date filter bound: {}", e);
            errors.push(e);
            None
        }
        None => None,
    };

    let from = parse(from);
    let to = parse(to);

    if from.is_some() || to.is_some() {
        *spec = std::mem::take(spec).date_range(column, from, to);
    }

    errors
}
