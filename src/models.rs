//! Data models for the dashboard pipeline.
//!
//! This module contains the core data structures shared by the loader,
//! the filter/aggregate pipeline and the report renderers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Label used for missing cells when they become a group key.
pub const MISSING_LABEL: &str = "(missing)";

/// A single cell of a loaded dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Value {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Missing,
}

impl Value {
    /// Returns the label used for grouping and categorical selection.
    pub fn label(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Number(n) => format_number(*n),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Missing => MISSING_LABEL.to_string(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) if !n.is_nan() => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Ordering used for group keys: numbers numerically, dates
    /// chronologically, text lexically, missing values last.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Number(_) => 0,
            Value::Date(_) => 1,
            Value::Text(_) => 2,
            Value::Missing => 3,
        }
    }
}

/// Format a number the way it should appear as a label: integral values
/// without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Type of a dataset column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Text,
    Number,
    Date,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Text => write!(f, "text"),
            ColumnKind::Number => write!(f, "number"),
            ColumnKind::Date => write!(f, "date"),
        }
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Ordered column layout shared by every record of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Position of a column by exact name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }
}

/// One immutable row of a dataset; values follow the schema's column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub values: Vec<Value>,
}

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Value at a column position, `Missing` when the row is short.
    pub fn get(&self, index: usize) -> &Value {
        self.values.get(index).unwrap_or(&Value::Missing)
    }
}

/// An ordered collection of records sharing one schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub schema: Schema,
    pub records: Vec<Record>,
}

impl Dataset {
    pub fn new(schema: Schema, records: Vec<Record>) -> Self {
        Self { schema, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Non-missing numeric values of a column, in record order.
    pub fn numeric_values(&self, column: &str) -> Option<Vec<f64>> {
        let idx = self.schema.index_of(column)?;
        Some(
            self.records
                .iter()
                .filter_map(|r| r.get(idx).as_number())
                .collect(),
        )
    }
}

/// Tuple of labels identifying one group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey(pub Vec<String>);

impl GroupKey {
    #[cfg(test)]
    pub fn single(label: impl Into<String>) -> Self {
        Self(vec![label.into()])
    }

    /// Human readable form, labels joined by " / ".
    pub fn label(&self) -> String {
        self.0.join(" / ")
    }
}

impl From<&[&str]> for GroupKey {
    fn from(parts: &[&str]) -> Self {
        Self(parts.iter().map(|s| s.to_string()).collect())
    }
}

/// Reduction applied within each group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReduceOp {
    Count,
    Sum,
    Mean,
}

impl fmt::Display for ReduceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReduceOp::Count => write!(f, "count"),
            ReduceOp::Sum => write!(f, "sum"),
            ReduceOp::Mean => write!(f, "mean"),
        }
    }
}

/// Group key -> numeric summary, ordered by group key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    /// Grouping dimensions, in key order.
    pub dimensions: Vec<String>,
    /// Column being reduced (the grouping dimension for counts).
    pub value_label: String,
    pub op: ReduceOp,
    pub entries: Vec<(GroupKey, f64)>,
}

impl AggregateResult {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all group values.
    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, v)| v).sum()
    }

    pub fn get(&self, key: &GroupKey) -> Option<f64> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }

    #[cfg(test)]
    pub fn labels(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| k.label()).collect()
    }
}

/// Several grouped reductions sharing one grouping dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSet {
    pub group_dim: String,
    pub series: Vec<AggregateResult>,
}

/// One histogram bin; `lower` inclusive, `upper` exclusive except the last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

impl Bin {
    pub fn center(&self) -> f64 {
        (self.lower + self.upper) / 2.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub dimension: String,
    pub bins: Vec<Bin>,
    /// Mean of the binned values.
    pub mean: Option<f64>,
    /// Kernel density at each bin centre, scaled to expected counts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub density: Option<Vec<f64>>,
}

impl Histogram {
    pub fn total(&self) -> usize {
        self.bins.iter().map(|b| b.count).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterPoint {
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterSet {
    pub x: String,
    pub y: String,
    pub z: Option<String>,
    pub color: Option<String>,
    pub points: Vec<ScatterPoint>,
    /// Pearson correlation between x and y.
    pub correlation: Option<f64>,
}

/// A headline figure taken from a single record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub label: String,
    pub value: Option<f64>,
    pub unit: String,
    pub period: String,
}

/// Anything the pipeline can hand to a renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Summary {
    Aggregate(AggregateResult),
    Series(SeriesSet),
    Histogram(Histogram),
    Scatter(ScatterSet),
    Metrics { metrics: Vec<Metric> },
}

impl Summary {
    /// True when there is nothing to draw.
    pub fn is_empty(&self) -> bool {
        match self {
            Summary::Aggregate(result) => result.is_empty(),
            Summary::Series(set) => set.series.iter().all(|s| s.is_empty()),
            Summary::Histogram(hist) => hist.total() == 0,
            Summary::Scatter(set) => set.points.is_empty(),
            Summary::Metrics { metrics } => metrics.is_empty(),
        }
    }
}

/// Chart type requested from the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Pie,
    StackedBar,
    Line,
    Area,
    Histogram,
    Scatter,
    Metrics,
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChartKind::Pie => write!(f, "Pie"),
            ChartKind::StackedBar => write!(f, "Stacked bar"),
            ChartKind::Line => write!(f, "Line"),
            ChartKind::Area => write!(f, "Area"),
            ChartKind::Histogram => write!(f, "Histogram"),
            ChartKind::Scatter => write!(f, "Scatter"),
            ChartKind::Metrics => write!(f, "Metrics"),
        }
    }
}

/// Presentation details passed through to the renderer untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentationHint {
    pub title: String,
    pub chart: ChartKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y_label: Option<String>,
}

impl PresentationHint {
    pub fn new(title: impl Into<String>, chart: ChartKind) -> Self {
        Self {
            title: title.into(),
            chart,
            x_label: None,
            y_label: None,
        }
    }

    pub fn with_axes(mut self, x: impl Into<String>, y: impl Into<String>) -> Self {
        self.x_label = Some(x.into());
        self.y_label = Some(y.into());
        self
    }
}

/// Final state of one dashboard panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PanelStatus {
    Rendered { summary: Summary },
    Placeholder { dimension: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelReport {
    pub hint: PresentationHint,
    #[serde(flatten)]
    pub status: PanelStatus,
}

/// Metadata about a dashboard run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Path of the loaded dataset.
    pub source: String,
    /// Dashboard variant name.
    pub variant: String,
    pub generated_at: DateTime<Utc>,
    pub rows_loaded: usize,
    pub rows_filtered: usize,
    /// Human readable description of each active constraint.
    pub active_filters: Vec<String>,
    pub duration_seconds: f64,
}

/// The complete dashboard report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardReport {
    pub metadata: ReportMetadata,
    /// User-visible validation notices (e.g. an unparseable date filter).
    pub notices: Vec<String>,
    pub panels: Vec<PanelReport>,
}

impl DashboardReport {
    /// Number of panels that produced a non-empty summary.
    pub fn rendered_count(&self) -> usize {
        self.panels
            .iter()
            .filter(|p| match &p.status {
                PanelStatus::Rendered { summary } => !summary.is_empty(),
                PanelStatus::Placeholder { .. } => false,
            })
            .count()
    }

    pub fn placeholder_count(&self) -> usize {
        self.panels
            .iter()
            .filter(|p| matches!(p.status, PanelStatus::Placeholder { .. }))
            .count()
    }
}
