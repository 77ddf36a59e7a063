//! Aggregations over filtered datasets.
//!
//! Every function here is pure: it reads a (filtered) dataset and returns a
//! summary without touching the input. Group results are ordered by their
//! key values so repeated calls give identical output.

use super::error::{PipelineError, Result};
use crate::models::{
    AggregateResult, Bin, ColumnKind, Dataset, GroupKey, Histogram, Metric, Record, ReduceOp,
    Schema, ScatterPoint, ScatterSet, SeriesSet, Value,
};
use std::collections::HashMap;
use tracing::debug;

/// Resolve a column position, failing on unknown names.
fn resolve(schema: &Schema, dimension: &str) -> Result<usize> {
    schema
        .index_of(dimension)
        .ok_or_else(|| PipelineError::InvalidDimension(dimension.to_string()))
}

/// Resolve a column that must hold numbers.
fn resolve_numeric(schema: &Schema, dimension: &str) -> Result<usize> {
    let idx = resolve(schema, dimension)?;
    let kind = schema.columns[idx].kind;
    if kind != ColumnKind::Number {
        return Err(PipelineError::KindMismatch {
            dimension: dimension.to_string(),
            expected: ColumnKind::Number,
            actual: kind,
        });
    }
    Ok(idx)
}

/// Running totals for one value column within one group.
#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    sum: f64,
    numeric: usize,
    present: usize,
}

impl Accumulator {
    fn push(&mut self, value: &Value) {
        if !value.is_missing() {
            self.present += 1;
        }
        if let Some(n) = value.as_number() {
            self.sum += n;
            self.numeric += 1;
        }
    }

    /// Reduced value; `None` when every value in the group was missing.
    fn finish(&self, op: ReduceOp) -> Option<f64> {
        match op {
            ReduceOp::Count => Some(self.present as f64),
            _ if self.numeric == 0 => None,
            ReduceOp::Sum => Some(self.sum),
            ReduceOp::Mean => Some(self.sum / self.numeric as f64),
        }
    }
}

/// One group: its key values, row count and one accumulator per value column.
struct Group {
    key: Vec<Value>,
    rows: usize,
    values: Vec<Accumulator>,
}

/// Hash-grouping of records by a tuple of columns.
struct Groups {
    groups: Vec<Group>,
    index: HashMap<Vec<String>, usize>,
}

impl Groups {
    fn collect(dataset: &Dataset, key_idx: &[usize], value_idx: &[usize]) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut index: HashMap<Vec<String>, usize> = HashMap::new();

        for record in &dataset.records {
            let labels: Vec<String> = key_idx.iter().map(|i| record.get(*i).label()).collect();
            let slot = *index.entry(labels).or_insert_with(|| {
                groups.push(Group {
                    key: key_idx.iter().map(|i| record.get(*i).clone()).collect(),
                    rows: 0,
                    values: vec![Accumulator::default(); value_idx.len()],
                });
                groups.len() - 1
            });

            let group = &mut groups[slot];
            group.rows += 1;
            for (acc, idx) in group.values.iter_mut().zip(value_idx) {
                acc.push(record.get(*idx));
            }
        }

        Self { groups, index }
    }

    /// Groups ordered by key values.
    fn sorted(mut self) -> Vec<Group> {
        debug!("Collected {} groups", self.index.len());
        self.groups.sort_by(|a, b| {
            a.key
                .iter()
                .zip(&b.key)
                .map(|(x, y)| x.sort_cmp(y))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        self.groups
    }
}

fn group_key(values: &[Value]) -> GroupKey {
    GroupKey(values.iter().map(Value::label).collect())
}

/// Count records per distinct value of `dimension`.
///
/// Missing cells form their own group so the counts always add up to the
/// number of records.
pub fn aggregate_frequency(dataset: &Dataset, dimension: &str) -> Result<AggregateResult> {
    let idx = resolve(&dataset.schema, dimension)?;

    let entries = Groups::collect(dataset, &[idx], &[])
        .sorted()
        .into_iter()
        .map(|g| (group_key(&g.key), g.rows as f64))
        .collect();

    Ok(AggregateResult {
        dimensions: vec![dimension.to_string()],
        value_label: dimension.to_string(),
        op: ReduceOp::Count,
        entries,
    })
}

/// Reduce `value_dim` within each group of `group_dims`.
///
/// Missing values are excluded from the reduction. A group whose values are
/// all missing is left out of a sum or mean; `Count` counts present values.
pub fn aggregate_grouped(
    dataset: &Dataset,
    group_dims: &[&str],
    value_dim: &str,
    op: ReduceOp,
) -> Result<AggregateResult> {
    let key_idx = group_dims
        .iter()
        .map(|d| resolve(&dataset.schema, d))
        .collect::<Result<Vec<_>>>()?;
    let value_idx = match op {
        ReduceOp::Count => resolve(&dataset.schema, value_dim)?,
        ReduceOp::Sum | ReduceOp::Mean => resolve_numeric(&dataset.schema, value_dim)?,
    };

    let entries = Groups::collect(dataset, &key_idx, &[value_idx])
        .sorted()
        .into_iter()
        .filter_map(|g| g.values[0].finish(op).map(|v| (group_key(&g.key), v)))
        .collect();

    Ok(AggregateResult {
        dimensions: group_dims.iter().map(|d| d.to_string()).collect(),
        value_label: value_dim.to_string(),
        op,
        entries,
    })
}

/// One grouped reduction per value column, all sharing `group_dim`.
pub fn aggregate_series(
    dataset: &Dataset,
    group_dim: &str,
    value_dims: &[&str],
    op: ReduceOp,
) -> Result<SeriesSet> {
    let series = value_dims
        .iter()
        .map(|v| aggregate_grouped(dataset, &[group_dim], v, op))
        .collect::<Result<Vec<_>>>()?;

    Ok(SeriesSet {
        group_dim: group_dim.to_string(),
        series,
    })
}

/// Reduce each value column within each group, then add the reductions of
/// a group together. Columns with no present values in a group are skipped.
pub fn aggregate_row_sum(
    dataset: &Dataset,
    group_dim: &str,
    value_dims: &[&str],
    op: ReduceOp,
) -> Result<AggregateResult> {
    let key_idx = resolve(&dataset.schema, group_dim)?;
    let value_idx = value_dims
        .iter()
        .map(|d| resolve_numeric(&dataset.schema, d))
        .collect::<Result<Vec<_>>>()?;

    let entries = Groups::collect(dataset, &[key_idx], &value_idx)
        .sorted()
        .into_iter()
        .filter_map(|g| {
            let reduced: Vec<f64> = g.values.iter().filter_map(|a| a.finish(op)).collect();
            if reduced.is_empty() {
                None
            } else {
                Some((group_key(&g.key), reduced.iter().sum()))
            }
        })
        .collect();

    Ok(AggregateResult {
        dimensions: vec![group_dim.to_string()],
        value_label: value_dims.join(" + "),
        op,
        entries,
    })
}

/// Equal-width histogram of a numeric column.
///
/// Bins span the observed range; the last bin includes its upper edge. A
/// single repeated value gets a range of one unit centred on it.
pub fn histogram(
    dataset: &Dataset,
    dimension: &str,
    bins: usize,
    with_density: bool,
) -> Result<Histogram> {
    resolve_numeric(&dataset.schema, dimension)?;
    let values = dataset.numeric_values(dimension).unwrap_or_default();
    let bins = bins.max(1);

    if values.is_empty() {
        return Ok(Histogram {
            dimension: dimension.to_string(),
            bins: Vec::new(),
            mean: None,
            density: None,
        });
    }

    let mut lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let mut hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;

    let mut out: Vec<Bin> = (0..bins)
        .map(|i| Bin {
            lower: lo + i as f64 * width,
            upper: if i + 1 == bins {
                hi
            } else {
                lo + (i + 1) as f64 * width
            },
            count: 0,
        })
        .collect();

    for v in &values {
        let slot = (((v - lo) / width).floor() as usize).min(bins - 1);
        out[slot].count += 1;
    }

    let density = if with_density {
        kernel_density(&values, &out.iter().map(Bin::center).collect::<Vec<_>>())
            .map(|d| d.into_iter().map(|f| f * values.len() as f64 * width).collect())
    } else {
        None
    };

    Ok(Histogram {
        dimension: dimension.to_string(),
        bins: out,
        mean: mean(&values),
        density,
    })
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Sample standard deviation (n - 1 denominator).
fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

/// Gaussian kernel density estimate at `points`, bandwidth by Scott's rule.
///
/// Returns `None` for fewer than two values or zero spread.
pub fn kernel_density(values: &[f64], points: &[f64]) -> Option<Vec<f64>> {
    let sd = std_dev(values)?;
    if sd == 0.0 {
        return None;
    }

    let n = values.len() as f64;
    let bandwidth = sd * n.powf(-0.2);
    let norm = n * bandwidth * (2.0 * std::f64::consts::PI).sqrt();

    Some(
        points
            .iter()
            .map(|p| {
                values
                    .iter()
                    .map(|v| (-0.5 * ((p - v) / bandwidth).powi(2)).exp())
                    .sum::<f64>()
                    / norm
            })
            .collect(),
    )
}

/// Pearson correlation coefficient.
pub fn correlation(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mx = mean(xs)?;
    let my = mean(ys)?;

    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        cov += (x - mx) * (y - my);
        vx += (x - mx).powi(2);
        vy += (y - my).powi(2);
    }

    if vx == 0.0 || vy == 0.0 {
        None
    } else {
        Some(cov / (vx.sqrt() * vy.sqrt()))
    }
}

/// Points for a scatter plot. Rows missing any requested coordinate are
/// skipped.
pub fn scatter(
    dataset: &Dataset,
    x: &str,
    y: &str,
    z: Option<&str>,
    color: Option<&str>,
) -> Result<ScatterSet> {
    let schema = &dataset.schema;
    let xi = resolve_numeric(schema, x)?;
    let yi = resolve_numeric(schema, y)?;
    let zi = z.map(|d| resolve_numeric(schema, d)).transpose()?;
    let ci = color.map(|d| resolve_numeric(schema, d)).transpose()?;

    let optional = |idx: Option<usize>, record: &Record| -> Option<Option<f64>> {
        match idx {
            Some(i) => record.get(i).as_number().map(Some),
            None => Some(None),
        }
    };

    let points: Vec<ScatterPoint> = dataset
        .records
        .iter()
        .filter_map(|r| {
            Some(ScatterPoint {
                x: r.get(xi).as_number()?,
                y: r.get(yi).as_number()?,
                z: optional(zi, r)?,
                color: optional(ci, r)?,
            })
        })
        .collect();

    let xs: Vec<f64> = points.iter().map(|p| p.x).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.y).collect();

    Ok(ScatterSet {
        x: x.to_string(),
        y: y.to_string(),
        z: z.map(String::from),
        color: color.map(String::from),
        correlation: correlation(&xs, &ys),
        points,
    })
}

/// A column reported as a headline metric.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricColumn {
    pub column: String,
    pub label: String,
    pub unit: String,
}

impl MetricColumn {
    pub fn new(column: &str, label: &str, unit: &str) -> Self {
        Self {
            column: column.to_string(),
            label: label.to_string(),
            unit: unit.to_string(),
        }
    }
}

/// How the period of the latest record is labelled.
#[derive(Debug, Clone, PartialEq)]
pub enum Period {
    /// `Q{quarter} {year}`.
    Quarter { year: String, quarter: String },
}

impl Period {
    fn label(&self, dataset: &Dataset, record: &Record) -> Result<String> {
        match self {
            Period::Quarter { year, quarter } => {
                let y = record.get(resolve(&dataset.schema, year)?).label();
                let q = record.get(resolve(&dataset.schema, quarter)?).label();
                Ok(format!("Q{} {}", q, y))
            }
        }
    }
}

/// Metrics read from the last record of the dataset.
///
/// An empty dataset yields no metrics.
pub fn latest(dataset: &Dataset, columns: &[MetricColumn], period: &Period) -> Result<Vec<Metric>> {
    let indexes = columns
        .iter()
        .map(|c| resolve_numeric(&dataset.schema, &c.column))
        .collect::<Result<Vec<_>>>()?;

    let Some(record) = dataset.records.last() else {
        return Ok(Vec::new());
    };
    let period = period.label(dataset, record)?;

    Ok(columns
        .iter()
        .zip(indexes)
        .map(|(c, idx)| Metric {
            label: c.label.clone(),
            value: record.get(idx).as_number(),
            unit: c.unit.clone(),
            period: period.clone(),
        })
        .collect())
}
