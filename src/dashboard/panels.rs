//! Panel definitions and evaluation.
//!
//! A panel pairs a presentation hint with the measure it shows and,
//! optionally, the selection that drives it. Evaluating a panel against a
//! filtered dataset yields an [`Outcome`].

use crate::models::{ChartKind, Dataset, PresentationHint, ReduceOp, Summary};
use crate::pipeline::{
    aggregate_frequency, aggregate_grouped, aggregate_row_sum, aggregate_series, histogram,
    latest, scatter, FilterSpec, MetricColumn, Outcome, Period, PipelineError,
};
use crate::report::ChartSink;
use tracing::debug;

/// Name shown when the GDP component selection is empty.
pub const COMPONENT_DIMENSION: &str = "GDP component";

/// What a panel summarises.
#[derive(Debug, Clone, PartialEq)]
pub enum Measure {
    Frequency {
        dimension: String,
    },
    Grouped {
        group_dims: Vec<String>,
        value_dim: String,
        op: ReduceOp,
    },
    Series {
        group_dim: String,
        value_dims: Vec<String>,
        op: ReduceOp,
    },
    RowSum {
        group_dim: String,
        value_dims: Vec<String>,
        op: ReduceOp,
    },
    Histogram {
        dimension: String,
        bins: usize,
        density: bool,
    },
    Scatter {
        x: String,
        y: String,
        z: Option<String>,
        color: Option<String>,
    },
    Latest {
        columns: Vec<MetricColumn>,
        period: Period,
    },
}

impl Measure {
    /// Value columns picked by the user, for measures that take them.
    fn value_dims(&self) -> Option<&[String]> {
        match self {
            Measure::Series { value_dims, .. } | Measure::RowSum { value_dims, .. } => {
                Some(value_dims)
            }
            _ => None,
        }
    }
}

/// The user selection a panel depends on.
#[derive(Debug, Clone, PartialEq)]
pub enum Driver {
    /// A categorical filter; an empty selection leaves nothing to show.
    Selection(String),
    /// The measure's own value columns; none chosen leaves nothing to show.
    Columns(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PanelSpec {
    pub hint: PresentationHint,
    pub driver: Option<Driver>,
    pub measure: Measure,
}

impl PanelSpec {
    pub fn new(hint: PresentationHint, measure: Measure) -> Self {
        Self {
            hint,
            driver: None,
            measure,
        }
    }

    pub fn driven_by(mut self, driver: Driver) -> Self {
        self.driver = Some(driver);
        self
    }

    /// The dimension to report when this panel must show a placeholder.
    pub fn placeholder_dimension(&self, spec: &FilterSpec) -> Option<&str> {
        match &self.driver {
            Some(Driver::Selection(dim)) if spec.is_empty_selection(dim) => Some(dim.as_str()),
            Some(Driver::Columns(name))
                if self.measure.value_dims().map_or(false, |d| d.is_empty()) =>
            {
                Some(name.as_str())
            }
            _ => None,
        }
    }
}

fn strs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

/// Evaluate one panel over an already filtered dataset.
///
/// An empty driving selection short-circuits to a placeholder before any
/// aggregation runs.
pub fn run_panel(
    filtered: &Dataset,
    spec: &FilterSpec,
    panel: &PanelSpec,
) -> Result<Outcome, PipelineError> {
    if let Some(dimension) = panel.placeholder_dimension(spec) {
        debug!("Panel '{}' has an empty selection", panel.hint.title);
        return Ok(Outcome::Placeholder {
            dimension: dimension.to_string(),
        });
    }

    let summary = match &panel.measure {
        Measure::Frequency { dimension } => {
            Summary::Aggregate(aggregate_frequency(filtered, dimension)?)
        }
        Measure::Grouped {
            group_dims,
            value_dim,
            op,
        } => Summary::Aggregate(aggregate_grouped(
            filtered,
            &strs(group_dims),
            value_dim,
            *op,
        )?),
        Measure::Series {
            group_dim,
            value_dims,
            op,
        } => Summary::Series(aggregate_series(
            filtered,
            group_dim,
            &strs(value_dims),
            *op,
        )?),
        Measure::RowSum {
            group_dim,
            value_dims,
            op,
        } => Summary::Aggregate(aggregate_row_sum(
            filtered,
            group_dim,
            &strs(value_dims),
            *op,
        )?),
        Measure::Histogram {
            dimension,
            bins,
            density,
        } => Summary::Histogram(histogram(filtered, dimension, *bins, *density)?),
        Measure::Scatter { x, y, z, color } => Summary::Scatter(scatter(
            filtered,
            x,
            y,
            z.as_deref(),
            color.as_deref(),
        )?),
        Measure::Latest { columns, period } => Summary::Metrics {
            metrics: latest(filtered, columns, period)?,
        },
    };

    Ok(Outcome::Rendered(summary))
}

/// Hand an outcome to the sink: one `render` or one `placeholder` call.
pub fn dispatch(outcome: &Outcome, hint: &PresentationHint, sink: &mut dyn ChartSink) {
    match outcome {
        Outcome::Rendered(summary) => sink.render(hint, summary),
        Outcome::Placeholder { dimension } => sink.placeholder(hint, dimension),
    }
}

/// Panels of the retail sales dashboard.
pub fn sales_panels(bins: usize) -> Vec<PanelSpec> {
    let share = |title: &str, dimension: &str| {
        PanelSpec::new(
            PresentationHint::new(title, ChartKind::Pie),
            Measure::Frequency {
                dimension: dimension.to_string(),
            },
        )
        .driven_by(Driver::Selection(dimension.to_string()))
    };

    vec![
        share("Sales by Payment Method", "Payment"),
        share("Sales by Branch", "Branch"),
        share("Sales by Product Line", "Product line"),
        PanelSpec::new(
            PresentationHint::new(
                "Gross Income by Product Line and Branch",
                ChartKind::StackedBar,
            )
            .with_axes("Product line", "Total gross income"),
            Measure::Grouped {
                group_dims: vec!["Product line".to_string(), "Branch".to_string()],
                value_dim: "gross income".to_string(),
                op: ReduceOp::Sum,
            },
        ),
        PanelSpec::new(
            PresentationHint::new("Customer Rating Distribution", ChartKind::Histogram)
                .with_axes("Rating", "Frequency"),
            Measure::Histogram {
                dimension: "Rating".to_string(),
                bins,
                density: true,
            },
        ),
        PanelSpec::new(
            PresentationHint::new("Gross Income, Quantity and Rating", ChartKind::Scatter)
                .with_axes("Quantity", "Rating (1-10)"),
            Measure::Scatter {
                x: "Quantity".to_string(),
                y: "Rating".to_string(),
                z: Some("gross income".to_string()),
                color: Some("gross income".to_string()),
            },
        ),
    ]
}

/// Panels of the macroeconomic dashboard.
pub fn macro_panels(components: &[String], bins: usize) -> Vec<PanelSpec> {
    let by_components = |title: &str, chart: ChartKind, measure: Measure| {
        PanelSpec::new(PresentationHint::new(title, chart), measure)
            .driven_by(Driver::Columns(COMPONENT_DIMENSION.to_string()))
    };

    vec![
        PanelSpec::new(
            PresentationHint::new("Latest Quarter", ChartKind::Metrics),
            Measure::Latest {
                columns: vec![
                    MetricColumn::new("gdp", "GDP", "bn $"),
                    MetricColumn::new("unemp", "Unemployment", "%"),
                    MetricColumn::new("inflation", "Inflation", "%"),
                ],
                period: Period::Quarter {
                    year: "Year".to_string(),
                    quarter: "Quarter".to_string(),
                },
            },
        ),
        by_components(
            "GDP Components by Year",
            ChartKind::Area,
            Measure::Series {
                group_dim: "Year".to_string(),
                value_dims: components.to_vec(),
                op: ReduceOp::Mean,
            },
        ),
        by_components(
            "GDP Components by Quarter",
            ChartKind::Pie,
            Measure::RowSum {
                group_dim: "Quarter".to_string(),
                value_dims: components.to_vec(),
                op: ReduceOp::Mean,
            },
        ),
        PanelSpec::new(
            PresentationHint::new("GDP Trend", ChartKind::Line).with_axes("Year", "Billions $"),
            Measure::Grouped {
                group_dims: vec!["Year".to_string()],
                value_dim: "gdp".to_string(),
                op: ReduceOp::Mean,
            },
        ),
        PanelSpec::new(
            PresentationHint::new("Unemployment and Inflation", ChartKind::Line)
                .with_axes("Year", "Percent (%)"),
            Measure::Series {
                group_dim: "Year".to_string(),
                value_dims: vec!["unemp".to_string(), "inflation".to_string()],
                op: ReduceOp::Mean,
            },
        ),
        PanelSpec::new(
            PresentationHint::new("Inflation vs Unemployment", ChartKind::Scatter)
                .with_axes("Unemployment rate (%)", "Inflation rate (%)"),
            Measure::Scatter {
                x: "unemp".to_string(),
                y: "inflation".to_string(),
                z: None,
                color: Some("Year".to_string()),
            },
        ),
        PanelSpec::new(
            PresentationHint::new("Inflation Distribution", ChartKind::Histogram)
                .with_axes("Inflation rate (%)", "Frequency"),
            Measure::Histogram {
                dimension: "inflation".to_string(),
                bins,
                density: false,
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AggregateResult, Column, ColumnKind, GroupKey, Record, Schema, Value};

    /// Sink that records every call.
    #[derive(Default)]
    struct RecordingSink {
        rendered: Vec<(String, Summary)>,
        placeholders: Vec<(String, String)>,
    }

    impl ChartSink for RecordingSink {
        fn render(&mut self, hint: &PresentationHint, summary: &Summary) {
            self.rendered.push((hint.title.clone(), summary.clone()));
        }

        fn placeholder(&mut self, hint: &PresentationHint, dimension: &str) {
            self.placeholders
                .push((hint.title.clone(), dimension.to_string()));
        }

        fn notice(&mut self, _message: &str) {}
    }

    fn three_rows() -> Dataset {
        let schema = Schema::new(vec![Column::new("Branch", ColumnKind::Text)]);
        let records = ["A", "A", "B"]
            .into_iter()
            .map(|b| Record::new(vec![Value::Text(b.to_string())]))
            .collect();
        Dataset::new(schema, records)
    }

    fn branch_panel() -> PanelSpec {
        PanelSpec::new(
            PresentationHint::new("Branches", ChartKind::Pie),
            Measure::Frequency {
                dimension: "Branch".to_string(),
            },
        )
        .driven_by(Driver::Selection("Branch".to_string()))
    }

    #[test]
    fn test_frequency_panel_renders_counts() {
        let dataset = three_rows();
        let spec = FilterSpec::new().select("Branch", ["A", "B"]);
        let filtered = crate::pipeline::filter(&dataset, &spec);
        assert_eq!(filtered.len(), 3);

        let outcome = run_panel(&filtered, &spec, &branch_panel()).unwrap();
        let Outcome::Rendered(Summary::Aggregate(result)) = &outcome else {
            panic!("expected an aggregate, got {:?}", outcome);
        };
        assert_eq!(result.get(&GroupKey::single("A")), Some(2.0));
        assert_eq!(result.get(&GroupKey::single("B")), Some(1.0));
    }

    #[test]
    fn test_empty_selection_yields_single_placeholder() {
        let dataset = three_rows();
        let spec = FilterSpec::new().select("Branch", Vec::<String>::new());
        let filtered = crate::pipeline::filter(&dataset, &spec);

        let panel = branch_panel();
        let outcome = run_panel(&filtered, &spec, &panel).unwrap();
        assert_eq!(
            outcome,
            Outcome::Placeholder {
                dimension: "Branch".to_string()
            }
        );

        let mut sink = RecordingSink::default();
        dispatch(&outcome, &panel.hint, &mut sink);
        assert!(sink.rendered.is_empty());
        assert_eq!(
            sink.placeholders,
            vec![("Branches".to_string(), "Branch".to_string())]
        );
    }

    #[test]
    fn test_placeholder_skips_invalid_dimension_check() {
        // No aggregation happens for a placeholder, so even a bad measure
        // does not raise.
        let dataset = three_rows();
        let spec = FilterSpec::new().select("Branch", Vec::<String>::new());
        let panel = PanelSpec::new(
            PresentationHint::new("Broken", ChartKind::Pie),
            Measure::Frequency {
                dimension: "City".to_string(),
            },
        )
        .driven_by(Driver::Selection("Branch".to_string()));

        assert!(run_panel(&dataset, &spec, &panel).unwrap().is_placeholder());
    }

    #[test]
    fn test_rendered_outcome_dispatches_once_unmodified() {
        let result = AggregateResult {
            dimensions: vec!["Branch".to_string()],
            value_label: "Branch".to_string(),
            op: ReduceOp::Count,
            entries: vec![(GroupKey::single("B"), 5.0), (GroupKey::single("A"), 1.0)],
        };
        let outcome = Outcome::Rendered(Summary::Aggregate(result.clone()));
        let mut sink = RecordingSink::default();

        dispatch(&outcome, &branch_panel().hint, &mut sink);

        assert_eq!(sink.rendered.len(), 1);
        assert_eq!(sink.rendered[0].1, Summary::Aggregate(result));
        assert!(sink.placeholders.is_empty());
    }

    #[test]
    fn test_component_panels_need_components() {
        let panels = macro_panels(&[], 15);
        let spec = FilterSpec::new();

        let empty: Vec<_> = panels
            .iter()
            .filter_map(|p| p.placeholder_dimension(&spec))
            .collect();
        assert_eq!(empty, vec![COMPONENT_DIMENSION, COMPONENT_DIMENSION]);

        let panels = macro_panels(&["consumption".to_string()], 15);
        assert!(panels.iter().all(|p| p.placeholder_dimension(&spec).is_none()));
    }

    #[test]
    fn test_sales_layout() {
        let panels = sales_panels(20);
        assert_eq!(panels.len(), 6);
        assert_eq!(
            panels
                .iter()
                .filter(|p| p.hint.chart == ChartKind::Pie)
                .count(),
            3
        );
        assert!(panels.iter().any(|p| matches!(
            &p.measure,
            Measure::Histogram { bins: 20, density: true, .. }
        )));
    }
}
