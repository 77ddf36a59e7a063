//! Dashboard variants and the render pass.
//!
//! A render pass validates the request against the dataset schema, filters
//! the dataset once, evaluates every panel of the variant and dispatches
//! each outcome to a [`ChartSink`].

pub mod panels;

pub use panels::{dispatch, macro_panels, run_panel, sales_panels, PanelSpec};

use crate::models::{Column, ColumnKind, Dataset};
use crate::pipeline::{filter, FilterSpec, PipelineError};
use crate::report::ChartSink;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Default histogram bins for the sales rating distribution.
pub const SALES_HISTOGRAM_BINS: usize = 20;
/// Default histogram bins for the inflation distribution.
pub const MACRO_HISTOGRAM_BINS: usize = 15;

/// Which dashboard to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Retail sales transactions
    #[default]
    Sales,
    /// Quarterly US macroeconomic series
    Macro,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Sales => write!(f, "sales"),
            Variant::Macro => write!(f, "macro"),
        }
    }
}

impl Variant {
    /// Columns every dataset of this variant must provide.
    pub fn required_columns(&self) -> Vec<Column> {
        let text = |n: &str| Column::new(n, ColumnKind::Text);
        let number = |n: &str| Column::new(n, ColumnKind::Number);

        match self {
            Variant::Sales => vec![
                text("Branch"),
                text("Customer type"),
                text("Gender"),
                text("Product line"),
                text("Payment"),
                number("Quantity"),
                number("gross income"),
                number("Rating"),
                Column::new("Date", ColumnKind::Date),
            ],
            Variant::Macro => vec![
                number("Year"),
                number("Quarter"),
                number("gdp"),
                number("consumption"),
                number("invest"),
                number("government"),
                number("unemp"),
                number("inflation"),
            ],
        }
    }

    /// Column targeted by the free-text date filter, if the variant has one.
    pub fn date_column(&self) -> Option<&'static str> {
        match self {
            Variant::Sales => Some("Date"),
            Variant::Macro => None,
        }
    }

    pub fn default_bins(&self) -> usize {
        match self {
            Variant::Sales => SALES_HISTOGRAM_BINS,
            Variant::Macro => MACRO_HISTOGRAM_BINS,
        }
    }
}

/// Everything a render pass needs besides the dataset.
#[derive(Debug, Clone, Default)]
pub struct DashboardRequest {
    pub variant: Variant,
    pub filters: FilterSpec,
    /// GDP components shown by the macro composition panels.
    pub components: Vec<String>,
    /// Histogram bin override.
    pub bins: Option<usize>,
    /// Validation notices gathered while building the request.
    pub notices: Vec<String>,
}

impl DashboardRequest {
    pub fn panels(&self) -> Vec<PanelSpec> {
        let bins = self.bins.unwrap_or_else(|| self.variant.default_bins());
        match self.variant {
            Variant::Sales => sales_panels(bins),
            Variant::Macro => macro_panels(&self.components, bins),
        }
    }
}

/// Counters from one render pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub rows_loaded: usize,
    pub rows_filtered: usize,
    pub rendered: usize,
    pub placeholders: usize,
}

/// Run every panel of the requested dashboard over `dataset`.
pub fn run_dashboard(
    dataset: &Dataset,
    request: &DashboardRequest,
    sink: &mut dyn ChartSink,
) -> Result<RunStats, PipelineError> {
    for notice in &request.notices {
        sink.notice(notice);
    }

    request.filters.validate(&dataset.schema)?;

    let filtered = filter(dataset, &request.filters);
    info!(
        "{} of {} rows match the filters",
        filtered.len(),
        dataset.len()
    );
    if filtered.is_empty() {
        warn!("No rows match the filters; every panel will be empty");
    }

    let mut stats = RunStats {
        rows_loaded: dataset.len(),
        rows_filtered: filtered.len(),
        ..RunStats::default()
    };

    for panel in request.panels() {
        let outcome = run_panel(&filtered, &request.filters, &panel)?;
        if outcome.is_placeholder() {
            stats.placeholders += 1;
        } else {
            stats.rendered += 1;
        }
        debug!("Panel '{}' evaluated", panel.hint.title);
        dispatch(&outcome, &panel.hint, sink);
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        GroupKey, PanelStatus, PresentationHint, Record, Schema, Summary, Value,
    };
    use crate::report::ReportSink;
    use chrono::NaiveDate;

    fn sales_dataset() -> Dataset {
        let schema = Schema::new(Variant::Sales.required_columns());
        let row = |branch: &str, product: &str, payment: &str, income: f64, rating: f64| {
            Record::new(vec![
                Value::Text(branch.to_string()),
                Value::Text("Member".to_string()),
                Value::Text("Female".to_string()),
                Value::Text(product.to_string()),
                Value::Text(payment.to_string()),
                Value::Number(3.0),
                Value::Number(income),
                Value::Number(rating),
                Value::Date(NaiveDate::from_ymd_opt(2019, 1, 5).unwrap()),
            ])
        };
        Dataset::new(
            schema,
            vec![
                row("A", "Health and beauty", "Cash", 10.0, 9.1),
                row("A", "Health and beauty", "Ewallet", 5.0, 7.0),
                row("B", "Sports and travel", "Cash", 8.0, 4.2),
                row("C", "Sports and travel", "Credit card", 1.0, 6.0),
            ],
        )
    }

    fn panel<'a>(sink: &'a ReportSink, title: &str) -> &'a PanelStatus {
        &sink
            .panels()
            .iter()
            .find(|p| p.hint.title == title)
            .unwrap()
            .status
    }

    #[test]
    fn test_sales_dashboard_uses_filtered_rows() {
        let dataset = sales_dataset();
        let request = DashboardRequest {
            variant: Variant::Sales,
            filters: FilterSpec::new()
                .select("Branch", ["A", "B"])
                .select("Payment", ["Cash", "Ewallet"]),
            ..DashboardRequest::default()
        };
        let mut sink = ReportSink::new();

        let stats = run_dashboard(&dataset, &request, &mut sink).unwrap();
        assert_eq!(stats.rows_loaded, 4);
        assert_eq!(stats.rows_filtered, 3);
        assert_eq!(stats.rendered, 6);
        assert_eq!(stats.placeholders, 0);

        let PanelStatus::Rendered {
            summary: Summary::Aggregate(branches),
        } = panel(&sink, "Sales by Branch")
        else {
            panic!("branch panel not rendered");
        };
        assert_eq!(branches.total(), stats.rows_filtered as f64);
        assert_eq!(branches.get(&GroupKey::single("C")), None);

        let PanelStatus::Rendered {
            summary: Summary::Aggregate(income),
        } = panel(&sink, "Gross Income by Product Line and Branch")
        else {
            panic!("income panel not rendered");
        };
        assert_eq!(
            income.get(&GroupKey::from(&["Health and beauty", "A"][..])),
            Some(15.0)
        );
    }

    #[test]
    fn test_empty_branch_selection_placeholder() {
        let dataset = sales_dataset();
        let request = DashboardRequest {
            variant: Variant::Sales,
            filters: FilterSpec::new().select("Branch", Vec::<String>::new()),
            ..DashboardRequest::default()
        };
        let mut sink = ReportSink::new();

        let stats = run_dashboard(&dataset, &request, &mut sink).unwrap();
        assert_eq!(stats.placeholders, 1);
        assert_eq!(stats.rows_filtered, 0);
        assert!(matches!(
            panel(&sink, "Sales by Branch"),
            PanelStatus::Placeholder { dimension, .. } if dimension == "Branch"
        ));
        // Other panels still run, over zero rows.
        assert!(matches!(
            panel(&sink, "Sales by Payment Method"),
            PanelStatus::Rendered { summary } if summary.is_empty()
        ));
    }

    #[test]
    fn test_invalid_filter_dimension_is_surfaced() {
        let dataset = sales_dataset();
        let request = DashboardRequest {
            filters: FilterSpec::new().select("City", ["Yangon"]),
            ..DashboardRequest::default()
        };
        let mut sink = ReportSink::new();

        let err = run_dashboard(&dataset, &request, &mut sink).unwrap_err();
        assert_eq!(err, PipelineError::InvalidDimension("City".to_string()));
    }

    #[test]
    fn test_notices_reach_the_sink() {
        let dataset = sales_dataset();
        let request = DashboardRequest {
            notices: vec!["'31/02/2020' is not a valid date".to_string()],
            ..DashboardRequest::default()
        };
        let mut sink = ReportSink::new();

        run_dashboard(&dataset, &request, &mut sink).unwrap();
        let (_, notices) = sink.into_parts();
        assert_eq!(notices.len(), 1);
    }

    #[test]
    fn test_macro_dashboard() {
        let schema = Schema::new(Variant::Macro.required_columns());
        let records = (0..8)
            .map(|i| {
                let year = 1950.0 + (i / 4) as f64;
                let quarter = (i % 4 + 1) as f64;
                Record::new(vec![
                    Value::Number(year),
                    Value::Number(quarter),
                    Value::Number(1000.0 + i as f64),
                    Value::Number(600.0),
                    Value::Number(100.0),
                    Value::Number(200.0),
                    Value::Number(5.0 - i as f64 * 0.1),
                    Value::Number(2.0 + i as f64 * 0.2),
                ])
            })
            .collect();
        let dataset = Dataset::new(schema, records);
        let request = DashboardRequest {
            variant: Variant::Macro,
            filters: FilterSpec::new().range("Year", 1950.0, 1950.0),
            components: vec!["consumption".to_string(), "invest".to_string()],
            ..DashboardRequest::default()
        };
        let mut sink = ReportSink::new();

        let stats = run_dashboard(&dataset, &request, &mut sink).unwrap();
        assert_eq!(stats.rows_filtered, 4);
        assert_eq!(stats.rendered, 7);

        let PanelStatus::Rendered {
            summary: Summary::Metrics { metrics },
        } = panel(&sink, "Latest Quarter")
        else {
            panic!("metrics panel not rendered");
        };
        assert_eq!(metrics[0].period, "Q4 1950");
        assert_eq!(metrics[0].value, Some(1003.0));

        let PanelStatus::Rendered {
            summary: Summary::Aggregate(quarters),
        } = panel(&sink, "GDP Components by Quarter")
        else {
            panic!("quarter panel not rendered");
        };
        assert_eq!(quarters.get(&GroupKey::single("1")), Some(700.0));
    }

    #[test]
    fn test_sales_fixture_with_default_filters() {
        let csv = include_str!("../../fixtures/sales_sample.csv");
        let dataset = crate::loader::read_dataset(csv.as_bytes(), Variant::Sales).unwrap();
        let request = crate::config::Config::default().dashboard_request();
        let mut sink = ReportSink::new();

        let stats = run_dashboard(&dataset, &request, &mut sink).unwrap();
        assert_eq!(stats.rows_loaded, 20);
        assert_eq!(stats.rows_filtered, 2);

        let PanelStatus::Rendered {
            summary: Summary::Aggregate(income),
        } = panel(&sink, "Gross Income by Product Line and Branch")
        else {
            panic!("income panel not rendered");
        };
        assert_eq!(income.entries.len(), 2);
        let health_a = income
            .get(&GroupKey::from(&["Health and beauty", "A"][..]))
            .unwrap();
        assert!((health_a - 35.69).abs() < 1e-9);

        let markdown = crate::report::generate_markdown_report(
            &crate::models::DashboardReport {
                metadata: crate::models::ReportMetadata {
                    source: "sales_sample.csv".to_string(),
                    variant: Variant::Sales.to_string(),
                    generated_at: chrono::Utc::now(),
                    rows_loaded: stats.rows_loaded,
                    rows_filtered: stats.rows_filtered,
                    active_filters: request.filters.describe(),
                    duration_seconds: 0.0,
                },
                notices: Vec::new(),
                panels: sink.panels().to_vec(),
            },
            &crate::report::MarkdownOptions::default(),
        );
        assert!(markdown.starts_with("# Sales Dashboard"));
        assert!(markdown.contains("Sales by Branch"));
    }

    #[test]
    fn test_macro_fixture_latest_quarter() {
        let csv = include_str!("../../fixtures/macro_sample.csv");
        let dataset = crate::loader::read_dataset(csv.as_bytes(), Variant::Macro).unwrap();
        let mut config = crate::config::Config::default();
        config.general.variant = Variant::Macro;
        let request = config.dashboard_request();
        let mut sink = ReportSink::new();

        let stats = run_dashboard(&dataset, &request, &mut sink).unwrap();
        assert_eq!(stats.rows_filtered, 12);
        assert_eq!(stats.placeholders, 0);

        let PanelStatus::Rendered {
            summary: Summary::Metrics { metrics },
        } = panel(&sink, "Latest Quarter")
        else {
            panic!("metrics panel not rendered");
        };
        assert_eq!(metrics[0].period, "Q4 1952");
        assert_eq!(metrics[0].value, Some(1940.2));

        let PanelStatus::Rendered {
            summary: Summary::Aggregate(trend),
        } = panel(&sink, "GDP Trend")
        else {
            panic!("trend panel not rendered");
        };
        assert_eq!(trend.labels(), vec!["1950", "1951", "1952"]);
        let y1950 = trend.get(&GroupKey::single("1950")).unwrap();
        assert!((y1950 - 1686.55).abs() < 1e-9);
    }

    #[test]
    fn test_macro_without_components() {
        let schema = Schema::new(Variant::Macro.required_columns());
        let dataset = Dataset::new(schema, Vec::new());
        let request = DashboardRequest {
            variant: Variant::Macro,
            ..DashboardRequest::default()
        };
        let mut sink = ReportSink::new();

        let stats = run_dashboard(&dataset, &request, &mut sink).unwrap();
        assert_eq!(stats.placeholders, 2);
        let hint = PresentationHint::new("GDP Components by Year", crate::models::ChartKind::Area);
        assert!(sink.panels().iter().any(|p| p.hint == hint
            && matches!(p.status, PanelStatus::Placeholder { .. })));
    }
}
