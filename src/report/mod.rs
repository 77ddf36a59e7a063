//! Report rendering.
//!
//! The pipeline hands summaries to a [`ChartSink`]; [`ReportSink`] collects
//! them into a [`crate::models::DashboardReport`] which the generators turn
//! into Markdown or JSON.

pub mod generator;
pub mod sink;

pub use generator::{generate_json_report, generate_markdown_report, MarkdownOptions};
pub use sink::{ChartSink, ReportSink};
