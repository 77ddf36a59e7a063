//! Markdown and JSON report generation.
//!
//! Labels and values are printed in the order and magnitude the pipeline
//! produced them; percentages and bars are derived for display only.

use crate::models::{
    format_number, AggregateResult, ChartKind, DashboardReport, Histogram, Metric, PanelReport,
    PanelStatus, ReportMetadata, ScatterSet, SeriesSet, Summary,
};
use anyhow::Result;

/// Layout options for Markdown output.
#[derive(Debug, Clone)]
pub struct MarkdownOptions {
    /// Width in characters of the longest bar.
    pub bar_width: usize,
    /// Maximum number of table rows for scatter point listings.
    pub max_rows: usize,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            bar_width: 30,
            max_rows: 10,
        }
    }
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &DashboardReport, options: &MarkdownOptions) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "# {} Dashboard\n\n",
        capitalize(&report.metadata.variant)
    ));
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_notices_section(&report.notices));
    output.push_str(&generate_table_of_contents(&report.panels));

    for panel in &report.panels {
        output.push_str(&generate_panel_section(panel, options));
    }

    output.push_str(&generate_footer(&report.metadata));
    output
}

/// Generate a JSON report.
pub fn generate_json_report(report: &DashboardReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn anchor(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            'a'..='z' | '0'..='9' | '-' | '_' => Some(c),
            ' ' => Some('-'),
            _ => None,
        })
        .collect()
}

/// Display form of a reduced value.
fn format_value(v: f64) -> String {
    if v.fract() == 0.0 {
        format_number(v)
    } else {
        format!("{:.2}", v)
    }
}

fn bar(value: f64, max: f64, width: usize) -> String {
    if max <= 0.0 || value <= 0.0 {
        return String::new();
    }
    let len = ((value / max) * width as f64).round() as usize;
    "█".repeat(len.max(1))
}

fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Source:** `{}`\n", metadata.source));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Rows:** {} of {} after filtering\n",
        metadata.rows_filtered, metadata.rows_loaded
    ));
    if metadata.active_filters.is_empty() {
        section.push_str("- **Filters:** none\n");
    } else {
        section.push_str("- **Filters:**\n");
        for filter in &metadata.active_filters {
            section.push_str(&format!("  - {}\n", filter));
        }
    }
    section.push_str(&format!(
        "- **Duration:** {:.3}s\n\n",
        metadata.duration_seconds
    ));

    section
}

fn generate_notices_section(notices: &[String]) -> String {
    if notices.is_empty() {
        return String::new();
    }

    let mut section = String::from("## Notices\n\n");
    for notice in notices {
        section.push_str(&format!("> ⚠️ {}\n", notice));
    }
    section.push('\n');
    section
}

fn generate_table_of_contents(panels: &[PanelReport]) -> String {
    let mut toc = String::from("## Panels\n\n");
    for panel in panels {
        toc.push_str(&format!(
            "- [{}](#{})\n",
            panel.hint.title,
            anchor(&panel.hint.title)
        ));
    }
    toc.push('\n');
    toc
}

fn generate_panel_section(panel: &PanelReport, options: &MarkdownOptions) -> String {
    let mut section = String::new();
    let hint = &panel.hint;

    section.push_str(&format!("## {}\n\n", hint.title));

    let mut caption = format!("*{} chart", hint.chart);
    if let (Some(x), Some(y)) = (&hint.x_label, &hint.y_label) {
        caption.push_str(&format!(" | x: {} | y: {}", x, y));
    }
    caption.push_str("*\n\n");
    section.push_str(&caption);

    match &panel.status {
        PanelStatus::Placeholder { message, .. } => {
            section.push_str(&format!("> ℹ️ {}\n\n", message));
        }
        PanelStatus::Rendered { summary } if summary.is_empty() => {
            section.push_str("_No rows match the current filters._\n\n");
        }
        PanelStatus::Rendered { summary } => {
            section.push_str(&generate_summary(hint.chart, summary, options));
        }
    }

    section
}

fn generate_summary(chart: ChartKind, summary: &Summary, options: &MarkdownOptions) -> String {
    match summary {
        Summary::Aggregate(result)
            if chart == ChartKind::StackedBar && result.dimensions.len() == 2 =>
        {
            generate_cross_tab(result)
        }
        Summary::Aggregate(result) => generate_aggregate_table(result, chart, options),
        Summary::Series(set) => generate_series_table(set),
        Summary::Histogram(hist) => generate_histogram_table(hist, options),
        Summary::Scatter(set) => generate_scatter_summary(set, options),
        Summary::Metrics { metrics } => generate_metrics_list(metrics),
    }
}

/// Label/value table; pie charts also get each group's share.
fn generate_aggregate_table(
    result: &AggregateResult,
    chart: ChartKind,
    options: &MarkdownOptions,
) -> String {
    let mut table = String::new();
    let total = result.total();
    let max = result.entries.iter().map(|(_, v)| *v).fold(0.0, f64::max);
    let with_share = chart == ChartKind::Pie && total > 0.0;

    let header = format!("{} ({})", result.value_label, result.op);
    if with_share {
        table.push_str(&format!(
            "| {} | {} | Share | |\n|:---|---:|---:|:---|\n",
            result.dimensions.join(" / "),
            header
        ));
    } else {
        table.push_str(&format!(
            "| {} | {} | |\n|:---|---:|:---|\n",
            result.dimensions.join(" / "),
            header
        ));
    }

    for (key, value) in &result.entries {
        let drawn = bar(*value, max, options.bar_width);
        if with_share {
            table.push_str(&format!(
                "| {} | {} | {:.1}% | {} |\n",
                key.label(),
                format_value(*value),
                value / total * 100.0,
                drawn
            ));
        } else {
            table.push_str(&format!(
                "| {} | {} | {} |\n",
                key.label(),
                format_value(*value),
                drawn
            ));
        }
    }

    table.push('\n');
    table
}

/// Two-dimensional result laid out as rows × columns with row totals.
fn generate_cross_tab(result: &AggregateResult) -> String {
    let mut rows: Vec<&str> = Vec::new();
    let mut cols: Vec<&str> = Vec::new();
    for (key, _) in &result.entries {
        if let [row, col] = key.0.as_slice() {
            if !rows.contains(&row.as_str()) {
                rows.push(row.as_str());
            }
            if !cols.contains(&col.as_str()) {
                cols.push(col.as_str());
            }
        }
    }

    let lookup = |row: &str, col: &str| {
        result
            .entries
            .iter()
            .find(|(k, _)| k.0.len() == 2 && k.0[0] == row && k.0[1] == col)
            .map(|(_, v)| *v)
    };

    let mut table = format!("| {} \\ {} |", result.dimensions[0], result.dimensions[1]);
    for col in &cols {
        table.push_str(&format!(" {} |", col));
    }
    table.push_str(" Total |\n|:---|");
    table.push_str(&"---:|".repeat(cols.len() + 1));
    table.push('\n');

    for row in &rows {
        table.push_str(&format!("| {} |", row));
        let mut total = 0.0;
        for col in &cols {
            match lookup(*row, *col) {
                Some(v) => {
                    total += v;
                    table.push_str(&format!(" {} |", format_value(v)));
                }
                None => table.push_str(" – |"),
            }
        }
        table.push_str(&format!(" **{}** |\n", format_value(total)));
    }

    table.push_str(&format!(
        "\n*{} ({}) by {}*\n\n",
        result.value_label,
        result.op,
        result.dimensions.join(" and ")
    ));
    table
}

/// One row per group, one column per series.
fn generate_series_table(set: &SeriesSet) -> String {
    let mut keys = Vec::new();
    for series in &set.series {
        for (key, _) in &series.entries {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
    }

    let mut table = format!("| {} |", set.group_dim);
    for series in &set.series {
        table.push_str(&format!(" {} ({}) |", series.value_label, series.op));
    }
    table.push_str("\n|:---|");
    table.push_str(&"---:|".repeat(set.series.len()));
    table.push('\n');

    for key in &keys {
        table.push_str(&format!("| {} |", key.label()));
        for series in &set.series {
            match series.get(key) {
                Some(v) => table.push_str(&format!(" {} |", format_value(v))),
                None => table.push_str(" – |"),
            }
        }
        table.push('\n');
    }

    table.push('\n');
    table
}

fn generate_histogram_table(hist: &Histogram, options: &MarkdownOptions) -> String {
    let max = hist.bins.iter().map(|b| b.count).max().unwrap_or(0) as f64;
    let with_density = hist.density.is_some();

    let mut table = format!("| {} | Count |", hist.dimension);
    if with_density {
        table.push_str(" Density |");
    }
    table.push_str(" |\n|:---|---:|");
    if with_density {
        table.push_str("---:|");
    }
    table.push_str(":---|\n");

    for (i, bin) in hist.bins.iter().enumerate() {
        let close = if i + 1 == hist.bins.len() { "]" } else { ")" };
        table.push_str(&format!(
            "| [{:.2}, {:.2}{} | {} |",
            bin.lower, bin.upper, close, bin.count
        ));
        if let Some(density) = &hist.density {
            table.push_str(&format!(" {:.2} |", density[i]));
        }
        table.push_str(&format!(
            " {} |\n",
            bar(bin.count as f64, max, options.bar_width)
        ));
    }

    if let Some(mean) = hist.mean {
        table.push_str(&format!("\n**Mean:** {:.2}\n", mean));
    }
    table.push('\n');
    table
}

fn range_of(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

fn generate_scatter_summary(set: &ScatterSet, options: &MarkdownOptions) -> String {
    let mut section = String::new();

    section.push_str(&format!("- **Points:** {}\n", set.points.len()));
    if let Some((lo, hi)) = range_of(set.points.iter().map(|p| p.x)) {
        section.push_str(&format!("- **{} range:** {:.2} – {:.2}\n", set.x, lo, hi));
    }
    if let Some((lo, hi)) = range_of(set.points.iter().map(|p| p.y)) {
        section.push_str(&format!("- **{} range:** {:.2} – {:.2}\n", set.y, lo, hi));
    }
    if let Some(z) = &set.z {
        if let Some((lo, hi)) = range_of(set.points.iter().filter_map(|p| p.z)) {
            section.push_str(&format!("- **{} range:** {:.2} – {:.2}\n", z, lo, hi));
        }
    }
    if let Some(color) = &set.color {
        section.push_str(&format!("- **Coloured by:** {}\n", color));
    }
    match set.correlation {
        Some(r) => section.push_str(&format!(
            "- **Correlation ({} vs {}):** {:.3}\n",
            set.x, set.y, r
        )),
        None => section.push_str("- **Correlation:** n/a\n"),
    }
    section.push('\n');

    let shown = set.points.len().min(options.max_rows);
    if shown > 0 {
        section.push_str(&format!("| {} | {} |", set.x, set.y));
        if let Some(z) = &set.z {
            section.push_str(&format!(" {} |", z));
        }
        section.push_str("\n|---:|---:|");
        if set.z.is_some() {
            section.push_str("---:|");
        }
        section.push('\n');

        for point in &set.points[..shown] {
            section.push_str(&format!(
                "| {} | {} |",
                format_value(point.x),
                format_value(point.y)
            ));
            if let Some(z) = point.z {
                section.push_str(&format!(" {} |", format_value(z)));
            }
            section.push('\n');
        }

        if shown < set.points.len() {
            section.push_str(&format!(
                "\n*Showing {} of {} points.*\n",
                shown,
                set.points.len()
            ));
        }
        section.push('\n');
    }

    section
}

fn generate_metrics_list(metrics: &[Metric]) -> String {
    let mut section = String::new();

    if let Some(first) = metrics.first() {
        section.push_str(&format!("**Period:** {}\n\n", first.period));
    }

    section.push_str("| Metric | Value |\n|:---|---:|\n");
    for metric in metrics {
        let value = match metric.value {
            Some(v) if metric.unit == "%" => format!("{:.1}%", v),
            Some(v) => format!("{:.1} {}", v, metric.unit),
            None => "n/a".to_string(),
        };
        section.push_str(&format!("| {} | {} |\n", metric.label, value));
    }
    section.push('\n');
    section
}

fn generate_footer(metadata: &ReportMetadata) -> String {
    format!(
        "---\n\n*Generated by dashpipe v{} | Data: {}*\n",
        env!("CARGO_PKG_VERSION"),
        metadata.source
    )
}
