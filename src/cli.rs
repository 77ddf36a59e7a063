//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation of filter expressions.

use crate::dashboard::Variant;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Dashpipe - filter, aggregate and render tabular dashboards
///
/// Loads a CSV dataset, applies the dashboard filters and writes every
/// panel of the sales or macroeconomic dashboard as a Markdown or JSON
/// report.
///
/// Examples:
///   dashpipe --data supermarket_sales.csv
///   dashpipe --data supermarket_sales.csv --select Branch=A,C --select "Payment=Cash,Ewallet"
///   dashpipe --data supermarket_sales.csv --date-from 01/01/2019 --date-to 31/03/2019
///   dashpipe --variant macro --data USMacroG_v2.csv --range Year=1960..1990 --format json
///   dashpipe --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// CSV dataset to load
    ///
    /// Can also be set via DASHPIPE_DATA env var or .dashpipe.toml config.
    #[arg(short, long, value_name = "FILE", env = "DASHPIPE_DATA")]
    pub data: Option<PathBuf>,

    /// Dashboard to build (sales, macro)
    #[arg(long, value_name = "VARIANT")]
    pub variant: Option<Variant>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .dashpipe.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output file path for the report ("-" for stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Restrict a column to the listed values (repeatable)
    ///
    /// Example: --select "Product line=Health and beauty,Sports and travel".
    /// An empty list (--select Branch=) selects nothing.
    #[arg(short, long, value_name = "DIM=A,B", value_parser = parse_selection)]
    pub select: Vec<Selection>,

    /// Restrict a numeric column to an inclusive range (repeatable)
    ///
    /// Example: --range Rating=4..10
    #[arg(short, long, value_name = "DIM=MIN..MAX", value_parser = parse_range)]
    pub range: Vec<RangeArg>,

    /// Earliest date to include (dd/mm/yyyy)
    #[arg(long, value_name = "DATE")]
    pub date_from: Option<String>,

    /// Latest date to include (dd/mm/yyyy)
    #[arg(long, value_name = "DATE")]
    pub date_to: Option<String>,

    /// GDP components for the macro composition panels (comma-separated)
    ///
    /// Example: --components consumption,invest,government
    #[arg(long, value_name = "COLUMNS", value_delimiter = ',')]
    pub components: Option<Vec<String>>,

    /// Number of histogram bins
    #[arg(long, value_name = "COUNT")]
    pub bins: Option<usize>,

    /// Ignore the default and configured filters
    ///
    /// Only filters and components given on the command line apply.
    #[arg(long)]
    pub no_default_filters: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Dry run: load the dataset and show the schema and filters
    ///
    /// Nothing is aggregated and no report is written.
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .dashpipe.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// A `--select DIM=A,B` argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub dimension: String,
    pub values: Vec<String>,
}

/// A `--range DIM=MIN..MAX` argument.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeArg {
    pub dimension: String,
    pub min: f64,
    pub max: f64,
}

fn split_assignment(s: &str) -> Result<(String, &str), String> {
    let (dimension, rest) = s
        .split_once('=')
        .ok_or_else(|| format!("expected DIM=..., got '{}'", s))?;
    let dimension = dimension.trim();
    if dimension.is_empty() {
        return Err(format!("missing column name in '{}'", s));
    }
    Ok((dimension.to_string(), rest))
}

/// Parse `DIM=A,B`. Blank items are dropped, so `DIM=` is an empty selection.
pub fn parse_selection(s: &str) -> Result<Selection, String> {
    let (dimension, rest) = split_assignment(s)?;
    let values = rest
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect();
    Ok(Selection { dimension, values })
}

/// Parse `DIM=MIN..MAX`.
pub fn parse_range(s: &str) -> Result<RangeArg, String> {
    let (dimension, rest) = split_assignment(s)?;
    let (min, max) = rest
        .split_once("..")
        .ok_or_else(|| format!("expected MIN..MAX, got '{}'", rest))?;
    let bound = |b: &str| {
        b.trim()
            .parse::<f64>()
            .map_err(|_| format!("'{}' is not a number", b.trim()))
    };
    let (min, max) = (bound(min)?, bound(max)?);
    if min > max {
        return Err(format!("range minimum {} exceeds maximum {}", min, max));
    }
    Ok(RangeArg {
        dimension,
        min,
        max,
    })
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(bins) = self.bins {
            if bins == 0 {
                return Err("Bins must be at least 1".to_string());
            }
        }

        // The same column twice is almost certainly a typo
        for (i, selection) in self.select.iter().enumerate() {
            if self.select[..i]
                .iter()
                .any(|s| s.dimension == selection.dimension)
            {
                return Err(format!(
                    "Column '{}' is selected more than once",
                    selection.dimension
                ));
            }
        }
        for (i, range) in self.range.iter().enumerate() {
            if self.range[..i]
                .iter()
                .any(|r| r.dimension == range.dimension)
            {
                return Err(format!(
                    "Column '{}' has more than one --range",
                    range.dimension
                ));
            }
            if self.select.iter().any(|s| s.dimension == range.dimension) {
                return Err(format!(
                    "Column '{}' cannot take both --select and --range",
                    range.dimension
                ));
            }
        }

        // Validate dataset path if provided
        if let Some(ref data) = self.data {
            if !data.exists() {
                return Err(format!("Dataset does not exist: {}", data.display()));
            }
            if !data.is_file() {
                return Err(format!("Dataset is not a file: {}", data.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `configured_verbose` is the `verbose` flag of the config file;
    /// `--quiet` still wins over it.
    pub fn log_level(&self, configured_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || configured_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

/// Whether an output path means standard output.
pub fn is_stdout(path: &Path) -> bool {
    path.as_os_str() == "-"
}
