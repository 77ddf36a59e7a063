//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.dashpipe.toml` files, and turns the merged settings into a
//! [`DashboardRequest`].

use crate::cli::OutputFormat;
use crate::dashboard::{DashboardRequest, Variant};
use crate::pipeline::{apply_date_text, FilterSpec};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

/// Name of the configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".dashpipe.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Filter settings, per dashboard.
    #[serde(default)]
    pub filters: FiltersConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Dataset to load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    /// Dashboard to build.
    #[serde(default)]
    pub variant: Variant,

    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Report format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data: None,
            variant: Variant::default(),
            output: default_output(),
            format: OutputFormat::default(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "dashboard_report.md".to_string()
}

/// Filters for each dashboard variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiltersConfig {
    #[serde(default = "default_sales_filters")]
    pub sales: FilterConfig,

    #[serde(rename = "macro", default = "default_macro_filters")]
    pub macroeconomic: FilterConfig,
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            sales: default_sales_filters(),
            macroeconomic: default_macro_filters(),
        }
    }
}

impl FiltersConfig {
    pub fn for_variant(&self, variant: Variant) -> &FilterConfig {
        match variant {
            Variant::Sales => &self.sales,
            Variant::Macro => &self.macroeconomic,
        }
    }

    pub fn for_variant_mut(&mut self, variant: Variant) -> &mut FilterConfig {
        match variant {
            Variant::Sales => &mut self.sales,
            Variant::Macro => &mut self.macroeconomic,
        }
    }
}

/// Filter settings of one dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Accepted values per categorical column. An empty list selects nothing.
    #[serde(default)]
    pub select: BTreeMap<String, Vec<String>>,

    /// Inclusive `[min, max]` per numeric column.
    #[serde(default)]
    pub range: BTreeMap<String, [f64; 2]>,

    /// Earliest date, dd/mm/yyyy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<String>,

    /// Latest date, dd/mm/yyyy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<String>,

    /// GDP components for the composition panels.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn default_sales_filters() -> FilterConfig {
    let mut select = BTreeMap::new();
    select.insert("Branch".to_string(), strings(&["A", "B"]));
    select.insert(
        "Product line".to_string(),
        strings(&["Health and beauty", "Electronic accessories"]),
    );
    select.insert("Payment".to_string(), strings(&["Cash"]));

    let mut range = BTreeMap::new();
    range.insert("Rating".to_string(), [1.0, 10.0]);

    FilterConfig {
        select,
        range,
        ..FilterConfig::default()
    }
}

fn default_macro_filters() -> FilterConfig {
    let mut range = BTreeMap::new();
    range.insert("Year".to_string(), [1950.0, 2000.0]);

    FilterConfig {
        range,
        components: strings(&["consumption", "invest"]),
        ..FilterConfig::default()
    }
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Histogram bins; the dashboard default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub histogram_bins: Option<usize>,

    /// Width of the text bars in Markdown tables.
    #[serde(default = "default_bar_width")]
    pub bar_width: usize,

    /// Maximum rows listed per scatter panel.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            histogram_bins: None,
            bar_width: default_bar_width(),
            max_rows: default_max_rows(),
        }
    }
}

fn default_bar_width() -> usize {
    30
}

fn default_max_rows() -> usize {
    10
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref data) = args.data {
            self.general.data = Some(data.display().to_string());
        }
        if let Some(variant) = args.variant {
            self.general.variant = variant;
        }
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if let Some(format) = args.format {
            self.general.format = format;
        }
        if args.verbose {
            self.general.verbose = true;
        }
        if let Some(bins) = args.bins {
            self.report.histogram_bins = Some(bins);
        }

        // Filters of the dashboard that will actually run
        let filters = self.filters.for_variant_mut(self.general.variant);
        if args.no_default_filters {
            *filters = FilterConfig::default();
        }
        // A CLI filter replaces whatever the file set on the same column
        for selection in &args.select {
            filters.range.remove(&selection.dimension);
            filters
                .select
                .insert(selection.dimension.clone(), selection.values.clone());
        }
        for range in &args.range {
            filters.select.remove(&range.dimension);
            filters
                .range
                .insert(range.dimension.clone(), [range.min, range.max]);
        }
        if args.date_from.is_some() {
            filters.date_from = args.date_from.clone();
        }
        if args.date_to.is_some() {
            filters.date_to = args.date_to.clone();
        }
        if let Some(ref components) = args.components {
            filters.components = components
                .iter()
                .map(|c| c.trim())
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect();
        }
    }

    /// Build the request for the configured dashboard.
    ///
    /// Problems that leave a filter inactive become notices on the request
    /// rather than errors.
    pub fn dashboard_request(&self) -> DashboardRequest {
        let variant = self.general.variant;
        let settings = self.filters.for_variant(variant);
        let mut filters = FilterSpec::new();
        let mut notices = Vec::new();

        for (dimension, values) in &settings.select {
            filters = filters.select(dimension, values);
        }

        for (dimension, [min, max]) in &settings.range {
            if filters.selection(dimension).is_some() {
                let notice = format!(
                    "{} has both a selection and a range; the range was ignored",
                    dimension
                );
                warn!("{}", notice);
                notices.push(notice);
                continue;
            }
            if min > max {
                let notice = format!(
                    "Range for {} is empty ({} > {}); the filter was ignored",
                    dimension, min, max
                );
                warn!("{}", notice);
                notices.push(notice);
                continue;
            }
            filters = filters.range(dimension, *min, *max);
        }

        if settings.date_from.is_some() || settings.date_to.is_some() {
            match variant.date_column() {
                Some(column) => {
                    let errors = apply_date_text(
                        &mut filters,
                        column,
                        settings.date_from.as_deref(),
                        settings.date_to.as_deref(),
                    );
                    notices.extend(
                        errors
                            .into_iter()
                            .map(|e| format!("Date filter ignored: {}", e)),
                    );
                }
                None => {
                    let notice = format!(
                        "The {} dashboard has no date column; the date filter was ignored",
                        variant
                    );
                    warn!("{}", notice);
                    notices.push(notice);
                }
            }
        }

        DashboardRequest {
            variant,
            filters,
            components: settings.components.clone(),
            bins: self.report.histogram_bins,
            notices,
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{parse_range, parse_selection, Args};
    use crate::pipeline::Constraint;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    fn make_args() -> Args {
        Args {
            data: None,
            variant: None,
            config: None,
            output: None,
            format: None,
            select: Vec::new(),
            range: Vec::new(),
            date_from: None,
            date_to: None,
            components: None,
            bins: None,
            no_default_filters: false,
            verbose: false,
            quiet: false,
            dry_run: false,
            init_config: false,
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.variant, Variant::Sales);
        assert_eq!(config.general.output, "dashboard_report.md");
        assert_eq!(config.filters.sales.select["Branch"], vec!["A", "B"]);
        assert_eq!(config.filters.sales.range["Rating"], [1.0, 10.0]);
        assert_eq!(
            config.filters.macroeconomic.components,
            vec!["consumption", "invest"]
        );
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
data = "USMacroG_v2.csv"
variant = "macro"
format = "json"
verbose = true

[filters.macro]
range = { Year = [1970.0, 1980.0] }
components = ["government"]

[report]
histogram_bins = 8
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.data.as_deref(), Some("USMacroG_v2.csv"));
        assert_eq!(config.general.variant, Variant::Macro);
        assert_eq!(config.general.format, OutputFormat::Json);
        assert!(config.general.verbose);
        assert_eq!(make_args().log_level(config.general.verbose), tracing::Level::DEBUG);
        assert_eq!(config.general.output, "dashboard_report.md");
        assert_eq!(config.filters.macroeconomic.range["Year"], [1970.0, 1980.0]);
        assert_eq!(config.filters.macroeconomic.components, vec!["government"]);
        // Untouched tables keep their defaults
        assert_eq!(config.filters.sales, default_sales_filters());
        assert_eq!(config.report.histogram_bins, Some(8));
        assert_eq!(config.report.bar_width, 30);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[filters.sales.select]\nGender = [\"Female\"]").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.filters.sales.select.len(), 1);
        assert_eq!(config.filters.sales.select["Gender"], vec!["Female"]);
        // A table that is present replaces the defaults entirely
        assert!(config.filters.sales.range.is_empty());
    }

    #[test]
    fn test_load_invalid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[general\nvariant = ").unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[report]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.filters.sales, default_sales_filters());
        assert_eq!(parsed.filters.macroeconomic, default_macro_filters());
    }

    #[test]
    fn test_merge_overrides_active_variant() {
        let mut config = Config::default();
        let mut args = make_args();
        args.variant = Some(Variant::Macro);
        args.data = Some(PathBuf::from("macro.csv"));
        args.range = vec![parse_range("Year=1960..1970").unwrap()];
        args.components = Some(vec!["government".to_string(), " ".to_string()]);
        args.bins = Some(5);

        config.merge_with_args(&args);

        assert_eq!(config.general.variant, Variant::Macro);
        assert_eq!(config.general.data.as_deref(), Some("macro.csv"));
        assert_eq!(config.filters.macroeconomic.range["Year"], [1960.0, 1970.0]);
        assert_eq!(config.filters.macroeconomic.components, vec!["government"]);
        assert_eq!(config.report.histogram_bins, Some(5));
        // Sales filters untouched
        assert_eq!(config.filters.sales, default_sales_filters());
    }

    #[test]
    fn test_merge_without_default_filters() {
        let mut config = Config::default();
        let mut args = make_args();
        args.no_default_filters = true;
        args.select = vec![parse_selection("Gender=Male").unwrap()];

        config.merge_with_args(&args);

        let sales = &config.filters.sales;
        assert_eq!(sales.select.len(), 1);
        assert!(sales.range.is_empty());
    }

    #[test]
    fn test_merge_without_default_filters_clears_components() {
        let mut config = Config::default();
        let mut args = make_args();
        args.variant = Some(Variant::Macro);
        args.no_default_filters = true;

        config.merge_with_args(&args);

        let request = config.dashboard_request();
        assert!(request.components.is_empty());
        assert!(request.filters.is_empty());
        // Explicit components still apply
        args.components = Some(vec!["government".to_string()]);
        config.merge_with_args(&args);
        assert_eq!(config.filters.macroeconomic.components, vec!["government"]);
    }

    #[test]
    fn test_cli_selection_replaces_configured_range() {
        let mut config = Config::default();
        let mut args = make_args();
        args.select = vec![parse_selection("Rating=9").unwrap()];

        config.merge_with_args(&args);
        let request = config.dashboard_request();

        assert!(request.notices.is_empty());
        assert!(matches!(
            request.filters.get("Rating"),
            Some(Constraint::OneOf(_))
        ));
        assert!(!config.filters.sales.range.contains_key("Rating"));
    }

    #[test]
    fn test_cli_range_replaces_configured_selection() {
        let mut config = Config::default();
        let mut args = make_args();
        args.range = vec![parse_range("Branch=1..2").unwrap()];

        config.merge_with_args(&args);

        assert!(!config.filters.sales.select.contains_key("Branch"));
        assert_eq!(config.filters.sales.range["Branch"], [1.0, 2.0]);
    }

    #[test]
    fn test_request_selection_and_range_on_same_column() {
        let mut config = Config::default();
        config
            .filters
            .sales
            .select
            .insert("Rating".to_string(), strings(&["9"]));

        let request = config.dashboard_request();
        assert_eq!(request.notices.len(), 1);
        assert!(request.notices[0].contains("Rating"));
        assert!(request.filters.selection("Rating").is_some());
    }

    #[test]
    fn test_request_from_defaults() {
        let request = Config::default().dashboard_request();
        assert_eq!(request.variant, Variant::Sales);
        assert!(request.notices.is_empty());
        assert_eq!(
            request.filters.describe(),
            vec![
                "Branch: A, B",
                "Payment: Cash",
                "Product line: Electronic accessories, Health and beauty",
                "Rating: 1 to 10",
            ]
        );
    }

    #[test]
    fn test_request_with_invalid_date() {
        let mut config = Config::default();
        config.filters.sales.date_from = Some("31/02/2020".to_string());
        config.filters.sales.date_to = Some("31/03/2019".to_string());

        let request = config.dashboard_request();
        assert_eq!(request.notices.len(), 1);
        assert!(request.notices[0].contains("31/02/2020"));
        // The valid bound still applies
        assert!(matches!(
            request.filters.get("Date"),
            Some(Constraint::DateRange { from: None, to: Some(_) })
        ));
    }

    #[test]
    fn test_request_date_on_macro_is_ignored() {
        let mut config = Config::default();
        config.general.variant = Variant::Macro;
        config.filters.macroeconomic.date_from = Some("01/01/1990".to_string());

        let request = config.dashboard_request();
        assert_eq!(request.notices.len(), 1);
        assert!(request.filters.get("Date").is_none());
        assert_eq!(request.components, vec!["consumption", "invest"]);
    }

    #[test]
    fn test_request_inverted_range_is_ignored() {
        let mut config = Config::default();
        config.filters.sales.range.insert("Rating".to_string(), [9.0, 2.0]);

        let request = config.dashboard_request();
        assert_eq!(request.notices.len(), 1);
        assert!(request.filters.get("Rating").is_none());
    }
}
