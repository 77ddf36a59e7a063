//! Dashpipe - filter, aggregate and render tabular dashboards
//!
//! A CLI tool that loads a CSV dataset, narrows it with the dashboard
//! filters and renders every panel of the sales or macroeconomic
//! dashboard into a Markdown or JSON report.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (config, dataset, invalid filter, output failure)
//!   2 - Nothing rendered (every panel was a placeholder or empty)

mod cli;
mod config;
mod dashboard;
mod loader;
mod models;
mod pipeline;
mod report;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, DEFAULT_CONFIG_FILE};
use dashboard::run_dashboard;
use loader::LoadOptions;
use models::{DashboardReport, ReportMetadata};
use report::{MarkdownOptions, ReportSink};
use std::fmt::Display;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration first: it can turn on verbose logging
    let (mut config, origin) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(args.log_level(config.general.verbose));

    info!("Dashpipe v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    origin.log();

    match run(args, config) {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Dashboard failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .dashpipe.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to customize the dataset, filters and report options.");
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Progress lines for the user.
///
/// They go to stderr when the report itself is written to stdout.
struct Console {
    quiet: bool,
    to_stderr: bool,
}

impl Console {
    fn line(&self, message: impl Display) {
        if self.quiet {
            return;
        }
        if self.to_stderr {
            eprintln!("{}", message);
        } else {
            println!("{}", message);
        }
    }
}

/// Run the complete dashboard workflow. Returns exit code (0 or 2).
fn run(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    let output = PathBuf::from(&config.general.output);
    let console = Console {
        quiet: args.quiet,
        to_stderr: cli::is_stdout(&output),
    };

    let data_path = config.general.data.as_deref().map(PathBuf::from).ok_or_else(|| {
        anyhow!(
            "No dataset given. Use --data, DASHPIPE_DATA or `data` under [general] in {}",
            DEFAULT_CONFIG_FILE
        )
    })?;
    let variant = config.general.variant;

    // Step 1: Load the dataset
    console.line(format!("📥 Loading {} dataset: {}", variant, data_path.display()));
    let load_options = LoadOptions {
        show_progress: !args.quiet && !console.to_stderr,
    };
    let dataset = loader::load_dataset(&data_path, variant, &load_options)?;

    let request = config.dashboard_request();

    // Handle --dry-run: show schema and filters, then exit
    if args.dry_run {
        return handle_dry_run(&dataset, &request, &console);
    }

    // Step 2: Filter, aggregate and render every panel
    console.line(format!(
        "\n🔬 Building the {} dashboard ({} active filters)...",
        variant,
        request.filters.describe().len()
    ));
    for notice in &request.notices {
        console.line(format!("   ⚠️  {}", notice));
    }

    let mut sink = ReportSink::new();
    let stats = run_dashboard(&dataset, &request, &mut sink)
        .context("Dashboard filters do not match the dataset")?;
    let (panels, notices) = sink.into_parts();

    // Step 3: Build the report
    console.line("\n📝 Generating report...");

    let duration = start_time.elapsed().as_secs_f64();
    let metadata = ReportMetadata {
        source: data_path.display().to_string(),
        variant: variant.to_string(),
        generated_at: Utc::now(),
        rows_loaded: stats.rows_loaded,
        rows_filtered: stats.rows_filtered,
        active_filters: request.filters.describe(),
        duration_seconds: duration,
    };

    let report = DashboardReport {
        metadata,
        notices,
        panels,
    };

    let rendered = match config.general.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => {
            let options = MarkdownOptions {
                bar_width: config.report.bar_width,
                max_rows: config.report.max_rows,
            };
            report::generate_markdown_report(&report, &options)
        }
    };

    write_output(&output, &rendered)?;

    // Print summary
    console.line("\n📊 Dashboard Summary:");
    console.line(format!(
        "   Rows: {} loaded, {} after filters",
        stats.rows_loaded, stats.rows_filtered
    ));
    console.line(format!(
        "   Panels: {} rendered | {} placeholders | {} empty",
        report.rendered_count(),
        report.placeholder_count(),
        stats.rendered - report.rendered_count()
    ));
    console.line(format!("   Duration: {:.1}s", duration));
    if !cli::is_stdout(&output) {
        console.line(format!(
            "\n✅ Dashboard complete! Report saved to: {}",
            output.display()
        ));
    }

    if report.rendered_count() == 0 {
        eprintln!("\n⛔ No panel has anything to show with the current filters (exit code 2).");
        return Ok(2);
    }

    Ok(0)
}

/// Handle --dry-run: print the schema and the filters that would apply.
fn handle_dry_run(
    dataset: &models::Dataset,
    request: &dashboard::DashboardRequest,
    console: &Console,
) -> Result<i32> {
    console.line("\n🔍 Dry run: nothing is aggregated\n");
    console.line(loader::describe_schema(dataset));

    if request.filters.is_empty() {
        console.line("\n   No active filters.");
    } else {
        console.line("\n   Active filters:");
        for line in request.filters.describe() {
            console.line(format!("     {}", line));
        }
    }

    for notice in &request.notices {
        console.line(format!("   ⚠️  {}", notice));
    }

    if let Err(e) = request.filters.validate(&dataset.schema) {
        console.line(format!("\n   ❌ {}", e));
        return Ok(1);
    }

    let matched = pipeline::filter(dataset, &request.filters).len();
    console.line(format!("\n   {} of {} rows match.", matched, dataset.len()));
    console.line("\n✅ Dry run complete. No report was written.");
    Ok(0)
}

/// Write the rendered report to a file, or stdout for `-`.
fn write_output(path: &Path, content: &str) -> Result<()> {
    if cli::is_stdout(path) {
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(content.as_bytes())
            .context("Failed to write report to stdout")?;
        return stdout.flush().context("Failed to write report to stdout");
    }

    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

/// Where the configuration came from.
///
/// Logged once logging is set up, which happens after the config is read.
enum ConfigOrigin {
    File(PathBuf),
    Defaults,
    Unreadable(String),
}

impl ConfigOrigin {
    fn log(&self) {
        match self {
            ConfigOrigin::File(path) => info!("Loaded config from: {}", path.display()),
            ConfigOrigin::Defaults => debug!("No config file found, using defaults"),
            ConfigOrigin::Unreadable(e) => warn!("Failed to load config: {}", e),
        }
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<(Config, ConfigOrigin)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigOrigin::File(config_path.clone())));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok((config, ConfigOrigin::File(PathBuf::from(DEFAULT_CONFIG_FILE)))),
        Ok(None) => Ok((Config::default(), ConfigOrigin::Defaults)),
        Err(e) => Ok((
            Config::default(),
            ConfigOrigin::Unreadable(format!("{:#}", e)),
        )),
    }
}
