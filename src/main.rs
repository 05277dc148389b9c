//! CLI entry point for the speed data extractor.
//!
//! Narrows RITIS speed exports to `tmc,tstamp,speed,cvalue` and splits each
//! route's narrowed file into one CSV per day; `delta` compares two of those days.

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use speed_extract::config::{ConfigFile, Overrides, PipelineConfig};
use speed_extract::delta::{DEFAULT_MIN_CVALUE, delta_path, write_route_delta};
use speed_extract::pipeline::{run, run_partition, run_projection};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "speed_extract")]
#[command(about = "Reformat RITIS speed exports into per-day CSV extracts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding the `<ROUTE>_data` folders (overrides SPEED_DATA_BASE_DIR)
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// JSON file supplying `routes` and/or `dates`
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Only process this route id (repeatable)
    #[arg(short, long = "route", global = true)]
    routes: Vec<String>,

    /// Extract this date, YYYY-MM-DD (repeatable)
    #[arg(short, long = "date", global = true, conflicts_with = "month")]
    dates: Vec<String>,

    /// Extract every day of this month, YYYY-MM
    #[arg(short, long, global = true)]
    month: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Project every route, then split each into daily files
    Run,
    /// Only narrow the raw exports to the four attributes of interest
    Project,
    /// Only split existing intermediate files into daily files
    Partition,
    /// Show the resolved route table and date list
    Routes,
    /// Write per-TMC, per-time-slot speed changes between two days of a route
    Delta {
        /// Route id, e.g. I93_NB
        route_id: String,
        /// Earlier day, YYYY-MM-DD
        first: String,
        /// Later day, YYYY-MM-DD
        last: String,

        /// Readings with a lower cvalue count as missing (0 disables the check)
        #[arg(long, default_value_t = DEFAULT_MIN_CVALUE)]
        min_cvalue: f64,

        /// Output CSV (default: `<prefix>delta_<first>_<last>.csv`)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Keep the guard alive so the file writer flushes on exit.
    let _file_guard = init_logging()?;

    let cli = Cli::parse();
    let config = build_config(&cli)?;

    match &cli.command {
        Commands::Run => {
            run(&config)?;
        }
        Commands::Project => {
            let reports = run_projection(&config)?;
            let rows: usize = reports.iter().map(|(_, r)| r.rows).sum();
            info!(routes = reports.len(), rows, "Projection finished");
        }
        Commands::Partition => {
            let summaries = run_partition(&config, &HashMap::new())?;
            info!(routes = summaries.len(), "Partitioning finished");
        }
        Commands::Routes => {
            for route in &config.routes {
                info!(
                    route = %route.id,
                    source = %route.source_path.display(),
                    intermediate = %route.intermediate_path.display(),
                    prefix = %route.output_prefix.display(),
                    "Route"
                );
            }
            info!(
                routes = config.routes.len(),
                dates = config.dates.len(),
                first = config.dates.first().map(String::as_str).unwrap_or(""),
                last = config.dates.last().map(String::as_str).unwrap_or(""),
                "Date list"
            );
        }
        Commands::Delta {
            route_id,
            first,
            last,
            min_cvalue,
            output,
        } => {
            let route = config
                .routes
                .iter()
                .find(|r| &r.id == route_id)
                .ok_or_else(|| anyhow!("unknown route `{route_id}`"))?;
            let destination = output
                .clone()
                .unwrap_or_else(|| delta_path(route, first, last));
            write_route_delta(route, first, last, *min_cvalue, &destination)?;
        }
    }

    Ok(())
}

/// Colored stderr output plus a JSON rolling log file.
///
/// The JSON log lands in `logs/` under the working directory, not next to the
/// speed data, so runs against a read-only share still log.
fn init_logging() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/speed_extract.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("speed_extract.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    Ok(file_guard)
}

/// Reads flags and environment; precedence lives in [`PipelineConfig::resolve`].
fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let file = match &cli.config {
        Some(path) => {
            info!(config = %path.display(), "Loading config file");
            Some(ConfigFile::load(path)?)
        }
        None => None,
    };

    PipelineConfig::resolve(Overrides {
        base_dir: cli.base_dir.clone(),
        env_base_dir: std::env::var("SPEED_DATA_BASE_DIR").ok(),
        file,
        month: cli.month.clone(),
        dates: cli.dates.clone(),
        routes: cli.routes.clone(),
    })
}
