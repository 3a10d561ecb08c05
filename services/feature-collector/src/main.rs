//! Crop-type feature collector.
//!
//! Reads a feature query (YAML) and a directory of product stacks (JSON),
//! assembles the feature cube and prints a JSON summary of its bands.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crop_common::{TimeRange, WindowSpec};
use feature_cube::{CollectorConfig, CubeSummary, FeatureCollector, MemorySource, QueryConfig};

#[derive(Parser, Debug)]
#[command(name = "feature-collector")]
#[command(about = "Assemble a crop-type feature cube from satellite products")]
struct Args {
    /// Query file path
    #[arg(short, long, env = "FEATURE_QUERY")]
    query: PathBuf,

    /// Directory of `<product>.json` stacks
    #[arg(short, long, env = "CATALOG_DIR")]
    catalog: PathBuf,

    /// Write the summary here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Comma separated bands that must be present in the cube
    #[arg(long, value_delimiter = ',')]
    require: Vec<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// What gets printed: the query's time windows and the cube overview.
#[derive(Debug, Serialize)]
struct Report {
    query: QueryEcho,
    cube: CubeSummary,
}

#[derive(Debug, Serialize)]
struct QueryEcho {
    annual_windows: Vec<String>,
    semiannual_windows: Vec<String>,
    monthly_range: TimeRange,
    fc_windows: Vec<String>,
    fc_reducer: String,
}

fn labels(spec: &WindowSpec) -> Vec<String> {
    spec.labels().map(String::from).collect()
}

impl QueryEcho {
    fn from_query(query: &QueryConfig) -> Self {
        Self {
            annual_windows: labels(&query.annual_geomedian_times),
            semiannual_windows: labels(&query.semiannual_geomedian_times),
            monthly_range: query.monthly_ndvi_time_range,
            fc_windows: labels(&query.ls_fc_cover_times),
            fc_reducer: query.fc_reducer.name().to_string(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing; stdout is reserved for the report
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting feature collector");

    let report = run(&args).await?;
    let json = serde_json::to_string_pretty(&report)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("writing report to {}", path.display()))?;
            info!(path = %path.display(), "Wrote report");
        }
        None => println!("{}", json),
    }

    Ok(())
}

async fn run(args: &Args) -> Result<Report> {
    let query = load_query(&args.query)?;
    let config = CollectorConfig::from_env();
    info!(
        annual = query.annual_geomedian_times.len(),
        semiannual = query.semiannual_geomedian_times.len(),
        fc = query.ls_fc_cover_times.len(),
        tolerance_secs = config.mask_match_tolerance_secs,
        "Loaded configuration"
    );

    let source = MemorySource::from_dir(&args.catalog)
        .with_context(|| format!("reading catalogue {}", args.catalog.display()))?;
    info!(products = ?source.products(), "Catalogue ready");

    let collector = FeatureCollector::from_query(&query, &config)?;
    let cube = collector.collect(Arc::new(source)).await?;

    if !args.require.is_empty() {
        cube.require_bands(&args.require)?;
    }

    Ok(Report {
        query: QueryEcho::from_query(&query),
        cube: cube.summary(),
    })
}

fn load_query(path: &Path) -> Result<QueryConfig> {
    QueryConfig::from_yaml_file(path).with_context(|| format!("loading query {}", path.display()))
}
