use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use corridor_screen::config::AnalysisConfig;
use corridor_screen::dispatch::{AnalysisContext, CancelToken, analyze_with_context};
use corridor_screen::index::ReferenceLayer;
use corridor_screen::layers::{load_drawn_geometry, load_layer, read_feature_collection};
use corridor_screen::optimize::{LayerStats, optimize_collection};
use corridor_screen::output::{summary_lines, to_geojson};

#[derive(Parser)]
#[command(about = "Screen a drawn route or site against reference GIS layers")]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every configured dataset against a drawn geometry
    Analyze {
        /// GeoJSON file with the drawn point or line
        #[arg(long)]
        drawn: PathBuf,

        /// Dataset configuration (JSON)
        #[arg(long)]
        config: PathBuf,

        /// Write results JSON here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// Also write matched features as GeoJSON
        #[arg(long)]
        geojson: Option<PathBuf>,

        /// Cache directory for remote layers
        #[arg(long, default_value = ".cache")]
        cache_dir: PathBuf,

        /// Analyse datasets in parallel
        #[arg(long)]
        parallel: bool,
    },

    /// Report size and complexity of a GeoJSON layer
    Stats { input: PathBuf },

    /// Simplify and round a GeoJSON layer
    Optimize {
        input: PathBuf,
        output: PathBuf,

        /// Simplification tolerance in degrees (0.0001 is about 36 ft)
        #[arg(long, default_value_t = 0.0001)]
        tolerance: f64,

        /// Coordinate decimal places (6 is about 4 in)
        #[arg(long, default_value_t = 6)]
        precision: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Analyze {
            drawn,
            config,
            output,
            geojson,
            cache_dir,
            parallel,
        } => analyze(&drawn, &config, output, geojson, &cache_dir, parallel, cli.quiet),
        Command::Stats { input } => {
            let fc = read_feature_collection(&input)?;
            eprintln!("{}", input.display());
            println!("{}", LayerStats::from_collection(&fc));
            Ok(())
        }
        Command::Optimize {
            input,
            output,
            tolerance,
            precision,
        } => optimize(&input, &output, tolerance, precision),
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn analyze(
    drawn: &Path,
    config_path: &Path,
    output: Option<PathBuf>,
    geojson: Option<PathBuf>,
    cache_dir: &Path,
    parallel: bool,
    quiet: bool,
) -> Result<()> {
    let drawn = load_drawn_geometry(drawn)?;
    let config = AnalysisConfig::load(config_path)?;
    let base_dir = config_path.parent().unwrap_or(Path::new("."));

    let sources: Vec<_> = config
        .datasets
        .iter()
        .filter(|d| d.enabled)
        .filter_map(|d| d.source.as_deref().map(|s| (d, s)))
        .collect();

    let pb = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(sources.len() as u64)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} layers {msg}")?
            .progress_chars("#>-"),
    );

    let mut data = HashMap::new();
    for (dataset, source) in sources {
        pb.set_message(dataset.label().to_string());
        match load_layer(source, base_dir, cache_dir) {
            Ok(features) => {
                let layer = ReferenceLayer::new(features);
                if layer.is_empty() {
                    warn!(dataset = %dataset.id, "layer has no features");
                }
                data.insert(dataset.id.clone(), layer);
            }
            // Datasets without data are skipped by the analysis.
            Err(e) => warn!(dataset = %dataset.id, error = %format!("{e:#}"), "failed to load layer"),
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let features: usize = data.values().map(ReferenceLayer::len).sum();
    info!(datasets = config.datasets.len(), loaded = data.len(), features, parallel, "running analysis");

    let spinner = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    spinner.set_style(
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {pos} features screened {msg}")?,
    );
    let observer = |dataset: &str, _: usize| {
        spinner.set_message(dataset.to_string());
        spinner.inc(1);
    };
    let cancel = CancelToken::new();
    let ctx = AnalysisContext::new(&drawn, &cancel).with_observer(&observer);
    let results = analyze_with_context(&ctx, &config.datasets, &data, parallel)?;
    spinner.finish_and_clear();

    for line in summary_lines(&results) {
        eprintln!("  {line}");
    }

    let json = serde_json::to_string_pretty(&results)?;
    match output {
        Some(path) => {
            std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
        None => println!("{json}"),
    }

    if let Some(path) = geojson {
        let json = serde_json::to_string_pretty(&to_geojson(&results))?;
        std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        eprintln!("Wrote {}", path.display());
    }

    Ok(())
}

fn optimize(input: &Path, output: &Path, tolerance: f64, precision: u32) -> Result<()> {
    let fc = read_feature_collection(input)?;
    eprintln!("{}", LayerStats::from_collection(&fc));

    eprintln!("Optimizing (tolerance {tolerance} deg, {precision} decimals)...");
    let (optimized, stats) = optimize_collection(&fc, tolerance, precision);
    let json = serde_json::to_string(&optimized)?;
    std::fs::write(output, &json).with_context(|| format!("Failed to write {}", output.display()))?;

    let input_mb = std::fs::metadata(input)?.len() as f64 / 1024.0 / 1024.0;
    let output_mb = json.len() as f64 / 1024.0 / 1024.0;
    eprintln!(
        "Coordinates: {} -> {} ({:.1}% fewer)",
        stats.coords_before,
        stats.coords_after,
        stats.reduction_pct()
    );
    eprintln!("File size: {input_mb:.2} MB -> {output_mb:.2} MB");
    if output_mb > 10.0 {
        warn!(size_mb = output_mb, "output still large, consider --tolerance 0.0002 or 0.0005");
    }
    eprintln!("Wrote {}", output.display());
    Ok(())
}
