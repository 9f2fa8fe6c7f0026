mod report;

use alignment_interpreter::interpretation_core::{
    bar_breakdown, diagnose, global_bias_banner, interpret, RawIntervalRow, RawIntervalScores,
    ThresholdConfig, ThresholdOverrides,
};
use alignment_interpreter::rows::{
    find_bar, join_wave_states, latest_per_timeframe, load_rows, to_scores, RowFilter,
};
use alignment_interpreter::VersionRegistry;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "interpret")]
#[command(about = "Batch alignment interpretation and threshold diagnostics")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Threshold version registry file
    #[arg(long, global = true, env = "THRESHOLD_REGISTRY", default_value = "thresholds.json")]
    registry: PathBuf,

    /// Print verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Where rows come from and which thresholds to apply
#[derive(clap::Args, Debug)]
struct Source {
    /// Score rows (.json, .json.zst or .csv)
    #[arg(short, long)]
    scores: PathBuf,

    /// Wave-engine state rows joined by timestamp
    #[arg(short, long)]
    wave_state: Option<PathBuf>,

    /// Threshold overrides as a JSON object, e.g. '{"alignment_strong":0.6}'
    #[arg(short, long)]
    overrides: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interpret one bar (by timestamp, or the latest)
    Interpret {
        #[command(flatten)]
        source: Source,

        #[arg(long)]
        symbol: Option<String>,

        #[arg(short, long)]
        timeframe: Option<String>,

        /// Bar timestamp; defaults to the latest bar
        #[arg(long)]
        timestamp: Option<String>,

        /// Include the rule breakdown
        #[arg(short, long)]
        breakdown: bool,
    },

    /// Aggregate diagnostics over a population of bars
    Diagnostics {
        #[command(flatten)]
        source: Source,

        #[arg(long)]
        symbol: Option<String>,

        #[arg(short, long)]
        timeframe: Option<String>,

        /// Inclusive start timestamp
        #[arg(long)]
        from: Option<String>,

        /// Inclusive end timestamp
        #[arg(long)]
        to: Option<String>,

        /// Maximum bars (clamped to 10000)
        #[arg(short, long, default_value = "5000")]
        limit: usize,

        /// Print JSON instead of a text report
        #[arg(long)]
        json: bool,
    },

    /// Interpret the latest bar of every timeframe and synthesize a banner
    MultiTf {
        #[command(flatten)]
        source: Source,

        #[arg(long)]
        symbol: Option<String>,
    },

    /// Show the resolved thresholds
    Thresholds {
        /// Threshold overrides as a JSON object
        #[arg(short, long)]
        overrides: Option<String>,
    },

    /// Manage saved threshold versions
    Versions {
        #[command(subcommand)]
        action: VersionAction,
    },
}

#[derive(Subcommand, Debug)]
enum VersionAction {
    /// List saved versions
    List,

    /// Snapshot thresholds (defaults + overrides) as a new active version
    Create {
        #[arg(short, long)]
        name: Option<String>,

        /// Threshold overrides as a JSON object
        #[arg(short, long)]
        overrides: Option<String>,
    },

    /// Activate a version by id
    Activate {
        id: Option<String>,

        /// Return to defaults
        #[arg(long, conflicts_with = "id")]
        clear: bool,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let registry_path = args.registry;
    match args.command {
        Commands::Interpret { source, symbol, timeframe, timestamp, breakdown } => {
            run_interpret(&registry_path, source, symbol, timeframe, timestamp, breakdown)?;
        }
        Commands::Diagnostics { source, symbol, timeframe, from, to, limit, json } => {
            let filter = RowFilter {
                symbol,
                timeframe,
                from,
                to,
                limit: Some(limit),
            };
            run_diagnostics(&registry_path, source, filter, json)?;
        }
        Commands::MultiTf { source, symbol } => {
            run_multi_tf(&registry_path, source, symbol)?;
        }
        Commands::Thresholds { overrides } => {
            let registry = VersionRegistry::load(&registry_path)?;
            let config = registry.resolve(parse_overrides(overrides.as_deref())?.as_ref());
            print!("{}", report::thresholds_table(&config, registry.active()));
        }
        Commands::Versions { action } => {
            run_versions(&registry_path, action)?;
        }
    }

    Ok(())
}

fn parse_overrides(raw: Option<&str>) -> Result<Option<ThresholdOverrides>> {
    raw.map(|r| ThresholdOverrides::from_json(r).context("Invalid --overrides JSON"))
        .transpose()
}

/// Load, join and resolve everything a row-based command needs
fn load_source(registry_path: &Path, source: &Source) -> Result<(Vec<RawIntervalRow>, ThresholdConfig)> {
    let rows = load_rows(&source.scores)?;
    let rows = match &source.wave_state {
        Some(path) => join_wave_states(rows, &load_rows(path)?),
        None => rows,
    };
    let registry = VersionRegistry::load(registry_path)?;
    let config = registry.resolve(parse_overrides(source.overrides.as_deref())?.as_ref());
    if let Some(v) = registry.active() {
        info!("Active threshold version: {} ({})", v.id, v.name);
    }
    Ok((rows, config))
}

fn run_interpret(
    registry_path: &Path,
    source: Source,
    symbol: Option<String>,
    timeframe: Option<String>,
    timestamp: Option<String>,
    breakdown: bool,
) -> Result<()> {
    let (rows, config) = load_source(registry_path, &source)?;
    let series = RowFilter {
        symbol,
        timeframe,
        ..Default::default()
    };
    let rows: Vec<RawIntervalRow> = rows.into_iter().filter(|r| series.matches_series(r)).collect();

    let Some(row) = find_bar(&rows, timestamp.as_deref())? else {
        bail!("No bar found for the requested timestamp");
    };
    let scores = RawIntervalScores::from_row(row);

    let mut out = json!({
        "symbol": row.symbol,
        "timeframe": row.timeframe,
        "timestamp": row.timestamp,
        "interpretation": interpret(&scores, &config),
    });
    if breakdown {
        out["breakdown"] = json!(bar_breakdown(&scores, &config));
    }
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn run_diagnostics(registry_path: &Path, source: Source, filter: RowFilter, as_json: bool) -> Result<()> {
    let (rows, config) = load_source(registry_path, &source)?;
    let rows = filter.apply(rows)?;
    if rows.is_empty() {
        warn!("No rows matched; reporting an empty population");
    }

    let result = diagnose(to_scores(&rows), &config);
    info!("Diagnostics over {} bars", result.total_bars);

    if as_json {
        let out = json!({ "thresholdsUsed": config, "diagnostics": result });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print!("{}", report::diagnostics_report(&result, &config));
    }
    Ok(())
}

fn run_multi_tf(registry_path: &Path, source: Source, symbol: Option<String>) -> Result<()> {
    let (rows, config) = load_source(registry_path, &source)?;
    let series = RowFilter {
        symbol,
        ..Default::default()
    };
    let rows: Vec<RawIntervalRow> = rows.into_iter().filter(|r| series.matches_series(r)).collect();

    let latest = latest_per_timeframe(&rows);
    if latest.is_empty() {
        warn!("No timestamped rows with a timeframe");
    }
    let interpretations: Vec<_> = latest
        .iter()
        .map(|row| interpret(&RawIntervalScores::from_row(row), &config))
        .collect();

    let per_tf: Vec<_> = latest
        .iter()
        .zip(&interpretations)
        .map(|(row, interpretation)| {
            json!({
                "timeframe": row.timeframe,
                "timestamp": row.timestamp,
                "interpretation": interpretation,
            })
        })
        .collect();
    let out = json!({
        "interpretations": per_tf,
        "globalBiasBanner": global_bias_banner(&interpretations),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn run_versions(registry_path: &Path, action: VersionAction) -> Result<()> {
    let mut registry = VersionRegistry::load(registry_path)?;
    match action {
        VersionAction::List => {
            print!("{}", report::versions_table(&registry));
            return Ok(());
        }
        VersionAction::Create { name, overrides } => {
            let values = ThresholdConfig::resolve(parse_overrides(overrides.as_deref())?.as_ref());
            let version = registry.create_version(values, name.as_deref());
            println!("Created {} ({}) and made it active", version.id, version.name);
        }
        VersionAction::Activate { id, clear } => {
            if id.is_none() && !clear {
                bail!("Pass a version id or --clear");
            }
            registry.set_active(id.as_deref())?;
            match id {
                Some(id) => println!("Active version: {}", id),
                None => println!("Active version cleared; using defaults"),
            }
        }
    }
    registry.save(registry_path)
}
