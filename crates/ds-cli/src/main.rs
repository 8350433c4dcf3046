//! dsens CLI

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use ds_inference::{PackOptions, Slot, TaggedEstimate, pack, summarize};
use std::path::{Path, PathBuf};

mod config;

#[derive(Parser)]
#[command(name = "dsens")]
#[command(about = "dsens - Sensitivity of group disparity estimates to unobserved confounding")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate adjusted group disparities for one parameter setting
    Estimate {
        /// Run configuration (YAML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Evaluate every parameter setting in the config's `grid`
    Sweep {
        /// Run configuration (YAML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Threads (0 = auto). Overrides the config value.
        #[arg(long)]
        threads: Option<usize>,
    },

    /// Pivot `<group>_min` / `<group>_max` tagged estimates into bounds
    Summarize {
        /// JSON array of `{tag, term, estimate}` rows
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Map a flat optimizer vector to the eight named sensitivity slots
    Pack {
        /// Free parameter values, comma separated
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
        params: Vec<f64>,

        /// Positional free mask over the eight slots, comma separated
        #[arg(long, value_delimiter = ',')]
        free_mask: Option<Vec<bool>>,

        /// Values for the non-free slots, comma separated
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        fixed: Option<Vec<f64>>,

        /// Keep modifier-group slots independent of the base group
        #[arg(long, default_value_t = false)]
        allow_sgv: bool,

        /// Interpret `qm` as a log-odds delta relative to `qb`
        #[arg(long, default_value_t = false)]
        q_log_odds: bool,
    },

    /// Print version
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Estimate { config, output } => cmd_estimate(&config, output.as_ref()),
        Commands::Sweep { config, output, threads } => {
            cmd_sweep(&config, output.as_ref(), threads)
        }
        Commands::Summarize { input, output } => cmd_summarize(&input, output.as_ref()),
        Commands::Pack { params, free_mask, fixed, allow_sgv, q_log_odds } => {
            let opts = PackOptions {
                free_mask,
                fixed_values: fixed,
                allow_subgroup_validity: allow_sgv,
                q_on_log_odds_range: q_log_odds,
            };
            cmd_pack(&params, &opts)
        }
        Commands::Version => {
            println!("dsens {}", ds_core::VERSION);
            Ok(())
        }
    }
}

fn config_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

fn cmd_estimate(config: &PathBuf, output: Option<&PathBuf>) -> Result<()> {
    let cfg = config::read_run_config(config)?;
    let policy = cfg.load_policy(&config_dir(config))?;
    let Some(params) = cfg.params.as_ref() else {
        bail!("run config {} has no `params` section", config.display());
    };

    let report = ds_inference::estimate(&policy, params, &cfg.options)?;
    tracing::info!(terms = report.estimates.len(), "estimate complete");

    let mut output_json = serde_json::json!({ "estimates": report.estimates });
    if let Some(aug) = &report.augmented {
        output_json["augmented_rows"] = serde_json::json!(aug.n_rows());
    }
    write_json(output, output_json)
}

fn cmd_sweep(config: &PathBuf, output: Option<&PathBuf>, threads: Option<usize>) -> Result<()> {
    let cfg = config::read_run_config(config)?;
    if cfg.grid.is_empty() {
        bail!("run config {} has an empty `grid`", config.display());
    }
    let policy = cfg.load_policy(&config_dir(config))?;

    let threads = threads.unwrap_or(cfg.threads);
    if threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("configuring the rayon thread pool")?;
    }

    let points = ds_inference::sweep(&policy, &cfg.grid, &cfg.options)?;
    tracing::info!(points = points.len(), threads, "sweep complete");

    let output_json: Vec<serde_json::Value> = points
        .into_iter()
        .map(|p| {
            serde_json::json!({
                "index": p.index,
                "params": p.params,
                "estimates": p.report.estimates,
            })
        })
        .collect();
    write_json(output, serde_json::Value::Array(output_json))
}

fn cmd_summarize(input: &PathBuf, output: Option<&PathBuf>) -> Result<()> {
    let text =
        std::fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let rows: Vec<TaggedEstimate> = serde_json::from_str(&text)
        .with_context(|| format!("parsing tagged estimates {}", input.display()))?;
    let bounds = summarize(&rows)?;
    tracing::info!(rows = rows.len(), terms = bounds.len(), "summarize complete");
    write_json(output, serde_json::to_value(bounds)?)
}

fn cmd_pack(params: &[f64], opts: &PackOptions) -> Result<()> {
    let packed = pack(params, opts)?;
    let mut obj = serde_json::Map::new();
    for slot in Slot::ALL {
        obj.insert(slot.name().to_string(), serde_json::json!(packed.get(slot)));
    }
    write_json(None, serde_json::Value::Object(obj))
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
