//! CONDUIT CLI
//!
//! Compile a JSON program description, run it against the reference kernels
//! or print its stream plan.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use conduit_core::Tensor;
use conduit_core::elementwise::reference_registry;
use conduit_program::ProgramDesc;
use conduit_runtime::{GcMode, InterpreterConfig, RunStats, StandaloneExecutor};
use indexmap::IndexMap;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "conduit")]
#[command(about = "CONDUIT - dependency-driven instruction scheduler", long_about = None)]
struct Cli {
    /// Log filter, overrides RUST_LOG
    #[arg(long, global = true)]
    log: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program and print its fetches as JSON
    Run {
        /// Path to the program description
        #[arg(short, long)]
        program: PathBuf,
        /// Scalar feed, `name=value`
        #[arg(short, long = "feed")]
        feeds: Vec<String>,
        /// JSON file mapping feed names to tensors
        #[arg(long)]
        feeds_file: Option<PathBuf>,
        /// Element type of `--feed` values
        #[arg(long, value_enum, default_value_t = FeedType::F32)]
        dtype: FeedType,
        /// Interpreter config file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Host worker threads
        #[arg(short, long)]
        threads: Option<usize>,
        /// Garbage collection mode
        #[arg(long, value_enum)]
        gc: Option<GcArg>,
        /// Budget for a single event wait, in milliseconds
        #[arg(long)]
        sync_timeout_ms: Option<u64>,
        /// Also print run statistics
        #[arg(long)]
        stats: bool,
    },
    /// Print the stream plan of a program as JSON
    Analyze {
        /// Path to the program description
        #[arg(short, long)]
        program: PathBuf,
    },
}

#[derive(Serialize)]
struct RunReport<'a> {
    fetches: &'a IndexMap<String, Tensor>,
    stats: &'a RunStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FeedType {
    Bool,
    I32,
    I64,
    F32,
    F64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum GcArg {
    Deferred,
    Inline,
    Disabled,
}

impl From<GcArg> for GcMode {
    fn from(arg: GcArg) -> Self {
        match arg {
            GcArg::Deferred => GcMode::Deferred,
            GcArg::Inline => GcMode::Inline,
            GcArg::Disabled => GcMode::Disabled,
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let filter = match &cli.log {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("conduit=info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            program,
            feeds,
            feeds_file,
            dtype,
            config,
            threads,
            gc,
            sync_timeout_ms,
            stats,
        } => {
            let desc = load_program(&program)?;
            let mut config = match config {
                Some(path) => InterpreterConfig::from_file(&path)
                    .wrap_err_with(|| format!("loading config {}", path.display()))?,
                None => InterpreterConfig::default(),
            };
            if let Some(threads) = threads {
                config = config.with_threads(threads);
            }
            if let Some(gc) = gc {
                config = config.with_gc_mode(gc.into());
            }
            if let Some(ms) = sync_timeout_ms {
                config = config.with_sync_timeout(ms);
            }

            let mut inputs = match feeds_file {
                Some(path) => load_feeds(&path)?,
                None => IndexMap::new(),
            };
            for feed in &feeds {
                let (name, tensor) = parse_feed(feed, dtype)?;
                inputs.insert(name, tensor);
            }

            let registry = reference_registry()?;
            let executor = StandaloneExecutor::from_desc(&desc, &registry, config)?;
            let outcome = executor.run_with_stats(inputs)?;
            let rendered = if stats {
                serde_json::to_string_pretty(&RunReport {
                    fetches: &outcome.fetches,
                    stats: &outcome.stats,
                })?
            } else {
                serde_json::to_string_pretty(&outcome.fetches)?
            };
            println!("{}", rendered);
            Ok(())
        }
        Commands::Analyze { program } => {
            let desc = load_program(&program)?;
            let registry = reference_registry()?;
            let executor = StandaloneExecutor::from_desc(&desc, &registry, InterpreterConfig::default())?;
            let plan = executor.stream_plan()?;
            println!("{}", serde_json::to_string_pretty(plan)?);
            Ok(())
        }
    }
}

fn load_program(path: &Path) -> Result<ProgramDesc> {
    let json = std::fs::read_to_string(path).wrap_err_with(|| format!("reading {}", path.display()))?;
    let desc = ProgramDesc::from_json(&json).wrap_err_with(|| format!("parsing {}", path.display()))?;
    tracing::debug!(program = %desc.name, ops = desc.ops.len(), "program loaded");
    Ok(desc)
}

fn load_feeds(path: &Path) -> Result<IndexMap<String, Tensor>> {
    let json = std::fs::read_to_string(path).wrap_err_with(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&json).wrap_err_with(|| format!("parsing feeds {}", path.display()))
}

/// Parse `name=value` into a scalar tensor of `dtype`
fn parse_feed(feed: &str, dtype: FeedType) -> Result<(String, Tensor)> {
    let (name, value) = feed
        .split_once('=')
        .ok_or_else(|| eyre!("feed `{}` is not of the form name=value", feed))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(eyre!("feed `{}` has an empty name", feed));
    }
    let value = value.trim();
    let bad = || format!("feed `{}`: `{}` is not a valid {:?}", name, value, dtype);
    let tensor = match dtype {
        FeedType::Bool => Tensor::scalar(value.parse::<bool>().wrap_err_with(bad)?),
        FeedType::I32 => Tensor::scalar(value.parse::<i32>().wrap_err_with(bad)?),
        FeedType::I64 => Tensor::scalar(value.parse::<i64>().wrap_err_with(bad)?),
        FeedType::F32 => Tensor::scalar(value.parse::<f32>().wrap_err_with(bad)?),
        FeedType::F64 => Tensor::scalar(value.parse::<f64>().wrap_err_with(bad)?),
    };
    Ok((name.to_string(), tensor))
}
