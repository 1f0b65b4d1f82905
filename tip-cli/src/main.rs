// TIP finder CLI
// Detects transposable element insertion polymorphisms from paired short reads

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tip_core::config::total_system_memory;
use tip_core::{
    read_manifest, run_pipeline, PipelineConfig, SearchAlgorithm, ShellToolchain, BYTES_PER_GB,
};

#[derive(Parser, Debug)]
#[command(name = "tipfinder")]
#[command(version, about = "Transposable element Insertion Polymorphisms finder", long_about = None)]
struct Cli {
    /// Manifest with one 'sample_name,forward_reads,reverse_reads' line per sample
    #[arg(short = 'f', long = "file")]
    manifest: PathBuf,

    /// Output directory
    #[arg(short = 'o', long = "out")]
    out_dir: PathBuf,

    /// Bowtie2 index of the TE library
    #[arg(short = 'b', long = "db-bowtie")]
    aligner_index: PathBuf,

    /// Blast database of the reference genome
    #[arg(short = 'l', long = "db-blast")]
    search_db: PathBuf,

    /// Bed file with the genomic windows to count insertions in
    #[arg(short = 'w', long = "windows")]
    windows: PathBuf,

    /// Name of the transposable element
    #[arg(short = 't', long = "te")]
    te_name: String,

    /// Total memory to use, in GB (default: all system memory)
    #[arg(short = 'm', long = "memory")]
    memory_gb: Option<u64>,

    /// Local search algorithm: blast or magic
    #[arg(short = 'a', long = "alg")]
    algorithm: Option<String>,

    /// Ranks in the pool, coordinator included (default: available cores + 1)
    #[arg(short = 'n', long = "pool-size")]
    pool_size: Option<usize>,

    /// Give up when no worker reports for this many seconds
    #[arg(long = "timeout-secs")]
    timeout_secs: Option<u64>,

    /// Verbosity level (0=warnings, 1=normal, 2=debug, 3=trace)
    #[arg(short = 'v', long, default_value_t = 1)]
    verbosity: u32,
}

fn init_logging(verbosity: u32) {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    let mut builder = env_logger::Builder::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        builder.filter_level(level);
    }
    builder.format_timestamp(None).format_target(false).init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbosity);

    if let Err(e) = run(cli) {
        eprintln!("FATAL ERROR: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let (algorithm, fell_back) = SearchAlgorithm::parse_or_default(cli.algorithm.as_deref());
    if fell_back {
        match &cli.algorithm {
            Some(name) => log::warn!("Incorrect value '{}' for -a, using by default: blast", name),
            None => log::warn!("Missing search algorithm, using by default: blast"),
        }
    }

    let defaults = PipelineConfig::default();
    let memory_budget = match cli.memory_gb {
        Some(gb) => gb.saturating_mul(BYTES_PER_GB),
        None => {
            let total = total_system_memory().unwrap_or(defaults.memory_budget);
            log::warn!(
                "Missing available memory to be used, using by default: {}Gb",
                total / BYTES_PER_GB
            );
            total
        }
    };

    let config = PipelineConfig {
        out_dir: cli.out_dir,
        te_name: cli.te_name,
        aligner_index: cli.aligner_index,
        search_db: cli.search_db,
        windows: cli.windows,
        pool_size: cli.pool_size.unwrap_or(defaults.pool_size),
        memory_budget,
        algorithm,
        phase_timeout: cli.timeout_secs.map(Duration::from_secs),
        ..defaults
    };

    let samples = read_manifest(&cli.manifest)
        .with_context(|| format!("reading manifest {}", cli.manifest.display()))?;
    let tools = Arc::new(ShellToolchain::new(&config));

    run_pipeline(config, samples, tools)?;
    Ok(())
}
