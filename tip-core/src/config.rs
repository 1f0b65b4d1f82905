// Pipeline configuration

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tip_common::{Result, TipError};

pub const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// Budget used when the system memory cannot be read
const FALLBACK_MEMORY_BYTES: u64 = 4 * BYTES_PER_GB;

/// Local-search tool used to place the unmapped mates on the reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchAlgorithm {
    #[default]
    Blast,
    Magic,
}

impl SearchAlgorithm {
    /// Parse an algorithm name; unknown or missing names select the default.
    /// The flag is true when the fallback was taken.
    pub fn parse_or_default(name: Option<&str>) -> (Self, bool) {
        match name.map(|n| n.trim().to_ascii_lowercase()).as_deref() {
            Some("blast") => (SearchAlgorithm::Blast, false),
            Some("magic") => (SearchAlgorithm::Magic, false),
            _ => (SearchAlgorithm::default(), true),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SearchAlgorithm::Blast => "blast",
            SearchAlgorithm::Magic => "magic",
        }
    }
}

/// Executables of the external collaborators, looked up on `PATH` by default
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub bowtie2: PathBuf,
    pub samtools: PathBuf,
    pub blastn: PathBuf,
    pub magicblast: PathBuf,
    pub sort: PathBuf,
    pub bedtools: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            bowtie2: "bowtie2".into(),
            samtools: "samtools".into(),
            blastn: "blastn".into(),
            magicblast: "magicblast".into(),
            sort: "sort".into(),
            bedtools: "bedtools".into(),
        }
    }
}

/// Configuration for one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory receiving the final outputs and the run's work directory
    pub out_dir: PathBuf,

    /// Transposable element name, used in output file names
    pub te_name: String,

    /// Short-read aligner index of the TE library
    pub aligner_index: PathBuf,

    /// Local-search database of the reference genome
    pub search_db: PathBuf,

    /// Windows bed file for the coverage counts
    pub windows: PathBuf,

    /// Ranks in the pool, coordinator included (must be at least 2)
    pub pool_size: usize,

    /// Memory budget of the whole run in bytes, split evenly across workers
    pub memory_budget: u64,

    pub algorithm: SearchAlgorithm,

    /// Coverage windows with fewer features are dropped
    pub min_window_count: u64,

    /// Limit on how long the coordinator waits for any worker message
    pub phase_timeout: Option<Duration>,

    /// Distinguishes this run's work directory from concurrent runs
    pub run_id: String,

    pub tools: ToolPaths,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("."),
            te_name: String::new(),
            aligner_index: PathBuf::new(),
            search_db: PathBuf::new(),
            windows: PathBuf::new(),
            pool_size: rayon::current_num_threads() + 1,
            memory_budget: total_system_memory().unwrap_or(FALLBACK_MEMORY_BYTES),
            algorithm: SearchAlgorithm::default(),
            min_window_count: 2,
            phase_timeout: None,
            run_id: new_run_id(),
            tools: ToolPaths::default(),
        }
    }
}

impl PipelineConfig {
    /// Reject settings no run could succeed with
    pub fn validate(&self) -> Result<()> {
        if self.pool_size < 2 {
            return Err(TipError::config(format!(
                "pool size {} is too small, at least 2 ranks (coordinator + 1 worker) are required",
                self.pool_size
            )));
        }
        if self.te_name.is_empty() {
            return Err(TipError::config("missing transposable element name"));
        }
        if self.run_id.is_empty() || self.run_id.contains(std::path::is_separator) {
            return Err(TipError::config(format!("invalid run id '{}'", self.run_id)));
        }
        if !self.windows.is_file() {
            return Err(TipError::FileNotFound {
                path: self.windows.clone(),
            });
        }
        Ok(())
    }

    pub fn num_workers(&self) -> usize {
        self.pool_size.saturating_sub(1)
    }

    pub fn memory_budget_gb(&self) -> f64 {
        self.memory_budget as f64 / BYTES_PER_GB as f64
    }
}

/// Total physical memory in bytes, from `/proc/meminfo`
pub fn total_system_memory() -> Option<u64> {
    let contents = fs::read_to_string("/proc/meminfo").ok()?;
    parse_mem_total(&contents)
}

fn parse_mem_total(meminfo: &str) -> Option<u64> {
    meminfo
        .lines()
        .find(|line| line.starts_with("MemTotal:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

/// Process id plus wall-clock nanoseconds
pub fn new_run_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!("{}-{:08x}", std::process::id(), nanos)
}
