//! Scatter/gather coordination engine for the TIP finder pipeline.
//!
//! A pool of ranks runs as threads of one process: rank 0 coordinates, ranks
//! `1..pool_size` do the per-partition work. For every sample of the manifest
//! the pool runs four strictly ordered phases:
//!
//! 1. **Align & search** - each worker aligns its slice of the paired reads
//!    against the TE index, keeps pairs with one unmapped mate and searches
//!    those mates against the reference genome
//! 2. **Read hit index** - each worker indexes its lines of the unified hit
//!    file by read; the coordinator unions the partial indexes into hit counts
//! 3. **Unique-hit filter** - each worker keeps the hits of reads that landed
//!    on a single target, under a per-worker memory budget
//! 4. **Post-processing** - the coordinator sorts the intervals and counts
//!    them per genomic window
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tip_core::{read_manifest, run_pipeline, PipelineConfig, ShellToolchain};
//!
//! # fn main() -> tip_common::Result<()> {
//! let config = PipelineConfig {
//!     out_dir: "results".into(),
//!     te_name: "Gypsy".into(),
//!     aligner_index: "te/gypsy".into(),
//!     search_db: "ref/genome".into(),
//!     windows: "ref/windows_10kb.bed".into(),
//!     ..PipelineConfig::default()
//! };
//! let samples = read_manifest("samples.csv".as_ref())?;
//! let tools = Arc::new(ShellToolchain::new(&config));
//! run_pipeline(config, samples, tools)?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod fastq;
pub mod hit_index;
pub mod line_io;
pub mod manifest;
pub mod memory_guard;
pub mod message;
pub mod partition;
pub mod phase;
pub mod pipeline;
pub mod tools;
pub mod worker;

pub use channel::{create_pool, Endpoint};
pub use config::{PipelineConfig, SearchAlgorithm, ToolPaths, BYTES_PER_GB};
pub use context::WorkerContext;
pub use hit_index::{HitRecord, ReadHitIndex};
pub use manifest::{parse_manifest, read_manifest};
pub use memory_guard::{GuardedReadSet, MemoryGuard};
pub use message::Message;
pub use partition::{partition, partition_for_rank, Partition};
pub use phase::Phase;
pub use pipeline::run_pipeline;
pub use tools::{ShellToolchain, Toolchain};
