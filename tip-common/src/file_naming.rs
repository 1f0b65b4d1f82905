// File naming conventions for one sample inside one run
//
// Shared outputs live in the output directory, phase hand-off files and
// rank-private scratch files live in a per-run, per-sample work directory so
// concurrent runs against the same output directory never collide.

use crate::types::Rank;
use std::path::{Path, PathBuf};

/// Append `.suffix` to the file name of `path` (`a.bed` -> `a.bed.3`)
pub fn with_suffix(path: &Path, suffix: impl std::fmt::Display) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{suffix}"));
    path.with_file_name(name)
}

/// Work directory shared by every sample of a run
pub fn run_work_dir(out_dir: &Path, run_id: &str) -> PathBuf {
    out_dir.join(format!(".tipfinder-{run_id}"))
}

/// Every path the pipeline touches for one sample
#[derive(Debug, Clone)]
pub struct SampleFiles {
    out_dir: PathBuf,
    work_dir: PathBuf,
    sample: String,
    te: String,
}

impl SampleFiles {
    pub fn new(out_dir: &Path, run_id: &str, sample: &str, te: &str) -> Self {
        SampleFiles {
            out_dir: out_dir.to_path_buf(),
            work_dir: run_work_dir(out_dir, run_id).join(sample),
            sample: sample.to_string(),
            te: te.to_string(),
        }
    }

    fn stem(&self) -> String {
        format!("{}-vs-{}", self.sample, self.te)
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    // Phase hand-off files

    /// Unified local-search hits (`target\tstart\tend\tread`)
    pub fn hit_file(&self) -> PathBuf {
        self.work_dir.join(format!("{}.fa.bl", self.stem()))
    }

    /// One worker's share of the hits, merged into [`Self::hit_file`] by the coordinator
    pub fn partial_hit_file(&self, rank: Rank) -> PathBuf {
        with_suffix(&self.hit_file(), rank)
    }

    /// `read_id,hit_count` lines written after the dictionary build
    pub fn hit_count_file(&self) -> PathBuf {
        self.work_dir.join("hit_counts.tmp.csv")
    }

    /// Unsorted unique-hit intervals
    pub fn bed_file(&self) -> PathBuf {
        self.work_dir.join(format!("{}.bed", self.stem()))
    }

    /// Raw per-window counts before the minimum-count filter
    pub fn raw_coverage_file(&self) -> PathBuf {
        self.work_dir.join(format!("{}.coverage.raw", self.stem()))
    }

    // Final outputs

    pub fn sorted_bed_file(&self) -> PathBuf {
        self.out_dir.join(format!("{}.sort.bed", self.stem()))
    }

    pub fn coverage_file(&self) -> PathBuf {
        self.out_dir
            .join(format!("coveragebed_{}_per10kb.bed", self.stem()))
    }

    // Rank-private scratch files

    pub fn forward_slice(&self, rank: Rank) -> PathBuf {
        self.work_dir
            .join(format!("{}_1.fastq.{}", self.sample, rank))
    }

    pub fn reverse_slice(&self, rank: Rank) -> PathBuf {
        self.work_dir
            .join(format!("{}_2.fastq.{}", self.sample, rank))
    }

    pub fn alignment_file(&self, rank: Rank) -> PathBuf {
        self.work_dir.join(format!("{}.bam.{}", self.stem(), rank))
    }

    pub fn query_file(&self, rank: Rank) -> PathBuf {
        self.work_dir.join(format!("{}.fa.{}", self.stem(), rank))
    }
}
