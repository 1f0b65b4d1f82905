// Deterministic work partitioning
//
// Every rank computes partitions on its own from the broadcast total; no
// partition table ever travels over the channel, so all invocations with the
// same inputs must agree exactly.

use std::ops::Range;
use tip_common::{Rank, Result, TipError, COORDINATOR_RANK, LINES_PER_READ};

/// A contiguous slice `[start, end)` of a 0-based record index space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub worker_index: usize,
    pub start: u64,
    pub end: u64,
}

impl Partition {
    #[inline]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<u64> {
        self.start..self.end
    }

    /// Line range covered by this partition when records are FASTQ reads
    pub fn read_lines(&self) -> Range<u64> {
        self.start * LINES_PER_READ..self.end * LINES_PER_READ
    }
}

/// Split `[0, total)` across `num_workers` and return the slice for `worker_index`
///
/// The first `total % num_workers` workers get `total / num_workers + 1`
/// records, the rest get `total / num_workers`.
pub fn partition(total: u64, num_workers: usize, worker_index: usize) -> Result<Partition> {
    if num_workers == 0 {
        return Err(TipError::config("cannot partition work across zero workers"));
    }
    if worker_index >= num_workers {
        return Err(TipError::config(format!(
            "worker index {worker_index} out of range for {num_workers} workers"
        )));
    }

    let workers = num_workers as u64;
    let index = worker_index as u64;
    let base = total / workers + 1;
    let remainder = total % workers;

    let (start, size) = if index < remainder {
        (index * base, base)
    } else {
        (index * (base - 1) + remainder, base - 1)
    };

    Ok(Partition {
        worker_index,
        start,
        end: start + size,
    })
}

/// Partition for a pool rank; rank 0 is the coordinator and owns no slice
pub fn partition_for_rank(total: u64, pool_size: usize, rank: Rank) -> Result<Partition> {
    if rank == COORDINATOR_RANK {
        return Err(TipError::protocol("the coordinator does not own a partition"));
    }
    partition(total, pool_size.saturating_sub(1), rank - 1)
}
