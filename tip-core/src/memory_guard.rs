// Per-worker memory budget for in-memory accumulation
//
// The unique-hit filter loads every qualifying read id of a sample into one
// set per worker. The guard estimates the set's live size before each
// insertion and turns an overrun into a fatal ResourceExhausted error instead
// of letting the process run out of memory.

use ahash::AHashSet;
use std::mem;
use tip_common::{Rank, Result, TipError};

/// Budget (bytes) for one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryGuard {
    rank: Rank,
    budget_bytes: usize,
}

impl MemoryGuard {
    pub fn new(rank: Rank, budget_bytes: usize) -> Self {
        MemoryGuard { rank, budget_bytes }
    }

    /// Share of `total_bytes` for each worker; the coordinator does no
    /// per-record accumulation and is left out of the split
    pub fn per_worker_budget(total_bytes: u64, pool_size: usize) -> usize {
        let workers = pool_size.saturating_sub(1).max(1) as u64;
        usize::try_from(total_bytes / workers).unwrap_or(usize::MAX)
    }

    pub fn budget(&self) -> usize {
        self.budget_bytes
    }

    /// Fail when `needed` bytes would not fit
    pub fn check(&self, needed: usize) -> Result<()> {
        if needed > self.budget_bytes {
            return Err(TipError::ResourceExhausted {
                rank: self.rank,
                needed,
                budget: self.budget_bytes,
            });
        }
        Ok(())
    }
}

/// Bytes one set slot costs beyond its string payload (entry + control byte)
const SLOT_OVERHEAD: usize = mem::size_of::<String>() + 1;

/// Set of read ids whose estimated size is checked on every insertion
#[derive(Debug)]
pub struct GuardedReadSet {
    guard: MemoryGuard,
    ids: AHashSet<String>,
    payload_bytes: usize,
}

impl GuardedReadSet {
    pub fn new(guard: MemoryGuard) -> Self {
        GuardedReadSet {
            guard,
            ids: AHashSet::new(),
            payload_bytes: 0,
        }
    }

    /// Estimated live size: the set header, every allocated slot and the
    /// heap bytes of the stored ids
    pub fn estimated_bytes(&self) -> usize {
        mem::size_of::<Self>() + self.ids.capacity() * SLOT_OVERHEAD + self.payload_bytes
    }

    /// Insert a read id; returns whether it was new
    ///
    /// The check runs before the insertion, against the size the set would
    /// have afterwards (including a table growth if one is due).
    pub fn insert(&mut self, read_id: &str) -> Result<bool> {
        if self.ids.contains(read_id) {
            return Ok(false);
        }
        let slots = if self.ids.len() + 1 > self.ids.capacity() {
            (self.ids.capacity() * 2 + 1).max(4)
        } else {
            self.ids.capacity()
        };
        let needed = mem::size_of::<Self>()
            + slots * SLOT_OVERHEAD
            + self.payload_bytes
            + read_id.len();
        self.guard.check(needed)?;

        self.payload_bytes += read_id.len();
        Ok(self.ids.insert(read_id.to_string()))
    }

    #[inline]
    pub fn contains(&self, read_id: &str) -> bool {
        self.ids.contains(read_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
