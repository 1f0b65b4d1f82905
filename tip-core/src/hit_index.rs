//! Read hit records and the read -> targets index.
//!
//! The unified hit file holds one local-search alignment per line as
//! `target_id\tstart\tend\tread_id`. Workers index disjoint line ranges of it,
//! the coordinator unions the partial indexes and flattens the result to hit
//! counts, and workers then keep the hits of reads with a single target.

use crate::line_io;
use crate::memory_guard::GuardedReadSet;
use ahash::{AHashMap, AHashSet};
use std::io::Write;
use std::ops::Range;
use std::path::Path;
use tip_common::{HitCountRecord, Result, TipError};

/// One line of the unified hit file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitRecord {
    pub target_id: String,
    pub start: u64,
    pub end: u64,
    pub read_id: String,
}

impl HitRecord {
    /// Parse `target\tstart\tend\tread`; extra columns are ignored
    pub fn parse(line: &str) -> std::result::Result<Self, String> {
        let mut columns = line.trim_end_matches(['\n', '\r']).split('\t');
        let mut next = |name: &str| {
            columns
                .next()
                .filter(|c| !c.is_empty())
                .ok_or_else(|| format!("missing {name} column"))
        };
        let target_id = next("target")?.to_string();
        let start = next("start")?;
        let end = next("end")?;
        let read_id = next("read")?.to_string();

        let coordinate = |value: &str| {
            value
                .parse::<u64>()
                .map_err(|_| format!("coordinate '{value}' is not a non-negative integer"))
        };
        Ok(HitRecord {
            target_id,
            start: coordinate(start)?,
            end: coordinate(end)?,
            read_id,
        })
    }

    /// Same record with its coordinates in ascending order
    pub fn normalized(mut self) -> Self {
        if self.end < self.start {
            std::mem::swap(&mut self.start, &mut self.end);
        }
        self
    }

    pub fn to_bed_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}",
            self.target_id, self.start, self.end, self.read_id
        )
    }
}

/// Mapping read id -> distinct targets it aligned to
#[derive(Debug, Clone, Default)]
pub struct ReadHitIndex {
    hits: AHashMap<String, AHashSet<String>>,
}

impl ReadHitIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `read_id` hit `target_id`; returns whether the pair was new
    pub fn insert(&mut self, read_id: &str, target_id: &str) -> bool {
        match self.hits.get_mut(read_id) {
            Some(targets) => {
                if targets.contains(target_id) {
                    false
                } else {
                    targets.insert(target_id.to_string())
                }
            }
            None => {
                let mut targets = AHashSet::new();
                targets.insert(target_id.to_string());
                self.hits.insert(read_id.to_string(), targets);
                true
            }
        }
    }

    /// Union another index into this one
    pub fn merge(&mut self, other: ReadHitIndex) {
        for (read_id, targets) in other.hits {
            match self.hits.get_mut(&read_id) {
                Some(existing) => {
                    for target in targets {
                        existing.insert(target);
                    }
                }
                None => {
                    self.hits.insert(read_id, targets);
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AHashSet<String>)> {
        self.hits.iter().map(|(read, targets)| (read.as_str(), targets))
    }

    /// Number of distinct reads
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Flatten to hit counts, sorted by read id, consuming the index
    pub fn into_hit_counts(self) -> Vec<HitCountRecord> {
        let mut counts: Vec<HitCountRecord> = self
            .hits
            .into_iter()
            .map(|(read_id, targets)| HitCountRecord {
                read_id,
                hit_count: targets.len() as u32,
            })
            .collect();
        counts.sort_unstable_by(|a, b| a.read_id.cmp(&b.read_id));
        counts
    }
}

impl PartialEq for ReadHitIndex {
    fn eq(&self, other: &Self) -> bool {
        self.hits.len() == other.hits.len()
            && self.hits.iter().all(|(read, targets)| {
                other.hits.get(read).is_some_and(|theirs| {
                    theirs.len() == targets.len() && targets.iter().all(|t| theirs.contains(t))
                })
            })
    }
}

impl Eq for ReadHitIndex {}

fn parse_hit(path: &Path, index: u64, line: &str) -> Result<HitRecord> {
    HitRecord::parse(line).map_err(|message| TipError::parse(path, index + 1, message))
}

/// Index the hits on lines `lines` of the unified hit file
pub fn build_partial_index(hit_file: &Path, lines: Range<u64>) -> Result<ReadHitIndex> {
    let mut index = ReadHitIndex::new();
    line_io::scan_lines(hit_file, lines, |i, line| {
        let hit = parse_hit(hit_file, i, line)?;
        index.insert(&hit.read_id, &hit.target_id);
        Ok(())
    })?;
    Ok(index)
}

pub fn write_hit_counts(path: &Path, counts: &[HitCountRecord]) -> Result<()> {
    let mut writer = line_io::create_text(path)?;
    for record in counts {
        writeln!(writer, "{}", record.to_line())?;
    }
    writer.flush()?;
    Ok(())
}

/// Load every unique-hit read id of the hit-count file into a guarded set
pub fn load_unique_reads(hit_count_file: &Path, unique: &mut GuardedReadSet) -> Result<()> {
    line_io::scan_lines(hit_count_file, 0..u64::MAX, |i, line| {
        let record = HitCountRecord::parse_line(line).ok_or_else(|| {
            TipError::parse(hit_count_file, i + 1, "expected 'read_id,hit_count'")
        })?;
        if record.is_unique_hit() {
            unique.insert(&record.read_id)?;
        }
        Ok(())
    })
}

/// Keep the hits on lines `lines` whose read is in `unique`, normalized and
/// formatted as bed lines, in file order
pub fn filter_unique_hits(
    hit_file: &Path,
    lines: Range<u64>,
    unique: &GuardedReadSet,
) -> Result<Vec<String>> {
    let mut kept = Vec::new();
    line_io::scan_lines(hit_file, lines, |i, line| {
        let hit = parse_hit(hit_file, i, line)?;
        if unique.contains(&hit.read_id) {
            kept.push(hit.normalized().to_bed_line());
        }
        Ok(())
    })?;
    Ok(kept)
}
