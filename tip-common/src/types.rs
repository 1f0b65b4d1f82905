// TIP finder core types and constants

use std::path::PathBuf;

/// Version information
pub const TIP_VER_MAJOR: u32 = 1;
pub const TIP_VER_MINOR: u32 = 1;
pub const TIP_VER_BUGFIX: u32 = 0;

/// Full version string
pub fn tip_version() -> String {
    format!(
        "TIP_finder (Transposable element Insertion Polymorphisms finder) v. {}.{}.{} [distributed]",
        TIP_VER_MAJOR, TIP_VER_MINOR, TIP_VER_BUGFIX
    )
}

/// Identity of a pool member. Rank 0 is the coordinator, ranks 1.. are workers.
pub type Rank = usize;

pub const COORDINATOR_RANK: Rank = 0;

/// Worker that reports conditions every worker hits identically (memory budget).
pub const REPORTING_RANK: Rank = 1;

/// FASTQ records span four lines
pub const LINES_PER_READ: u64 = 4;

/// A read is a unique hit when it aligned to fewer distinct targets than this
pub const UNIQUE_HIT_LIMIT: u32 = 2;

/// One manifest entry: a sample name and its paired read files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub name: String,
    pub forward: PathBuf,
    pub reverse: PathBuf,
}

impl Sample {
    pub fn new(name: impl Into<String>, forward: impl Into<PathBuf>, reverse: impl Into<PathBuf>) -> Self {
        Sample {
            name: name.into(),
            forward: forward.into(),
            reverse: reverse.into(),
        }
    }
}

/// Number of distinct targets a read aligned to
///
/// Persisted between the dictionary build and the unique-hit filter as
/// `read_id,hit_count` lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitCountRecord {
    pub read_id: String,
    pub hit_count: u32,
}

impl HitCountRecord {
    pub fn new(read_id: impl Into<String>, hit_count: u32) -> Self {
        HitCountRecord {
            read_id: read_id.into(),
            hit_count,
        }
    }

    #[inline]
    pub fn is_unique_hit(&self) -> bool {
        self.hit_count < UNIQUE_HIT_LIMIT
    }

    pub fn to_line(&self) -> String {
        format!("{},{}", self.read_id, self.hit_count)
    }

    /// Parse a `read_id,hit_count` line (trailing line terminators are ignored)
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\n', '\r']);
        let (read_id, count) = line.rsplit_once(',')?;
        if read_id.is_empty() {
            return None;
        }
        let hit_count = count.trim().parse().ok()?;
        Some(HitCountRecord::new(read_id, hit_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_hit_threshold() {
        assert!(HitCountRecord::new("A", 0).is_unique_hit());
        assert!(HitCountRecord::new("A", 1).is_unique_hit());
        assert!(!HitCountRecord::new("B", 2).is_unique_hit());
        assert!(!HitCountRecord::new("B", 3).is_unique_hit());
    }

    #[test]
    fn test_hit_count_line_format() {
        let record = HitCountRecord::new("SRR001.17", 3);
        assert_eq!(record.to_line(), "SRR001.17,3");
        assert_eq!(HitCountRecord::parse_line("SRR001.17,3\n"), Some(record));
    }

    #[test]
    fn test_hit_count_line_rejects_garbage() {
        assert_eq!(HitCountRecord::parse_line("no-comma"), None);
        assert_eq!(HitCountRecord::parse_line(",4"), None);
        assert_eq!(HitCountRecord::parse_line("R1,many"), None);
    }

    #[test]
    fn test_version_string() {
        let version = tip_version();
        assert!(version.contains("1.1.0"));
        assert!(version.contains("distributed"));
    }
}
