// Paired FASTQ handling: validation, read counting and slicing

use crate::line_io;
use crate::partition::Partition;
use std::path::Path;
use tip_common::{Result, Sample, TipError, LINES_PER_READ};

/// Extensions accepted for read files, optionally followed by `.gz`
pub const FASTQ_EXTENSIONS: [&str; 2] = ["fastq", "fq"];

/// True when the path names a FASTQ file (`x.fq`, `x.fastq`, `x.fq.gz`, ...)
pub fn is_fastq_path(path: &Path) -> bool {
    let stem_path = if line_io::is_gzip(path) {
        match path.file_stem() {
            Some(stem) => Path::new(stem),
            None => return false,
        }
    } else {
        path
    };
    stem_path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| FASTQ_EXTENSIONS.contains(&ext))
}

/// Number of read pairs in a sample
///
/// Both files must have the same line count and that count must be a whole
/// number of four-line records.
pub fn count_read_pairs(sample: &Sample) -> Result<u64> {
    let forward_lines = line_io::count_lines(&sample.forward)?;
    let reverse_lines = line_io::count_lines(&sample.reverse)?;

    if forward_lines != reverse_lines {
        return Err(TipError::consistency(format!(
            "processing {}: forward and reverse files have different lengths ({} vs {} lines)",
            sample.name, forward_lines, reverse_lines
        )));
    }
    if forward_lines % LINES_PER_READ != 0 {
        return Err(TipError::consistency(format!(
            "processing {}: {} lines is not a whole number of FASTQ records",
            sample.name, forward_lines
        )));
    }

    Ok(forward_lines / LINES_PER_READ)
}

/// Write the reads of `part` from `src` to a plain FASTQ file
pub fn write_read_slice(src: &Path, dst: &Path, part: &Partition) -> Result<u64> {
    let copied = line_io::copy_line_range(src, dst, part.read_lines())?;
    Ok(copied / LINES_PER_READ)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn fastq(reads: &[&str]) -> String {
        reads
            .iter()
            .map(|id| format!("@{id}\nACGTACGT\n+\nIIIIIIII\n"))
            .collect()
    }

    #[test]
    fn test_fastq_extensions() {
        assert!(is_fastq_path(Path::new("a/ind1_1.fastq")));
        assert!(is_fastq_path(Path::new("ind1_1.fq")));
        assert!(is_fastq_path(Path::new("ind1_1.fq.gz")));
        assert!(is_fastq_path(Path::new("ind1_1.fastq.gz")));
        assert!(!is_fastq_path(Path::new("ind1_1.fa")));
        assert!(!is_fastq_path(Path::new("ind1_1.gz")));
        assert!(!is_fastq_path(Path::new("ind1_1")));
    }

    #[test]
    fn test_count_pairs() {
        let dir = tempdir().unwrap();
        let fwd = dir.path().join("s_1.fq");
        let rev = dir.path().join("s_2.fq");
        fs::write(&fwd, fastq(&["r1", "r2", "r3"])).unwrap();
        fs::write(&rev, fastq(&["r1", "r2", "r3"])).unwrap();

        let sample = Sample::new("s", &fwd, &rev);
        assert_eq!(count_read_pairs(&sample).unwrap(), 3);
    }

    #[test]
    fn test_unequal_pairs_are_inconsistent() {
        let dir = tempdir().unwrap();
        let fwd = dir.path().join("s_1.fq");
        let rev = dir.path().join("s_2.fq");
        fs::write(&fwd, fastq(&["r1", "r2"])).unwrap();
        fs::write(&rev, fastq(&["r1"])).unwrap();

        let err = count_read_pairs(&Sample::new("s", &fwd, &rev)).unwrap_err();
        assert_eq!(err.kind(), tip_common::ErrorKind::Consistency);
    }

    #[test]
    fn test_slice_reads() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("s_1.fq");
        let dst = dir.path().join("slice.fq");
        fs::write(&src, fastq(&["r1", "r2", "r3", "r4"])).unwrap();

        let part = Partition {
            worker_index: 0,
            start: 1,
            end: 3,
        };
        assert_eq!(write_read_slice(&src, &dst, &part).unwrap(), 2);
        assert_eq!(fs::read_to_string(&dst).unwrap(), fastq(&["r2", "r3"]));
    }
}
