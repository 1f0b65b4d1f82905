// Sample manifest: one `name,forward_reads,reverse_reads` line per sample

use crate::fastq::is_fastq_path;
use std::fs;
use std::path::Path;
use tip_common::{Result, Sample, TipError};

/// Parse manifest text; blank lines are skipped, order is kept
pub fn parse_manifest(text: &str) -> Result<Vec<Sample>> {
    let mut samples = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 3 || fields.iter().any(|f| f.is_empty()) {
            return Err(TipError::config(format!(
                "manifest line {}: expected 'sample_name,forward_reads,reverse_reads', found '{}'",
                i + 1,
                line
            )));
        }
        samples.push(Sample::new(fields[0], fields[1], fields[2]));
    }
    Ok(samples)
}

pub fn read_manifest(path: &Path) -> Result<Vec<Sample>> {
    let text = fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => TipError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => TipError::Io(e),
    })?;
    let samples = parse_manifest(&text)?;
    if samples.is_empty() {
        return Err(TipError::config(format!(
            "manifest {} lists no samples",
            path.display()
        )));
    }
    Ok(samples)
}

/// The sample name must be a single path component; both read files must
/// carry a FASTQ extension and exist
pub fn validate_sample(sample: &Sample) -> Result<()> {
    check_sample_name(&sample.name)?;
    for path in [&sample.forward, &sample.reverse] {
        if !is_fastq_path(path) {
            return Err(TipError::config(format!(
                "sample {}: unrecognized extension on {}, expected .fastq or .fq (optionally .gz)",
                sample.name,
                path.display()
            )));
        }
        if !path.is_file() {
            return Err(TipError::FileNotFound { path: path.clone() });
        }
    }
    Ok(())
}

/// Sample names become file and directory names under the output directory
fn check_sample_name(name: &str) -> Result<()> {
    let unsafe_name = name.is_empty()
        || name == "."
        || name.contains("..")
        || name.chars().any(std::path::is_separator);
    if unsafe_name {
        return Err(TipError::config(format!(
            "sample name '{name}' must be a plain file name, without path separators or '..'"
        )));
    }
    Ok(())
}
