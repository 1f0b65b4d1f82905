//! External collaborators and the record filters applied to their output.
//!
//! The pipeline drives five tools: a paired short-read aligner, an
//! alignment-map reader, a local-sequence search, a genomic sort and a
//! windowed coverage counter. [`Toolchain`] is the seam between the phase
//! logic and the processes; [`ShellToolchain`] runs the real executables.
//!
//! Every tool must exit with status 0 and leave its output file behind. An
//! empty output file is a valid result.

use crate::config::{PipelineConfig, SearchAlgorithm, ToolPaths};
use crate::line_io;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use tip_common::{with_suffix, Result, TipError};

/// SAM flags of pairs with exactly one mate mapped to the TE
pub const ONE_MATE_UNMAPPED_FLAGS: [u32; 6] = [69, 133, 165, 181, 101, 117];

/// The external steps of the pipeline
pub trait Toolchain: Send + Sync {
    /// Align a read-pair slice against the TE index, writing an alignment map
    fn align(&self, forward: &Path, reverse: &Path, alignment_out: &Path) -> Result<()>;

    /// Write reads with one unmapped mate as FASTA queries; returns the count
    fn filter_alignments(&self, alignment: &Path, queries_out: &Path) -> Result<u64>;

    /// Search queries against the reference, writing `target\tstart\tend\tread` lines
    fn search(&self, queries: &Path, hits_out: &Path) -> Result<()>;

    /// Sort a bed file by target then numeric start
    fn sort(&self, bed: &Path, sorted_out: &Path) -> Result<()>;

    /// Count features of `sorted_bed` per window, one `window\tcount` line each
    fn coverage(&self, sorted_bed: &Path, counts_out: &Path) -> Result<()>;
}

/// Runs the real executables
#[derive(Debug, Clone)]
pub struct ShellToolchain {
    tools: ToolPaths,
    aligner_index: PathBuf,
    search_db: PathBuf,
    windows: PathBuf,
    algorithm: SearchAlgorithm,
}

impl ShellToolchain {
    pub fn new(config: &PipelineConfig) -> Self {
        ShellToolchain {
            tools: config.tools.clone(),
            aligner_index: config.aligner_index.clone(),
            search_db: config.search_db.clone(),
            windows: config.windows.clone(),
            algorithm: config.algorithm,
        }
    }
}

fn tool_name(program: &Path) -> String {
    program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string())
}

fn spawn(command: &mut Command) -> Result<Child> {
    let tool = tool_name(Path::new(command.get_program()));
    log::debug!("running {:?}", command);
    command
        .spawn()
        .map_err(|e| TipError::external_tool(tool, format!("could not start: {e}")))
}

fn check_status(program: &Path, status: ExitStatus) -> Result<()> {
    if status.success() {
        return Ok(());
    }
    let reason = match status.code() {
        Some(code) => format!("exited with status {code}"),
        None => "killed by a signal".to_string(),
    };
    Err(TipError::external_tool(tool_name(program), reason))
}

fn require_output(program: &Path, output: &Path) -> Result<()> {
    if output.is_file() {
        Ok(())
    } else {
        Err(TipError::external_tool(
            tool_name(program),
            format!("expected output {} was not produced", output.display()),
        ))
    }
}

/// Run a command to completion, with stdout discarded unless redirected
fn run_tool(program: &Path, command: &mut Command) -> Result<()> {
    let status = spawn(command.stdin(Stdio::null()).stderr(Stdio::null()))?.wait()?;
    check_status(program, status)
}

impl Toolchain for ShellToolchain {
    fn align(&self, forward: &Path, reverse: &Path, alignment_out: &Path) -> Result<()> {
        let mut aligner = spawn(
            Command::new(&self.tools.bowtie2)
                .args(["--end-to-end", "-k", "1", "--very-fast", "-p", "1", "-x"])
                .arg(&self.aligner_index)
                .arg("-1")
                .arg(forward)
                .arg("-2")
                .arg(reverse)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::null()),
        )?;
        let sam = aligner.stdout.take().ok_or_else(|| {
            TipError::external_tool(tool_name(&self.tools.bowtie2), "no output stream")
        })?;

        let converter_status = File::create(alignment_out)
            .map_err(TipError::from)
            .and_then(|out| {
                spawn(
                    Command::new(&self.tools.samtools)
                        .args(["view", "-b", "-S", "-"])
                        .stdin(sam)
                        .stdout(out)
                        .stderr(Stdio::null()),
                )
            })
            .and_then(|mut converter| converter.wait().map_err(TipError::from));
        let converter_status = match converter_status {
            Ok(status) => status,
            Err(e) => {
                // the aligner would otherwise outlive the failed step
                let _ = aligner.kill();
                let _ = aligner.wait();
                return Err(e);
            }
        };
        let aligner_status = aligner.wait()?;

        check_status(&self.tools.bowtie2, aligner_status)?;
        check_status(&self.tools.samtools, converter_status)?;
        require_output(&self.tools.samtools, alignment_out)
    }

    fn filter_alignments(&self, alignment: &Path, queries_out: &Path) -> Result<u64> {
        let mut reader = spawn(
            Command::new(&self.tools.samtools)
                .arg("view")
                .arg(alignment)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::null()),
        )?;
        let sam = reader.stdout.take().ok_or_else(|| {
            TipError::external_tool(tool_name(&self.tools.samtools), "no output stream")
        })?;

        let mut writer = line_io::create_text(queries_out)?;
        let kept = write_unmapped_queries(BufReader::new(sam), &mut writer);
        let status = reader.wait()?;
        let kept = kept?;
        writer.flush()?;
        check_status(&self.tools.samtools, status)?;
        Ok(kept)
    }

    fn search(&self, queries: &Path, hits_out: &Path) -> Result<()> {
        match self.algorithm {
            SearchAlgorithm::Blast => {
                run_tool(
                    &self.tools.blastn,
                    Command::new(&self.tools.blastn)
                        .arg("-db")
                        .arg(&self.search_db)
                        .arg("-query")
                        .arg(queries)
                        .arg("-out")
                        .arg(hits_out)
                        .args([
                            "-outfmt",
                            "6 sseqid sstart send qseqid",
                            "-num_threads",
                            "1",
                            "-evalue",
                            "1e-20",
                        ])
                        .stdout(Stdio::null()),
                )?;
                require_output(&self.tools.blastn, hits_out)
            }
            SearchAlgorithm::Magic => {
                let raw = with_suffix(hits_out, "magic");
                run_tool(
                    &self.tools.magicblast,
                    Command::new(&self.tools.magicblast)
                        .arg("-db")
                        .arg(&self.search_db)
                        .arg("-query")
                        .arg(queries)
                        .arg("-out")
                        .arg(&raw)
                        .args(["-outfmt", "tabular", "-num_threads", "1", "-perc_identity", "100"])
                        .stdout(Stdio::null()),
                )?;
                require_output(&self.tools.magicblast, &raw)?;
                let converted = convert_magic_hits(&raw, hits_out);
                line_io::discard(&raw);
                converted.map(|_| ())
            }
        }
    }

    fn sort(&self, bed: &Path, sorted_out: &Path) -> Result<()> {
        run_tool(
            &self.tools.sort,
            Command::new(&self.tools.sort)
                .args(["-k1,1", "-k2,2n"])
                .arg(bed)
                .arg("-o")
                .arg(sorted_out)
                .env("LC_ALL", "C")
                .stdout(Stdio::null()),
        )?;
        require_output(&self.tools.sort, sorted_out)
    }

    fn coverage(&self, sorted_bed: &Path, counts_out: &Path) -> Result<()> {
        run_tool(
            &self.tools.bedtools,
            Command::new(&self.tools.bedtools)
                .args(["coverage", "-counts", "-nonamecheck", "-a"])
                .arg(&self.windows)
                .arg("-b")
                .arg(sorted_bed)
                .stdout(File::create(counts_out)?),
        )?;
        require_output(&self.tools.bedtools, counts_out)
    }
}

/// Keep alignment records of pairs with one unmapped mate, written as
/// `>name\nsequence\n`; header lines are skipped. Returns records kept.
pub fn write_unmapped_queries<R: BufRead, W: Write>(reader: R, writer: &mut W) -> Result<u64> {
    let mut kept = 0u64;
    for line in reader.lines() {
        let line = line?;
        if line.starts_with('@') || line.is_empty() {
            continue;
        }
        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() < 10 {
            continue;
        }
        let keep = columns[1]
            .parse::<u32>()
            .is_ok_and(|flag| ONE_MATE_UNMAPPED_FLAGS.contains(&flag));
        if keep {
            writeln!(writer, ">{}\n{}", columns[0], columns[9])?;
            kept += 1;
        }
    }
    Ok(kept)
}

/// Convert magic-aligner tabular output to unified hit lines
///
/// Lines starting with `#` are headers. Records without a target (`-`) are
/// dropped; the rest become `subject\tstart\tend\tquery` (columns 2, 9, 10, 1).
pub fn convert_magic_hits(raw: &Path, hits_out: &Path) -> Result<u64> {
    let mut writer = line_io::create_text(hits_out)?;
    let mut converted = 0u64;
    line_io::scan_lines(raw, 0..u64::MAX, |i, line| {
        if line.starts_with('#') || line.trim().is_empty() {
            return Ok(());
        }
        let columns: Vec<&str> = line.split_whitespace().collect();
        if columns.len() < 10 {
            return Err(TipError::parse(
                raw,
                i + 1,
                format!("expected at least 10 columns, found {}", columns.len()),
            ));
        }
        if columns[1] == "-" {
            return Ok(());
        }
        writeln!(
            writer,
            "{}\t{}\t{}\t{}",
            columns[1], columns[8], columns[9], columns[0]
        )?;
        converted += 1;
        Ok(())
    })?;
    writer.flush()?;
    Ok(converted)
}

/// Keep coverage lines whose feature count (4th column) is at least `min_count`
pub fn filter_coverage(raw: &Path, out: &Path, min_count: u64) -> Result<u64> {
    let mut writer = line_io::create_text(out)?;
    let mut kept = 0u64;
    line_io::scan_lines(raw, 0..u64::MAX, |i, line| {
        if line.is_empty() {
            return Ok(());
        }
        let count = line
            .split('\t')
            .nth(3)
            .and_then(|c| c.trim().parse::<u64>().ok())
            .ok_or_else(|| TipError::parse(raw, i + 1, "missing feature count column"))?;
        if count >= min_count {
            writeln!(writer, "{line}")?;
            kept += 1;
        }
        Ok(())
    })?;
    writer.flush()?;
    Ok(kept)
}
