//! End-to-end runs of the four-phase protocol
//!
//! The external tools are replaced by an in-process toolchain so the full
//! coordinator/worker exchange runs without any installed binaries.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::{tempdir, TempDir};
use tip_common::{ErrorKind, Result, Sample, SampleFiles, TipError};
use tip_core::{run_pipeline, PipelineConfig, Toolchain};

/// Hits every read produces, as (target, start, end)
fn fixture_hits() -> HashMap<String, Vec<(&'static str, u64, u64)>> {
    let mut hits = HashMap::new();
    hits.insert("R1".to_string(), vec![("chr1", 100, 50), ("chr2", 10, 20)]);
    hits.insert("R2".to_string(), vec![("chr1", 5, 15)]);
    hits.insert("R3".to_string(), vec![("chr1", 300, 200)]);
    hits.insert("R4".to_string(), vec![("chr3", 1, 5)]);
    hits
}

const EXPECTED_SORTED_BED: &str = "chr1\t5\t15\tR2\nchr1\t200\t300\tR3\nchr3\t1\t5\tR4\n";
const EXPECTED_COVERAGE: &str = "chr1\t0\t10000\t2\n";

#[derive(Default)]
struct FakeToolchain {
    fail_search: bool,
    search_delay: Option<Duration>,
    /// Applied only to rank 1's search, so it reports last
    rank1_delay: Option<Duration>,
    panic_on_rank1: bool,
    /// Unified hit file and unsorted bed as seen by the last `sort`
    seen_hits: Mutex<Option<String>>,
    seen_bed: Mutex<Option<String>>,
}

fn is_rank1_file(path: &Path) -> bool {
    path.to_string_lossy().ends_with(".fa.1")
}

fn lines_of(path: &Path) -> Vec<String> {
    let file = fs::File::open(path).unwrap();
    BufReader::new(file).lines().map(|l| l.unwrap()).collect()
}

impl Toolchain for FakeToolchain {
    fn align(&self, forward: &Path, _reverse: &Path, alignment_out: &Path) -> Result<()> {
        fs::copy(forward, alignment_out)?;
        Ok(())
    }

    fn filter_alignments(&self, alignment: &Path, queries_out: &Path) -> Result<u64> {
        let lines = lines_of(alignment);
        let mut out = fs::File::create(queries_out)?;
        let mut kept = 0;
        for record in lines.chunks(4) {
            let id = record[0].trim_start_matches('@');
            writeln!(out, ">{}\n{}", id, record[1])?;
            kept += 1;
        }
        Ok(kept)
    }

    fn search(&self, queries: &Path, hits_out: &Path) -> Result<()> {
        if let Some(delay) = self.search_delay {
            thread::sleep(delay);
        }
        if is_rank1_file(queries) {
            if self.panic_on_rank1 {
                panic!("search crashed on {}", queries.display());
            }
            if let Some(delay) = self.rank1_delay {
                thread::sleep(delay);
            }
        }
        if self.fail_search {
            return Err(TipError::external_tool("blastn", "exited with status 2"));
        }
        let hits = fixture_hits();
        let mut out = fs::File::create(hits_out)?;
        for line in lines_of(queries) {
            if let Some(id) = line.strip_prefix('>') {
                for (target, start, end) in hits.get(id).into_iter().flatten() {
                    writeln!(out, "{target}\t{start}\t{end}\t{id}")?;
                }
            }
        }
        Ok(())
    }

    fn sort(&self, bed: &Path, sorted_out: &Path) -> Result<()> {
        *self.seen_bed.lock().unwrap() = Some(fs::read_to_string(bed)?);
        *self.seen_hits.lock().unwrap() = Some(fs::read_to_string(bed.with_extension("fa.bl"))?);

        let mut records: Vec<(String, u64, String)> = lines_of(bed)
            .into_iter()
            .map(|line| {
                let cols: Vec<&str> = line.split('\t').collect();
                (cols[0].to_string(), cols[1].parse().unwrap(), line.clone())
            })
            .collect();
        records.sort();
        let mut out = fs::File::create(sorted_out)?;
        for (_, _, line) in records {
            writeln!(out, "{line}")?;
        }
        Ok(())
    }

    fn coverage(&self, sorted_bed: &Path, counts_out: &Path) -> Result<()> {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for line in lines_of(sorted_bed) {
            let target = line.split('\t').next().unwrap().to_string();
            *counts.entry(target).or_default() += 1;
        }
        let mut out = fs::File::create(counts_out)?;
        for (target, count) in counts {
            writeln!(out, "{target}\t0\t10000\t{count}")?;
        }
        Ok(())
    }
}

fn write_fastq(path: &Path, ids: &[&str]) {
    let text: String = ids
        .iter()
        .map(|id| format!("@{id}\nACGTACGTAC\n+\nIIIIIIIIII\n"))
        .collect();
    fs::write(path, text).unwrap();
}

struct Fixture {
    dir: TempDir,
    config: PipelineConfig,
}

impl Fixture {
    fn new(pool_size: usize) -> Self {
        let dir = tempdir().unwrap();
        let windows = dir.path().join("windows.bed");
        fs::write(&windows, "chr1\t0\t10000\nchr3\t0\t10000\n").unwrap();

        let config = PipelineConfig {
            out_dir: dir.path().join("out"),
            te_name: "Gypsy".into(),
            windows,
            pool_size,
            memory_budget: 1 << 30,
            run_id: "test".into(),
            ..PipelineConfig::default()
        };
        Fixture { dir, config }
    }

    fn sample(&self, name: &str, forward_ids: &[&str], reverse_ids: &[&str]) -> Sample {
        let forward = self.dir.path().join(format!("{name}_1.fq"));
        let reverse = self.dir.path().join(format!("{name}_2.fq"));
        write_fastq(&forward, forward_ids);
        write_fastq(&reverse, reverse_ids);
        Sample::new(name, forward, reverse)
    }

    fn files(&self, sample: &str) -> SampleFiles {
        SampleFiles::new(&self.config.out_dir, &self.config.run_id, sample, &self.config.te_name)
    }

    fn work_dir(&self) -> PathBuf {
        self.config.out_dir.join(".tipfinder-test")
    }
}

const READS: [&str; 4] = ["R1", "R2", "R3", "R4"];

#[test]
fn test_full_run_is_independent_of_pool_size() {
    for pool_size in [2, 3, 5, 6] {
        let fixture = Fixture::new(pool_size);
        let samples = vec![
            fixture.sample("ind1", &READS, &READS),
            fixture.sample("ind2", &READS, &READS),
        ];

        run_pipeline(
            fixture.config.clone(),
            samples,
            Arc::new(FakeToolchain::default()),
        )
        .unwrap_or_else(|e| panic!("pool {pool_size}: {e}"));

        for name in ["ind1", "ind2"] {
            let files = fixture.files(name);
            assert_eq!(
                fs::read_to_string(files.sorted_bed_file()).unwrap(),
                EXPECTED_SORTED_BED,
                "pool {pool_size}, sample {name}"
            );
            assert_eq!(
                fs::read_to_string(files.coverage_file()).unwrap(),
                EXPECTED_COVERAGE,
                "pool {pool_size}, sample {name}"
            );
        }
        assert!(!fixture.work_dir().exists(), "pool {pool_size}: work dir left behind");
    }
}

#[test]
fn test_sample_without_hits() {
    let fixture = Fixture::new(3);
    let samples = vec![fixture.sample("empty", &["X1", "X2", "X3"], &["X1", "X2", "X3"])];

    run_pipeline(fixture.config.clone(), samples, Arc::new(FakeToolchain::default())).unwrap();

    let files = fixture.files("empty");
    assert_eq!(fs::read_to_string(files.sorted_bed_file()).unwrap(), "");
    assert_eq!(fs::read_to_string(files.coverage_file()).unwrap(), "");
}

#[test]
fn test_near_zero_memory_budget_fails_run() {
    let mut fixture = Fixture::new(3);
    fixture.config.memory_budget = 1;
    let samples = vec![fixture.sample("ind1", &READS, &READS)];

    let err = run_pipeline(fixture.config.clone(), samples, Arc::new(FakeToolchain::default()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceExhaustion);
    assert!(matches!(err, TipError::WorkerFailed { rank: 1, .. }));

    let files = fixture.files("ind1");
    assert!(!files.bed_file().exists());
    assert!(!files.sorted_bed_file().exists());
    assert!(!files.coverage_file().exists());
}

#[test]
fn test_tool_failure_ends_run_without_hanging() {
    let fixture = Fixture::new(4);
    let samples = vec![fixture.sample("ind1", &READS, &READS)];
    let tools = FakeToolchain {
        fail_search: true,
        ..FakeToolchain::default()
    };

    let err = run_pipeline(fixture.config.clone(), samples, Arc::new(tools)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalTool);
    assert!(err.to_string().contains("blastn"));
    assert!(!fixture.files("ind1").sorted_bed_file().exists());
}

#[test]
fn test_coordinator_times_out_on_slow_worker() {
    let mut fixture = Fixture::new(2);
    fixture.config.phase_timeout = Some(Duration::from_millis(50));
    let samples = vec![fixture.sample("ind1", &READS, &READS)];
    let tools = FakeToolchain {
        search_delay: Some(Duration::from_millis(500)),
        ..FakeToolchain::default()
    };

    let err = run_pipeline(fixture.config.clone(), samples, Arc::new(tools)).unwrap_err();
    assert!(matches!(err, TipError::Timeout { rank: 0, .. }));
}

#[test]
fn test_pool_of_one_is_rejected_before_work() {
    let fixture = Fixture::new(1);
    let samples = vec![fixture.sample("ind1", &READS, &READS)];

    let err = run_pipeline(fixture.config.clone(), samples, Arc::new(FakeToolchain::default()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(!fixture.config.out_dir.exists());
}

#[test]
fn test_unequal_read_files_are_inconsistent() {
    let fixture = Fixture::new(3);
    let samples = vec![fixture.sample("ind1", &READS, &READS[..3])];

    let err = run_pipeline(fixture.config.clone(), samples, Arc::new(FakeToolchain::default()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Consistency);
}

#[test]
fn test_missing_read_file_is_configuration_error() {
    let fixture = Fixture::new(3);
    let sample = Sample::new(
        "ghost",
        fixture.dir.path().join("ghost_1.fq"),
        fixture.dir.path().join("ghost_2.fq"),
    );

    let err = run_pipeline(fixture.config.clone(), vec![sample], Arc::new(FakeToolchain::default()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_memory_exhaustion_is_always_reported_by_rank_1() {
    // every worker of the pool runs out of memory at about the same time
    for attempt in 0..10 {
        let mut fixture = Fixture::new(6);
        fixture.config.memory_budget = 1;
        let samples = vec![fixture.sample("ind1", &READS, &READS)];

        let err = run_pipeline(fixture.config.clone(), samples, Arc::new(FakeToolchain::default()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhaustion, "attempt {attempt}");
        assert!(
            matches!(err, TipError::WorkerFailed { rank: 1, .. }),
            "attempt {attempt}: reported by {err:?}"
        );
        assert!(err.to_string().contains("rank 1"), "attempt {attempt}: {err}");
    }
}

#[test]
fn test_panicking_worker_fails_run_instead_of_hanging() {
    let fixture = Fixture::new(3);
    assert!(fixture.config.phase_timeout.is_none());
    let samples = vec![fixture.sample("ind1", &READS, &READS)];
    let tools = FakeToolchain {
        panic_on_rank1: true,
        ..FakeToolchain::default()
    };

    let started = Instant::now();
    let err = run_pipeline(fixture.config.clone(), samples, Arc::new(tools)).unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(30));
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(matches!(err, TipError::WorkerFailed { rank: 1, .. }));
    assert!(err.to_string().contains("panicked"), "{err}");
    assert!(!fixture.files("ind1").sorted_bed_file().exists());
}

#[test]
fn test_merges_follow_rank_order_not_arrival_order() {
    let fixture = Fixture::new(3);
    let reads = ["R3", "R4", "R1", "R2"];
    let samples = vec![fixture.sample("ind1", &reads, &reads)];
    let tools = Arc::new(FakeToolchain {
        rank1_delay: Some(Duration::from_millis(300)),
        ..FakeToolchain::default()
    });

    run_pipeline(fixture.config.clone(), samples, tools.clone()).unwrap();

    assert_eq!(
        tools.seen_hits.lock().unwrap().as_deref(),
        Some("chr1\t300\t200\tR3\nchr3\t1\t5\tR4\nchr1\t100\t50\tR1\nchr2\t10\t20\tR1\nchr1\t5\t15\tR2\n")
    );
    assert_eq!(
        tools.seen_bed.lock().unwrap().as_deref(),
        Some("chr1\t200\t300\tR3\nchr3\t1\t5\tR4\nchr1\t5\t15\tR2\n")
    );
    assert_eq!(
        fs::read_to_string(fixture.files("ind1").sorted_bed_file()).unwrap(),
        EXPECTED_SORTED_BED
    );
}
