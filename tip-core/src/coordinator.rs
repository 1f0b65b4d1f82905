// Coordinator (rank 0): phase broadcasts, barriers and rank-ordered merges
//
// Each worker phase ends with a gather that takes exactly one message from
// every worker. Results are slotted by sender rank, so merged files never
// depend on arrival order. A failure report from any worker ends the run:
// the coordinator broadcasts an abort and returns the worker's error.

use crate::config::PipelineConfig;
use crate::context::WorkerContext;
use crate::fastq;
use crate::hit_index::{write_hit_counts, ReadHitIndex};
use crate::line_io;
use crate::message::Message;
use crate::phase::Phase;
use crate::tools::{filter_coverage, Toolchain};
use std::fs;
use std::io::Write;
use std::time::Instant;
use tip_common::{
    run_work_dir, tip_version, ErrorKind, Result, Sample, SampleFiles, TipError, REPORTING_RANK,
};

/// Drive every sample through the four phases
///
/// On any error the workers are told to abort before the error is returned.
pub fn coordinator_main(
    ctx: &mut WorkerContext,
    config: &PipelineConfig,
    samples: &[Sample],
    tools: &dyn Toolchain,
) -> Result<()> {
    let result = run_samples(ctx, config, samples, tools);
    if let Err(e) = &result {
        log::debug!("coordinator failing run: {}", e);
        if ctx.broadcast(&Message::Abort).is_err() {
            log::debug!("some workers had already exited before the abort");
        }
    }
    result
}

fn run_samples(
    ctx: &mut WorkerContext,
    config: &PipelineConfig,
    samples: &[Sample],
    tools: &dyn Toolchain,
) -> Result<()> {
    log::info!("{}", tip_version());
    log::info!(
        "{} samples, {} workers, {:.2} GB memory budget, {} search",
        samples.len(),
        ctx.num_workers(),
        config.memory_budget_gb(),
        config.algorithm.as_str()
    );

    for sample in samples {
        let files = SampleFiles::new(&config.out_dir, &config.run_id, &sample.name, &config.te_name);
        process_sample(ctx, config, sample, &files, tools)?;
    }

    let work_dir = run_work_dir(&config.out_dir, &config.run_id);
    if let Err(e) = fs::remove_dir(&work_dir) {
        log::warn!("could not remove {}: {}", work_dir.display(), e);
    }
    Ok(())
}

fn process_sample(
    ctx: &mut WorkerContext,
    config: &PipelineConfig,
    sample: &Sample,
    files: &SampleFiles,
    tools: &dyn Toolchain,
) -> Result<()> {
    fs::create_dir_all(files.work_dir())?;
    let reads = fastq::count_read_pairs(sample)?;
    log::info!("Analyzing {} ({} read pairs)", sample.name, reads);

    // Phase 1: workers align and search their read slices
    let started = Instant::now();
    ctx.broadcast(&Message::Start {
        phase: Phase::AlignSearch,
        total: reads,
    })?;
    gather(ctx, Phase::AlignSearch, |m| {
        matches!(m, Message::Ack(Phase::AlignSearch)).then_some(())
    })?;
    let hit_file = files.hit_file();
    let hit_lines = merge_partial_hits(ctx, files)?;
    log_phase(sample, Phase::AlignSearch, started, hit_lines, "hits");

    // Phase 2: read hit index over the unified hit file
    let started = Instant::now();
    ctx.broadcast(&Message::Start {
        phase: Phase::BuildIndex,
        total: hit_lines,
    })?;
    let partials = gather(ctx, Phase::BuildIndex, |m| match m {
        Message::PartialIndex(index) => Some(index),
        _ => None,
    })?;
    let mut index = ReadHitIndex::new();
    for partial in partials {
        index.merge(partial);
    }
    let counts = index.into_hit_counts();
    write_hit_counts(&files.hit_count_file(), &counts)?;
    log_phase(sample, Phase::BuildIndex, started, counts.len() as u64, "reads");
    drop(counts);

    // Phase 3: unique-hit filter
    let started = Instant::now();
    ctx.broadcast(&Message::Trigger(Phase::FilterUnique))?;
    let parts = gather(ctx, Phase::FilterUnique, |m| match m {
        Message::PartialLines(lines) => Some(lines),
        _ => None,
    })?;
    let bed_file = files.bed_file();
    let mut writer = line_io::create_text(&bed_file)?;
    let mut intervals = 0u64;
    for lines in parts {
        for line in lines {
            writeln!(writer, "{line}")?;
            intervals += 1;
        }
    }
    writer.flush()?;
    drop(writer);
    line_io::discard(&files.hit_count_file());
    log_phase(sample, Phase::FilterUnique, started, intervals, "intervals");

    // Phase 4: coordinator alone
    let started = Instant::now();
    let sorted = files.sorted_bed_file();
    let raw_coverage = files.raw_coverage_file();
    tools.sort(&bed_file, &sorted)?;
    tools.coverage(&sorted, &raw_coverage)?;
    let windows = filter_coverage(&raw_coverage, &files.coverage_file(), config.min_window_count)?;
    log_phase(sample, Phase::PostProcess, started, windows, "windows");

    for path in [hit_file, bed_file, raw_coverage] {
        line_io::discard(&path);
    }
    if let Err(e) = fs::remove_dir(files.work_dir()) {
        log::warn!("could not remove {}: {}", files.work_dir().display(), e);
    }
    Ok(())
}

/// Concatenate the partial hit files in ascending rank order and delete them
fn merge_partial_hits(ctx: &WorkerContext, files: &SampleFiles) -> Result<u64> {
    let mut writer = line_io::create_text(&files.hit_file())?;
    let mut lines = 0u64;
    for rank in 1..ctx.pool_size() {
        let partial = files.partial_hit_file(rank);
        lines += line_io::append_lines(&partial, &mut writer).map_err(|e| match e {
            TipError::FileNotFound { path } => TipError::protocol(format!(
                "rank {} acknowledged without writing {}",
                rank,
                path.display()
            )),
            other => other,
        })?;
        line_io::discard(&partial);
    }
    writer.flush()?;
    Ok(lines)
}

/// Take one message from every worker and return the payloads in rank order
///
/// `extract` returns `None` for messages that do not belong to `phase`.
fn gather<T, F>(ctx: &mut WorkerContext, phase: Phase, mut extract: F) -> Result<Vec<T>>
where
    F: FnMut(Message) -> Option<T>,
{
    let workers = ctx.num_workers();
    let mut slots: Vec<Option<T>> = (0..workers).map(|_| None).collect();
    let mut exhausted: Option<TipError> = None;

    for _ in 0..workers {
        let (message, source) = ctx.receive(None)?;
        if let Message::Failure { kind, message } = message {
            let failure = TipError::WorkerFailed {
                rank: source,
                kind,
                message,
            };
            // Memory exhaustion hits every worker alike; rank 1 speaks for all
            if kind == ErrorKind::ResourceExhaustion && source != REPORTING_RANK {
                if exhausted.is_none() {
                    exhausted = Some(failure);
                }
                continue;
            }
            return Err(failure);
        }

        let name = message.name();
        let payload = extract(message).ok_or_else(|| {
            TipError::protocol(format!(
                "unexpected {} message from rank {} during the {} phase",
                name, source, phase
            ))
        })?;
        let slot = source
            .checked_sub(1)
            .and_then(|i| slots.get_mut(i))
            .ok_or_else(|| TipError::protocol(format!("message from unknown rank {source}")))?;
        if slot.is_some() {
            return Err(TipError::protocol(format!(
                "rank {} answered twice during the {} phase",
                source, phase
            )));
        }
        *slot = Some(payload);
    }

    if let Some(failure) = exhausted {
        return Err(failure);
    }
    Ok(slots.into_iter().flatten().collect())
}

fn log_phase(sample: &Sample, phase: Phase, started: Instant, count: u64, unit: &str) {
    log::info!(
        "{}: {} done, {} {}, time={:.2}s",
        sample.name,
        phase,
        count,
        unit,
        started.elapsed().as_secs_f64()
    );
}
