// Worker task executor
//
// A worker runs the same per-sample phase sequence as the coordinator, waiting
// for each phase start, working on its own partition and handing its partial
// result back. It never touches another rank's files and deletes its own
// scratch files before acknowledging.

use crate::config::PipelineConfig;
use crate::context::WorkerContext;
use crate::fastq;
use crate::hit_index::{build_partial_index, filter_unique_hits, load_unique_reads};
use crate::line_io;
use crate::memory_guard::{GuardedReadSet, MemoryGuard};
use crate::message::Message;
use crate::partition::Partition;
use crate::phase::Phase;
use crate::tools::Toolchain;
use std::any::Any;
use std::fs::File;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tip_common::{Rank, Result, Sample, SampleFiles, TipError, COORDINATOR_RANK};

/// Everything a worker needs besides its context
#[derive(Clone)]
pub struct WorkerInputs {
    pub config: Arc<PipelineConfig>,
    pub samples: Arc<Vec<Sample>>,
    pub tools: Arc<dyn Toolchain>,
}

/// Run every sample to completion; on failure, report it to the coordinator
///
/// A panic inside a phase is reported like any other failure, so the
/// coordinator is never left waiting on a rank that has died.
pub fn worker_main(mut ctx: WorkerContext, inputs: WorkerInputs) -> Result<()> {
    let rank = ctx.rank();
    let result = panic::catch_unwind(AssertUnwindSafe(|| run_samples(&mut ctx, &inputs)))
        .unwrap_or_else(|payload| {
            Err(TipError::protocol(format!(
                "rank {} panicked: {}",
                rank,
                panic_message(payload.as_ref())
            )))
        });

    match &result {
        Ok(()) => log::debug!("[rank {}] all samples done", rank),
        Err(TipError::Aborted) => log::debug!("[rank {}] stopping on abort", rank),
        Err(e) => {
            // the coordinator prints the run's single diagnostic
            log::debug!("[rank {}] {}", rank, e);
            let report = Message::Failure {
                kind: e.kind(),
                message: e.to_string(),
            };
            if ctx.send_to_coordinator(report, false).is_err() {
                log::debug!("[rank {}] coordinator gone, failure not delivered", rank);
            }
        }
    }
    result
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

fn run_samples(ctx: &mut WorkerContext, inputs: &WorkerInputs) -> Result<()> {
    let config = inputs.config.as_ref();
    for sample in inputs.samples.iter() {
        let files = SampleFiles::new(&config.out_dir, &config.run_id, &sample.name, &config.te_name);
        process_sample(ctx, config, sample, &files, inputs.tools.as_ref())?;
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
    let rank = ctx.rank();

    // Phase 1: align, filter and search this rank's read slice
    let reads = expect_start(ctx, Phase::AlignSearch)?;
    let part = ctx.partition(reads)?;
    log::debug!(
        "[rank {}] {}: reads [{}, {})",
        rank,
        sample.name,
        part.start,
        part.end
    );
    align_and_search(rank, sample, files, tools, &part)?;
    ctx.send_to_coordinator(Message::Ack(Phase::AlignSearch), false)?;

    // Phase 2: index this rank's lines of the unified hit file
    let hit_lines = expect_start(ctx, Phase::BuildIndex)?;
    let lines = ctx.partition(hit_lines)?;
    let index = build_partial_index(&files.hit_file(), lines.range())?;
    log::debug!(
        "[rank {}] {}: {} reads indexed from lines [{}, {})",
        rank,
        sample.name,
        index.len(),
        lines.start,
        lines.end
    );
    ctx.send_to_coordinator(Message::PartialIndex(index), true)?;

    // Phase 3: keep hits of unique-hit reads on the same lines
    expect_trigger(ctx, Phase::FilterUnique)?;
    let budget = MemoryGuard::per_worker_budget(config.memory_budget, ctx.pool_size());
    let mut unique = GuardedReadSet::new(MemoryGuard::new(rank, budget));
    load_unique_reads(&files.hit_count_file(), &mut unique)?;
    let kept = filter_unique_hits(&files.hit_file(), lines.range(), &unique)?;
    log::debug!(
        "[rank {}] {}: {} unique-hit reads (~{} bytes), {} lines kept",
        rank,
        sample.name,
        unique.len(),
        unique.estimated_bytes(),
        kept.len()
    );
    drop(unique);
    ctx.send_to_coordinator(Message::PartialLines(kept), true)
}

/// Produce this rank's partial hit file; scratch files are removed on every path
fn align_and_search(
    rank: Rank,
    sample: &Sample,
    files: &SampleFiles,
    tools: &dyn Toolchain,
    part: &Partition,
) -> Result<()> {
    let partial_hits = files.partial_hit_file(rank);
    if part.is_empty() {
        File::create(&partial_hits)?;
        return Ok(());
    }

    let scratch = [
        files.forward_slice(rank),
        files.reverse_slice(rank),
        files.alignment_file(rank),
        files.query_file(rank),
    ];
    let [forward, reverse, alignment, queries] = &scratch;

    let result = (|| -> Result<()> {
        fastq::write_read_slice(&sample.forward, forward, part)?;
        fastq::write_read_slice(&sample.reverse, reverse, part)?;
        tools.align(forward, reverse, alignment)?;

        let candidates = tools.filter_alignments(alignment, queries)?;
        if candidates == 0 {
            log::debug!("[rank {}] {}: no read with one unmapped mate", rank, sample.name);
            File::create(&partial_hits)?;
            return Ok(());
        }
        tools.search(queries, &partial_hits)
    })();

    for path in &scratch {
        line_io::discard(path);
    }
    result
}

fn expect_start(ctx: &mut WorkerContext, phase: Phase) -> Result<u64> {
    match ctx.receive_blocking(Some(COORDINATOR_RANK))?.0 {
        Message::Start { phase: p, total } if p == phase => Ok(total),
        other => Err(unexpected(ctx, phase, other)),
    }
}

fn expect_trigger(ctx: &mut WorkerContext, phase: Phase) -> Result<()> {
    match ctx.receive_blocking(Some(COORDINATOR_RANK))?.0 {
        Message::Trigger(p) if p == phase => Ok(()),
        other => Err(unexpected(ctx, phase, other)),
    }
}

fn unexpected(ctx: &WorkerContext, phase: Phase, message: Message) -> TipError {
    match message {
        Message::Abort => TipError::Aborted,
        other => TipError::protocol(format!(
            "rank {} expected the {} phase to start, got {}",
            ctx.rank(),
            phase,
            other.name()
        )),
    }
}
