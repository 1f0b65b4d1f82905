// Pool start-up: validate inputs, spawn the workers, run the coordinator

use crate::channel::create_pool;
use crate::config::PipelineConfig;
use crate::context::WorkerContext;
use crate::coordinator::coordinator_main;
use crate::manifest::validate_sample;
use crate::tools::Toolchain;
use crate::worker::{worker_main, WorkerInputs};
use std::fs;
use std::sync::Arc;
use std::thread;
use tip_common::{run_work_dir, Result, Sample, TipError};

/// Run the whole pipeline over `samples` with a pool of `config.pool_size` ranks
///
/// Nothing is spawned until the configuration and every sample have been
/// validated. On success every worker is joined; on failure the workers have
/// been sent an abort and are left to wind down on their own.
pub fn run_pipeline(
    config: PipelineConfig,
    samples: Vec<Sample>,
    tools: Arc<dyn Toolchain>,
) -> Result<()> {
    config.validate()?;
    if samples.is_empty() {
        return Err(TipError::config("no samples to process"));
    }
    for sample in &samples {
        validate_sample(sample)?;
    }

    if config.out_dir.is_dir() {
        log::warn!(
            "output directory {} already exists, existing results may be overwritten",
            config.out_dir.display()
        );
    }
    fs::create_dir_all(run_work_dir(&config.out_dir, &config.run_id))?;

    let timeout = config.phase_timeout;
    let inputs = WorkerInputs {
        config: Arc::new(config),
        samples: Arc::new(samples),
        tools,
    };

    let mut endpoints = create_pool(inputs.config.pool_size).into_iter();
    let coordinator_endpoint = endpoints
        .next()
        .ok_or_else(|| TipError::config("empty pool"))?;

    let mut handles = Vec::with_capacity(inputs.config.num_workers());
    for endpoint in endpoints {
        let rank = endpoint.rank();
        let ctx = WorkerContext::new(endpoint, None);
        let inputs = inputs.clone();
        let handle = thread::Builder::new()
            .name(format!("tip-rank-{rank}"))
            .spawn(move || worker_main(ctx, inputs))?;
        handles.push((rank, handle));
    }

    let mut ctx = WorkerContext::new(coordinator_endpoint, timeout);
    let result = coordinator_main(
        &mut ctx,
        &inputs.config,
        &inputs.samples,
        inputs.tools.as_ref(),
    );
    drop(ctx);

    match result {
        Ok(()) => {
            for (rank, handle) in handles {
                match handle.join() {
                    Ok(worker_result) => worker_result?,
                    Err(_) => {
                        return Err(TipError::protocol(format!("rank {rank} panicked")));
                    }
                }
            }
            log::info!("All samples done");
            Ok(())
        }
        Err(e) => {
            log::debug!("detaching {} worker threads", handles.len());
            Err(e)
        }
    }
}
