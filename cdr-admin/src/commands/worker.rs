//! `cdr-admin worker` and `cdr-admin sweep`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;

use cdr::config::Config;
use cdr::docs::WellFormedValidator;
use cdr::jobs::handlers::{self, GlobalChangeHandler, PublishHandler, UnpublishedReportHandler};
use cdr::jobs::{
    run_once, HandlerRegistry, JobOutcome, LoggingSink, PoolConfig, RetryPolicy, WorkerPool,
};
use cdr::{ProcessEngine, RequestContext, Session};

use super::emit;

#[derive(Debug, Args)]
pub struct WorkerArgs {
    /// Number of worker threads (defaults to the configured count)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Run at most one queued job, then exit
    #[arg(long)]
    pub once: bool,
}

fn handlers(ctx: &RequestContext, config: &Config) -> HandlerRegistry {
    let engine = Arc::new(ProcessEngine::from_config(&config.engine, &ctx.timeouts()));
    let validator = Arc::new(WellFormedValidator);
    let publish = PublishHandler::new(
        ctx.documents(),
        ctx.pipeline(engine, validator),
        ctx.ledger(),
        ctx.ledger_writer(),
    )
    .with_output_root(config.publishing.output_root.as_ref().map(PathBuf::from));
    handlers::builtin(
        publish,
        GlobalChangeHandler::new(ctx.documents()),
        UnpublishedReportHandler::new(ctx.documents()),
    )
}

fn report(outcome: &JobOutcome) {
    log::info!(
        "Job {} ({}) ended {}: {}",
        outcome.job_id,
        outcome.job_name,
        outcome.status,
        outcome.message
    );
}

pub fn run(args: &WorkerArgs, ctx: &RequestContext, config: &Config) -> Result<()> {
    let worker = ctx.for_session(Session::system());
    let controller = worker.jobs(Arc::new(LoggingSink));
    let registry = handlers(&worker, config);

    if args.once {
        match run_once(&controller, &registry, &RetryPolicy::from_config(&config.jobs))? {
            Some(outcome) => report(&outcome),
            None => log::info!("No queued jobs"),
        }
        return Ok(());
    }

    let mut pool_config = PoolConfig::from_config(&config.jobs);
    if let Some(n) = args.workers {
        pool_config.worker_count = n.max(1);
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("Failed to install Ctrl-C handler")?;

    log::info!("Starting {} batch workers", pool_config.worker_count);
    let pool = WorkerPool::start(controller, registry, pool_config);
    while !interrupted.load(Ordering::SeqCst) {
        if let Some(outcome) = pool.recv_result_timeout(Duration::from_millis(500)) {
            report(&outcome);
        }
    }

    log::info!("Interrupted; waiting for running jobs to finish");
    pool.shutdown();
    for outcome in pool.drain_results(Duration::from_millis(100)) {
        report(&outcome);
    }
    pool.wait();
    Ok(())
}

pub fn sweep(ctx: &RequestContext, json: bool) -> Result<()> {
    let failed = ctx
        .for_session(Session::system())
        .jobs(Arc::new(LoggingSink))
        .sweep_stale(Utc::now())?;
    emit(&failed, json, |ids| {
        if ids.is_empty() {
            println!("No stalled jobs");
        } else {
            for id in ids {
                println!("Failed stalled job {}", id);
            }
        }
    })
}
