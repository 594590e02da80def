//! Run modes: where the process group lives.
//!
//! `thread` keeps every rank inside the current process on the channel
//! substrate: cheap, deterministic, what the test suite uses. `process`
//! spawns one OS process per worker over the pipe substrate, which is the
//! production shape.

use std::thread;

use chromabound_core::Graph;
use chromabound_ipc::channel_group;
use clap::ValueEnum;
use tracing::debug;

use crate::coordinator::{run_coordinator, EngineError, Outcome};
use crate::worker::{run_worker, WorkerSummary};

/// Transport substrate selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunMode {
    /// One OS process per worker (pipes).
    Process,
    /// Every rank is a thread of this process (channels).
    Thread,
}

/// Runs the whole group in this process: the coordinator on the calling
/// thread, each worker (and its listener) on its own threads.
pub fn solve_threaded(
    graph: &Graph,
    workers: usize,
) -> Result<(Outcome, Vec<WorkerSummary>), EngineError> {
    let (coordinator, worker_sides) = channel_group(workers);
    thread::scope(|scope| {
        let handles: Vec<_> = worker_sides
            .into_iter()
            .map(|side| scope.spawn(move || run_worker(side.link, side.feed)))
            .collect();

        let outcome = run_coordinator(coordinator.link, coordinator.feed, graph);

        // When the coordinator bails out before dispatch (serial optimum or
        // a fault of its own), the dropped transport disconnects the
        // workers; that teardown is expected, not a second fault to report.
        let group_aborted = !matches!(&outcome, Ok(Outcome::Parallel { .. }));
        let mut summaries = Vec::new();
        for handle in handles {
            match handle.join() {
                Ok(Ok(summary)) => summaries.push(summary),
                Ok(Err(e)) if group_aborted => {
                    debug!(error = %e, "worker wound down after group abort");
                }
                Ok(Err(e)) => return Err(e),
                Err(_) if group_aborted => {}
                Err(_) => return Err(EngineError::ThreadPanic("worker")),
            }
        }
        outcome.map(|outcome| (outcome, summaries))
    })
}

/// Spawns `workers` copies of this binary and runs the coordinator against
/// them.
#[cfg(unix)]
pub fn solve_process(
    graph: &Graph,
    workers: usize,
    worker_args: &[String],
) -> Result<Outcome, EngineError> {
    let (coordinator, children) = chromabound_ipc::spawn_group(workers, worker_args)?;
    let outcome = run_coordinator(coordinator.link, coordinator.feed, graph)?;
    match &outcome {
        // Workers never got past their initial receive; dropping the guard
        // kills them, which is the documented group abort.
        Outcome::Serial { .. } => drop(children),
        Outcome::Parallel { .. } => children.wait_all()?,
    }
    Ok(outcome)
}

/// Entry point for a spawned worker process.
#[cfg(unix)]
pub fn run_worker_process(rank: chromabound_ipc::Rank) -> Result<WorkerSummary, EngineError> {
    let worker = chromabound_ipc::worker_from_env(rank)?;
    run_worker(worker.link, worker.feed)
}
