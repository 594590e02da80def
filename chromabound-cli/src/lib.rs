#![warn(missing_docs)]
//! Command-line front end for the chromabound solver.
//!
//! Rank 0 (the coordinator) is whoever runs `chromabound <instance>`; in the
//! default `process` mode it spawns the workers as copies of this binary via
//! a hidden flag, in `thread` mode the whole group shares the process. All
//! diagnostics go to stderr; stdout is reserved for the solution (and, in
//! worker processes, for the report stream).

mod coordinator;
mod dimacs;
mod report;
mod runtime;
mod worker;

pub use coordinator::{run_coordinator, AggregateStats, EngineError, Outcome};
pub use dimacs::{from_file, from_str, DimacsError};
pub use report::{print_solution, SolutionReport};
pub use runtime::{solve_threaded, RunMode};
pub use worker::{run_worker, WorkerSummary};
#[cfg(unix)]
pub use runtime::{run_worker_process, solve_process};

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

/// Exit code for the diagnostic "seed search proved the optimum without any
/// parallelism" path. Still a successful solve; the code just flags that the
/// worker pool was never engaged.
pub const NO_PARALLELISM_EXIT: i32 = 69;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "chromabound")]
#[command(author, version, about = "Distributed exact graph coloring")]
pub struct Cli {
    /// DIMACS-style instance file (`p edge N M`, `e u v` lines)
    pub instance: Option<PathBuf>,

    /// Number of workers (default: available parallelism minus one)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Where the process group lives
    #[arg(long, value_enum, default_value_t = RunMode::Process)]
    pub mode: RunMode,

    /// Fail unless the instance has exactly this many vertices
    #[arg(long)]
    pub vertices: Option<usize>,

    /// Also write the coloring as JSON to this path
    #[arg(long)]
    pub solution: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Internal: run as a spawned worker process with this rank
    #[arg(long = "worker-rank", hide = true)]
    pub worker_rank: Option<usize>,
}

fn init_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

/// Runs the CLI. This is the entry point for the `chromabound` binary.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Worker mode first: stdout is the report stream, nothing else may
    // touch it.
    if let Some(rank) = cli.worker_rank {
        return run_worker_mode(rank, cli.verbose);
    }

    init_logging(cli.verbose);

    let instance = cli
        .instance
        .context("an instance file is required (see --help)")?;
    let graph = dimacs::from_file(&instance)
        .with_context(|| format!("failed to load {}", instance.display()))?;
    if let Some(expected) = cli.vertices {
        anyhow::ensure!(
            graph.size() == expected,
            "instance has {} vertices, expected {expected}",
            graph.size()
        );
    }

    let workers = cli.workers.unwrap_or_else(default_workers);
    anyhow::ensure!(workers >= 1, "at least one worker is required");
    info!(
        instance = %instance.display(),
        vertices = graph.size(),
        edges = graph.edge_count(),
        workers,
        mode = ?cli.mode,
        "solving"
    );

    let outcome = match cli.mode {
        RunMode::Thread => {
            let (outcome, summaries) = solve_threaded(&graph, workers)?;
            let explored: u64 = summaries.iter().map(|s| s.explored).sum();
            info!(explored, "worker pool totals");
            outcome
        }
        RunMode::Process => solve_in_processes(&graph, workers, cli.verbose)?,
    };

    report::print_solution(outcome.best());
    if let Some(path) = &cli.solution {
        SolutionReport::from_outcome(&outcome)
            .write_json(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "solution written");
    }

    if matches!(outcome, Outcome::Serial { .. }) {
        std::process::exit(NO_PARALLELISM_EXIT);
    }
    Ok(())
}

#[cfg(unix)]
fn solve_in_processes(
    graph: &chromabound_core::Graph,
    workers: usize,
    verbose: bool,
) -> anyhow::Result<Outcome> {
    let mut worker_args = Vec::new();
    if verbose {
        worker_args.push("--verbose".to_string());
    }
    Ok(runtime::solve_process(graph, workers, &worker_args)?)
}

#[cfg(not(unix))]
fn solve_in_processes(
    _graph: &chromabound_core::Graph,
    _workers: usize,
    _verbose: bool,
) -> anyhow::Result<Outcome> {
    anyhow::bail!("process mode needs a Unix host; use --mode thread")
}

#[cfg(unix)]
fn run_worker_mode(rank: usize, verbose: bool) -> anyhow::Result<()> {
    init_logging(verbose);
    run_worker_process(rank)
        .map(|_| ())
        .with_context(|| format!("worker {rank} failed"))
}

#[cfg(not(unix))]
fn run_worker_mode(rank: usize, _verbose: bool) -> anyhow::Result<()> {
    anyhow::bail!("worker {rank}: process mode needs a Unix host")
}
