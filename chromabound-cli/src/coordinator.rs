//! Coordinator: seeds the search, dispatches subtrees, aggregates bounds.
//!
//! Phase A explores the tree breadth-first until the frontier fills the
//! worker pool (or proves the optimum outright). Phase B hands each worker
//! its subtree root. Phase C runs on two threads: the main thread waits in
//! the group barrier while the listener accepts worker reports, tightens the
//! shared bound, rebroadcasts it, and finally releases every worker listener
//! with the termination sentinel.

use std::collections::VecDeque;
use std::thread;

use chromabound_core::{Graph, SearchNode, SharedBound};
use chromabound_ipc::{CoordinatorFeed, CoordinatorLink, Tag, TransportError, TERMINATE};
use thiserror::Error;
use tracing::{debug, info};

/// Fatal engine failures. Any of these tears down the whole group.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The transport substrate failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A peer violated the engine protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A listener or worker thread panicked.
    #[error("{0} thread panicked")]
    ThreadPanic(&'static str),
}

/// Counters kept by the aggregation listener.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateStats {
    /// Improvements accepted; each one tightened the bound and was
    /// rebroadcast, so this also counts the non-sentinel bound broadcasts.
    pub accepted: u64,
    /// Improvements discarded because the bound had already moved past them.
    pub stale: u64,
}

/// How a run concluded on the coordinator.
#[derive(Debug)]
pub enum Outcome {
    /// Phase A exhausted the whole tree by itself; the workers were never
    /// engaged and the group is torn down without dispatching.
    Serial {
        /// The optimum coloring.
        best: SearchNode,
    },
    /// The distributed search ran to completion.
    Parallel {
        /// The optimum coloring.
        best: SearchNode,
        /// Workers that received a subtree; the remainder were sent
        /// [`Tag::Idle`].
        seeded: usize,
        /// Listener counters.
        stats: AggregateStats,
    },
}

impl Outcome {
    /// The optimum coloring, however it was reached.
    pub fn best(&self) -> &SearchNode {
        match self {
            Outcome::Serial { best } | Outcome::Parallel { best, .. } => best,
        }
    }
}

/// Runs the coordinator role to completion over the given transport halves.
///
/// Returning [`Outcome::Serial`] drops both halves before any dispatch,
/// which is the substrate's cue to tear the group down.
pub fn run_coordinator<L, F>(mut link: L, feed: F, graph: &Graph) -> Result<Outcome, EngineError>
where
    L: CoordinatorLink,
    F: CoordinatorFeed,
{
    let workers = link.worker_count();
    let bound = SharedBound::for_vertices(graph.size());

    // Workers install the relation while Phase A runs; if Phase A proves the
    // optimum alone they never get past their initial receive.
    link.broadcast_graph(graph)?;

    // Phase A: breadth-first seeding.
    let mut incumbent: Option<SearchNode> = None;
    let mut frontier = VecDeque::new();
    frontier.push_back(SearchNode::root(graph.size()));

    while let Some(node) = frontier.pop_front() {
        if node.is_final() {
            if bound.tighten(node.tot_colors()) {
                debug!(colors = node.tot_colors(), "seed search improved the incumbent");
                incumbent = Some(node);
            }
            continue;
        }
        if node.tot_colors() >= bound.get() {
            continue;
        }
        let children = node.expand(graph, bound.get());
        if frontier.len() + children.len() <= workers {
            frontier.extend(children);
        } else {
            frontier.push_front(node);
            break;
        }
    }

    if frontier.is_empty() {
        let best = incumbent.ok_or_else(|| {
            EngineError::Protocol("search tree exhausted without any complete coloring".to_string())
        })?;
        info!(
            colors = best.tot_colors(),
            "seed search proved the optimum; no parallelism used"
        );
        return Ok(Outcome::Serial { best });
    }

    // Phase B: one initial message per worker, frontier first, idles after.
    let seeded = frontier.len();
    info!(
        seeded,
        workers,
        bound = bound.get(),
        "dispatching subtree roots"
    );
    let mut rank = 1;
    for node in frontier.drain(..) {
        link.send_node(rank, Tag::Initial, &node)?;
        rank += 1;
    }
    let throwaway = SearchNode::root(graph.size());
    while rank <= workers {
        link.send_node(rank, Tag::Idle, &throwaway)?;
        rank += 1;
    }

    // Phase C: listener aggregates while the main thread holds the barrier.
    // Every path that fails the barrier also breaks the transport under the
    // listener, so the scope cannot hang on an unjoined thread.
    let (best, stats) = thread::scope(|scope| {
        let listener = scope.spawn(|| aggregate(feed, graph, &bound, incumbent, workers));
        link.barrier()?;
        listener
            .join()
            .map_err(|_| EngineError::ThreadPanic("listener"))?
    })?;

    info!(
        colors = best.tot_colors(),
        accepted = stats.accepted,
        stale = stats.stale,
        "distributed search completed"
    );
    Ok(Outcome::Parallel {
        best,
        seeded,
        stats,
    })
}

/// Phase C listener body: the only writer of the coordinator's bound and
/// the only reader of worker reports.
fn aggregate<F: CoordinatorFeed>(
    mut feed: F,
    graph: &Graph,
    bound: &SharedBound,
    mut incumbent: Option<SearchNode>,
    workers: usize,
) -> Result<(SearchNode, AggregateStats), EngineError> {
    let mut stats = AggregateStats::default();
    let mut done = 0;

    while done < workers {
        let report = feed.recv_report()?;
        match report.tag {
            Tag::Done => {
                done += 1;
                debug!(worker = report.source, done, workers, "worker finished");
            }
            Tag::Improved => {
                if !report.node.is_final() {
                    return Err(EngineError::Protocol(format!(
                        "worker {} reported a partial coloring as improved",
                        report.source
                    )));
                }
                if !report.node.is_proper(graph) {
                    return Err(EngineError::Protocol(format!(
                        "worker {} reported an improper coloring",
                        report.source
                    )));
                }
                let colors = report.node.tot_colors();
                if bound.tighten(colors) {
                    stats.accepted += 1;
                    info!(worker = report.source, colors, "accepted improved coloring");
                    feed.broadcast_bound(colors)?;
                    incumbent = Some(report.node);
                } else {
                    stats.stale += 1;
                    debug!(worker = report.source, colors, "discarded stale improvement");
                }
            }
            other => {
                return Err(EngineError::Protocol(format!(
                    "worker {} sent coordinator-only tag {other:?}",
                    report.source
                )));
            }
        }
    }

    feed.broadcast_bound(TERMINATE)?;
    let best = incumbent.ok_or_else(|| {
        EngineError::Protocol("all workers finished without any complete coloring".to_string())
    })?;
    Ok((best, stats))
}
