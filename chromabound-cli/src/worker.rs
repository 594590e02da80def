//! Worker: exhaustive depth-first search of one subtree under the live
//! upper bound.
//!
//! The main thread receives the graph and its assignment, then runs the DFS
//! while a listener thread adopts every bound broadcast from the
//! coordinator. Pruning reads the bound with a plain atomic load: a stale,
//! larger value only costs extra work.

use std::thread;

use chromabound_core::{Graph, SearchNode, SharedBound};
use chromabound_ipc::{BoundFeed, Rank, Tag, WorkerLink, TERMINATE};
use tracing::{debug, info, trace};

use crate::coordinator::EngineError;

/// What one worker did with its assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSummary {
    /// This worker's rank.
    pub rank: Rank,
    /// Whether it received a subtree ([`Tag::Initial`]) or stood by.
    pub assigned: bool,
    /// Nodes popped from the DFS stack.
    pub explored: u64,
    /// Improvements reported to the coordinator.
    pub improvements: u64,
}

/// Runs the worker role to completion over the given transport halves.
///
/// Idle workers skip the search but still send [`Tag::Done`], enter the
/// barrier, and wait for their listener, so the coordinator's termination
/// count and the barrier agree on exactly `W` participants.
pub fn run_worker<L, F>(mut link: L, feed: F) -> Result<WorkerSummary, EngineError>
where
    L: WorkerLink,
    F: BoundFeed,
{
    let rank = link.rank();
    let graph = link.recv_graph()?;
    let (tag, seed) = link.recv_assignment()?;
    let bound = SharedBound::for_vertices(graph.size());

    // Any failure below also breaks the transport under the listener, so
    // the scope cannot hang on an unjoined thread.
    let summary = thread::scope(|scope| {
        let listener = scope.spawn(|| bound_listener(feed, &bound));

        let mut summary = WorkerSummary {
            rank,
            assigned: false,
            explored: 0,
            improvements: 0,
        };
        match tag {
            Tag::Initial => {
                summary.assigned = true;
                search(&graph, &bound, seed, &mut link, &mut summary)?;
            }
            Tag::Idle => {
                debug!(rank, "no subtree assigned; standing by");
            }
            other => {
                return Err(EngineError::Protocol(format!(
                    "unexpected assignment tag {other:?}"
                )));
            }
        }

        link.send_report(Tag::Done, &SearchNode::root(graph.size()))?;
        link.barrier()?;
        listener
            .join()
            .map_err(|_| EngineError::ThreadPanic("bound listener"))?
            .map(|()| summary)
    })?;

    info!(
        rank,
        assigned = summary.assigned,
        explored = summary.explored,
        improvements = summary.improvements,
        "worker completed"
    );
    Ok(summary)
}

/// LIFO search of the assigned subtree. Children are pushed in reverse so
/// the smallest-color branch is explored first.
fn search<L: WorkerLink>(
    graph: &Graph,
    bound: &SharedBound,
    seed: SearchNode,
    link: &mut L,
    summary: &mut WorkerSummary,
) -> Result<(), EngineError> {
    let mut stack = vec![seed];
    while let Some(node) = stack.pop() {
        summary.explored += 1;
        if node.is_final() {
            if bound.tighten(node.tot_colors()) {
                summary.improvements += 1;
                debug!(
                    rank = summary.rank,
                    colors = node.tot_colors(),
                    "found improved coloring"
                );
                link.send_report(Tag::Improved, &node)?;
            }
            continue;
        }
        if node.tot_colors() >= bound.get() {
            continue;
        }
        stack.extend(node.expand(graph, bound.get()).into_iter().rev());
    }
    Ok(())
}

/// Worker-side bound listener: adopts every broadcast strictly below the
/// local bound and exits on the termination sentinel.
fn bound_listener<F: BoundFeed>(mut feed: F, bound: &SharedBound) -> Result<(), EngineError> {
    loop {
        let value = feed.recv_bound()?;
        if value == TERMINATE {
            return Ok(());
        }
        if bound.tighten(value) {
            trace!(bound = value, "adopted broadcast upper bound");
        }
    }
}
