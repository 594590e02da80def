//! In-memory substrate: the whole group lives in one process.
//!
//! Ranks are threads; commands, reports and bound broadcasts travel over
//! crossbeam channels and the collective barrier is `std::sync::Barrier`.
//! This is the substrate the test suite runs the engine on, and what the
//! single-process `thread` run mode uses.

use std::sync::{Arc, Barrier};

use chromabound_core::{Graph, SearchNode};
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::group::{BoundFeed, CoordinatorFeed, CoordinatorLink, Rank, TransportError, WorkerLink};
use crate::messages::{Report, Tag};

/// Coordinator → worker command stream.
#[derive(Debug)]
enum Command {
    Graph(Graph),
    Assign(Tag, SearchNode),
}

/// The coordinator's two transport halves.
pub struct ChannelCoordinator {
    /// Main-thread half.
    pub link: ChannelCoordinatorLink,
    /// Listener-thread half.
    pub feed: ChannelCoordinatorFeed,
}

/// One worker's two transport halves.
pub struct ChannelWorker {
    /// Main-thread half.
    pub link: ChannelWorkerLink,
    /// Listener-thread half.
    pub feed: ChannelBoundFeed,
}

/// Builds a group with one coordinator and `workers` workers.
///
/// Dropping the coordinator halves disconnects every stream, which the
/// workers observe as [`TransportError::Disconnected`]; that is the group
/// abort path when the coordinator bails out before dispatch.
pub fn channel_group(workers: usize) -> (ChannelCoordinator, Vec<ChannelWorker>) {
    let barrier = Arc::new(Barrier::new(workers + 1));
    let (report_tx, report_rx) = unbounded();

    let mut commands = Vec::with_capacity(workers);
    let mut bounds = Vec::with_capacity(workers);
    let mut sides = Vec::with_capacity(workers);

    for rank in 1..=workers {
        let (command_tx, command_rx) = unbounded();
        let (bound_tx, bound_rx) = unbounded();
        commands.push(command_tx);
        bounds.push(bound_tx);
        sides.push(ChannelWorker {
            link: ChannelWorkerLink {
                rank,
                commands: command_rx,
                reports: report_tx.clone(),
                barrier: Arc::clone(&barrier),
            },
            feed: ChannelBoundFeed { bounds: bound_rx },
        });
    }

    let coordinator = ChannelCoordinator {
        link: ChannelCoordinatorLink { commands, barrier },
        feed: ChannelCoordinatorFeed {
            reports: report_rx,
            bounds,
        },
    };
    (coordinator, sides)
}

/// Coordinator main-thread half over channels.
pub struct ChannelCoordinatorLink {
    commands: Vec<Sender<Command>>,
    barrier: Arc<Barrier>,
}

impl CoordinatorLink for ChannelCoordinatorLink {
    fn worker_count(&self) -> usize {
        self.commands.len()
    }

    fn broadcast_graph(&mut self, graph: &Graph) -> Result<(), TransportError> {
        for tx in &self.commands {
            tx.send(Command::Graph(graph.clone()))
                .map_err(|_| TransportError::Disconnected)?;
        }
        Ok(())
    }

    fn send_node(&mut self, dest: Rank, tag: Tag, node: &SearchNode) -> Result<(), TransportError> {
        let tx = self
            .commands
            .get(dest.wrapping_sub(1))
            .ok_or(TransportError::UnknownRank(dest))?;
        tx.send(Command::Assign(tag, node.clone()))
            .map_err(|_| TransportError::Disconnected)
    }

    fn barrier(&mut self) -> Result<(), TransportError> {
        self.barrier.wait();
        Ok(())
    }
}

/// Coordinator listener-thread half over channels.
pub struct ChannelCoordinatorFeed {
    reports: Receiver<Report>,
    bounds: Vec<Sender<u32>>,
}

impl CoordinatorFeed for ChannelCoordinatorFeed {
    fn recv_report(&mut self) -> Result<Report, TransportError> {
        self.reports.recv().map_err(|_| TransportError::Disconnected)
    }

    fn broadcast_bound(&mut self, value: u32) -> Result<(), TransportError> {
        for tx in &self.bounds {
            tx.send(value).map_err(|_| TransportError::Disconnected)?;
        }
        Ok(())
    }
}

/// Worker main-thread half over channels.
pub struct ChannelWorkerLink {
    rank: Rank,
    commands: Receiver<Command>,
    reports: Sender<Report>,
    barrier: Arc<Barrier>,
}

impl WorkerLink for ChannelWorkerLink {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn recv_graph(&mut self) -> Result<Graph, TransportError> {
        match self.commands.recv() {
            Ok(Command::Graph(graph)) => Ok(graph),
            Ok(Command::Assign(..)) => Err(TransportError::UnexpectedFrame {
                expected: "graph",
                got: "node",
            }),
            Err(_) => Err(TransportError::Disconnected),
        }
    }

    fn recv_assignment(&mut self) -> Result<(Tag, SearchNode), TransportError> {
        match self.commands.recv() {
            Ok(Command::Assign(tag, node)) => Ok((tag, node)),
            Ok(Command::Graph(_)) => Err(TransportError::UnexpectedFrame {
                expected: "node",
                got: "graph",
            }),
            Err(_) => Err(TransportError::Disconnected),
        }
    }

    fn send_report(&mut self, tag: Tag, node: &SearchNode) -> Result<(), TransportError> {
        self.reports
            .send(Report {
                source: self.rank,
                tag,
                node: node.clone(),
            })
            .map_err(|_| TransportError::Disconnected)
    }

    fn barrier(&mut self) -> Result<(), TransportError> {
        self.barrier.wait();
        Ok(())
    }
}

/// Worker listener-thread half over channels.
pub struct ChannelBoundFeed {
    bounds: Receiver<u32>,
}

impl BoundFeed for ChannelBoundFeed {
    fn recv_bound(&mut self) -> Result<u32, TransportError> {
        self.bounds.recv().map_err(|_| TransportError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::TERMINATE;

    #[test]
    fn test_graph_then_assignment_in_order() {
        let (mut coordinator, mut workers) = channel_group(2);
        let mut graph = Graph::new(3).unwrap();
        graph.add_edge(0, 1).unwrap();

        coordinator.link.broadcast_graph(&graph).unwrap();
        let root = SearchNode::root(3);
        coordinator.link.send_node(1, Tag::Initial, &root).unwrap();
        coordinator.link.send_node(2, Tag::Idle, &root).unwrap();

        for (i, worker) in workers.iter_mut().enumerate() {
            assert_eq!(worker.link.recv_graph().unwrap(), graph);
            let (tag, node) = worker.link.recv_assignment().unwrap();
            let expected = if i == 0 { Tag::Initial } else { Tag::Idle };
            assert_eq!(tag, expected);
            assert_eq!(node, root);
        }
    }

    #[test]
    fn test_reports_carry_source_rank() {
        let (mut coordinator, mut workers) = channel_group(3);
        let node = SearchNode::root(2);
        workers[2].link.send_report(Tag::Done, &node).unwrap();
        let report = coordinator.feed.recv_report().unwrap();
        assert_eq!(report.source, 3);
        assert_eq!(report.tag, Tag::Done);
    }

    #[test]
    fn test_bound_broadcast_reaches_every_worker_in_order() {
        let (mut coordinator, mut workers) = channel_group(2);
        coordinator.feed.broadcast_bound(5).unwrap();
        coordinator.feed.broadcast_bound(3).unwrap();
        coordinator.feed.broadcast_bound(TERMINATE).unwrap();
        for worker in &mut workers {
            assert_eq!(worker.feed.recv_bound().unwrap(), 5);
            assert_eq!(worker.feed.recv_bound().unwrap(), 3);
            assert_eq!(worker.feed.recv_bound().unwrap(), TERMINATE);
        }
    }

    #[test]
    fn test_unknown_rank_rejected() {
        let (mut coordinator, _workers) = channel_group(2);
        let root = SearchNode::root(1);
        assert!(matches!(
            coordinator.link.send_node(3, Tag::Initial, &root),
            Err(TransportError::UnknownRank(3))
        ));
        assert!(matches!(
            coordinator.link.send_node(0, Tag::Initial, &root),
            Err(TransportError::UnknownRank(0))
        ));
    }

    #[test]
    fn test_coordinator_drop_disconnects_workers() {
        let (coordinator, mut workers) = channel_group(1);
        drop(coordinator);
        assert!(matches!(
            workers[0].link.recv_graph(),
            Err(TransportError::Disconnected)
        ));
        assert!(matches!(
            workers[0].feed.recv_bound(),
            Err(TransportError::Disconnected)
        ));
    }

    #[test]
    fn test_barrier_synchronizes_all_ranks() {
        let (mut coordinator, workers) = channel_group(3);
        let handles: Vec<_> = workers
            .into_iter()
            .map(|mut worker| std::thread::spawn(move || worker.link.barrier()))
            .collect();
        coordinator.link.barrier().unwrap();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
    }
}
