//! Transport traits for one process group.
//!
//! Every rank runs exactly two threads, and each thread owns its own half of
//! the transport: on the coordinator the main thread drives a
//! [`CoordinatorLink`] (graph broadcast, node dispatch, barrier) while the
//! listener thread drives a [`CoordinatorFeed`] (any-source reports, bound
//! broadcast); on a worker the main thread drives a [`WorkerLink`] and the
//! listener a [`BoundFeed`]. Because the halves are independently owned
//! `Send` values, concurrent use of the transport from both threads is
//! guaranteed by construction; there is no runtime threading level to
//! probe at startup.

use chromabound_core::{Graph, SearchNode};
use thiserror::Error;

use crate::framing::FrameError;
use crate::messages::{Report, Tag};

/// Process rank. Rank 0 is the coordinator; workers are `1..=W`.
pub type Rank = usize;

/// Failures of the transport substrate. All of them are fatal to the run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The peer went away (closed pipe, dropped channel).
    #[error("peer disconnected")]
    Disconnected,

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Raw I/O failure outside the framing layer.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent a well-formed frame that the protocol does not allow
    /// at this point.
    #[error("protocol violation: expected {expected}, got {got}")]
    UnexpectedFrame {
        /// What this endpoint was waiting for.
        expected: &'static str,
        /// What actually arrived.
        got: &'static str,
    },

    /// A message was addressed to a rank outside the group.
    #[error("no worker with rank {0}")]
    UnknownRank(Rank),

    /// A worker process could not be started.
    #[error("failed to spawn worker {rank}: {source}")]
    Spawn {
        /// The rank that failed to start.
        rank: Rank,
        /// The underlying OS error.
        source: std::io::Error,
    },

    /// A worker process exited unsuccessfully.
    #[error("worker {rank} exited with {status}")]
    WorkerFailed {
        /// The failing worker's rank.
        rank: Rank,
        /// Its exit status.
        status: std::process::ExitStatus,
    },

    /// A spawned worker found its inherited environment unusable.
    #[error("invalid worker environment: {0}")]
    WorkerEnv(String),
}

/// Coordinator main-thread operations.
pub trait CoordinatorLink: Send {
    /// Number of workers in the group (`W = P − 1`).
    fn worker_count(&self) -> usize;

    /// One-to-all broadcast of the adjacency relation. Must complete before
    /// any node traffic.
    fn broadcast_graph(&mut self, graph: &Graph) -> Result<(), TransportError>;

    /// Point-to-point send of a tagged node to one worker.
    fn send_node(&mut self, dest: Rank, tag: Tag, node: &SearchNode) -> Result<(), TransportError>;

    /// Collective barrier; returns once every worker has entered.
    fn barrier(&mut self) -> Result<(), TransportError>;
}

/// Coordinator listener-thread operations.
pub trait CoordinatorFeed: Send {
    /// Blocking receive of the next report from any worker, in arrival
    /// order. Per-worker FIFO order is preserved.
    fn recv_report(&mut self) -> Result<Report, TransportError>;

    /// One-to-all broadcast on the bound channel. Workers observe these in
    /// the order they were issued.
    fn broadcast_bound(&mut self, value: u32) -> Result<(), TransportError>;
}

/// Worker main-thread operations.
pub trait WorkerLink: Send {
    /// This worker's rank (`1..=W`).
    fn rank(&self) -> Rank;

    /// Receive the graph broadcast.
    fn recv_graph(&mut self) -> Result<Graph, TransportError>;

    /// Receive the single initial message ([`Tag::Initial`] or
    /// [`Tag::Idle`]).
    fn recv_assignment(&mut self) -> Result<(Tag, SearchNode), TransportError>;

    /// Point-to-point send of a tagged node to the coordinator.
    fn send_report(&mut self, tag: Tag, node: &SearchNode) -> Result<(), TransportError>;

    /// Enter the collective barrier and block until released.
    fn barrier(&mut self) -> Result<(), TransportError>;
}

/// Worker listener-thread operations: the receive side of the bound channel.
pub trait BoundFeed: Send {
    /// Blocking receive of the next bound broadcast.
    fn recv_bound(&mut self) -> Result<u32, TransportError>;
}
