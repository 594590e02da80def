//! Message vocabulary of the engine protocol.
//!
//! Point-to-point traffic carries tagged search nodes; the bound channel
//! carries bare unsigned integers. The two namespaces are deliberately
//! disjoint: tags are a closed enum on node frames, while the bound channel
//! reserves a single sentinel value to release listeners.

use chromabound_core::{Graph, SearchNode};

use crate::group::Rank;

/// Sentinel broadcast on the bound channel to terminate worker listeners.
///
/// Never a feasible color count: vertex counts are capped at
/// [`chromabound_core::MAX_VERTICES`], far below this value.
pub const TERMINATE: u32 = u32::MAX;

/// Tag on a point-to-point node message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// Coordinator → worker: this node is your subtree root.
    Initial,
    /// Coordinator → worker: no subtree for you; stand by for termination.
    Idle,
    /// Worker → coordinator: a strictly better complete coloring.
    Improved,
    /// Worker → coordinator: my subtree is exhausted.
    Done,
}

impl Tag {
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            Tag::Initial => 1,
            Tag::Idle => 2,
            Tag::Improved => 3,
            Tag::Done => 4,
        }
    }

    pub(crate) fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Tag::Initial),
            2 => Some(Tag::Idle),
            3 => Some(Tag::Improved),
            4 => Some(Tag::Done),
            _ => None,
        }
    }
}

/// A tagged node received from a worker, with its source rank.
#[derive(Debug, Clone)]
pub struct Report {
    /// Rank of the sending worker.
    pub source: Rank,
    /// Why the worker sent it.
    pub tag: Tag,
    /// The accompanying node (a throwaway empty node for [`Tag::Done`]).
    pub node: SearchNode,
}

/// One unit on a byte-stream substrate.
///
/// `Graph` and `Node` payloads arrive fully validated: a frame that decodes
/// into an asymmetric relation or a structurally inconsistent node is a
/// framing error, not a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// The adjacency relation, broadcast once before any search traffic.
    Graph(Graph),
    /// A tagged search node.
    Node(Tag, SearchNode),
    /// A bound-channel value (a color count or [`TERMINATE`]).
    Bound(u32),
    /// Barrier entry marker (worker → coordinator, control pipe).
    Barrier,
    /// Barrier release marker (coordinator → worker, command stream).
    Release,
}

impl Frame {
    /// Short name for protocol-violation diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Frame::Graph(_) => "graph",
            Frame::Node(..) => "node",
            Frame::Bound(_) => "bound",
            Frame::Barrier => "barrier",
            Frame::Release => "release",
        }
    }
}
