//! Undirected graph as a symmetric boolean adjacency relation.
//!
//! The graph is built once on the coordinator, shipped to workers as a packed
//! byte matrix, and read-only afterwards. Adjacency rows are bitsets so the
//! branching rule can walk a vertex's earlier neighbors in ascending order.

use bit_set::BitSet;
use thiserror::Error;

/// Hard cap on the vertex count.
///
/// Keeps the packed broadcast payload (`n·n` bytes) comfortably under the
/// transport's frame-size guard, and keeps every feasible color count
/// strictly below the termination sentinel on the bound channel.
pub const MAX_VERTICES: usize = 4000;

/// Errors from graph construction and payload decoding.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GraphError {
    /// The requested vertex count exceeds [`MAX_VERTICES`].
    #[error("graph has {0} vertices (maximum {MAX_VERTICES})")]
    TooManyVertices(usize),

    /// An edge endpoint is not a valid vertex index.
    #[error("vertex {vertex} out of range for a graph on {n} vertices")]
    VertexOutOfRange {
        /// The offending endpoint.
        vertex: usize,
        /// The graph's vertex count.
        n: usize,
    },

    /// The relation requires `E(i, i) = false`.
    #[error("self-loop on vertex {0}")]
    SelfLoop(usize),

    /// A packed payload does not have `n·n` cells.
    #[error("packed adjacency is {got} bytes, expected {expected}")]
    PayloadSize {
        /// Bytes received.
        got: usize,
        /// Bytes required for the advertised vertex count.
        expected: usize,
    },

    /// A packed payload encodes an asymmetric or reflexive relation.
    #[error("packed adjacency is not a valid relation at ({i}, {j})")]
    MalformedRelation {
        /// Row of the offending cell.
        i: usize,
        /// Column of the offending cell.
        j: usize,
    },
}

/// Symmetric, irreflexive adjacency relation over `[0, n)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graph {
    n: usize,
    rows: Vec<BitSet>,
}

impl Graph {
    /// Creates an edgeless graph on `n` vertices.
    pub fn new(n: usize) -> Result<Self, GraphError> {
        if n > MAX_VERTICES {
            return Err(GraphError::TooManyVertices(n));
        }
        Ok(Self {
            n,
            rows: vec![BitSet::with_capacity(n); n],
        })
    }

    /// Inserts the undirected edge `{u, v}`. Duplicate inserts are idempotent.
    pub fn add_edge(&mut self, u: usize, v: usize) -> Result<(), GraphError> {
        let n = self.n;
        for vertex in [u, v] {
            if vertex >= n {
                return Err(GraphError::VertexOutOfRange { vertex, n });
            }
        }
        if u == v {
            return Err(GraphError::SelfLoop(u));
        }
        self.rows[u].insert(v);
        self.rows[v].insert(u);
        Ok(())
    }

    /// Number of vertices.
    pub fn size(&self) -> usize {
        self.n
    }

    /// Whether vertices `i` and `j` are adjacent.
    ///
    /// Panics if `i >= size()`.
    pub fn adj(&self, i: usize, j: usize) -> bool {
        self.rows[i].contains(j)
    }

    /// Degree of vertex `v`.
    pub fn degree(&self, v: usize) -> usize {
        self.rows[v].len()
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        self.rows.iter().map(BitSet::len).sum::<usize>() / 2
    }

    /// Neighbors of `v` with index strictly below `v`, in ascending order.
    ///
    /// This is exactly the set consulted when coloring vertex `v`: vertices
    /// are assigned in the fixed order `0, 1, …, n−1`, so only earlier
    /// neighbors can forbid a color.
    pub fn neighbors_below(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
        self.rows[v].iter().take_while(move |&j| j < v)
    }

    /// Flattens the relation into the broadcast payload: `n·n` bytes,
    /// row-major, cell `i·n + j` nonzero iff `(i, j)` is an edge.
    pub fn to_packed(&self) -> Vec<u8> {
        let mut cells = vec![0u8; self.n * self.n];
        for (i, row) in self.rows.iter().enumerate() {
            for j in row.iter() {
                cells[i * self.n + j] = 1;
            }
        }
        cells
    }

    /// Rebuilds a graph from a broadcast payload, validating that the cells
    /// encode a symmetric relation with an empty diagonal.
    pub fn from_packed(n: usize, cells: &[u8]) -> Result<Self, GraphError> {
        if n > MAX_VERTICES {
            return Err(GraphError::TooManyVertices(n));
        }
        let expected = n * n;
        if cells.len() != expected {
            return Err(GraphError::PayloadSize {
                got: cells.len(),
                expected,
            });
        }
        let mut graph = Self::new(n)?;
        for i in 0..n {
            if cells[i * n + i] != 0 {
                return Err(GraphError::MalformedRelation { i, j: i });
            }
            for j in (i + 1)..n {
                let upper = cells[i * n + j] != 0;
                let lower = cells[j * n + i] != 0;
                if upper != lower {
                    return Err(GraphError::MalformedRelation { i, j });
                }
                if upper {
                    graph.rows[i].insert(j);
                    graph.rows[j].insert(i);
                }
            }
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges_are_symmetric() {
        let mut g = Graph::new(4).unwrap();
        g.add_edge(0, 2).unwrap();
        assert!(g.adj(0, 2));
        assert!(g.adj(2, 0));
        assert!(!g.adj(0, 1));
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn test_duplicate_edge_is_idempotent() {
        let mut g = Graph::new(3).unwrap();
        g.add_edge(1, 2).unwrap();
        g.add_edge(2, 1).unwrap();
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.degree(1), 1);
    }

    #[test]
    fn test_self_loop_rejected() {
        let mut g = Graph::new(3).unwrap();
        assert!(matches!(g.add_edge(1, 1), Err(GraphError::SelfLoop(1))));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut g = Graph::new(3).unwrap();
        assert!(matches!(
            g.add_edge(0, 3),
            Err(GraphError::VertexOutOfRange { vertex: 3, n: 3 })
        ));
    }

    #[test]
    fn test_neighbors_below_ascending() {
        let mut g = Graph::new(5).unwrap();
        g.add_edge(4, 1).unwrap();
        g.add_edge(4, 3).unwrap();
        g.add_edge(4, 0).unwrap();
        g.add_edge(2, 4).unwrap();
        let below: Vec<usize> = g.neighbors_below(4).collect();
        assert_eq!(below, vec![0, 1, 2, 3]);
        assert_eq!(g.neighbors_below(0).count(), 0);
    }

    #[test]
    fn test_packed_roundtrip() {
        let mut g = Graph::new(5).unwrap();
        for (u, v) in [(0, 1), (1, 2), (2, 3), (3, 4), (4, 0)] {
            g.add_edge(u, v).unwrap();
        }
        let cells = g.to_packed();
        assert_eq!(cells.len(), 25);
        let decoded = Graph::from_packed(5, &cells).unwrap();
        assert_eq!(decoded, g);
    }

    #[test]
    fn test_packed_rejects_asymmetry() {
        let mut cells = vec![0u8; 9];
        cells[1] = 1; // (0,1) set, (1,0) clear
        assert!(matches!(
            Graph::from_packed(3, &cells),
            Err(GraphError::MalformedRelation { i: 0, j: 1 })
        ));
    }

    #[test]
    fn test_packed_rejects_diagonal() {
        let mut cells = vec![0u8; 4];
        cells[3] = 1; // (1,1)
        assert!(matches!(
            Graph::from_packed(2, &cells),
            Err(GraphError::MalformedRelation { i: 1, j: 1 })
        ));
    }

    #[test]
    fn test_packed_rejects_wrong_size() {
        assert!(matches!(
            Graph::from_packed(3, &[0u8; 8]),
            Err(GraphError::PayloadSize {
                got: 8,
                expected: 9
            })
        ));
    }
}
