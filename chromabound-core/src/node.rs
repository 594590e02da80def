//! Partial vertex colorings and the branching rule.
//!
//! A [`SearchNode`] colors a prefix of the vertex order `0, 1, …, n−1`.
//! Expansion colors the next vertex with each non-conflicting existing color
//! in ascending order, plus at most one fresh color. Colors are
//! interchangeable up to relabeling, so "reuse in ascending order, then one
//! new color" enumerates each coloring class exactly once.

use std::fmt;

use bit_set::BitSet;
use thiserror::Error;

use crate::graph::Graph;

/// Rejections from [`SearchNode::from_parts`].
///
/// Nodes cross the process boundary as raw integer sequences; a frame that
/// decodes but violates the structural invariants is a protocol fault, never
/// a value the engine should see.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NodeError {
    /// `next` points past the end of the color vector.
    #[error("branch point {next} exceeds vertex count {n}")]
    BranchPointOutOfRange {
        /// Claimed next vertex.
        next: u32,
        /// Vertex count implied by the color vector.
        n: usize,
    },

    /// A vertex before the branch point carries no color.
    #[error("vertex {0} unassigned before the branch point")]
    UnassignedPrefix(usize),

    /// A vertex at or after the branch point carries a color.
    #[error("vertex {0} assigned past the branch point")]
    AssignedSuffix(usize),

    /// An assigned color falls outside `[1, tot_colors]`.
    #[error("vertex {vertex} colored {color}, outside [1, {tot}]")]
    ColorOutOfRange {
        /// The offending vertex.
        vertex: usize,
        /// Its color.
        color: u32,
        /// The node's claimed color count.
        tot: u32,
    },

    /// `tot_colors` disagrees with the maximum assigned color.
    #[error("tot_colors is {tot} but the assigned maximum is {max}")]
    WrongColorCount {
        /// Claimed count.
        tot: u32,
        /// Actual maximum over the assigned prefix.
        max: u32,
    },
}

/// A node of the implicit search tree: a proper coloring of the first
/// `next` vertices using colors `1..=tot_colors` (`0` marks unassigned).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchNode {
    colors: Vec<u32>,
    tot_colors: u32,
    next: u32,
}

impl SearchNode {
    /// The empty coloring on `n` vertices, the root of the search tree.
    pub fn root(n: usize) -> Self {
        Self {
            colors: vec![0; n],
            tot_colors: 0,
            next: 0,
        }
    }

    /// Reassembles a node from its wire parts, validating the structural
    /// invariants (assigned prefix in range, zeroed suffix, consistent
    /// color count). Properness is relative to a graph and checked
    /// separately.
    pub fn from_parts(colors: Vec<u32>, tot_colors: u32, next: u32) -> Result<Self, NodeError> {
        let n = colors.len();
        if next as usize > n {
            return Err(NodeError::BranchPointOutOfRange { next, n });
        }
        let mut max = 0;
        for (vertex, &color) in colors.iter().enumerate() {
            if vertex < next as usize {
                if color == 0 {
                    return Err(NodeError::UnassignedPrefix(vertex));
                }
                if color > tot_colors {
                    return Err(NodeError::ColorOutOfRange {
                        vertex,
                        color,
                        tot: tot_colors,
                    });
                }
                max = max.max(color);
            } else if color != 0 {
                return Err(NodeError::AssignedSuffix(vertex));
            }
        }
        if max != tot_colors {
            return Err(NodeError::WrongColorCount {
                tot: tot_colors,
                max,
            });
        }
        Ok(Self {
            colors,
            tot_colors,
            next,
        })
    }

    /// Number of vertices this node colors over.
    pub fn vertex_count(&self) -> usize {
        self.colors.len()
    }

    /// Color vector, `0` for unassigned entries.
    pub fn colors(&self) -> &[u32] {
        &self.colors
    }

    /// Number of distinct colors used by the assigned prefix.
    pub fn tot_colors(&self) -> u32 {
        self.tot_colors
    }

    /// Index of the next vertex to color.
    pub fn next(&self) -> u32 {
        self.next
    }

    /// Whether every vertex is colored.
    pub fn is_final(&self) -> bool {
        self.next as usize == self.colors.len()
    }

    /// Children of a non-final node under the symmetry-breaking rule.
    ///
    /// Emits one child per existing color not used by an earlier neighbor of
    /// the branch vertex, in ascending color order, then one child that opens
    /// color `tot_colors + 1`, but only while the fresh color would still
    /// beat `ub`. The returned list may be empty; an empty expansion prunes
    /// the branch.
    pub fn expand(&self, graph: &Graph, ub: u32) -> Vec<SearchNode> {
        debug_assert!(!self.is_final());
        debug_assert_eq!(self.colors.len(), graph.size());
        let vertex = self.next as usize;
        let k = self.tot_colors;

        let mut forbidden = BitSet::with_capacity(k as usize + 1);
        for j in graph.neighbors_below(vertex) {
            forbidden.insert(self.colors[j] as usize);
        }

        let mut children = Vec::with_capacity(k as usize + 1);
        for color in 1..=k {
            if !forbidden.contains(color as usize) {
                children.push(self.child(vertex, color, k));
            }
        }
        if k + 1 < ub {
            children.push(self.child(vertex, k + 1, k + 1));
        }
        children
    }

    /// Whether no edge inside the assigned prefix is monochromatic.
    pub fn is_proper(&self, graph: &Graph) -> bool {
        let assigned = self.next as usize;
        for v in 0..assigned {
            for j in graph.neighbors_below(v) {
                if self.colors[j] == self.colors[v] {
                    return false;
                }
            }
        }
        true
    }

    fn child(&self, vertex: usize, color: u32, tot_colors: u32) -> SearchNode {
        let mut colors = self.colors.clone();
        colors[vertex] = color;
        SearchNode {
            colors,
            tot_colors,
            next: self.next + 1,
        }
    }
}

impl fmt::Display for SearchNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, color) in self.colors.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{color}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Graph {
        let mut g = Graph::new(3).unwrap();
        g.add_edge(0, 1).unwrap();
        g.add_edge(1, 2).unwrap();
        g.add_edge(0, 2).unwrap();
        g
    }

    /// Re-validates a child through `from_parts` and checks properness, so
    /// every structural invariant is exercised on expansion output.
    fn assert_well_formed(node: &SearchNode, graph: &Graph) {
        let revalidated =
            SearchNode::from_parts(node.colors().to_vec(), node.tot_colors(), node.next())
                .expect("expansion produced a structurally invalid node");
        assert_eq!(&revalidated, node);
        assert!(node.is_proper(graph));
    }

    #[test]
    fn test_root_expands_to_single_child() {
        let g = triangle();
        let root = SearchNode::root(3);
        let children = root.expand(&g, 4);
        // No colors exist yet, so the only branch opens color 1.
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].colors(), &[1, 0, 0]);
        assert_eq!(children[0].tot_colors(), 1);
        assert_eq!(children[0].next(), 1);
        assert_well_formed(&children[0], &g);
    }

    #[test]
    fn test_forbidden_colors_are_skipped() {
        let g = triangle();
        let node = SearchNode::from_parts(vec![1, 2, 0], 2, 2).unwrap();
        let children = node.expand(&g, 4);
        // Vertex 2 is adjacent to both earlier vertices: colors 1 and 2 are
        // forbidden, only the fresh color 3 remains.
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].colors(), &[1, 2, 3]);
        assert_eq!(children[0].tot_colors(), 3);
        for child in &children {
            assert_well_formed(child, &g);
        }
    }

    #[test]
    fn test_reuse_branches_come_first_in_ascending_order() {
        let mut g = Graph::new(4).unwrap();
        g.add_edge(0, 1).unwrap();
        let node = SearchNode::from_parts(vec![1, 2, 0, 0], 2, 2).unwrap();
        let children = node.expand(&g, 5);
        // Vertex 2 has no earlier neighbors: reuse 1, reuse 2, then open 3.
        let assigned: Vec<u32> = children.iter().map(|c| c.colors()[2]).collect();
        assert_eq!(assigned, vec![1, 2, 3]);
        assert_eq!(children[0].tot_colors(), 2);
        assert_eq!(children[2].tot_colors(), 3);
        for child in &children {
            assert_well_formed(child, &g);
        }
    }

    #[test]
    fn test_fresh_color_gated_by_bound() {
        let g = triangle();
        let node = SearchNode::from_parts(vec![1, 2, 0], 2, 2).unwrap();
        // Opening color 3 requires 3 < ub; at ub = 3 the branch dies out.
        assert!(node.expand(&g, 3).is_empty());
        assert_eq!(node.expand(&g, 4).len(), 1);
    }

    #[test]
    fn test_final_detection() {
        let g = triangle();
        let node = SearchNode::from_parts(vec![1, 2, 3], 3, 3).unwrap();
        assert!(node.is_final());
        assert!(node.is_proper(&g));
        assert!(!SearchNode::root(3).is_final());
        assert!(SearchNode::root(0).is_final());
    }

    #[test]
    fn test_improper_coloring_detected() {
        let g = triangle();
        let node = SearchNode::from_parts(vec![1, 1, 0], 1, 2).unwrap();
        assert!(!node.is_proper(&g));
    }

    #[test]
    fn test_from_parts_rejects_unassigned_prefix() {
        assert!(matches!(
            SearchNode::from_parts(vec![1, 0, 0], 1, 2),
            Err(NodeError::UnassignedPrefix(1))
        ));
    }

    #[test]
    fn test_from_parts_rejects_assigned_suffix() {
        assert!(matches!(
            SearchNode::from_parts(vec![1, 0, 2], 1, 1),
            Err(NodeError::AssignedSuffix(2))
        ));
    }

    #[test]
    fn test_from_parts_rejects_inconsistent_color_count() {
        assert!(matches!(
            SearchNode::from_parts(vec![1, 2, 0], 3, 2),
            Err(NodeError::WrongColorCount { tot: 3, max: 2 })
        ));
        assert!(matches!(
            SearchNode::from_parts(vec![1, 4, 0], 3, 2),
            Err(NodeError::ColorOutOfRange {
                vertex: 1,
                color: 4,
                tot: 3
            })
        ));
    }

    #[test]
    fn test_from_parts_rejects_branch_point_past_end() {
        assert!(matches!(
            SearchNode::from_parts(vec![1, 1], 1, 3),
            Err(NodeError::BranchPointOutOfRange { next: 3, n: 2 })
        ));
    }

    #[test]
    fn test_display_is_space_separated() {
        let node = SearchNode::from_parts(vec![1, 2, 1], 2, 3).unwrap();
        assert_eq!(node.to_string(), "1 2 1");
    }
}
