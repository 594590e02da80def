//! DIMACS-style instance reader.
//!
//! Accepts the classic coloring format: `c` comment lines, one
//! `p edge N M` header (`p col` is a common synonym), and `e u v` edge lines
//! with 1-based endpoints. The advisory edge count `M` is checked but never
//! fatal; self-loops and out-of-range endpoints are.

use std::path::Path;

use chromabound_core::{Graph, GraphError};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{digit1, space1},
    combinator::{all_consuming, map_res},
    sequence::{preceded, separated_pair, tuple},
    IResult,
};
use thiserror::Error;
use tracing::warn;

/// Errors from reading an instance file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DimacsError {
    /// The file could not be read at all.
    #[error("unable to read {path}: {source}")]
    Io {
        /// The offending path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A line does not parse as comment, header, or edge.
    #[error("line {line}: unrecognized syntax: {text:?}")]
    Syntax {
        /// 1-based line number.
        line: usize,
        /// The offending line.
        text: String,
    },

    /// An edge line appeared before the `p` header.
    #[error("line {line}: edge before the 'p edge' header")]
    EdgeBeforeHeader {
        /// 1-based line number.
        line: usize,
    },

    /// More than one `p` header.
    #[error("line {line}: duplicate 'p' header")]
    DuplicateHeader {
        /// 1-based line number.
        line: usize,
    },

    /// No `p` header in the whole file.
    #[error("missing 'p edge' header")]
    MissingHeader,

    /// Endpoints are 1-based in the format; `0` is not a vertex.
    #[error("line {line}: vertex indices are 1-based")]
    ZeroVertex {
        /// 1-based line number.
        line: usize,
    },

    /// The edge violates the relation (out of range, self-loop) or the
    /// header vertex count is unacceptable.
    #[error("line {line}: {source}")]
    Graph {
        /// 1-based line number.
        line: usize,
        /// The underlying relation error.
        #[source]
        source: GraphError,
    },
}

fn number(input: &str) -> IResult<&str, usize> {
    map_res(digit1, str::parse)(input)
}

fn header(input: &str) -> IResult<&str, (usize, usize)> {
    all_consuming(preceded(
        tuple((tag("p"), space1, alt((tag("edge"), tag("col"))), space1)),
        separated_pair(number, space1, number),
    ))(input)
}

fn edge(input: &str) -> IResult<&str, (usize, usize)> {
    all_consuming(preceded(
        tuple((tag("e"), space1)),
        separated_pair(number, space1, number),
    ))(input)
}

/// Parses an instance from file contents.
pub fn from_str(contents: &str) -> Result<Graph, DimacsError> {
    let mut graph: Option<Graph> = None;
    let mut advertised_edges = 0;
    let mut parsed_edges = 0;

    for (index, raw) in contents.lines().enumerate() {
        let line = index + 1;
        let text = raw.trim_end_matches('\r').trim_end();
        if text.is_empty() || text.starts_with('c') {
            continue;
        }
        if let Ok((_, (n, m))) = header(text) {
            if graph.is_some() {
                return Err(DimacsError::DuplicateHeader { line });
            }
            graph = Some(Graph::new(n).map_err(|source| DimacsError::Graph { line, source })?);
            advertised_edges = m;
            continue;
        }
        if let Ok((_, (u, v))) = edge(text) {
            let graph = graph
                .as_mut()
                .ok_or(DimacsError::EdgeBeforeHeader { line })?;
            if u == 0 || v == 0 {
                return Err(DimacsError::ZeroVertex { line });
            }
            graph
                .add_edge(u - 1, v - 1)
                .map_err(|source| DimacsError::Graph { line, source })?;
            parsed_edges += 1;
            continue;
        }
        return Err(DimacsError::Syntax {
            line,
            text: text.to_string(),
        });
    }

    let graph = graph.ok_or(DimacsError::MissingHeader)?;
    if parsed_edges != advertised_edges {
        warn!(
            advertised = advertised_edges,
            parsed = parsed_edges,
            "header edge count is advisory and does not match"
        );
    }
    Ok(graph)
}

/// Reads an instance from a file.
pub fn from_file(path: &Path) -> Result<Graph, DimacsError> {
    let contents = std::fs::read_to_string(path).map_err(|source| DimacsError::Io {
        path: path.display().to_string(),
        source,
    })?;
    from_str(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_instance() {
        let g = from_str("c a triangle\np edge 3 3\ne 1 2\ne 2 3\ne 1 3\n").unwrap();
        assert_eq!(g.size(), 3);
        assert_eq!(g.edge_count(), 3);
        assert!(g.adj(0, 1));
        assert!(g.adj(0, 2));
        assert!(g.adj(1, 2));
    }

    #[test]
    fn test_col_header_synonym() {
        let g = from_str("p col 2 1\ne 1 2\n").unwrap();
        assert_eq!(g.size(), 2);
        assert!(g.adj(0, 1));
    }

    #[test]
    fn test_comments_and_blank_lines_skipped() {
        let g = from_str("c one\n\nc two\np edge 2 1\n\ne 1 2\n").unwrap();
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn test_crlf_tolerated() {
        let g = from_str("p edge 2 1\r\ne 1 2\r\n").unwrap();
        assert!(g.adj(0, 1));
    }

    #[test]
    fn test_duplicate_edges_are_idempotent() {
        let g = from_str("p edge 2 2\ne 1 2\ne 2 1\n").unwrap();
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn test_missing_header() {
        assert!(matches!(from_str("c nothing\n"), Err(DimacsError::MissingHeader)));
        assert!(matches!(
            from_str("e 1 2\np edge 2 1\n"),
            Err(DimacsError::EdgeBeforeHeader { line: 1 })
        ));
    }

    #[test]
    fn test_duplicate_header_rejected() {
        assert!(matches!(
            from_str("p edge 2 1\np edge 3 1\n"),
            Err(DimacsError::DuplicateHeader { line: 2 })
        ));
    }

    #[test]
    fn test_zero_vertex_rejected() {
        assert!(matches!(
            from_str("p edge 2 1\ne 0 1\n"),
            Err(DimacsError::ZeroVertex { line: 2 })
        ));
    }

    #[test]
    fn test_out_of_range_and_self_loop_rejected() {
        assert!(matches!(
            from_str("p edge 2 1\ne 1 3\n"),
            Err(DimacsError::Graph { line: 2, .. })
        ));
        assert!(matches!(
            from_str("p edge 2 1\ne 2 2\n"),
            Err(DimacsError::Graph { line: 2, .. })
        ));
    }

    #[test]
    fn test_garbage_line_rejected() {
        assert!(matches!(
            from_str("p edge 2 1\nx 1 2\n"),
            Err(DimacsError::Syntax { line: 2, .. })
        ));
    }
}
