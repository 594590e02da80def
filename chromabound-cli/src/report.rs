//! Final solution output: the stdout surface and the optional JSON file.

use std::path::Path;

use chromabound_core::SearchNode;
use serde::Serialize;

use crate::coordinator::Outcome;

/// Machine-readable form of a solved instance.
#[derive(Debug, Serialize)]
pub struct SolutionReport {
    /// Vertex count.
    pub vertices: usize,
    /// Optimum number of colors (the chromatic number).
    pub colors_used: u32,
    /// Color of each vertex, 1-based colors in vertex order.
    pub colors: Vec<u32>,
    /// Whether the seed search alone proved the optimum.
    pub serial: bool,
}

impl SolutionReport {
    /// Builds the report from a finished run.
    pub fn from_outcome(outcome: &Outcome) -> Self {
        let best = outcome.best();
        Self {
            vertices: best.vertex_count(),
            colors_used: best.tot_colors(),
            colors: best.colors().to_vec(),
            serial: matches!(outcome, Outcome::Serial { .. }),
        }
    }

    /// Writes the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

/// Prints the optimum to stdout: the colored vector, then the color count.
pub fn print_solution(best: &SearchNode) {
    println!("{best}");
    println!("tot_colors: {}", best.tot_colors());
}
