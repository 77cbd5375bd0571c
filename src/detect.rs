//! Finding structured regions in an unstructured quad mesh.
//!
//! Detection walks from cell to cell across interior edges,
//! keeping track of each cell's orientation in a local frame:
//! a cell is oriented as `[a, b, c, d]` with `a` at grid point `(i, j)`,
//! `b` at `(i, j+1)`, `c` at `(i+1, j+1)` and `d` at `(i+1, j)`.
//! Rectangular patches are grown greedily from a corner,
//! first along a row and then row by row,
//! and the node grids of the patches are handed to [`build`][crate::build()].
//! The result only has to be plausible; the build phase checks everything.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{mesh::NodeGrid, MeshArrays, MeshError};

/// Limits on the regions [`detect_node_regions`] returns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectConfig {
    pub max_regions: usize,
    /// minimum number of node rows in a region
    pub min_rows: usize,
    /// minimum number of node columns in a region
    pub min_cols: usize,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            max_regions: 64,
            min_rows: 3,
            min_cols: 3,
        }
    }
}

/// A cell oriented in the local frame of a patch.
type Oriented = (usize, [usize; 4]);

#[derive(Clone, Copy, Debug)]
enum Step {
    East,
    North,
    West,
    South,
}

impl Step {
    /// Slots of the shared side in the current cell,
    /// and the slots they take in the neighbour.
    fn slots(self) -> ([usize; 2], [usize; 2]) {
        match self {
            Step::East => ([1, 2], [0, 3]),
            Step::North => ([3, 2], [0, 1]),
            Step::West => ([0, 3], [1, 2]),
            Step::South => ([0, 1], [3, 2]),
        }
    }
}

struct Walker<'a> {
    cell_nodes: &'a [[usize; 4]],
    /// sorted node pair -> the two cells of an interior edge
    across: HashMap<[usize; 2], [usize; 2]>,
    claimed_cells: Vec<bool>,
    claimed_nodes: Vec<bool>,
}

impl<'a> Walker<'a> {
    fn new(mesh: &'a MeshArrays) -> Self {
        let across = mesh
            .inedge_nodes
            .iter()
            .zip(&mesh.inedge_cells)
            .map(|(&[a, b], &cells)| ([a.min(b), a.max(b)], cells))
            .collect();
        Self {
            cell_nodes: &mesh.cell_nodes,
            across,
            claimed_cells: vec![false; mesh.num_cells()],
            claimed_nodes: vec![false; mesh.num_nodes()],
        }
    }

    fn is_free(&self, (cell, nodes): &Oriented) -> bool {
        !self.claimed_cells[*cell] && nodes.iter().all(|&n| !self.claimed_nodes[n])
    }

    /// The neighbour across one side, oriented to continue the frame.
    ///
    /// Returns `None` at the border, at claimed cells
    /// and at neighbours whose winding is mirrored.
    fn step(&self, (cell, nodes): &Oriented, step: Step) -> Option<Oriented> {
        let ([s0, s1], [t0, t1]) = step.slots();
        let (p, q) = (nodes[s0], nodes[s1]);
        let [c0, c1] = *self.across.get(&[p.min(q), p.max(q)])?;
        let next = if c0 == *cell { c1 } else { c0 };

        let cycle = &self.cell_nodes[next];
        let pos = cycle.iter().position(|&n| n == p)?;
        let oriented: [usize; 4] = std::array::from_fn(|k| cycle[(pos + 4 + k - t0) % 4]);
        let candidate = (next, oriented);
        (oriented[t1] == q && self.is_free(&candidate)).then_some(candidate)
    }

    /// Walk south and west as far as possible to find a corner to grow from.
    fn corner(&self, start: Oriented) -> Oriented {
        let limit = self.cell_nodes.len();
        let mut at = start;
        for dir in [Step::South, Step::West] {
            for _ in 0..limit {
                match self.step(&at, dir) {
                    Some(next) if next.0 != start.0 => at = next,
                    _ => break,
                }
            }
        }
        at
    }

    /// Grow the largest rectangle this greedy walk finds from a corner cell.
    fn grow(&self, corner: Oriented) -> Vec<Vec<Oriented>> {
        let mut used: HashSet<usize> = corner.1.iter().copied().collect();

        let mut first_row = vec![corner];
        while let Some(next) = first_row.last().and_then(|last| self.step(last, Step::East)) {
            // only the two new nodes on the far side can collide
            if used.contains(&next.1[1]) || used.contains(&next.1[2]) {
                break;
            }
            used.extend([next.1[1], next.1[2]]);
            first_row.push(next);
        }

        let mut rows = vec![first_row];
        'rows: loop {
            let Some(below) = rows.last() else { break };
            let mut row = Vec::with_capacity(below.len());
            for cell in below {
                match self.step(cell, Step::North) {
                    Some(next) => row.push(next),
                    None => break 'rows,
                }
            }
            // neighbours in the new row share their vertical sides
            let joined = row
                .windows(2)
                .all(|pair| pair[0].1[1] == pair[1].1[0] && pair[0].1[2] == pair[1].1[3]);
            let mut top: Vec<usize> = row.iter().map(|(_, n)| n[3]).collect();
            if let Some((_, last)) = row.last() {
                top.push(last[2]);
            }
            let mut seen = HashSet::with_capacity(top.len());
            if !joined || top.iter().any(|n| used.contains(n) || !seen.insert(*n)) {
                break;
            }
            used.extend(top);
            rows.push(row);
        }
        rows
    }

    fn claim(&mut self, rows: &[Vec<Oriented>]) {
        for (cell, nodes) in rows.iter().flatten() {
            self.claimed_cells[*cell] = true;
            for &n in nodes {
                self.claimed_nodes[n] = true;
            }
        }
    }
}

/// Node grid spanned by a patch of oriented cells.
fn node_grid(rows: &[Vec<Oriented>]) -> NodeGrid {
    let cols = rows[0].len() + 1;
    let mut raw_indices = Vec::with_capacity((rows.len() + 1) * cols);
    let bottom = rows[0].iter().map(|(_, n)| n[0]);
    raw_indices.extend(bottom.chain(rows[0].last().map(|(_, n)| n[1])));
    for row in rows {
        let top = row.iter().map(|(_, n)| n[3]);
        raw_indices.extend(top.chain(row.last().map(|(_, n)| n[2])));
    }
    NodeGrid {
        raw_indices,
        rows: rows.len() + 1,
        cols,
    }
}

/// Greedily find rectangular patches of consistently wound cells
/// and return their node grids, ready for [`build`][crate::build()].
///
/// Patches are disjoint in nodes, and so are their cells and edges.
pub fn detect_node_regions(
    mesh: &MeshArrays,
    config: &DetectConfig,
) -> Result<Vec<NodeGrid>, MeshError> {
    if config.min_rows < 2 || config.min_cols < 2 {
        return Err(MeshError::Configuration(format!(
            "minimum region size {}x{} is smaller than 2x2",
            config.min_rows, config.min_cols
        )));
    }
    mesh.validate()?;

    let mut walker = Walker::new(mesh);
    let mut grids = Vec::new();
    for start in 0..mesh.num_cells() {
        let start = (start, mesh.cell_nodes[start]);
        if !walker.is_free(&start) {
            continue;
        }
        if grids.len() >= config.max_regions {
            tracing::warn!(
                max_regions = config.max_regions,
                "region limit reached, remaining cells stay unstructured"
            );
            break;
        }

        let rows = walker.grow(walker.corner(start));
        let grid = node_grid(&rows);
        if grid.rows < config.min_rows || grid.cols < config.min_cols {
            tracing::debug!(
                start = start.0,
                rows = grid.rows,
                cols = grid.cols,
                "patch below minimum size"
            );
            continue;
        }
        tracing::debug!(rows = grid.rows, cols = grid.cols, "found structured region");
        walker.claim(&rows);
        grids.push(grid);
    }

    tracing::info!(
        regions = grids.len(),
        structured_cells = grids
            .iter()
            .map(|g| (g.rows - 1) * (g.cols - 1))
            .sum::<usize>(),
        cells = mesh.num_cells(),
        "structure detected"
    );
    Ok(grids)
}
