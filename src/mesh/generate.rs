//! Synthetic rectangular grids with known structure,
//! used for testing and as a quick source of meshes in the CLI.

use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{Coord, MeshArrays, NodeGrid};
use crate::MeshError;

/// Boundary condition tag for each side of a generated grid
/// and for the sides of removed cells.
///
/// Tag 1 is a solid wall for the airfoil kernels, anything else is far-field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SideBounds {
    pub bottom: i32,
    pub right: i32,
    pub top: i32,
    pub left: i32,
    pub hole: i32,
}

impl Default for SideBounds {
    fn default() -> Self {
        // a channel: walls above and below, far-field at the ends,
        // and solid obstacles where cells are removed
        Self {
            bottom: 1,
            right: 2,
            top: 1,
            left: 2,
            hole: 1,
        }
    }
}

/// A rectangle of nodes to be declared a structured region,
/// given by its first node and its size in nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSpec {
    pub row: usize,
    pub col: usize,
    pub rows: usize,
    pub cols: usize,
}

impl RegionSpec {
    pub fn new(row: usize, col: usize, rows: usize, cols: usize) -> Self {
        Self {
            row,
            col,
            rows,
            cols,
        }
    }
}

/// Parameters of a rectangular grid of `rows` x `cols` quad cells.
///
/// Node `(i, j)` sits at `(j * dx, i * dy)` before jitter,
/// so rows grow upward and columns to the right.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSpec {
    pub rows: usize,
    pub cols: usize,
    pub dx: f64,
    pub dy: f64,
    /// Move every node by up to `jitter / 2` of the spacing along each axis.
    /// Must be in `0.0..0.5`, which keeps every cell convex.
    pub jitter: f64,
    /// Seed of the jitter.
    pub seed: u64,
    /// Cells `(row, col)` left out of the grid.
    /// Their sides facing remaining cells become border edges.
    pub holes: Vec<(usize, usize)>,
    /// Slot of the counterclockwise node cycle that every cell starts from.
    pub cell_rotation: usize,
    /// Store every interior edge reversed (nodes and cells both swapped).
    pub flip_edges: bool,
    /// Permute raw node, cell and interior edge ids
    /// so that raw order has nothing to do with grid order.
    pub scramble: bool,
    pub bounds: SideBounds,
    pub node_regions: Vec<RegionSpec>,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            rows: 5,
            cols: 7,
            dx: 1.0,
            dy: 1.0,
            jitter: 0.0,
            seed: 0,
            holes: Vec::new(),
            cell_rotation: 0,
            flip_edges: false,
            scramble: false,
            bounds: SideBounds::default(),
            node_regions: vec![RegionSpec::new(0, 0, 3, 4), RegionSpec::new(3, 4, 3, 3)],
        }
    }
}

/// Output of [`GridSpec::generate`].
#[derive(Clone, Debug)]
pub struct GeneratedGrid {
    pub arrays: MeshArrays,
    /// raw node ids of each requested region, ready for [`build`][crate::build::build]
    pub node_grids: Vec<NodeGrid>,
}

impl GridSpec {
    #[inline]
    pub fn num_nodes(&self) -> usize {
        (self.rows + 1) * (self.cols + 1)
    }

    #[inline]
    pub fn num_cells(&self) -> usize {
        (self.rows * self.cols).saturating_sub(self.holes.len())
    }

    pub fn num_inedges(&self) -> usize {
        let (rows, cols) = (self.rows, self.cols);
        let horizontal = itertools::iproduct!(1..rows, 0..cols)
            .filter(|&(i, j)| self.has_cell(i - 1, j) && self.has_cell(i, j));
        let vertical = itertools::iproduct!(0..rows, 1..cols)
            .filter(|&(i, j)| self.has_cell(i, j - 1) && self.has_cell(i, j));
        horizontal.count() + vertical.count()
    }

    /// Every cell has four sides, and interior edges are shared by two.
    pub fn num_border_edges(&self) -> usize {
        (4 * self.num_cells()).saturating_sub(2 * self.num_inedges())
    }

    #[inline]
    fn has_cell(&self, i: usize, j: usize) -> bool {
        i < self.rows && j < self.cols && !self.holes.contains(&(i, j))
    }

    fn check(&self) -> Result<(), MeshError> {
        if self.rows == 0 || self.cols == 0 {
            return Err(MeshError::Configuration(format!(
                "grid of {}x{} cells is empty",
                self.rows, self.cols
            )));
        }
        for (name, spacing) in [("dx", self.dx), ("dy", self.dy)] {
            if !(spacing.is_finite() && spacing > 0.0) {
                return Err(MeshError::Configuration(format!(
                    "grid spacing {name} = {spacing} must be positive"
                )));
            }
        }
        if !(0.0..0.5).contains(&self.jitter) {
            return Err(MeshError::Configuration(format!(
                "jitter {} is outside of 0.0..0.5",
                self.jitter
            )));
        }
        if self.cell_rotation >= 4 {
            return Err(MeshError::Configuration(format!(
                "cell rotation {} is not a slot of a quad",
                self.cell_rotation
            )));
        }

        for (k, &(i, j)) in self.holes.iter().enumerate() {
            if i >= self.rows || j >= self.cols {
                return Err(MeshError::Configuration(format!(
                    "removed cell ({i}, {j}) is outside of {}x{} cells",
                    self.rows, self.cols
                )));
            }
            if self.holes[..k].contains(&(i, j)) {
                return Err(MeshError::Configuration(format!(
                    "cell ({i}, {j}) is removed twice"
                )));
            }
        }
        // a node with no cells left would not belong to the mesh
        for (i, j) in itertools::iproduct!(0..=self.rows, 0..=self.cols) {
            let touching = itertools::iproduct!(i.saturating_sub(1)..=i, j.saturating_sub(1)..=j)
                .any(|(ci, cj)| self.has_cell(ci, cj));
            if !touching {
                return Err(MeshError::Configuration(format!(
                    "removed cells leave node ({i}, {j}) without a cell"
                )));
            }
        }

        for (k, r) in self.node_regions.iter().enumerate() {
            if r.rows < 2 || r.cols < 2 {
                return Err(MeshError::Configuration(format!(
                    "node region {k} of {}x{} is smaller than 2x2",
                    r.rows, r.cols
                )));
            }
            if r.row + r.rows > self.rows + 1 || r.col + r.cols > self.cols + 1 {
                return Err(MeshError::Configuration(format!(
                    "node region {k} at ({}, {}) of {}x{} doesn't fit in {}x{} nodes",
                    r.row,
                    r.col,
                    r.rows,
                    r.cols,
                    self.rows + 1,
                    self.cols + 1
                )));
            }
            if let Some((i, j)) = self.holes.iter().find(|&&(i, j)| {
                (r.row..r.row + r.rows - 1).contains(&i) && (r.col..r.col + r.cols - 1).contains(&j)
            }) {
                return Err(MeshError::Configuration(format!(
                    "node region {k} frames the removed cell ({i}, {j})"
                )));
            }
        }
        Ok(())
    }

    /// Generate the raw adjacency arrays and the requested node grids.
    pub fn generate(&self) -> Result<GeneratedGrid, MeshError> {
        self.check()?;

        let (rows, cols) = (self.rows, self.cols);
        let num_inedges = self.num_inedges();
        let node_perm = Scramble::new(self.num_nodes(), self.scramble);
        let cell_perm = Scramble::new(self.num_cells(), self.scramble);
        let edge_perm = Scramble::new(num_inedges, self.scramble);
        let node = |i: usize, j: usize| node_perm.apply(i * (cols + 1) + j);

        // raw id of the cell at each grid position, if it wasn't removed
        let mut cell_ids = vec![None; rows * cols];
        let mut next = 0;
        for (i, j) in itertools::iproduct!(0..rows, 0..cols) {
            if self.has_cell(i, j) {
                cell_ids[i * cols + j] = Some(cell_perm.apply(next));
                next += 1;
            }
        }
        let cell = |i: usize, j: usize| cell_ids[i * cols + j];

        let mut rng = SmallRng::seed_from_u64(self.seed);
        let mut coords = vec![Coord::zeros(); self.num_nodes()];
        for i in 0..=rows {
            for j in 0..=cols {
                let mut x = Coord::new(j as f64 * self.dx, i as f64 * self.dy);
                if self.jitter > 0.0 {
                    x.x += (rng.gen::<f64>() - 0.5) * self.jitter * self.dx;
                    x.y += (rng.gen::<f64>() - 0.5) * self.jitter * self.dy;
                }
                coords[node(i, j)] = x;
            }
        }

        let mut cell_nodes = vec![[0; 4]; self.num_cells()];
        for (i, j) in itertools::iproduct!(0..rows, 0..cols) {
            if let Some(id) = cell(i, j) {
                let ccw = [node(i, j), node(i, j + 1), node(i + 1, j + 1), node(i + 1, j)];
                cell_nodes[id] = std::array::from_fn(|k| ccw[(k + self.cell_rotation) % 4]);
            }
        }

        // horizontal edges first, then vertical ones, in grid order.
        // the normal of the node pair points from the first cell to the second
        let horizontal = itertools::iproduct!(1..rows, 0..cols)
            .map(|(i, j)| ([node(i, j), node(i, j + 1)], [cell(i - 1, j), cell(i, j)]));
        let vertical = itertools::iproduct!(0..rows, 1..cols)
            .map(|(i, j)| ([node(i + 1, j), node(i, j)], [cell(i, j - 1), cell(i, j)]));
        let mut inedge_nodes = vec![[0; 2]; num_inedges];
        let mut inedge_cells = vec![[0; 2]; num_inedges];
        let mut hole_sides = Vec::new();
        let mut k = 0;
        for (mut nodes, cells) in horizontal.chain(vertical) {
            match cells {
                [Some(first), Some(second)] => {
                    let mut cells = [first, second];
                    if self.flip_edges {
                        nodes.reverse();
                        cells.reverse();
                    }
                    inedge_nodes[edge_perm.apply(k)] = nodes;
                    inedge_cells[edge_perm.apply(k)] = cells;
                    k += 1;
                }
                // border normals point out of their cell
                [Some(first), None] => hole_sides.push((nodes, Some(first), self.bounds.hole)),
                [None, Some(second)] => {
                    nodes.reverse();
                    hole_sides.push((nodes, Some(second), self.bounds.hole));
                }
                [None, None] => {}
            }
        }

        let mut arrays = MeshArrays {
            coords,
            cell_nodes,
            inedge_nodes,
            inedge_cells,
            ..Default::default()
        };
        let b = &self.bounds;
        let sides = (0..cols)
            .map(|j| ([node(0, j + 1), node(0, j)], cell(0, j), b.bottom))
            .chain((0..rows).map(|i| ([node(i + 1, cols), node(i, cols)], cell(i, cols - 1), b.right)))
            .chain((0..cols).map(|j| ([node(rows, j), node(rows, j + 1)], cell(rows - 1, j), b.top)))
            .chain((0..rows).map(|i| ([node(i, 0), node(i + 1, 0)], cell(i, 0), b.left)))
            .chain(hole_sides);
        for (nodes, cell, bound) in sides {
            // outer sides of removed cells are simply gone
            if let Some(cell) = cell {
                arrays.border_nodes.push(nodes);
                arrays.border_cell.push(cell);
                arrays.border_bounds.push(bound);
            }
        }

        let node_grids = self
            .node_regions
            .iter()
            .map(|r| NodeGrid {
                raw_indices: itertools::iproduct!(0..r.rows, 0..r.cols)
                    .map(|(i, j)| node(r.row + i, r.col + j))
                    .collect(),
                rows: r.rows,
                cols: r.cols,
            })
            .collect();

        Ok(GeneratedGrid { arrays, node_grids })
    }
}

/// A jittered 6x8 grid with cell (2, 3) removed,
/// framed by one region below the hole and one above it.
///
/// Every cell has its own shape and the row of the hole stays unstructured.
#[cfg(test)]
pub(crate) fn holed() -> GridSpec {
    GridSpec {
        rows: 6,
        cols: 8,
        jitter: 0.3,
        seed: 7,
        holes: vec![(2, 3)],
        scramble: true,
        cell_rotation: 1,
        node_regions: vec![RegionSpec::new(0, 0, 3, 9), RegionSpec::new(3, 0, 4, 9)],
        ..Default::default()
    }
}

/// A fixed permutation `g -> g * stride mod n` with `stride` coprime to `n`.
struct Scramble {
    n: usize,
    stride: usize,
}

impl Scramble {
    fn new(n: usize, enabled: bool) -> Self {
        let stride = if enabled {
            (n / 2 + 1..n).find(|&s| gcd(s, n) == 1).unwrap_or(1)
        } else {
            1
        };
        Self { n, stride }
    }

    #[inline]
    fn apply(&self, g: usize) -> usize {
        if self.stride == 1 {
            g
        } else {
            (g * self.stride) % self.n
        }
    }
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}
