//! The hybrid quad mesh data model.
//!
//! A [`QuadMesh`] stores every entity twice:
//! once in the raw index space it was ingested in,
//! and once in the relabeled space where every structured region
//! occupies a contiguous block.
//! Structured region descriptors tell the dispatcher
//! how to address those blocks arithmetically.

use nalgebra as na;

use itertools::iproduct;
use serde::Serialize;

use crate::{
    compass::{PairCompass, QuadCompass},
    MeshError,
};

pub mod construction;
pub mod generate;
pub use generate::{GridSpec, RegionSpec};

/// Sentinel for a neighbour that doesn't exist.
pub const NO_NEIGHBOUR: usize = usize::MAX;

/// A node coordinate.
pub type Coord = na::Vector2<f64>;

/// Adjacency arrays of a mesh in one index space.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshArrays {
    pub coords: Vec<Coord>,
    /// cell -> nodes, tracing the quad boundary in order
    pub cell_nodes: Vec<[usize; 4]>,
    pub inedge_nodes: Vec<[usize; 2]>,
    pub inedge_cells: Vec<[usize; 2]>,
    pub border_nodes: Vec<[usize; 2]>,
    pub border_cell: Vec<usize>,
    /// boundary condition tag per border edge
    pub border_bounds: Vec<i32>,
}

impl MeshArrays {
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.coords.len()
    }

    #[inline]
    pub fn num_cells(&self) -> usize {
        self.cell_nodes.len()
    }

    #[inline]
    pub fn num_inedges(&self) -> usize {
        self.inedge_nodes.len()
    }

    #[inline]
    pub fn num_border_edges(&self) -> usize {
        self.border_nodes.len()
    }

    /// Check that array lengths agree and every stored id is in range.
    pub fn validate(&self) -> Result<(), MeshError> {
        crate::error::check_eq(
            || "interior edge cell list length",
            self.num_inedges(),
            self.inedge_cells.len(),
        )?;
        crate::error::check_eq(
            || "border edge cell list length",
            self.num_border_edges(),
            self.border_cell.len(),
        )?;
        crate::error::check_eq(
            || "border edge bound list length",
            self.num_border_edges(),
            self.border_bounds.len(),
        )?;

        let nodes = self.num_nodes();
        let cells = self.num_cells();
        check_ids("cell -> node", self.cell_nodes.iter().flatten(), nodes)?;
        check_ids("interior edge -> node", self.inedge_nodes.iter().flatten(), nodes)?;
        check_ids("interior edge -> cell", self.inedge_cells.iter().flatten(), cells)?;
        check_ids("border edge -> node", self.border_nodes.iter().flatten(), nodes)?;
        check_ids("border edge -> cell", self.border_cell.iter(), cells)?;
        Ok(())
    }
}

fn check_ids<'a>(
    what: &str,
    mut ids: impl Iterator<Item = &'a usize>,
    count: usize,
) -> Result<(), MeshError> {
    match ids.find(|&&id| id >= count) {
        Some(id) => Err(MeshError::Index(format!(
            "{what} adjacency refers to {id}, but there are only {count}"
        ))),
        None => Ok(()),
    }
}

/// Whether `b` is `a` read from another starting node.
pub(crate) fn is_rotation(a: &[usize; 4], b: &[usize; 4]) -> bool {
    (0..4).any(|shift| (0..4).all(|k| a[k] == b[(k + shift) % 4]))
}

#[inline]
pub(crate) fn reversed([a, b]: [usize; 2]) -> [usize; 2] {
    [b, a]
}

/// A rectangle of grid points in the node-local coordinates of a region,
/// `row_start..row_finish` by `col_start..col_finish`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GridExtent {
    pub row_start: usize,
    pub row_finish: usize,
    pub col_start: usize,
    pub col_finish: usize,
}

impl GridExtent {
    pub fn new(rows: std::ops::Range<usize>, cols: std::ops::Range<usize>) -> Self {
        Self {
            row_start: rows.start,
            row_finish: rows.end,
            col_start: cols.start,
            col_finish: cols.end,
        }
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.row_finish.saturating_sub(self.row_start)
    }

    #[inline]
    pub fn num_cols(&self) -> usize {
        self.col_finish.saturating_sub(self.col_start)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.num_rows() * self.num_cols()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `other` fits inside this extent (empty extents fit anywhere).
    pub fn contains(&self, other: &GridExtent) -> bool {
        other.is_empty()
            || (other.row_start >= self.row_start
                && other.row_finish <= self.row_finish
                && other.col_start >= self.col_start
                && other.col_finish <= self.col_finish)
    }

    /// Iterate over the grid points in row-major order.
    pub fn points(&self) -> impl Iterator<Item = (usize, usize)> {
        iproduct!(
            self.row_start..self.row_finish,
            self.col_start..self.col_finish
        )
    }
}

impl std::fmt::Display for GridExtent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}..{}, {}..{}]",
            self.row_start, self.row_finish, self.col_start, self.col_finish
        )
    }
}

/// A rectangular grid of raw node ids, row-major,
/// proposed as the frame of a structured region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeGrid {
    pub raw_indices: Vec<usize>,
    pub rows: usize,
    pub cols: usize,
}

impl NodeGrid {
    #[inline]
    pub fn raw(&self, row: usize, col: usize) -> usize {
        self.raw_indices[row * self.cols + col]
    }
}

/// A rectangular grid of nodes forming the frame of one structured region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeRegion {
    /// raw node ids in row-major order
    pub raw_indices: Vec<usize>,
    pub rows: usize,
    pub cols: usize,
    /// relabeled id of the first node
    pub offset: usize,
}

impl NodeRegion {
    #[inline]
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Relabeled id of the node at a grid point.
    #[inline]
    pub fn node(&self, row: usize, col: usize) -> usize {
        self.offset + row * self.cols + col
    }

    /// Extent of the grid points that can hold the top-left node of a cell.
    pub fn quad_extent(&self) -> GridExtent {
        GridExtent::new(
            0..self.rows.saturating_sub(1),
            0..self.cols.saturating_sub(1),
        )
    }
}

/// Cells of one structured region, identified by their top-left node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellRegion {
    pub extent: GridExtent,
    pub compass: QuadCompass,
    /// relabeled id of the first cell
    pub offset: usize,
}

impl CellRegion {
    /// Relabeled id of the cell whose top-left node is at a grid point.
    #[inline]
    pub fn cell(&self, row: usize, col: usize) -> usize {
        self.offset
            + (row - self.extent.row_start) * self.extent.num_cols()
            + (col - self.extent.col_start)
    }
}

/// Horizontal or vertical interior edges of one structured region,
/// one per grid point in the extent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EdgeRegion {
    pub extent: GridExtent,
    pub node_compass: PairCompass,
    pub cell_compass: PairCompass,
    /// relabeled id of the first edge
    pub offset: usize,
}

/// A bijection between raw and relabeled ids of one entity kind.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexMap {
    new_to_old: Vec<usize>,
    old_to_new: Vec<usize>,
}

impl IndexMap {
    pub fn identity(count: usize) -> Self {
        Self {
            new_to_old: (0..count).collect(),
            old_to_new: (0..count).collect(),
        }
    }

    /// Build the map from relabeled -> raw ids,
    /// checking that it is a bijection over `0..len`.
    pub fn from_new_to_old(new_to_old: Vec<usize>) -> Result<Self, MeshError> {
        let count = new_to_old.len();
        let mut old_to_new = vec![NO_NEIGHBOUR; count];
        for (new, &old) in new_to_old.iter().enumerate() {
            match old_to_new.get_mut(old) {
                Some(slot) if *slot == NO_NEIGHBOUR => *slot = new,
                Some(_) => {
                    return Err(MeshError::Index(format!(
                        "raw index {old} is mapped twice"
                    )))
                }
                None => {
                    return Err(MeshError::Index(format!(
                        "raw index {old} outside of 0..{count}"
                    )))
                }
            }
        }
        Ok(Self {
            new_to_old,
            old_to_new,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.new_to_old.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.new_to_old.is_empty()
    }

    pub fn new_to_old(&self) -> &[usize] {
        &self.new_to_old
    }

    pub fn old_to_new(&self) -> &[usize] {
        &self.old_to_new
    }

    #[inline]
    pub fn to_new(&self, old: usize) -> usize {
        self.old_to_new[old]
    }

    #[inline]
    pub fn to_old(&self, new: usize) -> usize {
        self.new_to_old[new]
    }
}

/// Which of the two stored index spaces to use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexSpace {
    Raw,
    Relabeled,
}

/// A quad mesh with its raw and relabeled representations
/// and the structured region metadata tying them together.
///
/// Fields are public for inspection and tooling;
/// [`validate`][Self::validate] should be run after any manual changes.
/// Everything produced by [`build`][crate::build] or read from a file
/// has already been validated.
#[derive(Clone, Debug)]
pub struct QuadMesh {
    pub raw: MeshArrays,
    pub relabeled: MeshArrays,

    pub node_regions: Vec<NodeRegion>,
    pub cell_regions: Vec<CellRegion>,
    pub unstructured_cells_offset: usize,
    pub h_edge_regions: Vec<EdgeRegion>,
    pub v_edge_regions: Vec<EdgeRegion>,
    pub unstructured_inedges_offset: usize,

    pub node_map: IndexMap,
    pub cell_map: IndexMap,
    pub inedge_map: IndexMap,
}

impl QuadMesh {
    /// Wrap an unstructured mesh with no structured regions,
    /// where the relabeled space equals the raw one.
    pub fn unstructured(raw: MeshArrays) -> Result<Self, MeshError> {
        let mesh = Self {
            node_map: IndexMap::identity(raw.num_nodes()),
            cell_map: IndexMap::identity(raw.num_cells()),
            inedge_map: IndexMap::identity(raw.num_inedges()),
            relabeled: raw.clone(),
            raw,
            node_regions: Vec::new(),
            cell_regions: Vec::new(),
            unstructured_cells_offset: 0,
            h_edge_regions: Vec::new(),
            v_edge_regions: Vec::new(),
            unstructured_inedges_offset: 0,
        };
        mesh.validate()?;
        Ok(mesh)
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.relabeled.num_nodes()
    }

    #[inline]
    pub fn num_cells(&self) -> usize {
        self.relabeled.num_cells()
    }

    #[inline]
    pub fn num_inedges(&self) -> usize {
        self.relabeled.num_inedges()
    }

    #[inline]
    pub fn num_border_edges(&self) -> usize {
        self.relabeled.num_border_edges()
    }

    #[inline]
    pub fn num_regions(&self) -> usize {
        self.node_regions.len()
    }

    pub fn arrays(&self, space: IndexSpace) -> &MeshArrays {
        match space {
            IndexSpace::Raw => &self.raw,
            IndexSpace::Relabeled => &self.relabeled,
        }
    }

    /// Check every structural invariant the dispatcher relies on.
    ///
    /// After this passes, structured traversal cannot index out of bounds;
    /// whether its arithmetic agrees with the stored adjacency
    /// is checked by the dispatcher itself.
    pub fn validate(&self) -> Result<(), MeshError> {
        use crate::error::check_eq;

        self.raw.validate()?;
        self.relabeled.validate()?;
        for (what, raw, new) in [
            ("node count", self.raw.num_nodes(), self.relabeled.num_nodes()),
            ("cell count", self.raw.num_cells(), self.relabeled.num_cells()),
            ("interior edge count", self.raw.num_inedges(), self.relabeled.num_inedges()),
            ("border edge count", self.raw.num_border_edges(), self.relabeled.num_border_edges()),
            ("node map size", self.raw.num_nodes(), self.node_map.len()),
            ("cell map size", self.raw.num_cells(), self.cell_map.len()),
            ("interior edge map size", self.raw.num_inedges(), self.inedge_map.len()),
        ] {
            check_eq(|| what, raw, new)?;
        }

        let regions = self.num_regions();
        check_eq(|| "cell region count", regions, self.cell_regions.len())?;
        check_eq(|| "horizontal edge region count", regions, self.h_edge_regions.len())?;
        check_eq(|| "vertical edge region count", regions, self.v_edge_regions.len())?;

        let mut node_offset = 0;
        let mut cell_offset = 0;
        let mut edge_offset = 0;
        for (k, node_region) in self.node_regions.iter().enumerate() {
            if node_region.rows < 2 || node_region.cols < 2 {
                return Err(MeshError::Configuration(format!(
                    "node region {k} is {}x{}, smaller than 2x2",
                    node_region.rows, node_region.cols
                )));
            }
            check_eq(
                || format!("node region {k} index count"),
                node_region.len(),
                node_region.raw_indices.len(),
            )?;
            check_eq(|| format!("node region {k} offset"), node_offset, node_region.offset)?;
            node_offset += node_region.len();

            let cells = &self.cell_regions[k];
            if !node_region.quad_extent().contains(&cells.extent) {
                return Err(MeshError::consistency(
                    format!("cell region {k} within its node region"),
                    node_region.quad_extent(),
                    cells.extent,
                ));
            }
            check_eq(|| format!("cell region {k} offset"), cell_offset, cells.offset)?;
            cell_offset += cells.extent.len();

            // every edge needs both of its cells inside the cell region
            let e = &cells.extent;
            let room = GridExtent::new(e.row_start + 1..e.row_finish, e.col_start + 1..e.col_finish);
            for (dir, edges) in [("horizontal", &self.h_edge_regions[k]), ("vertical", &self.v_edge_regions[k])] {
                if !room.contains(&edges.extent) {
                    return Err(MeshError::consistency(
                        format!("{dir} edge region {k} within its cell region"),
                        room,
                        edges.extent,
                    ));
                }
                check_eq(|| format!("{dir} edge region {k} offset"), edge_offset, edges.offset)?;
                edge_offset += edges.extent.len();
            }
        }

        if node_offset > self.num_nodes() {
            return Err(MeshError::consistency(
                "structured nodes within node count",
                self.num_nodes(),
                node_offset,
            ));
        }
        check_eq(|| "unstructured cell offset", cell_offset, self.unstructured_cells_offset)?;
        check_eq(
            || "unstructured interior edge offset",
            edge_offset,
            self.unstructured_inedges_offset,
        )?;
        if cell_offset > self.num_cells() {
            return Err(MeshError::consistency(
                "structured cells within cell count",
                self.num_cells(),
                cell_offset,
            ));
        }
        if edge_offset > self.num_inedges() {
            return Err(MeshError::consistency(
                "structured interior edges within edge count",
                self.num_inedges(),
                edge_offset,
            ));
        }
        self.check_maps()
    }

    /// Check that the index maps carry every raw entity
    /// onto its relabeled counterpart.
    ///
    /// Cells may differ by a rotation of their node cycle
    /// and interior edges by a flip of both nodes and cells,
    /// which is how the build canonicalizes structured regions.
    fn check_maps(&self) -> Result<(), MeshError> {
        let (raw, new) = (&self.raw, &self.relabeled);
        let node = |old: usize| self.node_map.to_new(old);
        let cell = |old: usize| self.cell_map.to_new(old);

        for (k, region) in self.node_regions.iter().enumerate() {
            for (i, &old) in region.raw_indices.iter().enumerate() {
                let mapped = self.node_map.to_old(region.offset + i);
                if mapped != old {
                    return Err(MeshError::consistency(
                        format!("raw id of node {i} in node region {k}"),
                        mapped,
                        old,
                    ));
                }
            }
        }

        for (id, coord) in new.coords.iter().enumerate() {
            let old = self.node_map.to_old(id);
            if *coord != raw.coords[old] {
                return Err(MeshError::consistency(
                    format!("coordinates of node {id} (raw node {old})"),
                    raw.coords[old],
                    coord,
                ));
            }
        }

        for (id, nodes) in new.cell_nodes.iter().enumerate() {
            let old = self.cell_map.to_old(id);
            let expected = raw.cell_nodes[old].map(node);
            if !is_rotation(&expected, nodes) {
                return Err(MeshError::consistency(
                    format!("nodes of cell {id} (raw cell {old}) up to rotation"),
                    expected,
                    nodes,
                ));
            }
        }

        for (id, (nodes, cells)) in new.inedge_nodes.iter().zip(&new.inedge_cells).enumerate() {
            let old = self.inedge_map.to_old(id);
            let expected = (raw.inedge_nodes[old].map(node), raw.inedge_cells[old].map(cell));
            let flipped = (reversed(expected.0), reversed(expected.1));
            if (*nodes, *cells) != expected && (*nodes, *cells) != flipped {
                return Err(MeshError::consistency(
                    format!("nodes and cells of interior edge {id} (raw edge {old})"),
                    expected,
                    (nodes, cells),
                ));
            }
        }

        for (id, (nodes, &c)) in new.border_nodes.iter().zip(&new.border_cell).enumerate() {
            let expected = (raw.border_nodes[id].map(node), cell(raw.border_cell[id]));
            if (*nodes, c) != expected {
                return Err(MeshError::consistency(
                    format!("nodes and cell of border edge {id}"),
                    expected,
                    (nodes, c),
                ));
            }
        }
        crate::error::check_eq(|| "border edge bounds", &raw.border_bounds, &new.border_bounds)
    }

    /// A serializable overview of counts and regions.
    pub fn summary(&self) -> MeshSummary {
        MeshSummary {
            num_nodes: self.num_nodes(),
            num_cells: self.num_cells(),
            num_inedges: self.num_inedges(),
            num_border_edges: self.num_border_edges(),
            unstructured_cells_offset: self.unstructured_cells_offset,
            unstructured_inedges_offset: self.unstructured_inedges_offset,
            regions: itertools::izip!(
                &self.node_regions,
                &self.cell_regions,
                &self.h_edge_regions,
                &self.v_edge_regions
            )
            .map(|(nodes, cells, h, v)| RegionSummary {
                rows: nodes.rows,
                cols: nodes.cols,
                node_offset: nodes.offset,
                cell_extent: cells.extent,
                cell_offset: cells.offset,
                quad_compass: cells.compass.index(),
                edge_extent: h.extent,
                h_edge_offset: h.offset,
                h_compasses: [h.node_compass.index(), h.cell_compass.index()],
                v_edge_offset: v.offset,
                v_compasses: [v.node_compass.index(), v.cell_compass.index()],
            })
            .collect(),
        }
    }
}

/// Overview of a mesh for inspection tools.
#[derive(Clone, Debug, Serialize)]
pub struct MeshSummary {
    pub num_nodes: usize,
    pub num_cells: usize,
    pub num_inedges: usize,
    pub num_border_edges: usize,
    pub unstructured_cells_offset: usize,
    pub unstructured_inedges_offset: usize,
    pub regions: Vec<RegionSummary>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RegionSummary {
    pub rows: usize,
    pub cols: usize,
    pub node_offset: usize,
    pub cell_extent: GridExtent,
    pub cell_offset: usize,
    pub quad_compass: usize,
    pub edge_extent: GridExtent,
    pub h_edge_offset: usize,
    /// node and cell compass indices
    pub h_compasses: [usize; 2],
    pub v_edge_offset: usize,
    pub v_compasses: [usize; 2],
}

//
// tests
//
