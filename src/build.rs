//! Turning raw adjacency plus a list of node grids
//! into a fully relabeled [`QuadMesh`].
//!
//! Node grids only describe where the structure is.
//! Everything else (which cells and edges belong to each region,
//! how they are oriented, and where they land in the relabeled space)
//! is derived here and checked against the stored adjacency.
//!
//! Structured traversal applies one compass per region,
//! so all elements of a region must share an orientation.
//! Cells whose node cycle starts from a different corner
//! are rotated to the region's orientation,
//! and interior edges stored reversed relative to the region
//! get both their nodes and cells swapped.
//! Both are the same element seen from another starting point,
//! and kernels see them consistently in every traversal mode.
//! Anything else (mirrored winding, a missing cell, cells that don't
//! match the grid) is an error.

use std::collections::HashMap;

use crate::{
    compass::{Compass, CompassTable, PairCompass, QuadCompass, Tables},
    dispatch::{BorderEdgeVisit, CellVisit, Dispatcher, InteriorEdgeVisit, Traversal},
    mesh::{
        is_rotation, reversed, CellRegion, EdgeRegion, GridExtent, MeshArrays, NodeGrid,
        NodeRegion, QuadMesh,
    },
    relabel::Relabeler,
    MeshError,
};

/// Relabel a mesh around the given structured node grids.
///
/// With no node grids this produces the same result as
/// [`QuadMesh::unstructured`].
pub fn build(raw: MeshArrays, node_grids: &[NodeGrid]) -> Result<QuadMesh, MeshError> {
    let _span = tracing::debug_span!("build", regions = node_grids.len()).entered();
    raw.validate()?;

    //
    // nodes
    //

    let mut node_relabeler = Relabeler::new();
    for grid in node_grids {
        node_relabeler.add_structured_grid(&grid.raw_indices, grid.rows, grid.cols)?;
    }
    node_relabeler.add_unstructured_data(0..raw.num_nodes());
    let node_map = node_relabeler.finish(raw.num_nodes())?;

    let node_regions: Vec<NodeRegion> = node_grids
        .iter()
        .zip(node_relabeler.blocks())
        .map(|(grid, block)| NodeRegion {
            raw_indices: grid.raw_indices.clone(),
            rows: grid.rows,
            cols: grid.cols,
            offset: block.offset,
        })
        .collect();

    // keyed by raw cell, valued by relabeled node
    let mut cycles = node_relabeler.translate_values(&raw.cell_nodes)?;

    //
    // cells
    //

    let node_cells = incidence(&cycles, raw.num_nodes());
    let mut cell_relabeler = Relabeler::new();
    let mut cell_extents = Vec::with_capacity(node_regions.len());
    for (k, region) in node_regions.iter().enumerate() {
        let extent = region.quad_extent();
        let mut region_compass: Option<QuadCompass> = None;
        let mut raw_cells = Vec::with_capacity(extent.len());
        for (r, c) in extent.points() {
            let grid = [
                region.node(r, c),
                region.node(r, c + 1),
                region.node(r + 1, c),
                region.node(r + 1, c + 1),
            ];
            let cell = find_cell(&node_cells, &cycles, &grid).map_err(|found| {
                MeshError::consistency(
                    format!("cells with the nodes of quad ({r}, {c}) in node region {k}"),
                    1,
                    found,
                )
            })?;

            let stored = cycles[cell];
            let compass = match region_compass {
                Some(compass) => compass,
                None => *region_compass.insert(QuadCompass::observe(&grid, &stored)?),
            };
            let oriented = compass.apply(grid);
            if oriented != stored {
                if !is_rotation(&oriented, &stored) {
                    return Err(MeshError::consistency(
                        format!("winding of cell {cell} at ({r}, {c}) in node region {k}"),
                        oriented,
                        stored,
                    ));
                }
                cycles[cell] = oriented;
            }
            raw_cells.push(cell);
        }
        cell_relabeler.add_block(&raw_cells, extent.num_rows(), extent.num_cols())?;
        cell_extents.push((extent, region_compass.unwrap_or_else(QuadCompass::identity)));
    }
    cell_relabeler.add_unstructured_data(0..raw.num_cells());
    let cell_map = cell_relabeler.finish(raw.num_cells())?;
    let unstructured_cells_offset = cell_relabeler.unstructured_start().unwrap_or(0);

    let cell_regions: Vec<CellRegion> = cell_extents
        .into_iter()
        .zip(cell_relabeler.blocks())
        .map(|((extent, compass), block)| CellRegion {
            extent,
            compass,
            offset: block.offset,
        })
        .collect();

    //
    // interior edges
    //

    // keyed by raw edge, valued by relabeled nodes and cells
    let mut edge_nodes = node_relabeler.translate_values(&raw.inedge_nodes)?;
    let mut edge_cells = cell_relabeler.translate_values(&raw.inedge_cells)?;
    let mut edge_lookup: HashMap<[usize; 2], usize> = HashMap::with_capacity(edge_nodes.len());
    for (edge, nodes) in edge_nodes.iter().enumerate() {
        if let Some(other) = edge_lookup.insert(sorted(*nodes), edge) {
            return Err(MeshError::consistency(
                format!("interior edges between nodes {nodes:?}"),
                1,
                format!("edges {other} and {edge}"),
            ));
        }
    }

    let mut edge_relabeler = Relabeler::new();
    let mut h_edge_regions = Vec::with_capacity(node_regions.len());
    let mut v_edge_regions = Vec::with_capacity(node_regions.len());
    for (k, (nodes, cells)) in node_regions.iter().zip(&cell_regions).enumerate() {
        let e = &cells.extent;
        let extent = GridExtent::new(e.row_start + 1..e.row_finish, e.col_start + 1..e.col_finish);

        for dir in [EdgeDir::Horizontal, EdgeDir::Vertical] {
            let mut compasses: Option<(PairCompass, PairCompass)> = None;
            let mut raw_edges = Vec::with_capacity(extent.len());
            for (r, c) in extent.points() {
                let (grid_nodes, grid_cells) = match dir {
                    EdgeDir::Horizontal => (
                        [nodes.node(r, c), nodes.node(r, c + 1)],
                        [cells.cell(r - 1, c), cells.cell(r, c)],
                    ),
                    EdgeDir::Vertical => (
                        [nodes.node(r, c), nodes.node(r + 1, c)],
                        [cells.cell(r, c - 1), cells.cell(r, c)],
                    ),
                };
                let at = || format!("{} edge at ({r}, {c}) in node region {k}", dir.name());

                let edge = *edge_lookup.get(&sorted(grid_nodes)).ok_or_else(|| {
                    MeshError::consistency(
                        format!("interior edges at the {}", at()),
                        1,
                        0,
                    )
                })?;
                let (stored_nodes, stored_cells) = (edge_nodes[edge], edge_cells[edge]);

                let (node_compass, cell_compass) = match compasses {
                    Some(pair) => pair,
                    None => *compasses.insert((
                        observe(&grid_nodes, &stored_nodes, || format!("nodes of the {}", at()))?,
                        observe(&grid_cells, &stored_cells, || format!("cells of the {}", at()))?,
                    )),
                };
                let want_nodes = node_compass.apply(grid_nodes);
                let want_cells = cell_compass.apply(grid_cells);
                if (want_nodes, want_cells) != (stored_nodes, stored_cells) {
                    if want_nodes != reversed(stored_nodes) || want_cells != reversed(stored_cells) {
                        return Err(MeshError::consistency(
                            format!("orientation of interior edge {edge}, the {}", at()),
                            (want_nodes, want_cells),
                            (stored_nodes, stored_cells),
                        ));
                    }
                    edge_nodes[edge] = want_nodes;
                    edge_cells[edge] = want_cells;
                }
                raw_edges.push(edge);
            }

            edge_relabeler.add_block(&raw_edges, extent.num_rows(), extent.num_cols())?;
            let (node_compass, cell_compass) = compasses
                .unwrap_or_else(|| (PairCompass::identity(), PairCompass::identity()));
            let region = EdgeRegion {
                extent,
                node_compass,
                cell_compass,
                offset: edge_relabeler.current_offset() - raw_edges.len(),
            };
            match dir {
                EdgeDir::Horizontal => h_edge_regions.push(region),
                EdgeDir::Vertical => v_edge_regions.push(region),
            }
        }
        tracing::debug!(
            region = k,
            rows = nodes.rows,
            cols = nodes.cols,
            cells = cells.extent.len(),
            edges = 2 * extent.len(),
            "structured region"
        );
    }
    edge_relabeler.add_unstructured_data(0..raw.num_inedges());
    let inedge_map = edge_relabeler.finish(raw.num_inedges())?;
    let unstructured_inedges_offset = edge_relabeler.unstructured_start().unwrap_or(0);

    //
    // assemble
    //

    let relabeled = MeshArrays {
        coords: node_relabeler.reorder(&raw.coords)?,
        cell_nodes: cell_relabeler.reorder(&cycles)?,
        inedge_nodes: edge_relabeler.reorder(&edge_nodes)?,
        inedge_cells: edge_relabeler.reorder(&edge_cells)?,
        border_nodes: node_relabeler.translate_values(&raw.border_nodes)?,
        border_cell: raw
            .border_cell
            .iter()
            .map(|&cell| cell_relabeler.translate(cell))
            .collect::<Result<_, _>>()?,
        border_bounds: raw.border_bounds.clone(),
    };

    let mesh = QuadMesh {
        raw,
        relabeled,
        node_regions,
        cell_regions,
        unstructured_cells_offset,
        h_edge_regions,
        v_edge_regions,
        unstructured_inedges_offset,
        node_map,
        cell_map,
        inedge_map,
    };

    // a mesh that fails the dispatcher's checks is never handed out
    let dispatcher = Dispatcher::new(&mesh, Traversal::Hybrid)?;
    dispatcher.cells(&mut |_: &CellVisit| {})?;
    dispatcher.interior_edges(&mut |_: &InteriorEdgeVisit| {})?;
    dispatcher.border_edges(&mut |_: &BorderEdgeVisit| {})?;

    tracing::info!(
        regions = mesh.num_regions(),
        structured_cells = mesh.unstructured_cells_offset,
        cells = mesh.num_cells(),
        structured_inedges = mesh.unstructured_inedges_offset,
        inedges = mesh.num_inedges(),
        "mesh built"
    );
    Ok(mesh)
}

#[derive(Clone, Copy, Debug)]
enum EdgeDir {
    Horizontal,
    Vertical,
}

impl EdgeDir {
    fn name(self) -> &'static str {
        match self {
            EdgeDir::Horizontal => "horizontal",
            EdgeDir::Vertical => "vertical",
        }
    }
}

/// node -> cells containing it, in ascending order
fn incidence(cycles: &[[usize; 4]], num_nodes: usize) -> Vec<Vec<usize>> {
    let mut node_cells = vec![Vec::new(); num_nodes];
    for (cell, nodes) in cycles.iter().enumerate() {
        for &node in nodes {
            node_cells[node].push(cell);
        }
    }
    node_cells
}

/// The single cell made of exactly the given nodes,
/// or the number of such cells if there isn't exactly one.
fn find_cell(
    node_cells: &[Vec<usize>],
    cycles: &[[usize; 4]],
    grid: &[usize; 4],
) -> Result<usize, usize> {
    let mut found = node_cells[grid[0]]
        .iter()
        .copied()
        .filter(|&cell| grid.iter().all(|n| cycles[cell].contains(n)));
    match (found.next(), found.count()) {
        (Some(cell), 0) => Ok(cell),
        (None, _) => Err(0),
        (Some(_), more) => Err(1 + more),
    }
}

#[inline]
fn sorted([a, b]: [usize; 2]) -> [usize; 2] {
    if a <= b {
        [a, b]
    } else {
        [b, a]
    }
}

/// [`Compass::observe`], reporting a mismatch as a consistency failure.
fn observe<const N: usize>(
    grid: &[usize; N],
    stored: &[usize; N],
    what: impl FnOnce() -> String,
) -> Result<Compass<N>, MeshError>
where
    Tables: CompassTable<N>,
{
    Compass::observe(grid, stored).map_err(|_| MeshError::consistency(what(), grid, stored))
}
