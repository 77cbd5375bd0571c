//! Driving kernels over the cells and edges of a [`QuadMesh`].
//!
//! In the hybrid traversal, elements of structured regions are addressed
//! arithmetically from their region descriptors,
//! and only the unstructured remainder is read from stored adjacency.
//! Because the descriptors and the stored adjacency are independent data,
//! every structured element is checked against its stored counterpart
//! before the kernel sees it, along with the visit counts of every region.
//! These checks are always on and any failure aborts the traversal.
//!
//! Kernels are values implementing [`CellKernel`], [`InteriorEdgeKernel`]
//! or [`BorderEdgeKernel`]. They hold shared borrows of their input arrays
//! and mutable borrows of their outputs, so only outputs can be written.
//! Plain closures implement the kernel traits as well.

use itertools::izip;
use serde::{Deserialize, Serialize};

use crate::{
    error::check_eq,
    mesh::{Coord, IndexSpace, MeshArrays, QuadMesh},
    MeshError,
};

/// A cell as seen by a kernel.
#[derive(Clone, Copy, Debug)]
pub struct CellVisit<'m> {
    pub id: usize,
    /// nodes in the cell's stored cycle order
    pub nodes: [usize; 4],
    pub mesh: &'m QuadMesh,
}

/// An interior edge as seen by a kernel.
#[derive(Clone, Copy, Debug)]
pub struct InteriorEdgeVisit<'m> {
    pub id: usize,
    pub nodes: [usize; 2],
    pub cells: [usize; 2],
    /// nodes of `cells[0]` and `cells[1]` in their stored cycle order
    pub cell_nodes: [[usize; 4]; 2],
    pub mesh: &'m QuadMesh,
}

/// A border edge as seen by a kernel.
#[derive(Clone, Copy, Debug)]
pub struct BorderEdgeVisit<'m> {
    pub id: usize,
    pub nodes: [usize; 2],
    pub cell: usize,
    pub cell_nodes: [usize; 4],
    /// boundary condition tag
    pub bound: i32,
    pub mesh: &'m QuadMesh,
}

/// A computation run once per cell.
pub trait CellKernel {
    const NAME: &'static str = "cell kernel";
    fn visit(&mut self, cell: &CellVisit<'_>);
}

/// A computation run once per interior edge.
pub trait InteriorEdgeKernel {
    const NAME: &'static str = "interior edge kernel";
    fn visit(&mut self, edge: &InteriorEdgeVisit<'_>);
}

/// A computation run once per border edge.
pub trait BorderEdgeKernel {
    const NAME: &'static str = "border edge kernel";
    fn visit(&mut self, edge: &BorderEdgeVisit<'_>);
}

impl<F: FnMut(&CellVisit<'_>)> CellKernel for F {
    #[inline]
    fn visit(&mut self, cell: &CellVisit<'_>) {
        self(cell)
    }
}

impl<F: FnMut(&InteriorEdgeVisit<'_>)> InteriorEdgeKernel for F {
    #[inline]
    fn visit(&mut self, edge: &InteriorEdgeVisit<'_>) {
        self(edge)
    }
}

impl<F: FnMut(&BorderEdgeVisit<'_>)> BorderEdgeKernel for F {
    #[inline]
    fn visit(&mut self, edge: &BorderEdgeVisit<'_>) {
        self(edge)
    }
}

/// How a [`Dispatcher`] walks the mesh.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Traversal {
    /// Structured regions arithmetically, then the stored remainder,
    /// in the relabeled index space.
    #[default]
    Hybrid,
    /// Stored adjacency only, in the relabeled index space.
    Unstructured,
    /// Stored adjacency only, in the raw index space.
    Raw,
}

impl Traversal {
    pub const ALL: [Traversal; 3] = [Traversal::Hybrid, Traversal::Unstructured, Traversal::Raw];

    /// The index space element ids refer to in this traversal.
    pub fn space(self) -> IndexSpace {
        match self {
            Traversal::Raw => IndexSpace::Raw,
            Traversal::Hybrid | Traversal::Unstructured => IndexSpace::Relabeled,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Traversal::Hybrid => "hybrid",
            Traversal::Unstructured => "unstructured",
            Traversal::Raw => "raw",
        }
    }
}

impl std::fmt::Display for Traversal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Traversal {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| {
                MeshError::Configuration(format!(
                    "unknown traversal `{s}`, expected one of hybrid, unstructured, raw"
                ))
            })
    }
}

/// Number of elements a traversal handed to its kernel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Visited {
    /// elements addressed through structured region descriptors
    pub structured: usize,
    /// elements read from stored adjacency
    pub unstructured: usize,
}

impl Visited {
    #[inline]
    pub fn total(&self) -> usize {
        self.structured + self.unstructured
    }
}

/// Runs kernels over a mesh with a fixed traversal.
#[derive(Clone, Copy, Debug)]
pub struct Dispatcher<'m> {
    mesh: &'m QuadMesh,
    traversal: Traversal,
}

impl<'m> Dispatcher<'m> {
    /// Validate the mesh and prepare to traverse it.
    pub fn new(mesh: &'m QuadMesh, traversal: Traversal) -> Result<Self, MeshError> {
        mesh.validate()?;
        Ok(Self { mesh, traversal })
    }

    #[inline]
    pub fn mesh(&self) -> &'m QuadMesh {
        self.mesh
    }

    #[inline]
    pub fn traversal(&self) -> Traversal {
        self.traversal
    }

    /// Stored arrays of the index space the traversal works in.
    #[inline]
    pub fn arrays(&self) -> &'m MeshArrays {
        self.mesh.arrays(self.traversal.space())
    }

    /// Node coordinates indexed by the node ids kernels receive.
    #[inline]
    pub fn coords(&self) -> &'m [Coord] {
        &self.arrays().coords
    }

    /// Run a kernel on every cell.
    pub fn cells<K: CellKernel>(&self, kernel: &mut K) -> Result<Visited, MeshError> {
        let _span = tracing::trace_span!("cells", kernel = K::NAME, traversal = %self.traversal)
            .entered();

        let mesh = self.mesh;
        let visited = match self.traversal {
            Traversal::Hybrid => {
                let structured = self.structured_cells(kernel)?;
                let stored = &mesh.relabeled.cell_nodes;
                let mut unstructured = 0;
                for id in mesh.unstructured_cells_offset..mesh.num_cells() {
                    kernel.visit(&CellVisit {
                        id,
                        nodes: stored[id],
                        mesh,
                    });
                    unstructured += 1;
                }
                Visited {
                    structured,
                    unstructured,
                }
            }
            Traversal::Unstructured | Traversal::Raw => {
                let mut unstructured = 0;
                for (id, &nodes) in self.arrays().cell_nodes.iter().enumerate() {
                    kernel.visit(&CellVisit { id, nodes, mesh });
                    unstructured += 1;
                }
                Visited {
                    structured: 0,
                    unstructured,
                }
            }
        };
        check_eq(|| "total cells visited", mesh.num_cells(), visited.total())?;
        tracing::trace!(?visited, "cells done");
        Ok(visited)
    }

    fn structured_cells<K: CellKernel>(&self, kernel: &mut K) -> Result<usize, MeshError> {
        let mesh = self.mesh;
        let stored = &mesh.relabeled.cell_nodes;

        let mut id = 0;
        for (k, (nodes, cells)) in mesh.node_regions.iter().zip(&mesh.cell_regions).enumerate() {
            let region_start = id;
            for (r, c) in cells.extent.points() {
                let grid = [
                    nodes.node(r, c),
                    nodes.node(r, c + 1),
                    nodes.node(r + 1, c),
                    nodes.node(r + 1, c + 1),
                ];
                let quad = cells.compass.apply(grid);
                check_eq(
                    || format!("nodes of cell {id} at ({r}, {c}) in structured region {k}"),
                    stored[id],
                    quad,
                )?;
                kernel.visit(&CellVisit {
                    id,
                    nodes: quad,
                    mesh,
                });
                id += 1;
            }
            check_eq(
                || format!("cells visited in structured region {k}"),
                cells.extent.num_rows() * cells.extent.num_cols(),
                id - region_start,
            )?;
        }
        check_eq(
            || "structured cells visited against the unstructured cell offset",
            mesh.unstructured_cells_offset,
            id,
        )?;
        Ok(id)
    }

    /// Run a kernel on every interior edge.
    pub fn interior_edges<K: InteriorEdgeKernel>(
        &self,
        kernel: &mut K,
    ) -> Result<Visited, MeshError> {
        let _span =
            tracing::trace_span!("interior_edges", kernel = K::NAME, traversal = %self.traversal)
                .entered();

        let mesh = self.mesh;
        let visited = match self.traversal {
            Traversal::Hybrid => {
                let structured = self.structured_edges(kernel)?;
                let arrays = &mesh.relabeled;
                let mut unstructured = 0;
                for id in mesh.unstructured_inedges_offset..mesh.num_inedges() {
                    kernel.visit(&stored_edge(arrays, id, mesh));
                    unstructured += 1;
                }
                Visited {
                    structured,
                    unstructured,
                }
            }
            Traversal::Unstructured | Traversal::Raw => {
                let arrays = self.arrays();
                for id in 0..arrays.num_inedges() {
                    kernel.visit(&stored_edge(arrays, id, mesh));
                }
                Visited {
                    structured: 0,
                    unstructured: arrays.num_inedges(),
                }
            }
        };
        check_eq(|| "total interior edges visited", mesh.num_inedges(), visited.total())?;
        tracing::trace!(?visited, "interior edges done");
        Ok(visited)
    }

    fn structured_edges<K: InteriorEdgeKernel>(&self, kernel: &mut K) -> Result<usize, MeshError> {
        let mesh = self.mesh;

        let mut visited = 0;
        for (k, (nodes, cells, h, v)) in izip!(
            &mesh.node_regions,
            &mesh.cell_regions,
            &mesh.h_edge_regions,
            &mesh.v_edge_regions
        )
        .enumerate()
        {
            check_eq(
                || format!("horizontal and vertical edge extents of structured region {k}"),
                h.extent,
                v.extent,
            )?;
            check_eq(
                || format!("first horizontal edge of structured region {k}"),
                visited,
                h.offset,
            )?;

            let quad = |r: usize, c: usize| {
                cells.compass.apply([
                    nodes.node(r, c),
                    nodes.node(r, c + 1),
                    nodes.node(r + 1, c),
                    nodes.node(r + 1, c + 1),
                ])
            };

            let mut points = 0;
            for (r, c) in h.extent.points() {
                // edge extents start at row and column 1,
                // so the cells above and to the left exist
                let horizontal = InteriorEdgeVisit {
                    id: h.offset + points,
                    nodes: h.node_compass.apply([nodes.node(r, c), nodes.node(r, c + 1)]),
                    cells: h.cell_compass.apply([cells.cell(r - 1, c), cells.cell(r, c)]),
                    cell_nodes: h.cell_compass.apply([quad(r - 1, c), quad(r, c)]),
                    mesh,
                };
                let vertical = InteriorEdgeVisit {
                    id: v.offset + points,
                    nodes: v.node_compass.apply([nodes.node(r, c), nodes.node(r + 1, c)]),
                    cells: v.cell_compass.apply([cells.cell(r, c - 1), cells.cell(r, c)]),
                    cell_nodes: v.cell_compass.apply([quad(r, c - 1), quad(r, c)]),
                    mesh,
                };
                check_stored(&horizontal, "horizontal", k, (r, c))?;
                check_stored(&vertical, "vertical", k, (r, c))?;

                kernel.visit(&horizontal);
                kernel.visit(&vertical);
                points += 1;
            }
            check_eq(
                || format!("grid points visited in edge region {k}"),
                h.extent.num_rows() * h.extent.num_cols(),
                points,
            )?;
            visited += 2 * points;
        }
        check_eq(
            || "structured interior edges visited against the unstructured edge offset",
            mesh.unstructured_inedges_offset,
            visited,
        )?;
        Ok(visited)
    }

    /// Run a kernel on every border edge.
    ///
    /// Border edges are always read from stored adjacency.
    pub fn border_edges<K: BorderEdgeKernel>(&self, kernel: &mut K) -> Result<Visited, MeshError> {
        let _span =
            tracing::trace_span!("border_edges", kernel = K::NAME, traversal = %self.traversal)
                .entered();

        let mesh = self.mesh;
        let arrays = self.arrays();
        let mut unstructured = 0;
        for (id, (&nodes, &cell, &bound)) in
            izip!(&arrays.border_nodes, &arrays.border_cell, &arrays.border_bounds).enumerate()
        {
            kernel.visit(&BorderEdgeVisit {
                id,
                nodes,
                cell,
                cell_nodes: arrays.cell_nodes[cell],
                bound,
                mesh,
            });
            unstructured += 1;
        }
        check_eq(
            || "total border edges visited",
            mesh.num_border_edges(),
            unstructured,
        )?;
        Ok(Visited {
            structured: 0,
            unstructured,
        })
    }
}

#[inline]
fn stored_edge<'m>(arrays: &MeshArrays, id: usize, mesh: &'m QuadMesh) -> InteriorEdgeVisit<'m> {
    let cells = arrays.inedge_cells[id];
    InteriorEdgeVisit {
        id,
        nodes: arrays.inedge_nodes[id],
        cells,
        cell_nodes: cells.map(|c| arrays.cell_nodes[c]),
        mesh,
    }
}

/// Compare an arithmetically addressed edge against the stored relabeled adjacency.
fn check_stored(
    edge: &InteriorEdgeVisit<'_>,
    dir: &str,
    region: usize,
    (r, c): (usize, usize),
) -> Result<(), MeshError> {
    let stored = &edge.mesh.relabeled;
    let id = edge.id;
    let at = || format!("{dir} edge {id} at ({r}, {c}) in structured region {region}");
    check_eq(|| format!("nodes of {}", at()), stored.inedge_nodes[id], edge.nodes)?;
    check_eq(|| format!("cells of {}", at()), stored.inedge_cells[id], edge.cells)?;
    for (side, (&cell, &nodes)) in edge.cells.iter().zip(&edge.cell_nodes).enumerate() {
        check_eq(
            || format!("nodes of cell {side} of {}", at()),
            stored.cell_nodes[cell],
            nodes,
        )?;
    }
    Ok(())
}
