//! Cheap kernels whose per-element outputs depend on exactly
//! which ids and slot orders the dispatcher produced,
//! used to compare traversals against each other.

use crate::{
    dispatch::{CellKernel, CellVisit, InteriorEdgeKernel, InteriorEdgeVisit},
    mesh::Coord,
};

/// Signed area of each cell, positive for counterclockwise node cycles.
pub struct Area<'a> {
    pub x: &'a [Coord],
    pub area: &'a mut [f64],
}

impl CellKernel for Area<'_> {
    const NAME: &'static str = "area";

    #[inline]
    fn visit(&mut self, cell: &CellVisit<'_>) {
        let x = cell.nodes.map(|n| self.x[n]);
        let twice: f64 = (0..4)
            .map(|k| {
                let (a, b) = (x[k], x[(k + 1) % 4]);
                a.x * b.y - b.x * a.y
            })
            .sum();
        self.area[cell.id] = 0.5 * twice;
    }
}

/// A mix of node and cell coordinates per interior edge,
/// weighted by slot so that any change in node or cell order shows up.
pub struct Difference<'a> {
    pub x: &'a [Coord],
    pub out: &'a mut [f64],
}

impl Difference<'_> {
    #[inline]
    fn weighted(x: &[Coord], nodes: &[usize; 4]) -> f64 {
        let s = nodes.map(|n| x[n].x + x[n].y);
        4.0 * s[0] + 3.0 * s[1] + 2.0 * s[2] + s[3]
    }
}

impl InteriorEdgeKernel for Difference<'_> {
    const NAME: &'static str = "difference";

    #[inline]
    fn visit(&mut self, edge: &InteriorEdgeVisit<'_>) {
        let (a, b) = (self.x[edge.nodes[0]], self.x[edge.nodes[1]]);
        let difference = a.x * a.y - b.x * b.y;
        let [cell0, cell1] = &edge.cell_nodes;
        self.out[edge.id] =
            difference + Self::weighted(self.x, cell0) - Self::weighted(self.x, cell1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        build,
        dispatch::{Dispatcher, Traversal},
        mesh::GridSpec,
    };
    use approx::assert_relative_eq;

    #[test]
    fn areas_of_a_stretched_grid() {
        let grid = GridSpec {
            dx: 0.5,
            dy: 2.0,
            cell_rotation: 1,
            scramble: true,
            ..Default::default()
        }
        .generate()
        .unwrap();
        let mesh = build(grid.arrays, &grid.node_grids).unwrap();

        for traversal in Traversal::ALL {
            let dispatcher = Dispatcher::new(&mesh, traversal).unwrap();
            let mut area = vec![0.0; mesh.num_cells()];
            dispatcher
                .cells(&mut Area {
                    x: dispatcher.coords(),
                    area: &mut area,
                })
                .unwrap();
            for a in area {
                assert_relative_eq!(a, 1.0, max_relative = 1e-12);
            }
        }
    }

    #[test]
    fn difference_sees_slot_order() {
        let grid = GridSpec::default().generate().unwrap();
        let mesh = build(grid.arrays, &grid.node_grids).unwrap();
        let run = |mesh: &crate::QuadMesh| {
            let dispatcher = Dispatcher::new(mesh, Traversal::Hybrid).unwrap();
            let mut out = vec![0.0; mesh.num_inedges()];
            dispatcher
                .interior_edges(&mut Difference {
                    x: dispatcher.coords(),
                    out: &mut out,
                })
                .unwrap();
            out
        };
        let before = run(&mesh);

        // swapping an unstructured edge around changes its value
        let edge = mesh.num_inedges() - 1;
        let mut swapped = mesh.clone();
        swapped.relabeled.inedge_nodes[edge].reverse();
        swapped.relabeled.inedge_cells[edge].reverse();
        let after = run(&swapped);

        assert_ne!(before[edge], after[edge]);
        assert_eq!(before[..edge], after[..edge]);
    }
}
