//! Finite-volume kernels of the classic 2D inviscid airfoil benchmark.
//!
//! The flow state of a cell is `[density, x momentum, y momentum, energy]`.

use crate::{
    config::FlowConstants,
    dispatch::{BorderEdgeKernel, BorderEdgeVisit, CellKernel, CellVisit},
    dispatch::{InteriorEdgeKernel, InteriorEdgeVisit},
    mesh::Coord,
};

/// Conserved variables of one cell.
pub type State = [f64; 4];

/// Boundary tag of a solid wall. Everything else is far-field.
pub const WALL: i32 = 1;

#[inline]
fn pressure(flow: &FlowConstants, q: &State) -> f64 {
    let ri = 1.0 / q[0];
    flow.gm1 * (q[3] - 0.5 * ri * (q[1] * q[1] + q[2] * q[2]))
}

/// Flux through a side with `d = x(node0) - x(node1)`
/// between two states, with dissipation coefficient `mu`.
#[inline]
fn flux(flow: &FlowConstants, d: Coord, q1: &State, q2: &State, mu: f64) -> State {
    let (dx, dy) = (d.x, d.y);

    let p1 = pressure(flow, q1);
    let vol1 = (1.0 / q1[0]) * (q1[1] * dy - q1[2] * dx);
    let p2 = pressure(flow, q2);
    let vol2 = (1.0 / q2[0]) * (q2[1] * dy - q2[2] * dx);

    [
        0.5 * (vol1 * q1[0] + vol2 * q2[0]) + mu * (q1[0] - q2[0]),
        0.5 * (vol1 * q1[1] + p1 * dy + vol2 * q2[1] + p2 * dy) + mu * (q1[1] - q2[1]),
        0.5 * (vol1 * q1[2] - p1 * dx + vol2 * q2[2] - p2 * dx) + mu * (q1[2] - q2[2]),
        0.5 * (vol1 * (q1[3] + p1) + vol2 * (q2[3] + p2)) + mu * (q1[3] - q2[3]),
    ]
}

/// Copy the current state aside before the two-stage update.
pub struct SaveSoln<'a> {
    pub q: &'a [State],
    pub qold: &'a mut [State],
}

impl CellKernel for SaveSoln<'_> {
    const NAME: &'static str = "save_soln";

    #[inline]
    fn visit(&mut self, cell: &CellVisit<'_>) {
        self.qold[cell.id] = self.q[cell.id];
    }
}

/// Local time step of each cell, from the wave speed across its sides.
pub struct AdtCalc<'a> {
    pub flow: &'a FlowConstants,
    pub x: &'a [Coord],
    pub q: &'a [State],
    pub adt: &'a mut [f64],
}

impl CellKernel for AdtCalc<'_> {
    const NAME: &'static str = "adt_calc";

    #[inline]
    fn visit(&mut self, cell: &CellVisit<'_>) {
        let q = &self.q[cell.id];
        let ri = 1.0 / q[0];
        let u = ri * q[1];
        let v = ri * q[2];
        let c = (self.flow.gam * self.flow.gm1 * (ri * q[3] - 0.5 * (u * u + v * v))).sqrt();

        let mut adt = 0.0;
        for k in 0..4 {
            let d = self.x[cell.nodes[(k + 1) % 4]] - self.x[cell.nodes[k]];
            adt += (u * d.y - v * d.x).abs() + c * (d.x * d.x + d.y * d.y).sqrt();
        }
        self.adt[cell.id] = adt / self.flow.cfl;
    }
}

/// Flux across interior edges, added to the first cell's residual
/// and subtracted from the second's.
pub struct ResCalc<'a> {
    pub flow: &'a FlowConstants,
    pub x: &'a [Coord],
    pub q: &'a [State],
    pub adt: &'a [f64],
    pub res: &'a mut [State],
}

impl InteriorEdgeKernel for ResCalc<'_> {
    const NAME: &'static str = "res_calc";

    #[inline]
    fn visit(&mut self, edge: &InteriorEdgeVisit<'_>) {
        let [c1, c2] = edge.cells;
        let d = self.x[edge.nodes[0]] - self.x[edge.nodes[1]];
        let mu = 0.5 * (self.adt[c1] + self.adt[c2]) * self.flow.eps;
        let f = flux(self.flow, d, &self.q[c1], &self.q[c2], mu);
        for (n, f) in f.into_iter().enumerate() {
            self.res[c1][n] += f;
            self.res[c2][n] -= f;
        }
    }
}

/// Boundary fluxes: pressure only on walls,
/// a flux against the free stream elsewhere.
pub struct BresCalc<'a> {
    pub flow: &'a FlowConstants,
    pub x: &'a [Coord],
    pub q: &'a [State],
    pub adt: &'a [f64],
    pub res: &'a mut [State],
}

impl BorderEdgeKernel for BresCalc<'_> {
    const NAME: &'static str = "bres_calc";

    #[inline]
    fn visit(&mut self, edge: &BorderEdgeVisit<'_>) {
        let d = self.x[edge.nodes[0]] - self.x[edge.nodes[1]];
        let q1 = &self.q[edge.cell];
        let res = &mut self.res[edge.cell];

        if edge.bound == WALL {
            let p1 = pressure(self.flow, q1);
            res[1] += p1 * d.y;
            res[2] -= p1 * d.x;
        } else {
            let mu = self.adt[edge.cell] * self.flow.eps;
            let f = flux(self.flow, d, q1, &self.flow.qinf, mu);
            for (r, f) in res.iter_mut().zip(f) {
                *r += f;
            }
        }
    }
}

/// Apply the residual to the saved state and reset it,
/// accumulating the squared change for the rms.
pub struct Update<'a> {
    pub qold: &'a [State],
    pub adt: &'a [f64],
    pub q: &'a mut [State],
    pub res: &'a mut [State],
    pub rms: f64,
}

impl CellKernel for Update<'_> {
    const NAME: &'static str = "update";

    #[inline]
    fn visit(&mut self, cell: &CellVisit<'_>) {
        let id = cell.id;
        let adti = 1.0 / self.adt[id];
        for n in 0..4 {
            let del = adti * self.res[id][n];
            self.q[id][n] = self.qold[id][n] - del;
            self.res[id][n] = 0.0;
            self.rms += del * del;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        build,
        config::FlowConfig,
        dispatch::{Dispatcher, Traversal},
        mesh::GridSpec,
        QuadMesh,
    };

    fn mesh(spec: &GridSpec) -> QuadMesh {
        let grid = spec.generate().unwrap();
        build(grid.arrays, &grid.node_grids).unwrap()
    }

    /// Cells of the mesh that have no border edge.
    fn interior_cells(mesh: &QuadMesh) -> Vec<usize> {
        (0..mesh.num_cells())
            .filter(|c| !mesh.relabeled.border_cell.contains(c))
            .collect()
    }

    /// Time steps and interior residuals of a uniform free stream.
    fn freestream(mesh: &QuadMesh, traversal: Traversal, flow: &FlowConstants) -> (Vec<f64>, Vec<State>) {
        let dispatcher = Dispatcher::new(mesh, traversal).unwrap();
        let x = dispatcher.coords();
        let q = vec![flow.qinf; mesh.num_cells()];
        let mut adt = vec![0.0; mesh.num_cells()];
        let mut res = vec![[0.0; 4]; mesh.num_cells()];

        dispatcher
            .cells(&mut AdtCalc {
                flow,
                x,
                q: &q,
                adt: &mut adt,
            })
            .unwrap();
        dispatcher
            .interior_edges(&mut ResCalc {
                flow,
                x,
                q: &q,
                adt: &adt,
                res: &mut res,
            })
            .unwrap();
        (adt, res)
    }

    #[test]
    fn freestream_residual_is_exactly_zero() {
        let flow = FlowConfig::default().constants();
        for spec in [
            GridSpec::default(),
            GridSpec {
                dx: 0.1,
                dy: 0.3,
                flip_edges: true,
                cell_rotation: 2,
                scramble: true,
                ..Default::default()
            },
        ] {
            let mesh = mesh(&spec);
            for traversal in Traversal::ALL {
                let (_, res) = freestream(&mesh, traversal, &flow);
                let interior = interior_cells(&mesh);
                assert!(!interior.is_empty());
                for cell in interior {
                    let cell = match traversal {
                        Traversal::Raw => mesh.cell_map.to_old(cell),
                        _ => cell,
                    };
                    assert_eq!(res[cell], [0.0; 4], "cell {cell} in {traversal} traversal");
                }
            }
        }
    }

    #[test]
    fn freestream_on_irregular_cells() {
        let flow = FlowConfig::default().constants();
        let mesh = mesh(&crate::mesh::generate::holed());
        let interior = interior_cells(&mesh);
        assert_eq!(interior.len(), 19);

        let (hybrid_adt, _) = freestream(&mesh, Traversal::Hybrid, &flow);
        for traversal in Traversal::ALL {
            let (adt, res) = freestream(&mesh, traversal, &flow);
            for &cell in &interior {
                let raw = match traversal {
                    Traversal::Raw => mesh.cell_map.to_old(cell),
                    _ => cell,
                };
                // edge vectors around a jittered cell only cancel up to rounding
                for n in 0..4 {
                    approx::assert_abs_diff_eq!(res[raw][n], 0.0, epsilon = 1e-12);
                }
                approx::assert_relative_eq!(adt[raw], hybrid_adt[cell], max_relative = 1e-12);
            }
            if traversal == Traversal::Unstructured {
                assert_eq!(adt, hybrid_adt);
            }
        }

        // every cell has its own shape and so its own time step
        let mut adt = hybrid_adt;
        adt.sort_unstable_by(f64::total_cmp);
        assert!(adt.windows(2).all(|w| w[0] != w[1]));
    }

    #[test]
    fn wall_touches_only_momentum() {
        let flow = FlowConfig::default().constants();
        let mesh = mesh(&GridSpec::default());
        let dispatcher = Dispatcher::new(&mesh, Traversal::Hybrid).unwrap();
        let x = dispatcher.coords();

        // a non-uniform state so that every flux component is nonzero
        let q: Vec<State> = (0..mesh.num_cells())
            .map(|c| {
                let s = 1.0 + 0.01 * c as f64;
                [s, 0.3 * s, 0.1 * s, 2.5 * s]
            })
            .collect();
        let adt = vec![1.0; mesh.num_cells()];
        let mut res = vec![[0.0; 4]; mesh.num_cells()];

        let mut walls = 0;
        let mut far = 0;
        dispatcher
            .border_edges(&mut |edge: &BorderEdgeVisit| {
                res.iter_mut().for_each(|r| *r = [0.0; 4]);
                let mut kernel = BresCalc {
                    flow: &flow,
                    x,
                    q: &q,
                    adt: &adt,
                    res: &mut res,
                };
                kernel.visit(edge);

                let r = res[edge.cell];
                if edge.bound == WALL {
                    walls += 1;
                    assert_eq!(r[0], 0.0);
                    assert_eq!(r[3], 0.0);
                    // walls run along x, so only the y momentum sees the pressure
                    assert_eq!(r[1], 0.0);
                    assert!(r[2] != 0.0);
                } else {
                    far += 1;
                    assert!(r[0] != 0.0);
                }
                // nothing else was touched
                for (cell, r) in res.iter().enumerate() {
                    if cell != edge.cell {
                        assert_eq!(*r, [0.0; 4]);
                    }
                }
            })
            .unwrap();
        assert_eq!(walls, 14);
        assert_eq!(far, 10);
    }

    #[test]
    fn update_applies_and_resets_residual() {
        let flow = FlowConfig::default().constants();
        let mesh = mesh(&GridSpec::default());
        let dispatcher = Dispatcher::new(&mesh, Traversal::Hybrid).unwrap();

        let n = mesh.num_cells();
        let qold = vec![flow.qinf; n];
        let adt = vec![2.0; n];
        let mut q = vec![[0.0; 4]; n];
        let mut res = vec![[1.0, 0.0, -2.0, 0.0]; n];
        let mut update = Update {
            qold: &qold,
            adt: &adt,
            q: &mut q,
            res: &mut res,
            rms: 0.0,
        };
        dispatcher.cells(&mut update).unwrap();

        approx::assert_relative_eq!(update.rms, n as f64 * (0.25 + 1.0));
        assert_eq!(q[3][0], flow.qinf[0] - 0.5);
        assert_eq!(q[3][2], 1.0);
        assert!(res.iter().all(|r| *r == [0.0; 4]));

        let mut saved = vec![[0.0; 4]; n];
        dispatcher
            .cells(&mut SaveSoln {
                q: &q,
                qold: &mut saved,
            })
            .unwrap();
        assert_eq!(saved, q);
    }

    #[test]
    fn time_step_of_a_unit_cell() {
        let flow = FlowConfig::default().constants();
        let mesh = mesh(&GridSpec::default());
        let dispatcher = Dispatcher::new(&mesh, Traversal::Unstructured).unwrap();
        let q = vec![flow.qinf; mesh.num_cells()];
        let mut adt = vec![0.0; mesh.num_cells()];
        dispatcher
            .cells(&mut AdtCalc {
                flow: &flow,
                x: dispatcher.coords(),
                q: &q,
                adt: &mut adt,
            })
            .unwrap();

        // |u dy| on the two vertical sides plus the sound speed on all four
        let u = flow.qinf[1];
        let c = (flow.gam * flow.gm1 * (flow.qinf[3] - 0.5 * u * u)).sqrt();
        for a in adt {
            approx::assert_relative_eq!(a, (2.0 * u + 4.0 * c) / flow.cfl, max_relative = 1e-12);
        }
    }
}
