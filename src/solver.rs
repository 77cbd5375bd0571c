//! Time stepping of the airfoil flow over any traversal.

use serde::Serialize;
use std::io::Write;

use crate::{
    config::{FlowConfig, FlowConstants, SolverConfig},
    dispatch::{Dispatcher, Traversal},
    kernels::airfoil::{AdtCalc, BresCalc, ResCalc, SaveSoln, State, Update},
    MeshError, QuadMesh,
};

/// Per-cell arrays of the flow solution.
#[derive(Clone, Debug, PartialEq)]
pub struct FlowState {
    pub q: Vec<State>,
    pub qold: Vec<State>,
    pub adt: Vec<f64>,
    pub res: Vec<State>,
}

impl FlowState {
    /// Uniform free stream everywhere.
    pub fn new(num_cells: usize, flow: &FlowConstants) -> Self {
        Self {
            q: vec![flow.qinf; num_cells],
            qold: vec![[0.0; 4]; num_cells],
            adt: vec![0.0; num_cells],
            res: vec![[0.0; 4]; num_cells],
        }
    }

    /// XOR of the bit patterns of every value, for exact comparison of runs.
    ///
    /// The XOR doesn't depend on element order,
    /// so states in different index spaces can be compared
    /// as long as the values themselves are identical.
    pub fn checksum(&self, bounds: &[i32]) -> Checksum {
        let xor = |states: &[State]| {
            states
                .iter()
                .flatten()
                .fold(0u64, |acc, v| acc ^ v.to_bits())
        };
        Checksum {
            q: xor(&self.q),
            qold: xor(&self.qold),
            res: xor(&self.res),
            bound: bounds.iter().fold(0, |acc, b| acc ^ b),
        }
    }
}

/// Order-independent fingerprint of a [`FlowState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Checksum {
    pub q: u64,
    pub qold: u64,
    pub res: u64,
    pub bound: i32,
}

/// Drives the airfoil kernels over a mesh.
pub struct Solver<'m> {
    dispatcher: Dispatcher<'m>,
    flow: FlowConstants,
    state: FlowState,
    iteration: usize,
}

impl<'m> Solver<'m> {
    pub fn new(mesh: &'m QuadMesh, traversal: Traversal, flow: &FlowConfig) -> Result<Self, MeshError> {
        flow.validate()?;
        let dispatcher = Dispatcher::new(mesh, traversal)?;
        let flow = flow.constants();
        Ok(Self {
            dispatcher,
            state: FlowState::new(mesh.num_cells(), &flow),
            flow,
            iteration: 0,
        })
    }

    #[inline]
    pub fn state(&self) -> &FlowState {
        &self.state
    }

    #[inline]
    pub fn dispatcher(&self) -> &Dispatcher<'m> {
        &self.dispatcher
    }

    /// Number of iterations run so far.
    #[inline]
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Run one iteration of the two-stage scheme and return the rms change.
    pub fn iterate(&mut self) -> Result<f64, MeshError> {
        let dispatcher = &self.dispatcher;
        let flow = &self.flow;
        let state = &mut self.state;
        let x = dispatcher.coords();

        dispatcher.cells(&mut SaveSoln {
            q: &state.q,
            qold: &mut state.qold,
        })?;

        let mut rms = 0.0;
        for _ in 0..2 {
            dispatcher.cells(&mut AdtCalc {
                flow,
                x,
                q: &state.q,
                adt: &mut state.adt,
            })?;
            dispatcher.interior_edges(&mut ResCalc {
                flow,
                x,
                q: &state.q,
                adt: &state.adt,
                res: &mut state.res,
            })?;
            dispatcher.border_edges(&mut BresCalc {
                flow,
                x,
                q: &state.q,
                adt: &state.adt,
                res: &mut state.res,
            })?;
            let mut update = Update {
                qold: &state.qold,
                adt: &state.adt,
                q: &mut state.q,
                res: &mut state.res,
                rms: 0.0,
            };
            dispatcher.cells(&mut update)?;
            rms = update.rms;
        }

        self.iteration += 1;
        Ok((rms / self.state.q.len() as f64).sqrt())
    }

    /// Run the configured number of iterations,
    /// returning `(iteration, rms)` at every report interval.
    pub fn run(&mut self, config: &SolverConfig) -> Result<Vec<(usize, f64)>, MeshError> {
        config.validate()?;
        let _span = tracing::info_span!("solve", traversal = %self.dispatcher.traversal()).entered();
        tracing::info!(
            cells = self.state.q.len(),
            iterations = config.iterations,
            mach = config.flow.mach,
            alpha = config.flow.alpha,
            "starting"
        );

        let mut history = Vec::with_capacity(config.iterations / config.report_interval);
        for _ in 0..config.iterations {
            let rms = self.iterate()?;
            if self.iteration % config.report_interval == 0 {
                tracing::info!(iteration = self.iteration, rms, "residual");
                history.push((self.iteration, rms));
            }
        }
        Ok(history)
    }

    pub fn checksum(&self) -> Checksum {
        self.state.checksum(&self.dispatcher.arrays().border_bounds)
    }

    /// The solution `q` with cells in raw order, whatever the traversal.
    pub fn q_in_raw_order(&self) -> Vec<State> {
        let mesh = self.dispatcher.mesh();
        match self.dispatcher.traversal() {
            Traversal::Raw => self.state.q.clone(),
            Traversal::Hybrid | Traversal::Unstructured => {
                mesh.cell_map.old_to_new().iter().map(|&new| self.state.q[new]).collect()
            }
        }
    }

    /// Write the solution in raw cell order:
    /// a header line `N 4` and one line of four values per cell.
    pub fn write_q(&self, out: &mut impl Write) -> Result<(), MeshError> {
        let q = self.q_in_raw_order();
        writeln!(out, "{} 4", q.len())?;
        for [a, b, c, d] in q {
            writeln!(out, "{a:.6} {b:.6} {c:.6} {d:.6}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build, mesh::GridSpec};
    use approx::assert_relative_eq;

    fn mesh() -> QuadMesh {
        let grid = GridSpec {
            scramble: true,
            cell_rotation: 1,
            ..Default::default()
        }
        .generate()
        .unwrap();
        build(grid.arrays, &grid.node_grids).unwrap()
    }

    fn holed_mesh() -> QuadMesh {
        let grid = crate::mesh::generate::holed().generate().unwrap();
        build(grid.arrays, &grid.node_grids).unwrap()
    }

    #[test]
    fn traversals_agree() {
        let flow = FlowConfig::default();
        for mesh in [mesh(), holed_mesh()] {
            let mut solvers: Vec<Solver> = Traversal::ALL
                .into_iter()
                .map(|t| Solver::new(&mesh, t, &flow).unwrap())
                .collect();

            for _ in 0..5 {
                let rms: Vec<f64> = solvers.iter_mut().map(|s| s.iterate().unwrap()).collect();
                assert!(rms[0] > 0.0);
                for r in &rms[1..] {
                    assert_relative_eq!(*r, rms[0], epsilon = 1e-14, max_relative = 1e-9);
                }
            }

            let reference = solvers[0].q_in_raw_order();
            for solver in &solvers[1..] {
                for (a, b) in reference.iter().zip(solver.q_in_raw_order()) {
                    for n in 0..4 {
                        assert_relative_eq!(a[n], b[n], epsilon = 1e-14, max_relative = 1e-9);
                    }
                }
            }
            assert_ne!(solvers[0].state().q, vec![flow.constants().qinf; mesh.num_cells()]);
        }
    }

    #[test]
    fn saved_solution_is_bitwise_identical() {
        let mesh = mesh();
        let flow = FlowConfig::default();
        let mut hybrid = Solver::new(&mesh, Traversal::Hybrid, &flow).unwrap();
        let mut unstructured = Solver::new(&mesh, Traversal::Unstructured, &flow).unwrap();
        assert_eq!(hybrid.checksum(), unstructured.checksum());

        hybrid.iterate().unwrap();
        unstructured.iterate().unwrap();
        assert_eq!(hybrid.state().qold, unstructured.state().qold);
        assert_eq!(hybrid.checksum().qold, unstructured.checksum().qold);
        assert_eq!(hybrid.checksum().bound, unstructured.checksum().bound);
    }

    #[test]
    fn run_reports_at_intervals() {
        let mesh = mesh();
        let config = SolverConfig {
            iterations: 10,
            report_interval: 4,
            ..Default::default()
        };
        let mut solver = Solver::new(&mesh, config.traversal, &config.flow).unwrap();
        let history = solver.run(&config).unwrap();
        let iterations: Vec<usize> = history.iter().map(|(i, _)| *i).collect();
        assert_eq!(iterations, [4, 8]);
        assert_eq!(solver.iteration(), 10);
        assert!(history.iter().all(|(_, rms)| rms.is_finite()));
    }

    #[test]
    fn write_q_format() {
        let mesh = mesh();
        let solver = Solver::new(&mesh, Traversal::Hybrid, &FlowConfig::default()).unwrap();
        let mut out = Vec::new();
        solver.write_q(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("35 4"));
        let first: Vec<f64> = lines
            .next()
            .unwrap()
            .split_whitespace()
            .map(|v| v.parse().unwrap())
            .collect();
        assert_eq!(first.len(), 4);
        assert_relative_eq!(first[0], 1.0);
        assert_eq!(lines.count(), 34);
    }

    #[test]
    fn checksum_tracks_bits() {
        let flow = FlowConfig::default().constants();
        let a = FlowState::new(3, &flow);
        let mut b = a.clone();
        assert_eq!(a.checksum(&[1, 2]), b.checksum(&[1, 2]));
        b.q[1][2] = -0.0;
        assert_ne!(a.checksum(&[1, 2]), b.checksum(&[1, 2]));
        assert_ne!(a.checksum(&[1, 2]), a.checksum(&[1, 3]));
    }
}
