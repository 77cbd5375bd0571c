//! Cross-checking of the three traversal modes on one mesh.
//!
//! Hybrid and unstructured traversals share the relabeled index space
//! and must hand every kernel the same local ids in the same slot order,
//! so per-element outputs are compared bit for bit.
//! Raw traversal sees cells before rotation and edges before flipping,
//! so it is compared through the index maps within a tolerance.

use serde::Serialize;

use crate::{
    config::FlowConfig,
    dispatch::{Dispatcher, Traversal, Visited},
    kernels::{
        airfoil::AdtCalc,
        diagnostic::{Area, Difference},
    },
    solver::Solver,
    MeshError, QuadMesh,
};

/// Outcome of a successful [`verify`].
///
/// Raw-mode and solver outputs are compared against the hybrid traversal.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyReport {
    pub cells: Visited,
    pub inedges: Visited,
    /// names of the outputs found bitwise identical in hybrid and unstructured mode
    pub bitwise: Vec<&'static str>,
    /// largest deviation of any output compared within tolerance,
    /// relative to its magnitude or absolute below 1
    pub max_raw_deviation: f64,
    /// rms of one solver iteration per traversal
    pub rms: Vec<(Traversal, f64)>,
}

/// Run the diagnostic kernels and one solver iteration in every traversal
/// and fail on the first disagreement.
pub fn verify(mesh: &QuadMesh, tolerance: f64) -> Result<VerifyReport, MeshError> {
    let _span = tracing::info_span!("verify").entered();
    let per_element = |traversal| -> Result<(Outputs, Visited, Visited), MeshError> {
        let dispatcher = Dispatcher::new(mesh, traversal)?;
        let x = dispatcher.coords();
        let flow = FlowConfig::default().constants();
        let q = vec![flow.qinf; mesh.num_cells()];

        let mut out = Outputs {
            area: vec![0.0; mesh.num_cells()],
            adt: vec![0.0; mesh.num_cells()],
            difference: vec![0.0; mesh.num_inedges()],
        };
        let cells = dispatcher.cells(&mut Area { x, area: &mut out.area })?;
        dispatcher.cells(&mut AdtCalc {
            flow: &flow,
            x,
            q: &q,
            adt: &mut out.adt,
        })?;
        let inedges = dispatcher.interior_edges(&mut Difference {
            x,
            out: &mut out.difference,
        })?;
        Ok((out, cells, inedges))
    };

    let (hybrid, cells, inedges) = per_element(Traversal::Hybrid)?;
    let (unstructured, ..) = per_element(Traversal::Unstructured)?;
    let (raw, ..) = per_element(Traversal::Raw)?;

    let mut bitwise = Vec::new();
    for (name, a, b) in [
        ("area", &hybrid.area, &unstructured.area),
        ("adt", &hybrid.adt, &unstructured.adt),
        ("difference", &hybrid.difference, &unstructured.difference),
    ] {
        if let Some(id) = (0..a.len()).find(|&i| a[i].to_bits() != b[i].to_bits()) {
            return Err(MeshError::consistency(
                format!("{name} of element {id} in hybrid and unstructured traversal"),
                a[id],
                b[id],
            ));
        }
        bitwise.push(name);
    }

    let mut max_raw_deviation: f64 = 0.0;
    let mut compare = |what: &str, id: usize, expected: f64, actual: f64| {
        let deviation = relative_deviation(expected, actual);
        max_raw_deviation = max_raw_deviation.max(deviation);
        if deviation > tolerance {
            Err(MeshError::consistency(
                format!("{what} of element {id}"),
                expected,
                actual,
            ))
        } else {
            Ok(())
        }
    };
    for new in 0..mesh.num_cells() {
        let old = mesh.cell_map.to_old(new);
        compare("area in raw traversal", new, hybrid.area[new], raw.area[old])?;
        compare("adt in raw traversal", new, hybrid.adt[new], raw.adt[old])?;
    }

    let flow = FlowConfig::default();
    let mut rms = Vec::new();
    let mut solutions = Vec::new();
    for traversal in Traversal::ALL {
        let mut solver = Solver::new(mesh, traversal, &flow)?;
        rms.push((traversal, solver.iterate()?));
        solutions.push(solver.q_in_raw_order());
    }
    for (traversal, solution) in Traversal::ALL.iter().zip(&solutions).skip(1) {
        for (cell, (a, b)) in solutions[0].iter().zip(solution).enumerate() {
            for n in 0..4 {
                compare(&format!("q[{n}] after one {traversal} iteration"), cell, a[n], b[n])?;
            }
        }
    }
    for &(traversal, r) in &rms[1..] {
        compare(&format!("rms of {traversal} iteration"), 0, rms[0].1, r)?;
    }

    tracing::info!(
        structured_cells = cells.structured,
        structured_inedges = inedges.structured,
        max_raw_deviation,
        "traversals agree"
    );
    Ok(VerifyReport {
        cells,
        inedges,
        bitwise,
        max_raw_deviation,
        rms,
    })
}

struct Outputs {
    area: Vec<f64>,
    adt: Vec<f64>,
    difference: Vec<f64>,
}

/// Relative difference for large values, absolute for values below 1,
/// so that results cancelling to almost zero compare sensibly.
fn relative_deviation(expected: f64, actual: f64) -> f64 {
    (expected - actual).abs() / expected.abs().max(actual.abs()).max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build, mesh::GridSpec};

    fn mesh(spec: GridSpec) -> QuadMesh {
        let grid = spec.generate().unwrap();
        build(grid.arrays, &grid.node_grids).unwrap()
    }

    #[test]
    fn generated_meshes_verify() {
        for spec in [
            GridSpec::default(),
            GridSpec {
                scramble: true,
                cell_rotation: 2,
                flip_edges: true,
                dx: 0.25,
                ..Default::default()
            },
        ] {
            let report = verify(&mesh(spec), 1e-9).unwrap();
            assert_eq!(report.cells.total(), 35);
            assert_eq!(report.cells.structured, 10);
            assert_eq!(report.inedges.structured, 6);
            assert_eq!(report.bitwise, ["area", "adt", "difference"]);
            assert!(report.max_raw_deviation <= 1e-9);
            assert_eq!(report.rms.len(), 3);
        }
    }

    #[test]
    fn jittered_mesh_with_a_hole_verifies() {
        let report = verify(&mesh(crate::mesh::generate::holed()), 1e-9).unwrap();
        assert_eq!(report.cells.total(), 47);
        assert_eq!(report.cells.structured, 40);
        assert_eq!(report.inedges.total(), 78);
        assert_eq!(report.inedges.structured, 42);
        assert_eq!(report.bitwise, ["area", "adt", "difference"]);
        assert!(report.max_raw_deviation <= 1e-9);
        assert!(report.rms.iter().all(|(_, rms)| *rms > 0.0));
    }

    #[test]
    fn unstructured_mesh_verifies() {
        let grid = GridSpec::default().generate().unwrap();
        let mesh = QuadMesh::unstructured(grid.arrays).unwrap();
        let report = verify(&mesh, 1e-9).unwrap();
        assert_eq!(report.cells.structured, 0);
        assert_eq!(report.max_raw_deviation, 0.0);
    }

    #[test]
    fn moved_raw_node_is_caught() {
        let mut mesh = mesh(GridSpec::default());
        // only the raw copy moves, which breaks the node map
        let node = mesh.raw.cell_nodes[0][0];
        mesh.raw.coords[node].x += 0.5;
        let err = verify(&mesh, 1e-9).unwrap_err();
        assert!(
            matches!(&err, MeshError::Consistency { check, .. } if check.contains("coordinates")),
            "{err}"
        );
    }

    #[test]
    fn deviation_is_relative() {
        assert_eq!(relative_deviation(2.0, 2.0), 0.0);
        assert_eq!(relative_deviation(0.0, 0.0), 0.0);
        approx::assert_relative_eq!(relative_deviation(100.0, 101.0), 1.0 / 101.0);
        assert_eq!(relative_deviation(0.0, 1e-300), 1e-300);
        assert_eq!(relative_deviation(-0.5, 0.5), 1.0);
    }
}
