//! Hybrid structured/unstructured quad meshes for finite-volume codes.
//!
//! A mesh is ingested as plain adjacency arrays ([`MeshArrays`]),
//! rectangular patches of it are found ([`detect_node_regions`])
//! and relabeled into contiguous blocks ([`build`]),
//! and kernels are then run over it by a [`Dispatcher`]
//! that addresses the structured blocks arithmetically
//! while checking every element against the stored adjacency.

pub mod error;
#[doc(inline)]
pub use error::MeshError;

pub mod compass;
#[doc(inline)]
pub use compass::{Compass, PairCompass, QuadCompass};

pub mod relabel;
#[doc(inline)]
pub use relabel::Relabeler;

pub mod mesh;
#[doc(inline)]
pub use mesh::{GridSpec, MeshArrays, NodeGrid, QuadMesh, NO_NEIGHBOUR};

pub mod detect;
#[doc(inline)]
pub use detect::{detect_node_regions, DetectConfig};

pub mod build;
#[doc(inline)]
pub use build::build;

pub mod dispatch;
#[doc(inline)]
pub use dispatch::{
    BorderEdgeKernel, CellKernel, Dispatcher, InteriorEdgeKernel, Traversal, Visited,
};

pub mod kernels;

pub mod config;
#[doc(inline)]
pub use config::{FlowConfig, SolverConfig};

pub mod solver;
#[doc(inline)]
pub use solver::{FlowState, Solver};

pub mod verify;
#[doc(inline)]
pub use verify::{verify, VerifyReport};

pub mod io;

pub mod gmsh;
