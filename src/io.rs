//! Persistence of meshes in a sectioned binary container.

pub mod container;
pub use container::{Container, ContainerWriter, SectionReader, SectionWriter};

pub mod mesh_file;
pub use mesh_file::{load, load_raw, save, save_raw};
