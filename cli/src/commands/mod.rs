//! Subcommand implementations.

pub mod build;
pub mod generate;
pub mod import_msh;
pub mod inspect;
pub mod solve;
pub mod verify;

use anyhow::{Context, Result};
use clap::Args;
use quadweave::{config::load_json, DetectConfig, MeshArrays, QuadMesh};
use std::path::{Path, PathBuf};
use tracing::info;

/// Options controlling structured region detection.
#[derive(Args, Debug, Default)]
pub struct DetectArgs {
    /// JSON file with detection limits
    #[arg(long)]
    pub detect_config: Option<PathBuf>,

    /// Maximum number of structured regions
    #[arg(long)]
    pub max_regions: Option<usize>,

    /// Minimum node rows of a structured region
    #[arg(long)]
    pub min_rows: Option<usize>,

    /// Minimum node columns of a structured region
    #[arg(long)]
    pub min_cols: Option<usize>,

    /// Skip detection and keep the whole mesh unstructured
    #[arg(long)]
    pub no_detect: bool,
}

impl DetectArgs {
    pub fn config(&self) -> Result<DetectConfig> {
        let mut config = match &self.detect_config {
            Some(path) => load_json(path)?,
            None => DetectConfig::default(),
        };
        if let Some(n) = self.max_regions {
            config.max_regions = n;
        }
        if let Some(n) = self.min_rows {
            config.min_rows = n;
        }
        if let Some(n) = self.min_cols {
            config.min_cols = n;
        }
        Ok(config)
    }

    /// Detect regions in `arrays` and build the hybrid mesh.
    pub fn build(&self, arrays: MeshArrays) -> Result<QuadMesh> {
        if self.no_detect {
            return Ok(QuadMesh::unstructured(arrays)?);
        }
        let config = self.config()?;
        let grids = quadweave::detect_node_regions(&arrays, &config)?;
        Ok(quadweave::build(arrays, &grids)?)
    }
}

pub fn save(mesh: &QuadMesh, path: &Path) -> Result<()> {
    quadweave::io::save(mesh, path).with_context(|| format!("writing {}", path.display()))?;
    info!(
        path = %path.display(),
        cells = mesh.num_cells(),
        structured_cells = mesh.unstructured_cells_offset,
        regions = mesh.num_regions(),
        "wrote mesh"
    );
    Ok(())
}

pub fn load(path: &Path) -> Result<QuadMesh> {
    quadweave::io::load(path).with_context(|| format!("reading {}", path.display()))
}
