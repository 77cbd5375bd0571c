//! Gmsh import.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use super::DetectArgs;

#[derive(Args, Debug)]
pub struct ImportMshArgs {
    /// Input .msh file (format 4.1)
    pub input: PathBuf,

    /// Output mesh file
    #[arg(short, long)]
    pub output: PathBuf,

    #[command(flatten)]
    pub detect: DetectArgs,
}

pub fn execute(args: ImportMshArgs) -> Result<()> {
    let bytes = std::fs::read(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let arrays = quadweave::gmsh::load_quadmesh_2d(&bytes)
        .with_context(|| format!("loading {}", args.input.display()))?;
    let mesh = args.detect.build(arrays)?;
    super::save(&mesh, &args.output)
}
