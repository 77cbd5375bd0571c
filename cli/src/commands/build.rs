//! Building a hybrid mesh from an unstructured-only mesh file.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use super::DetectArgs;

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Mesh file holding at least the raw sections
    pub input: PathBuf,

    /// Output mesh file
    #[arg(short, long)]
    pub output: PathBuf,

    #[command(flatten)]
    pub detect: DetectArgs,
}

pub fn execute(args: BuildArgs) -> Result<()> {
    let arrays = quadweave::io::load_raw(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let mesh = args.detect.build(arrays)?;
    super::save(&mesh, &args.output)
}
