//! Traversal cross-checks.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Mesh file to verify
    pub input: PathBuf,

    /// Largest deviation accepted for outputs that can't be compared bitwise
    #[arg(long, default_value_t = 1e-9)]
    pub tolerance: f64,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: VerifyArgs) -> Result<()> {
    let mesh = super::load(&args.input)?;
    let report = quadweave::verify(&mesh, args.tolerance)
        .with_context(|| format!("verifying {}", args.input.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!(
        "cells: {} structured + {} unstructured",
        report.cells.structured, report.cells.unstructured
    );
    println!(
        "interior edges: {} structured + {} unstructured",
        report.inedges.structured, report.inedges.unstructured
    );
    println!("bitwise identical: {}", report.bitwise.join(", "));
    println!("max deviation: {:e}", report.max_raw_deviation);
    for (traversal, rms) in &report.rms {
        println!("rms after one {traversal} iteration: {rms:e}");
    }
    println!("OK");
    Ok(())
}
