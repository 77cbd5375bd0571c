//! Airfoil solver runs.

use anyhow::{Context, Result};
use clap::Args;
use quadweave::{Solver, SolverConfig, Traversal};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
    time::Instant,
};
use tracing::info;

#[derive(Args, Debug)]
pub struct SolveArgs {
    /// Mesh file to solve on
    pub input: PathBuf,

    /// JSON solver configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of iterations, overriding the configuration
    #[arg(short = 'n', long)]
    pub iterations: Option<usize>,

    /// Traversal mode (hybrid, unstructured, raw), overriding the configuration
    #[arg(short, long)]
    pub traversal: Option<Traversal>,

    /// Write the final solution here, one cell per line in raw order
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn execute(args: SolveArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => SolverConfig::from_file(path)?,
        None => SolverConfig::default(),
    };
    if let Some(n) = args.iterations {
        config.iterations = n;
    }
    if let Some(t) = args.traversal {
        config.traversal = t;
    }

    let mesh = super::load(&args.input)?;
    let mut solver = Solver::new(&mesh, config.traversal, &config.flow)?;
    let start = Instant::now();
    let history = solver.run(&config)?;
    info!(
        iterations = solver.iteration(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        final_rms = ?history.last().map(|(_, rms)| *rms),
        "done"
    );
    for (iteration, rms) in &history {
        println!("{iteration:6}  {rms:10.5e}");
    }
    println!("checksum: {:?}", solver.checksum());

    if let Some(path) = &args.output {
        let mut out = BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        );
        solver.write_q(&mut out)?;
        out.flush()?;
        info!(path = %path.display(), "wrote solution");
    }
    Ok(())
}
