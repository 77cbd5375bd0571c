//! Synthetic rectangular grids.

use anyhow::{bail, Result};
use clap::Args;
use quadweave::{config::load_json, mesh::RegionSpec, GridSpec};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Output mesh file
    #[arg(short, long)]
    pub output: PathBuf,

    /// JSON grid description; flags override its fields
    #[arg(short, long)]
    pub spec: Option<PathBuf>,

    /// Cell rows
    #[arg(long)]
    pub rows: Option<usize>,

    /// Cell columns
    #[arg(long)]
    pub cols: Option<usize>,

    #[arg(long)]
    pub dx: Option<f64>,

    #[arg(long)]
    pub dy: Option<f64>,

    /// Random node displacement as a fraction of the spacing (0 to 0.5)
    #[arg(long)]
    pub jitter: Option<f64>,

    /// Seed of the node displacement
    #[arg(long)]
    pub seed: Option<u64>,

    /// Cell to leave out as ROW,COL (repeatable)
    #[arg(long, value_parser = parse_cell)]
    pub hole: Vec<(usize, usize)>,

    /// Starting slot of every cell's node cycle (0-3)
    #[arg(long)]
    pub rotation: Option<usize>,

    /// Store interior edges reversed
    #[arg(long)]
    pub flip_edges: bool,

    /// Permute raw ids away from grid order
    #[arg(long)]
    pub scramble: bool,

    /// Structured node region as ROW,COL,ROWS,COLS (repeatable)
    #[arg(long, value_parser = parse_region)]
    pub region: Vec<RegionSpec>,

    /// Write the raw mesh only, without building, for the `build` command
    #[arg(long)]
    pub raw: bool,
}

fn parse_numbers(s: &str) -> Result<Vec<usize>> {
    Ok(s.split(',')
        .map(|p| p.trim().parse::<usize>())
        .collect::<Result<Vec<_>, _>>()?)
}

fn parse_region(s: &str) -> Result<RegionSpec> {
    let [row, col, rows, cols] = parse_numbers(s)?[..] else {
        bail!("expected ROW,COL,ROWS,COLS, got `{s}`");
    };
    Ok(RegionSpec::new(row, col, rows, cols))
}

fn parse_cell(s: &str) -> Result<(usize, usize)> {
    let [row, col] = parse_numbers(s)?[..] else {
        bail!("expected ROW,COL, got `{s}`");
    };
    Ok((row, col))
}

pub fn execute(args: GenerateArgs) -> Result<()> {
    let mut spec: GridSpec = match &args.spec {
        Some(path) => load_json(path)?,
        None => GridSpec::default(),
    };
    if let Some(rows) = args.rows {
        spec.rows = rows;
    }
    if let Some(cols) = args.cols {
        spec.cols = cols;
    }
    if let Some(dx) = args.dx {
        spec.dx = dx;
    }
    if let Some(dy) = args.dy {
        spec.dy = dy;
    }
    if let Some(jitter) = args.jitter {
        spec.jitter = jitter;
    }
    if let Some(seed) = args.seed {
        spec.seed = seed;
    }
    if !args.hole.is_empty() {
        spec.holes = args.hole;
    }
    if let Some(rotation) = args.rotation {
        spec.cell_rotation = rotation;
    }
    spec.flip_edges |= args.flip_edges;
    spec.scramble |= args.scramble;
    if !args.region.is_empty() {
        spec.node_regions = args.region;
    }

    let grid = spec.generate()?;
    if args.raw {
        quadweave::io::save_raw(&grid.arrays, &args.output)?;
        tracing::info!(path = %args.output.display(), cells = grid.arrays.num_cells(), "wrote raw mesh");
        return Ok(());
    }
    let mesh = quadweave::build(grid.arrays, &grid.node_grids)?;
    super::save(&mesh, &args.output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_parse() {
        assert_eq!(parse_region("1, 2,3,4").unwrap(), RegionSpec::new(1, 2, 3, 4));
        assert!(parse_region("1,2,3").is_err());
        assert!(parse_region("1,2,3,x").is_err());
        assert_eq!(parse_cell("2,3").unwrap(), (2, 3));
        assert!(parse_cell("2").is_err());
    }
}
