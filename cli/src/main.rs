//! Command line tools for building, checking and running quad meshes.

mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "quadweave")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Hybrid structured/unstructured quad mesh tools", long_about = None)]
struct Cli {
    /// Log more (-v for debug, -vv for trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a rectangular test grid and write it as a built mesh
    Generate(commands::generate::GenerateArgs),
    /// Import a gmsh .msh file, detect structured regions and build
    ImportMsh(commands::import_msh::ImportMshArgs),
    /// Detect structured regions in an unstructured-only mesh file and build
    Build(commands::build::BuildArgs),
    /// Print counts, regions and sections of a mesh file
    Inspect(commands::inspect::InspectArgs),
    /// Check that every traversal mode agrees on a mesh
    Verify(commands::verify::VerifyArgs),
    /// Run the airfoil solver on a mesh
    Solve(commands::solve::SolveArgs),
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            return ExitCode::FAILURE;
        }
        // --help and --version
        Err(e) => e.exit(),
    };

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Generate(args) => commands::generate::execute(args),
        Commands::ImportMsh(args) => commands::import_msh::execute(args),
        Commands::Build(args) => commands::build::execute(args),
        Commands::Inspect(args) => commands::inspect::execute(args),
        Commands::Verify(args) => commands::verify::execute(args),
        Commands::Solve(args) => commands::solve::execute(args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
