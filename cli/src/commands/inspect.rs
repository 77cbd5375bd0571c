//! Mesh file summaries.

use anyhow::{Context, Result};
use clap::Args;
use quadweave::io::{mesh_file, Container};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Mesh file to inspect
    pub input: PathBuf,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct Section<'a> {
    name: &'a str,
    offset: u64,
    len: u64,
}

pub fn execute(args: InspectArgs) -> Result<()> {
    let container =
        Container::open(&args.input).with_context(|| format!("reading {}", args.input.display()))?;
    let sections: Vec<Section> = container
        .entries()
        .iter()
        .map(|e| Section {
            name: &e.name,
            offset: e.offset,
            len: e.len,
        })
        .collect();

    // unstructured-only files carry no relabeled data
    let summary = if container.has_section("new_coord_data") {
        Some(mesh_file::read(&container)?.summary())
    } else {
        let raw = mesh_file::read_raw(&container)?;
        if !args.json {
            println!(
                "raw mesh: {} nodes, {} cells, {} interior edges, {} border edges",
                raw.num_nodes(),
                raw.num_cells(),
                raw.num_inedges(),
                raw.num_border_edges()
            );
        }
        None
    };

    if args.json {
        let out = serde_json::json!({ "summary": summary, "sections": sections });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if let Some(s) = &summary {
        println!(
            "{} nodes, {} cells, {} interior edges, {} border edges",
            s.num_nodes, s.num_cells, s.num_inedges, s.num_border_edges
        );
        println!(
            "structured: {} cells, {} interior edges in {} regions",
            s.unstructured_cells_offset,
            s.unstructured_inedges_offset,
            s.regions.len()
        );
        for (k, r) in s.regions.iter().enumerate() {
            println!(
                "  region {k}: {}x{} nodes from {}, cells {} from {} (compass {}), \
                 edges {} from {}/{} (compasses {:?}/{:?})",
                r.rows,
                r.cols,
                r.node_offset,
                r.cell_extent,
                r.cell_offset,
                r.quad_compass,
                r.edge_extent,
                r.h_edge_offset,
                r.v_edge_offset,
                r.h_compasses,
                r.v_compasses,
            );
        }
    }
    println!("sections:");
    for s in &sections {
        println!("  {:<28} {:>10} bytes at {}", s.name, s.len, s.offset);
    }
    Ok(())
}
