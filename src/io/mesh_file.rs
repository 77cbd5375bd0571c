//! Layout of meshes inside a [`Container`].
//!
//! Raw adjacency lives in sections named after the entity maps
//! (`cell_to_ord_nodes`, `inedge_to_cells` and so on),
//! the relabeled copies in the same names prefixed with `new_`,
//! and region metadata in the `structured_*` sections.

use std::{
    fs::File,
    io::{BufWriter, Seek, Write},
    path::Path,
};

use crate::{
    compass::Compass,
    io::container::{Container, ContainerWriter, SectionReader, SectionWriter},
    mesh::{CellRegion, Coord, EdgeRegion, GridExtent, IndexMap, MeshArrays, NodeRegion},
    MeshError, QuadMesh,
};

const REGION_TAG: &str = "region";
const H_EDGES_TAG: &str = "structured_h_edge_regions";
const V_EDGES_TAG: &str = "structured_v_edge_regions";
const EDGE_OFFSET_TAG: &str = "unstructured_edges_offset";

/// Write a fully built mesh.
pub fn write<W: Write + Seek>(mesh: &QuadMesh, writer: W) -> Result<W, MeshError> {
    let mut out = ContainerWriter::new(writer)?;
    write_arrays(&mut out, &mesh.raw, "")?;
    write_arrays(&mut out, &mesh.relabeled, "new_")?;

    let mut nodes = SectionWriter::new();
    nodes.usize(mesh.node_regions.len());
    for region in &mesh.node_regions {
        nodes
            .string(REGION_TAG)
            .usize(region.rows)
            .usize(region.cols)
            .usizes(&region.raw_indices);
    }
    out.write_section("structured_node_regions", nodes)?;

    let mut cells = SectionWriter::new();
    cells.usize(mesh.cell_regions.len());
    for region in &mesh.cell_regions {
        cells.usize(region.offset);
        write_extent(&mut cells, &region.extent);
        cells.usizes(&region.compass.forward());
    }
    out.write_section("structured_cell_regions", cells)?;

    let mut unstructured = SectionWriter::new();
    unstructured
        .usize(mesh.unstructured_cells_offset)
        .usize(mesh.num_cells() - mesh.unstructured_cells_offset);
    out.write_section("unstructured_cell_regions", unstructured)?;

    let mut edges = SectionWriter::new();
    for (tag, regions) in [(H_EDGES_TAG, &mesh.h_edge_regions), (V_EDGES_TAG, &mesh.v_edge_regions)] {
        edges.string(tag).usize(regions.len());
        for region in regions {
            edges.usize(region.offset);
            write_extent(&mut edges, &region.extent);
            edges
                .usizes(&region.node_compass.forward())
                .usizes(&region.cell_compass.forward());
        }
    }
    edges
        .string(EDGE_OFFSET_TAG)
        .usize(mesh.unstructured_inedges_offset);
    out.write_section("structured_edge_regions", edges)?;

    for (name, map) in [
        ("node_map", &mesh.node_map),
        ("cell_map", &mesh.cell_map),
        ("inedge_map", &mesh.inedge_map),
    ] {
        let mut section = SectionWriter::new();
        section.usize(map.len()).usizes(map.new_to_old());
        out.write_section(name, section)?;
    }

    out.finish()
}

/// Write an unstructured-only mesh, before relabeling.
pub fn write_raw<W: Write + Seek>(arrays: &MeshArrays, writer: W) -> Result<W, MeshError> {
    let mut out = ContainerWriter::new(writer)?;
    write_arrays(&mut out, arrays, "")?;
    out.finish()
}

pub fn save(mesh: &QuadMesh, path: impl AsRef<Path>) -> Result<(), MeshError> {
    let file = BufWriter::new(File::create(path)?);
    write(mesh, file)?;
    Ok(())
}

pub fn save_raw(arrays: &MeshArrays, path: impl AsRef<Path>) -> Result<(), MeshError> {
    let file = BufWriter::new(File::create(path)?);
    write_raw(arrays, file)?;
    Ok(())
}

/// Read a built mesh, re-checking every structural invariant.
pub fn read(container: &Container) -> Result<QuadMesh, MeshError> {
    let raw = read_arrays(container, "")?;
    let relabeled = read_arrays(container, "new_")?;

    let mut section = container.section("structured_node_regions")?;
    let count = section.count()?;
    let mut node_regions = Vec::with_capacity(count);
    let mut offset = 0;
    for _ in 0..count {
        section.expect_tag(REGION_TAG)?;
        let rows = section.usize()?;
        let cols = section.usize()?;
        let len = rows
            .checked_mul(cols)
            .filter(|&len| len <= section.remaining())
            .ok_or_else(|| MeshError::Format(format!("node region of {rows}x{cols} is too large")))?;
        let raw_indices = section.usizes(len)?;
        node_regions.push(NodeRegion {
            raw_indices,
            rows,
            cols,
            offset,
        });
        offset += len;
    }
    section.finish()?;

    let mut section = container.section("structured_cell_regions")?;
    let count = section.count()?;
    let mut cell_regions = Vec::with_capacity(count);
    for _ in 0..count {
        let offset = section.usize()?;
        let extent = read_extent(&mut section)?;
        let compass = read_compass(&mut section)?;
        cell_regions.push(CellRegion {
            extent,
            compass,
            offset,
        });
    }
    section.finish()?;

    let mut section = container.section("unstructured_cell_regions")?;
    let unstructured_cells_offset = section.usize()?;
    let unstructured_cells = section.usize()?;
    section.finish()?;
    if unstructured_cells_offset.checked_add(unstructured_cells) != Some(raw.num_cells()) {
        return Err(MeshError::Format(format!(
            "{unstructured_cells} unstructured cells from {unstructured_cells_offset} \
             don't add up to {} cells",
            raw.num_cells()
        )));
    }

    let mut section = container.section("structured_edge_regions")?;
    let h_edge_regions = read_edge_regions(&mut section, H_EDGES_TAG)?;
    let v_edge_regions = read_edge_regions(&mut section, V_EDGES_TAG)?;
    section.expect_tag(EDGE_OFFSET_TAG)?;
    let unstructured_inedges_offset = section.usize()?;
    section.finish()?;

    let mesh = QuadMesh {
        node_map: read_index_map(container, "node_map")?,
        cell_map: read_index_map(container, "cell_map")?,
        inedge_map: read_index_map(container, "inedge_map")?,
        raw,
        relabeled,
        node_regions,
        cell_regions,
        unstructured_cells_offset,
        h_edge_regions,
        v_edge_regions,
        unstructured_inedges_offset,
    };
    mesh.validate()?;
    tracing::debug!(
        cells = mesh.num_cells(),
        regions = mesh.num_regions(),
        "read mesh"
    );
    Ok(mesh)
}

/// Read an unstructured-only mesh. Relabeled sections, if any, are ignored.
pub fn read_raw(container: &Container) -> Result<MeshArrays, MeshError> {
    let arrays = read_arrays(container, "")?;
    arrays.validate()?;
    Ok(arrays)
}

pub fn load(path: impl AsRef<Path>) -> Result<QuadMesh, MeshError> {
    read(&Container::open(path)?)
}

pub fn load_raw(path: impl AsRef<Path>) -> Result<MeshArrays, MeshError> {
    read_raw(&Container::open(path)?)
}

fn write_arrays<W: Write + Seek>(
    out: &mut ContainerWriter<W>,
    arrays: &MeshArrays,
    prefix: &str,
) -> Result<(), MeshError> {
    if prefix.is_empty() {
        for (name, count) in [
            ("num_cells", arrays.num_cells()),
            ("num_nodes", arrays.num_nodes()),
            ("num_inedges", arrays.num_inedges()),
            ("num_borderedges", arrays.num_border_edges()),
        ] {
            let mut section = SectionWriter::new();
            section.usize(count);
            out.write_section(name, section)?;
        }

        let mut bounds = SectionWriter::new();
        bounds.usize(arrays.border_bounds.len());
        for &b in &arrays.border_bounds {
            bounds.int(b.into());
        }
        out.write_section("borderedge_bounds", bounds)?;
    }

    let mut coords = SectionWriter::new();
    coords.usize(arrays.coords.len());
    for c in &arrays.coords {
        coords.f64(c.x).f64(c.y);
    }
    out.write_section(&format!("{prefix}coord_data"), coords)?;

    out.write_section(
        &format!("{prefix}cell_to_ord_nodes"),
        id_section(&arrays.cell_nodes),
    )?;
    out.write_section(
        &format!("{prefix}inedge_to_nodes"),
        id_section(&arrays.inedge_nodes),
    )?;
    out.write_section(
        &format!("{prefix}inedge_to_cells"),
        id_section(&arrays.inedge_cells),
    )?;
    out.write_section(
        &format!("{prefix}borderedge_to_nodes"),
        id_section(&arrays.border_nodes),
    )?;
    out.write_section(
        &format!("{prefix}borderedge_to_cell"),
        id_section(arrays.border_cell.iter().map(|&c| [c]).collect::<Vec<_>>().as_slice()),
    )?;
    Ok(())
}

fn id_section<const N: usize>(ids: &[[usize; N]]) -> SectionWriter {
    let mut section = SectionWriter::new();
    section.usize(ids.len()).usizes(ids.iter().flatten());
    section
}

fn read_arrays(container: &Container, prefix: &str) -> Result<MeshArrays, MeshError> {
    let read_count = |name: &str| -> Result<usize, MeshError> {
        let mut section = container.section(name)?;
        let count = section.usize()?;
        section.finish()?;
        Ok(count)
    };
    let num_cells = read_count("num_cells")?;
    let num_nodes = read_count("num_nodes")?;
    let num_inedges = read_count("num_inedges")?;
    let num_border_edges = read_count("num_borderedges")?;

    let mut section = container.section("borderedge_bounds")?;
    let border_bounds = read_counted(&mut section, num_border_edges, |s| {
        let b = s.int()?;
        i32::try_from(b).map_err(|_| MeshError::Format(format!("boundary tag {b} out of range")))
    })?;
    section.finish()?;

    let name = format!("{prefix}coord_data");
    let mut section = container.section(&name)?;
    let coords = read_counted(&mut section, num_nodes, |s| Ok(Coord::new(s.f64()?, s.f64()?)))?;
    section.finish()?;

    Ok(MeshArrays {
        coords,
        cell_nodes: read_ids(container, &format!("{prefix}cell_to_ord_nodes"), num_cells)?,
        inedge_nodes: read_ids(container, &format!("{prefix}inedge_to_nodes"), num_inedges)?,
        inedge_cells: read_ids(container, &format!("{prefix}inedge_to_cells"), num_inedges)?,
        border_nodes: read_ids(container, &format!("{prefix}borderedge_to_nodes"), num_border_edges)?,
        border_cell: read_ids::<1>(container, &format!("{prefix}borderedge_to_cell"), num_border_edges)?
            .into_iter()
            .map(|[c]| c)
            .collect(),
        border_bounds,
    })
}

/// Read a count that must match `expected`, then that many items.
fn read_counted<T>(
    section: &mut SectionReader,
    expected: usize,
    mut item: impl FnMut(&mut SectionReader) -> Result<T, MeshError>,
) -> Result<Vec<T>, MeshError> {
    let count = section.count()?;
    if count != expected {
        return Err(MeshError::Format(format!(
            "expected {expected} entries, found {count}"
        )));
    }
    (0..count).map(|_| item(section)).collect()
}

fn read_ids<const N: usize>(
    container: &Container,
    name: &str,
    expected: usize,
) -> Result<Vec<[usize; N]>, MeshError> {
    let mut section = container.section(name)?;
    let ids = read_counted(&mut section, expected, |s| {
        let mut ids = [0; N];
        for id in &mut ids {
            *id = s.usize()?;
        }
        Ok(ids)
    })
    .map_err(|e| match e {
        MeshError::Format(msg) => MeshError::Format(format!("{name}: {msg}")),
        e => e,
    })?;
    section.finish()?;
    Ok(ids)
}

fn read_index_map(container: &Container, name: &str) -> Result<IndexMap, MeshError> {
    let mut section = container.section(name)?;
    let count = section.count()?;
    let new_to_old = section.usizes(count)?;
    section.finish()?;
    IndexMap::from_new_to_old(new_to_old)
}

fn write_extent(section: &mut SectionWriter, extent: &GridExtent) {
    section
        .usize(extent.row_start)
        .usize(extent.row_finish)
        .usize(extent.col_start)
        .usize(extent.col_finish);
}

fn read_extent(section: &mut SectionReader) -> Result<GridExtent, MeshError> {
    let [row_start, row_finish, col_start, col_finish] =
        [section.usize()?, section.usize()?, section.usize()?, section.usize()?];
    if row_start > row_finish || col_start > col_finish {
        return Err(MeshError::Format(format!(
            "inverted extent {row_start}..{row_finish} x {col_start}..{col_finish}"
        )));
    }
    Ok(GridExtent::new(row_start..row_finish, col_start..col_finish))
}

fn read_compass<const N: usize>(section: &mut SectionReader) -> Result<Compass<N>, MeshError>
where
    crate::compass::Tables: crate::compass::CompassTable<N>,
{
    let forward = section.usizes(N)?;
    Compass::from_forward(&forward)
        .map_err(|e| MeshError::Format(format!("stored compass {forward:?}: {e}")))
}

fn read_edge_regions(section: &mut SectionReader, tag: &str) -> Result<Vec<EdgeRegion>, MeshError> {
    section.expect_tag(tag)?;
    let count = section.count()?;
    let mut regions = Vec::with_capacity(count);
    for _ in 0..count {
        let offset = section.usize()?;
        let extent = read_extent(section)?;
        regions.push(EdgeRegion {
            extent,
            node_compass: read_compass(section)?,
            cell_compass: read_compass(section)?,
            offset,
        });
    }
    Ok(regions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build, mesh::GridSpec, Dispatcher, Traversal};
    use std::io::Cursor;

    fn built() -> QuadMesh {
        let grid = GridSpec {
            scramble: true,
            cell_rotation: 3,
            flip_edges: true,
            ..Default::default()
        }
        .generate()
        .unwrap();
        build(grid.arrays, &grid.node_grids).unwrap()
    }

    fn bytes(mesh: &QuadMesh) -> Vec<u8> {
        write(mesh, Cursor::new(Vec::new())).unwrap().into_inner()
    }

    #[test]
    fn built_mesh_reads_back() {
        let mesh = built();
        let container = Container::from_bytes(bytes(&mesh)).unwrap();
        for name in [
            "num_cells",
            "new_coord_data",
            "new_borderedge_to_cell",
            "structured_node_regions",
            "structured_edge_regions",
            "unstructured_cell_regions",
            "inedge_map",
        ] {
            assert!(container.has_section(name), "{name}");
        }

        let loaded = read(&container).unwrap();
        assert_eq!(loaded.raw, mesh.raw);
        assert_eq!(loaded.relabeled, mesh.relabeled);
        assert_eq!(loaded.node_regions, mesh.node_regions);
        assert_eq!(loaded.cell_regions, mesh.cell_regions);
        assert_eq!(loaded.h_edge_regions, mesh.h_edge_regions);
        assert_eq!(loaded.v_edge_regions, mesh.v_edge_regions);
        assert_eq!(loaded.unstructured_inedges_offset, 6);
        assert_eq!(loaded.inedge_map, mesh.inedge_map);

        for traversal in Traversal::ALL {
            Dispatcher::new(&loaded, traversal)
                .unwrap()
                .interior_edges(&mut |_: &crate::dispatch::InteriorEdgeVisit| {})
                .unwrap();
        }
    }

    #[test]
    fn raw_mesh_reads_back() {
        let grid = GridSpec::default().generate().unwrap();
        let bytes = write_raw(&grid.arrays, Cursor::new(Vec::new()))
            .unwrap()
            .into_inner();
        let container = Container::from_bytes(bytes).unwrap();
        assert!(!container.has_section("new_coord_data"));
        assert_eq!(read_raw(&container).unwrap(), grid.arrays);
        // a raw container is not a built mesh
        assert!(matches!(read(&container), Err(MeshError::Format(_))));
    }

    #[test]
    fn truncated_file_is_rejected() {
        let bytes = bytes(&built());
        for len in [0, 5, 20, bytes.len() / 2, bytes.len() - 3] {
            let result = Container::from_bytes(bytes[..len].to_vec()).and_then(|c| read(&c));
            assert!(matches!(result, Err(MeshError::Format(_))), "length {len}");
        }
    }

    #[test]
    fn corrupted_metadata_is_rejected() {
        let mesh = built();

        // an offset that doesn't follow the previous region
        let mut bad = mesh.clone();
        bad.cell_regions[1].offset += 1;
        let container = Container::from_bytes(bytes(&bad)).unwrap();
        assert!(matches!(read(&container), Err(MeshError::Consistency { .. })));

        // a node map that isn't a bijection
        let mut writer = ContainerWriter::new(Cursor::new(Vec::new())).unwrap();
        let mut section = SectionWriter::new();
        section.usize(3).usizes(&[0, 2, 2]);
        writer.write_section("node_map", section).unwrap();
        let container = Container::from_bytes(writer.finish().unwrap().into_inner()).unwrap();
        assert!(matches!(read_index_map(&container, "node_map"), Err(MeshError::Index(_))));

        // a compass that isn't a permutation
        let mut section = SectionWriter::new();
        section.usizes(&[0, 1, 1, 2]);
        let mut writer = ContainerWriter::new(Cursor::new(Vec::new())).unwrap();
        writer.write_section("compass", section).unwrap();
        let container = Container::from_bytes(writer.finish().unwrap().into_inner()).unwrap();
        let mut reader = container.section("compass").unwrap();
        assert!(matches!(read_compass::<4>(&mut reader), Err(MeshError::Format(_))));
    }

    #[test]
    fn mismatched_index_maps_are_rejected() {
        let mesh = built();

        // still a bijection, but pointing cells at the wrong raw cells
        let mut bad = mesh.clone();
        let mut cells = mesh.cell_map.new_to_old().to_vec();
        cells.swap(0, 20);
        bad.cell_map = IndexMap::from_new_to_old(cells).unwrap();
        let container = Container::from_bytes(bytes(&bad)).unwrap();
        assert!(matches!(read(&container), Err(MeshError::Consistency { .. })));

        let mut bad = mesh.clone();
        bad.node_regions[0].raw_indices.reverse();
        let container = Container::from_bytes(bytes(&bad)).unwrap();
        assert!(matches!(read(&container), Err(MeshError::Consistency { .. })));

        let mut bad = mesh;
        let mut edges = bad.inedge_map.new_to_old().to_vec();
        let last = edges.len() - 1;
        edges.swap(0, last);
        bad.inedge_map = IndexMap::from_new_to_old(edges).unwrap();
        let container = Container::from_bytes(bytes(&bad)).unwrap();
        assert!(matches!(read(&container), Err(MeshError::Consistency { .. })));
    }

    #[test]
    fn save_and_load() {
        let mesh = built();
        let path = std::env::temp_dir().join(format!("quadweave-mesh-{}.qwm", std::process::id()));
        save(&mesh, &path).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.relabeled, mesh.relabeled);
        assert_eq!(loaded.summary().regions.len(), 2);
        assert!(load_raw(&path).is_ok());
        std::fs::remove_file(&path).unwrap();
    }
}
