//! Loading quad meshes generated with [`gmsh`](https://www.gmsh.info/).
//!
//! Only version 4.1 of the MSH format is supported,
//! as per the [`mshio`] library.

use std::collections::HashMap;

use crate::{
    mesh::{Coord, MeshArrays},
    MeshError,
};

/// Error in loading a mesh from a Gmsh .msh file.
#[derive(thiserror::Error, Debug)]
pub enum GmshError {
    /// Error parsing the .msh file.
    ///
    /// (parser error converted to string
    /// to avoid lifetime issues with the byte slices it contains)
    #[error("Parsing the .msh data failed: {0}")]
    ParseError(String),
    /// The given .msh file contains no nodes.
    #[error("Invalid .msh data: no nodes")]
    MissingNodes,
    /// The given .msh file contains no quadrilateral elements.
    #[error("Invalid .msh data: no elements of the correct type")]
    MissingElements,
}

impl From<GmshError> for MeshError {
    fn from(e: GmshError) -> Self {
        MeshError::Format(e.to_string())
    }
}

/// Load a 2D quad mesh from a `.msh` file.
///
/// First-order quadrilaterals (`Qua4`, see [`ElementType`][mshio::ElementType])
/// become the cells of the mesh, in file order,
/// and the `z` coordinate of nodes is dropped.
///
/// # Boundary tags
///
/// Border edges take the first physical tag of the curve
/// whose `Lin2` elements cover them, or 0 if there is none.
/// (gmsh does not save elements that aren't part of a physical group by default,
/// so remember to use `-save_all` for untagged boundaries)
pub fn load_quadmesh_2d(bytes: &[u8]) -> Result<MeshArrays, MeshError> {
    let msh = mshio::parse_msh_bytes(bytes).map_err(|e| GmshError::ParseError(format!("{}", e)))?;
    let nodes = msh.data.nodes.ok_or(GmshError::MissingNodes)?;
    let elements = msh.data.elements.ok_or(GmshError::MissingElements)?;

    let coords: Vec<Coord> = nodes
        .node_blocks
        .iter()
        .flat_map(|block| block.nodes.iter())
        .map(|node| Coord::new(node.x, node.y))
        .collect();
    if coords.is_empty() {
        return Err(GmshError::MissingNodes.into());
    }

    // gmsh tags start at 1; this assumes they are sequential,
    // which holds for meshes gmsh writes itself
    let node_index = |tag: u64| -> Result<usize, GmshError> {
        usize::try_from(tag)
            .ok()
            .and_then(|t| t.checked_sub(1))
            .filter(|&i| i < coords.len())
            .ok_or_else(|| GmshError::ParseError(format!("node tag {tag} out of range")))
    };

    let mut cell_nodes = Vec::new();
    for block in elements
        .element_blocks
        .iter()
        .filter(|block| block.element_type == mshio::ElementType::Qua4)
    {
        for el in &block.elements {
            cell_nodes.push(quad_nodes(&el.nodes, node_index)?);
        }
    }
    if cell_nodes.is_empty() {
        return Err(GmshError::MissingElements.into());
    }

    let curve_tags = curve_physical_tags(msh.data.entities.as_ref());
    let mut boundary_tags: HashMap<[usize; 2], i32> = HashMap::new();
    for block in elements.element_blocks.iter().filter(|block| {
        block.element_type == mshio::ElementType::Lin2 && block.entity_dim == 1
    }) {
        let Some(&tag) = curve_tags.get(&block.entity_tag) else {
            continue;
        };
        for el in &block.elements {
            let (a, b) = match el.nodes[..] {
                [a, b, ..] => (node_index(a)?, node_index(b)?),
                _ => continue,
            };
            boundary_tags.insert([a.min(b), a.max(b)], tag);
        }
    }

    let arrays = MeshArrays::from_cells(coords, cell_nodes, &boundary_tags)?;
    tracing::info!(
        nodes = arrays.num_nodes(),
        cells = arrays.num_cells(),
        tagged_edges = boundary_tags.len(),
        "loaded gmsh mesh"
    );
    Ok(arrays)
}

/// Node indices of a `Qua4` element, which must have exactly four node tags.
fn quad_nodes(
    tags: &[u64],
    node_index: impl Fn(u64) -> Result<usize, GmshError>,
) -> Result<[usize; 4], GmshError> {
    match *tags {
        [a, b, c, d] => Ok([node_index(a)?, node_index(b)?, node_index(c)?, node_index(d)?]),
        _ => Err(GmshError::ParseError(format!(
            "quad element with {} nodes",
            tags.len()
        ))),
    }
}

/// The first physical tag of every curve entity that has one.
fn curve_physical_tags(entities: Option<&mshio::Entities<i32, f64>>) -> HashMap<i32, i32> {
    let Some(entities) = entities else {
        return HashMap::new();
    };
    entities
        .curves
        .iter()
        .filter_map(|curve| Some((curve.tag, *curve.physical_tags.first()?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two unit squares side by side, with the bottom curve tagged 1.
    const TWO_QUADS: &str = "\
$MeshFormat
4.1 0 8
$EndMeshFormat
$Entities
0 2 1 0
1 0 0 0 2 0 0 1 1 0
2 0 1 0 2 1 0 0 0
1 0 0 0 2 1 0 0 0
$EndEntities
$Nodes
1 6 1 6
2 1 0 6
1
2
3
4
5
6
0 0 0
1 0 0
2 0 0
0 1 0
1 1 0
2 1 0
$EndNodes
$Elements
3 6 1 6
1 1 1 2
1 1 2
2 2 3
1 2 1 2
3 6 5
4 5 4
2 1 3 2
5 1 2 5 4
6 2 3 6 5
$EndElements
";

    #[test]
    fn quads_and_tags() {
        let mesh = load_quadmesh_2d(TWO_QUADS.as_bytes()).expect("Failed to load mesh");
        assert_eq!(mesh.num_nodes(), 6);
        assert_eq!(mesh.cell_nodes, [[0, 1, 4, 3], [1, 2, 5, 4]]);
        assert_eq!(mesh.num_inedges(), 1);
        assert_eq!(mesh.inedge_cells, [[0, 1]]);
        assert_eq!(mesh.num_border_edges(), 6);

        for (nodes, bound) in mesh.border_nodes.iter().zip(&mesh.border_bounds) {
            let on_bottom = nodes.iter().all(|&n| mesh.coords[n].y == 0.);
            assert_eq!(*bound, if on_bottom { 1 } else { 0 }, "edge {nodes:?}");
        }
        assert_eq!(mesh.border_bounds.iter().filter(|&&b| b == 1).count(), 2);
    }

    #[test]
    fn quads_need_four_nodes() {
        let index = |tag: u64| -> Result<usize, GmshError> { Ok(tag as usize - 1) };
        assert_eq!(quad_nodes(&[1, 2, 5, 4], index).unwrap(), [0, 1, 4, 3]);
        for short in [&[1, 2, 5][..], &[][..], &[1, 2, 5, 4, 3][..]] {
            assert!(matches!(
                quad_nodes(short, index),
                Err(GmshError::ParseError(msg)) if msg.contains("quad element")
            ));
        }
        let out_of_range =
            |tag: u64| -> Result<usize, GmshError> { Err(GmshError::ParseError(format!("node tag {tag}"))) };
        assert!(quad_nodes(&[1, 2, 5, 4], out_of_range).is_err());
    }

    #[test]
    fn missing_quads_is_an_error() {
        let no_quads = TWO_QUADS.replace("2 1 3 2\n5 1 2 5 4\n6 2 3 6 5\n", "").replace("3 6 1 6", "2 4 1 4");
        assert!(matches!(
            load_quadmesh_2d(no_quads.as_bytes()),
            Err(MeshError::Format(msg)) if msg.contains("no elements")
        ));
        assert!(matches!(
            load_quadmesh_2d(b"not a mesh"),
            Err(MeshError::Format(_))
        ));
    }
}
