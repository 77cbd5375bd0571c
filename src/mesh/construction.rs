use itertools::Itertools;
use std::collections::HashMap;

use super::{Coord, MeshArrays};
use crate::MeshError;

/// One side of a cell as seen while walking the cell's node cycle.
#[derive(Clone, Copy, Debug)]
struct Side {
    /// node ids sorted ascending, identifying the edge regardless of direction
    key: [usize; 2],
    /// node ids in the cell's cycle order
    walked: [usize; 2],
    cell: usize,
}

impl MeshArrays {
    /// Construct the full adjacency of a mesh from its quad cells.
    ///
    /// Cells must trace their boundary consistently
    /// (all counterclockwise or all clockwise).
    /// Edge node pairs are stored reversed relative to the cycle of the first cell
    /// that contains them, which for counterclockwise cells
    /// makes the normal `(dy, -dx)` of `x0 - x1` point out of that cell.
    ///
    /// `boundary_tags` assigns a boundary condition to border edges
    /// by their sorted node pair; untagged border edges get 0.
    pub fn from_cells(
        coords: Vec<Coord>,
        cell_nodes: Vec<[usize; 4]>,
        boundary_tags: &HashMap<[usize; 2], i32>,
    ) -> Result<Self, MeshError> {
        let num_nodes = coords.len();
        if let Some((cell, nodes)) = cell_nodes
            .iter()
            .enumerate()
            .find(|(_, nodes)| {
                nodes.iter().any(|&n| n >= num_nodes) || nodes.iter().duplicates().next().is_some()
            })
        {
            return Err(MeshError::Index(format!(
                "cell {cell} has invalid nodes {nodes:?} for {num_nodes} nodes"
            )));
        }

        // every cell contributes its four sides,
        // sorted by node pair so that shared sides end up next to each other.
        // the sort is stable, so within a group the lower cell id comes first
        let sides = cell_nodes
            .iter()
            .enumerate()
            .flat_map(|(cell, nodes)| {
                (0..4).map(move |i| {
                    let walked = [nodes[i], nodes[(i + 1) % 4]];
                    let key = if walked[0] < walked[1] {
                        walked
                    } else {
                        [walked[1], walked[0]]
                    };
                    Side { key, walked, cell }
                })
            })
            .sorted_by_key(|side| side.key);

        let mut arrays = MeshArrays {
            coords,
            cell_nodes,
            ..Default::default()
        };

        for (key, group) in &sides.group_by(|side| side.key) {
            let group: Vec<Side> = group.collect();
            match group.as_slice() {
                [side] => {
                    let [p, q] = side.walked;
                    arrays.border_nodes.push([q, p]);
                    arrays.border_cell.push(side.cell);
                    arrays
                        .border_bounds
                        .push(boundary_tags.get(&key).copied().unwrap_or(0));
                }
                [first, second] => {
                    if second.walked != [first.walked[1], first.walked[0]] {
                        return Err(MeshError::consistency(
                            format!(
                                "winding of cells {} and {} along their shared edge",
                                first.cell, second.cell
                            ),
                            [first.walked[1], first.walked[0]],
                            second.walked,
                        ));
                    }
                    let [p, q] = first.walked;
                    arrays.inedge_nodes.push([q, p]);
                    arrays.inedge_cells.push([first.cell, second.cell]);
                }
                _ => {
                    return Err(MeshError::consistency(
                        format!("number of cells sharing edge {key:?}"),
                        "at most 2",
                        group.len(),
                    ));
                }
            }
        }

        Ok(arrays)
    }
}
