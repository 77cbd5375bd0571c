//! Construction of the raw -> relabeled index bijection.
//!
//! Structured blocks are laid out first, each one a contiguous range
//! in row-major order, and whatever remains is appended afterwards
//! in visitation order.

use fixedbitset as fb;
use itertools::Itertools;
use std::collections::HashMap;

use crate::{mesh::IndexMap, MeshError, NO_NEIGHBOUR};

/// Placement of one structured block in the relabeled index space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelabeledBlock {
    pub offset: usize,
    pub rows: usize,
    pub cols: usize,
}

impl RelabeledBlock {
    /// Number of elements in the block.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Incrementally built mapping from raw indices to relabeled indices.
#[derive(Clone, Debug, Default)]
pub struct Relabeler {
    blocks: Vec<RelabeledBlock>,
    /// raw index of every relabeled slot assigned so far
    new_to_old: Vec<usize>,
    old_to_new: HashMap<usize, usize>,
    /// set for slots that are visible to unstructured bookkeeping,
    /// i.e. the outer ring of each block and everything after the blocks
    dual_mask: fb::FixedBitSet,
    unstructured_start: Option<usize>,
}

impl Relabeler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a structured grid of raw indices given in row-major order.
    ///
    /// Grids must be at least 2x2,
    /// and none of the indices may have been mapped before.
    pub fn add_structured_grid(
        &mut self,
        raw: &[usize],
        rows: usize,
        cols: usize,
    ) -> Result<(), MeshError> {
        if rows < 2 || cols < 2 {
            return Err(MeshError::Configuration(format!(
                "structured region of {rows}x{cols} is smaller than 2x2"
            )));
        }
        self.add_block(raw, rows, cols)
    }

    /// Append a block of any shape, including degenerate ones.
    ///
    /// Cell and edge blocks derived from a node grid can be a single row wide
    /// or empty, which is fine for them even though node grids need 2x2.
    pub(crate) fn add_block(
        &mut self,
        raw: &[usize],
        rows: usize,
        cols: usize,
    ) -> Result<(), MeshError> {
        if raw.len() != rows * cols {
            return Err(MeshError::Configuration(format!(
                "{rows}x{cols} block given {} indices",
                raw.len()
            )));
        }
        // check everything before mutating so a failed insertion leaves no trace
        if let Some(&dup) = raw.iter().duplicates().next() {
            return Err(MeshError::Index(format!(
                "raw index {dup} appears twice in one structured block"
            )));
        }
        if let Some(&mapped) = raw.iter().find(|i| self.old_to_new.contains_key(*i)) {
            return Err(MeshError::Index(format!(
                "raw index {mapped} is already mapped to {}",
                self.old_to_new[&mapped]
            )));
        }

        let offset = self.current_offset();
        self.blocks.push(RelabeledBlock { offset, rows, cols });

        self.dual_mask.grow(offset + raw.len());
        for (slot, &old) in raw.iter().enumerate() {
            self.old_to_new.insert(old, offset + slot);
            self.new_to_old.push(old);

            let (r, c) = (slot / cols, slot % cols);
            if r == 0 || r == rows - 1 || c == 0 || c == cols - 1 {
                self.dual_mask.insert(offset + slot);
            }
        }
        Ok(())
    }

    /// Append every raw index not mapped yet, in the given order.
    ///
    /// Indices already placed in a structured block are skipped,
    /// so passing the full range `0..n` completes the mapping.
    pub fn add_unstructured_data(&mut self, raw: impl IntoIterator<Item = usize>) {
        self.unstructured_start = Some(self.current_offset());
        for old in raw {
            let new = self.current_offset();
            if let std::collections::hash_map::Entry::Vacant(entry) = self.old_to_new.entry(old) {
                entry.insert(new);
                self.new_to_old.push(old);
                self.dual_mask.grow(new + 1);
                self.dual_mask.insert(new);
            }
        }
    }

    /// Number of relabeled slots assigned so far.
    #[inline]
    pub fn current_offset(&self) -> usize {
        self.new_to_old.len()
    }

    /// Relabeled index where the unstructured remainder begins,
    /// if it has been added.
    #[inline]
    pub fn unstructured_start(&self) -> Option<usize> {
        self.unstructured_start
    }

    pub fn blocks(&self) -> &[RelabeledBlock] {
        &self.blocks
    }

    /// Raw index for every relabeled slot, in relabeled order.
    pub fn new_to_old(&self) -> &[usize] {
        &self.new_to_old
    }

    /// Whether a relabeled slot is visible to unstructured bookkeeping.
    #[inline]
    pub fn is_unstructured(&self, new: usize) -> bool {
        self.dual_mask.contains(new)
    }

    /// Relabeled index of a raw index.
    ///
    /// [`NO_NEIGHBOUR`] maps to itself.
    pub fn translate(&self, old: usize) -> Result<usize, MeshError> {
        if old == NO_NEIGHBOUR {
            return Ok(NO_NEIGHBOUR);
        }
        self.old_to_new
            .get(&old)
            .copied()
            .ok_or_else(|| MeshError::Index(format!("raw index {old} has no relabeled index")))
    }

    pub fn translate_all<const N: usize>(&self, old: &[usize; N]) -> Result<[usize; N], MeshError> {
        let mut new = [NO_NEIGHBOUR; N];
        for (n, &o) in new.iter_mut().zip(old) {
            *n = self.translate(o)?;
        }
        Ok(new)
    }

    /// Translate the values of an adjacency list, keeping its keys in place.
    ///
    /// Used where the keys belong to a different index space
    /// than the values, e.g. cell -> nodes while only nodes are relabeled.
    pub fn translate_values<const N: usize>(
        &self,
        lists: &[[usize; N]],
    ) -> Result<Vec<[usize; N]>, MeshError> {
        lists.iter().map(|l| self.translate_all(l)).collect()
    }

    /// Translate both the keys and the values of an adjacency list
    /// whose keys and values share this index space.
    pub fn translate_keyed<const N: usize>(
        &self,
        lists: &[[usize; N]],
    ) -> Result<Vec<[usize; N]>, MeshError> {
        let mut out = vec![[NO_NEIGHBOUR; N]; lists.len()];
        for (old, list) in lists.iter().enumerate() {
            let new = self.translate(old)?;
            let slot = out.get_mut(new).ok_or_else(|| {
                MeshError::Index(format!(
                    "relabeled index {new} outside of {} keys",
                    lists.len()
                ))
            })?;
            *slot = self.translate_all(list)?;
        }
        Ok(out)
    }

    /// Produce a relabeled-order copy of an array given in raw order.
    pub fn reorder<T: Clone>(&self, data: &[T]) -> Result<Vec<T>, MeshError> {
        self.new_to_old
            .iter()
            .map(|&old| {
                data.get(old).cloned().ok_or_else(|| {
                    MeshError::Index(format!(
                        "raw index {old} outside of data with {} entries",
                        data.len()
                    ))
                })
            })
            .collect()
    }

    /// Finish the mapping, checking that it is a bijection over `0..count`.
    pub fn finish(&self, count: usize) -> Result<IndexMap, MeshError> {
        IndexMap::from_new_to_old(self.new_to_old.clone()).and_then(|map| {
            if map.len() == count {
                Ok(map)
            } else {
                Err(MeshError::consistency(
                    "relabeled index count",
                    count,
                    map.len(),
                ))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_slots_are_dual() {
        let mut relabeler = Relabeler::new();
        let raw: Vec<usize> = (0..12).rev().collect();
        relabeler.add_structured_grid(&raw, 3, 4).unwrap();

        let interior = [5, 6];
        for new in 0..12 {
            assert_eq!(
                relabeler.is_unstructured(new),
                !interior.contains(&new),
                "slot {new}"
            );
        }
        assert_eq!(relabeler.translate(11).unwrap(), 0);
        assert_eq!(relabeler.translate(0).unwrap(), 11);
    }

    #[test]
    fn mapping_is_bijection_after_remainder() {
        let count = 30;
        let mut relabeler = Relabeler::new();
        relabeler
            .add_structured_grid(&[3, 4, 5, 9, 10, 11], 2, 3)
            .unwrap();
        relabeler
            .add_structured_grid(&[20, 21, 25, 26], 2, 2)
            .unwrap();
        relabeler.add_unstructured_data(0..count);

        assert_eq!(relabeler.unstructured_start(), Some(10));
        assert_eq!(relabeler.current_offset(), count);

        let mut image: Vec<usize> = (0..count)
            .map(|old| relabeler.translate(old).unwrap())
            .collect();
        image.sort_unstable();
        itertools::assert_equal(image, 0..count);

        // structured blocks come first and contiguously
        itertools::assert_equal(
            [3, 4, 5, 9, 10, 11, 20, 21, 25, 26]
                .iter()
                .map(|&old| relabeler.translate(old).unwrap()),
            0..10,
        );
        // the remainder keeps visitation order
        assert_eq!(relabeler.translate(0).unwrap(), 10);
        assert_eq!(relabeler.translate(6).unwrap(), 13);
        assert!(relabeler.is_unstructured(13));

        assert!(relabeler.translate(count).is_err());

        let map = relabeler.finish(count).unwrap();
        assert_eq!(map.new_to_old(), relabeler.new_to_old());
        assert!(relabeler.finish(count + 1).is_err());
    }

    #[test]
    fn repeated_unstructured_data_is_idempotent() {
        let mut relabeler = Relabeler::new();
        relabeler.add_structured_grid(&[0, 1, 2, 3], 2, 2).unwrap();
        relabeler.add_unstructured_data(0..6);
        let offset = relabeler.current_offset();
        let order = relabeler.new_to_old().to_vec();

        relabeler.add_unstructured_data([1, 4, 5]);
        assert_eq!(relabeler.current_offset(), offset);
        assert_eq!(relabeler.new_to_old(), &order[..]);
    }

    #[test]
    fn overlapping_structured_grid_fails() {
        let mut relabeler = Relabeler::new();
        relabeler.add_structured_grid(&[0, 1, 2, 3], 2, 2).unwrap();

        let res = relabeler.add_structured_grid(&[4, 5, 3, 6], 2, 2);
        assert!(matches!(res, Err(MeshError::Index(_))));
        // the failed grid left nothing behind
        assert_eq!(relabeler.current_offset(), 4);
        assert_eq!(relabeler.blocks().len(), 1);
        assert!(relabeler.translate(4).is_err());

        let res = relabeler.add_structured_grid(&[7, 8, 7, 9], 2, 2);
        assert!(matches!(res, Err(MeshError::Index(_))));
    }

    #[test]
    fn too_small_grid_fails() {
        let mut relabeler = Relabeler::new();
        let res = relabeler.add_structured_grid(&[0, 1, 2], 1, 3);
        assert!(matches!(res, Err(MeshError::Configuration(_))));
        let res = relabeler.add_structured_grid(&[0, 1, 2], 2, 2);
        assert!(matches!(res, Err(MeshError::Configuration(_))));

        // degenerate blocks are allowed internally
        relabeler.add_block(&[0, 1, 2], 1, 3).unwrap();
        relabeler.add_block(&[], 0, 5).unwrap();
        assert!((0..3).all(|new| relabeler.is_unstructured(new)));
    }

    #[test]
    fn sentinel_and_reordering() {
        let mut relabeler = Relabeler::new();
        relabeler.add_structured_grid(&[2, 0, 3, 1], 2, 2).unwrap();
        relabeler.add_unstructured_data(0..4);

        assert_eq!(relabeler.translate(NO_NEIGHBOUR).unwrap(), NO_NEIGHBOUR);

        let data = ['a', 'b', 'c', 'd'];
        assert_eq!(relabeler.reorder(&data).unwrap(), vec!['c', 'a', 'd', 'b']);
        assert!(relabeler.reorder(&data[..2]).is_err());

        // node -> neighbouring nodes, keyed by the same index space
        let adjacency = [[1, NO_NEIGHBOUR], [0, 2], [1, 3], [2, NO_NEIGHBOUR]];
        let keyed = relabeler.translate_keyed(&adjacency).unwrap();
        // raw 2 -> new 0, its neighbours raw 1 and 3 -> new 3 and 2
        assert_eq!(keyed[0], [3, 2]);
        assert_eq!(keyed[1], [3, NO_NEIGHBOUR]);

        let values = relabeler.translate_values(&adjacency).unwrap();
        assert_eq!(values[0], [3, NO_NEIGHBOUR]);
    }
}
