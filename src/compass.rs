//! Orientation canonicalization for quads and edges.
//!
//! A compass records how the local slot order of a stored element
//! relates to the canonical grid order that structured traversal produces.
//! The forward permutation maps grid slot -> element slot
//! (`forward[grid_slot] = element_slot`).
//! Its inverse is what traversal needs: element slot `k` takes
//! the grid entry at `inverse[k]`.
//!
//! Inverses are not stored directly but as an index
//! into a fixed, lexicographically ordered table of all permutations
//! of the slot count ([`QUAD_TABLE`] and [`PAIR_TABLE`]),
//! so metadata is a single small integer per region.

use crate::MeshError;

/// All permutations of two slots, in lexicographic order.
pub const PAIR_TABLE: [[usize; 2]; 2] = [[0, 1], [1, 0]];

/// All permutations of four slots, in lexicographic order.
pub const QUAD_TABLE: [[usize; 4]; 24] = [
    [0, 1, 2, 3],
    [0, 1, 3, 2],
    [0, 2, 1, 3],
    [0, 2, 3, 1],
    [0, 3, 1, 2],
    [0, 3, 2, 1],
    [1, 0, 2, 3],
    [1, 0, 3, 2],
    [1, 2, 0, 3],
    [1, 2, 3, 0],
    [1, 3, 0, 2],
    [1, 3, 2, 0],
    [2, 0, 1, 3],
    [2, 0, 3, 1],
    [2, 1, 0, 3],
    [2, 1, 3, 0],
    [2, 3, 0, 1],
    [2, 3, 1, 0],
    [3, 0, 1, 2],
    [3, 0, 2, 1],
    [3, 1, 0, 2],
    [3, 1, 2, 0],
    [3, 2, 0, 1],
    [3, 2, 1, 0],
];

/// Marker type carrying the permutation table for each supported slot count.
#[derive(Clone, Copy, Debug)]
pub struct Tables;

/// Access to the fixed permutation table for `N` slots.
pub trait CompassTable<const N: usize> {
    const TABLE: &'static [[usize; N]];
}

impl CompassTable<2> for Tables {
    const TABLE: &'static [[usize; 2]] = &PAIR_TABLE;
}

impl CompassTable<4> for Tables {
    const TABLE: &'static [[usize; 4]] = &QUAD_TABLE;
}

/// A canonicalized orientation of an `N`-slot element,
/// stored as an index into the permutation table of size `N`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Compass<const N: usize> {
    index: usize,
}

/// Compass of a quad cell (4 node slots).
pub type QuadCompass = Compass<4>;
/// Compass of an edge (2 node slots or 2 cell slots).
pub type PairCompass = Compass<2>;

impl<const N: usize> Compass<N>
where
    Tables: CompassTable<N>,
{
    /// The compass under which element order equals grid order.
    ///
    /// This is always the first table entry since the table is lexicographic.
    pub fn identity() -> Self {
        Self { index: 0 }
    }

    /// Canonicalize an observed forward permutation (grid slot -> element slot).
    pub fn from_forward(forward: &[usize]) -> Result<Self, MeshError> {
        let inverse = invert::<N>(forward)?;
        Ok(Self {
            index: table_index(&inverse)?,
        })
    }

    /// Look up a compass by its stored table index.
    pub fn from_index(index: usize) -> Result<Self, MeshError> {
        if index < <Tables as CompassTable<N>>::TABLE.len() {
            Ok(Self { index })
        } else {
            Err(MeshError::Configuration(format!(
                "no {n}-slot compass with index {index}",
                n = N
            )))
        }
    }

    /// Find the compass relating a grid-ordered element
    /// to the same element in its stored order.
    ///
    /// Fails if the two don't contain exactly the same entries.
    pub fn observe<T: PartialEq + std::fmt::Debug>(
        grid: &[T; N],
        element: &[T; N],
    ) -> Result<Self, MeshError> {
        let mut forward = [0; N];
        for (slot, entry) in grid.iter().enumerate() {
            forward[slot] = element.iter().position(|e| e == entry).ok_or_else(|| {
                MeshError::Configuration(format!(
                    "grid entries {grid:?} are not a reordering of {element:?}"
                ))
            })?;
        }
        Self::from_forward(&forward)
    }

    /// Index of this compass in the permutation table.
    #[inline]
    pub fn index(self) -> usize {
        self.index
    }

    /// The inverse permutation (element slot -> grid slot).
    #[inline]
    pub fn inverse(self) -> &'static [usize; N] {
        &<Tables as CompassTable<N>>::TABLE[self.index]
    }

    /// The forward permutation (grid slot -> element slot).
    pub fn forward(self) -> [usize; N] {
        let inverse = self.inverse();
        let mut forward = [0; N];
        for (element_slot, &grid_slot) in inverse.iter().enumerate() {
            forward[grid_slot] = element_slot;
        }
        forward
    }

    /// Reorder grid-ordered entries into element order.
    #[inline]
    pub fn apply<T: Copy>(self, grid: [T; N]) -> [T; N] {
        let inverse = self.inverse();
        std::array::from_fn(|k| grid[inverse[k]])
    }
}

/// Validate that `perm` is a permutation of `0..N` and invert it.
pub fn invert<const N: usize>(perm: &[usize]) -> Result<[usize; N], MeshError> {
    if perm.len() != N {
        return Err(MeshError::Configuration(format!(
            "compass {perm:?} has {} slots, expected {N}",
            perm.len(),
            N = N
        )));
    }

    let mut inverse = [usize::MAX; N];
    for (slot, &target) in perm.iter().enumerate() {
        if target >= N || inverse[target] != usize::MAX {
            return Err(MeshError::Configuration(format!(
                "compass {perm:?} is not a permutation of 0..{n}",
                n = N
            )));
        }
        inverse[target] = slot;
    }
    Ok(inverse)
}

/// Find the position of a permutation in the table of size `N`.
pub fn table_index<const N: usize>(perm: &[usize; N]) -> Result<usize, MeshError>
where
    Tables: CompassTable<N>,
{
    <Tables as CompassTable<N>>::TABLE
        .iter()
        .position(|entry| entry == perm)
        .ok_or_else(|| {
            MeshError::Configuration(format!("permutation {perm:?} is not in the compass table"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    /// The hardcoded tables are exactly the lexicographic permutations.
    #[test]
    fn tables_are_lexicographic() {
        itertools::assert_equal(
            QUAD_TABLE.iter().map(|p| p.to_vec()),
            (0..4usize).permutations(4),
        );
        itertools::assert_equal(
            PAIR_TABLE.iter().map(|p| p.to_vec()),
            (0..2usize).permutations(2),
        );
    }

    fn check_round_trips<const N: usize>()
    where
        Tables: CompassTable<N>,
    {
        for perm in <Tables as CompassTable<N>>::TABLE {
            let inverse = invert::<N>(perm).unwrap();
            // composing both ways gives the identity
            for k in 0..N {
                assert_eq!(inverse[perm[k]], k);
                assert_eq!(perm[inverse[k]], k);
            }

            let idx = table_index(&inverse).unwrap();
            assert_eq!(&<Tables as CompassTable<N>>::TABLE[idx], &inverse);

            let compass = Compass::<N>::from_forward(perm).unwrap();
            assert_eq!(compass.index(), idx);
            assert_eq!(compass.inverse(), &inverse);
            assert_eq!(&compass.forward(), perm);
            assert_eq!(Compass::<N>::from_index(idx).unwrap(), compass);
        }
    }

    #[test]
    fn every_permutation_round_trips() {
        check_round_trips::<4>();
        check_round_trips::<2>();
    }

    #[test]
    fn invalid_permutations_are_rejected() {
        let bad: [&[usize]; 5] = [&[0, 1, 2], &[0, 1, 1, 2], &[0, 1, 2, 4], &[3, 3, 3, 3], &[]];
        for perm in bad {
            assert!(
                matches!(
                    QuadCompass::from_forward(perm),
                    Err(MeshError::Configuration(_))
                ),
                "{perm:?} should be rejected"
            );
        }
        assert!(PairCompass::from_forward(&[1, 1]).is_err());
        assert!(PairCompass::from_forward(&[0, 1, 2]).is_err());

        assert!(QuadCompass::from_index(23).is_ok());
        assert!(QuadCompass::from_index(24).is_err());
        assert!(PairCompass::from_index(2).is_err());
    }

    #[test]
    fn apply_and_observe() {
        // a counterclockwise cell stored starting from its top-left corner
        // sees grid slots 2 and 3 swapped
        let grid = [10, 11, 20, 21];
        let cycle = [10, 11, 21, 20];
        let compass = QuadCompass::observe(&grid, &cycle).unwrap();
        assert_eq!(compass.forward(), [0, 1, 3, 2]);
        assert_eq!(compass.index(), 1);
        assert_eq!(compass.apply(grid), cycle);

        // rotated start slot
        let rotated = [11, 21, 20, 10];
        let compass = QuadCompass::observe(&grid, &rotated).unwrap();
        assert_eq!(compass.apply(grid), rotated);

        let flipped = PairCompass::observe(&[4, 9], &[9, 4]).unwrap();
        assert_eq!(flipped.index(), 1);
        assert_eq!(flipped.apply([4, 9]), [9, 4]);
        assert_eq!(PairCompass::identity().apply([4, 9]), [4, 9]);

        assert!(QuadCompass::observe(&grid, &[10, 11, 21, 99]).is_err());
    }
}
