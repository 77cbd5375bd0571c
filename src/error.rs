//! The error type shared by every stage of the pipeline.
//!
//! Every kind of error here is treated as unrecoverable by the callers:
//! corrupted metadata would silently produce wrong numbers downstream,
//! so detection sites return immediately and nothing retries.

use std::fmt::Debug;

/// Error raised while building, relabeling, persisting or traversing a mesh.
#[derive(thiserror::Error, Debug)]
pub enum MeshError {
    /// Malformed input parameters,
    /// e.g. a compass that is not a permutation
    /// or a structured region smaller than 2x2.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Lookup of an unmapped index or duplicate insertion into an index map.
    #[error("index error: {0}")]
    Index(String),
    /// A mandatory consistency check failed.
    #[error("consistency check failed: {check} (expected {expected}, got {actual})")]
    Consistency {
        check: String,
        expected: String,
        actual: String,
    },
    /// Malformed or truncated persisted data.
    #[error("malformed mesh file: {0}")]
    Format(String),
    /// Underlying I/O failure.
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

impl MeshError {
    /// Construct a [`Consistency`][Self::Consistency] error
    /// from the debug representations of the expected and actual values.
    pub fn consistency(
        check: impl Into<String>,
        expected: impl Debug,
        actual: impl Debug,
    ) -> Self {
        Self::Consistency {
            check: check.into(),
            expected: format!("{expected:?}"),
            actual: format!("{actual:?}"),
        }
    }
}

/// Fail with a consistency error unless `expected == actual`.
///
/// The check name is only formatted on failure,
/// so this is cheap enough for the hot loops of the dispatcher.
#[inline]
pub(crate) fn check_eq<T, F, S>(check: F, expected: T, actual: T) -> Result<(), MeshError>
where
    T: PartialEq + Debug,
    F: FnOnce() -> S,
    S: Into<String>,
{
    if expected == actual {
        Ok(())
    } else {
        Err(MeshError::consistency(check(), expected, actual))
    }
}
