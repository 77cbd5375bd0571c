//! Kernels runnable through a [`Dispatcher`][crate::Dispatcher].
//!
//! Each kernel is a struct borrowing its input arrays immutably
//! and its output arrays mutably, indexed by the ids the dispatcher hands out.
//! Which index space that is depends on the traversal,
//! so arrays must be laid out to match ([`Dispatcher::coords`][crate::Dispatcher::coords]
//! gives the coordinates of the right space).

pub mod airfoil;
pub mod diagnostic;
