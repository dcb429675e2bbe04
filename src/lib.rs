//! Element integrands for the scalar advection-diffusion-reaction equation
//!
//! $$ \vec U \cdot \nabla u - \nabla \cdot (\kappa \nabla u) + r u = f. $$
//!
//! The crate computes *local* (per-element) contributions only. A finite element driver owns the
//! mesh, the basis functions and the quadrature, and feeds per-point data into the integrands
//! found in [`assembly::local`]. Error norms and effectivity indices are found in [`error`].
use nalgebra::{DimMin, DimName};

pub mod allocators;
pub mod assembly;
pub mod error;
pub mod fields;
pub mod properties;
pub mod stabilization;
pub mod util;

pub(crate) mod workspace;

pub extern crate nalgebra;

pub use transport_fem_traits::Real;

/// A small, fixed-size dimension.
///
/// Used as a trait alias for various traits frequently needed by generic `transport-fem` routines.
pub trait SmallDim: DimName + DimMin<Self, Output = Self> {}

impl<D> SmallDim for D where D: DimName + DimMin<Self, Output = Self> {}

/// Describes whether an element matrix is symmetric.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Symmetry {
    NonSymmetric,
    Symmetric,
}
