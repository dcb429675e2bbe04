use nalgebra::RealField;

pub use nalgebra;

/// Scalar type used throughout `transport-fem`.
///
/// Integrands copy scalars freely inside quadrature loops, so we additionally require `Copy`.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}

pub mod allocators;
