//! Borrowed field closures supplied by the caller.
//!
//! Integrands never own their fields. The caller keeps the closures alive for the duration of an
//! assembly pass, which the lifetime `'a` expresses. Fields must be `Sync` so that a configured
//! integrand can be shared between threads assembling different elements.
use crate::nalgebra::allocator::Allocator;
use crate::nalgebra::{DefaultAllocator, DimName, OPoint, OVector, Scalar};

/// A scalar field $f: \mathbb{R}^d \rightarrow \mathbb{R}$.
pub type ScalarField<'a, T, D> = &'a (dyn Fn(&OPoint<T, D>) -> T + Sync);

/// A vector field $\vec U: \mathbb{R}^d \rightarrow \mathbb{R}^d$.
pub type VectorField<'a, T, D> = &'a (dyn Fn(&OPoint<T, D>) -> OVector<T, D> + Sync);

/// An analytical solution $u$ together with its gradient $\nabla u$.
pub struct AnalyticalSolution<'a, T, D>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    pub value: ScalarField<'a, T, D>,
    pub gradient: VectorField<'a, T, D>,
}

impl<'a, T, D> AnalyticalSolution<'a, T, D>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    pub fn new(value: ScalarField<'a, T, D>, gradient: VectorField<'a, T, D>) -> Self {
        Self { value, gradient }
    }
}

impl<'a, T, D> Clone for AnalyticalSolution<'a, T, D>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, T, D> Copy for AnalyticalSolution<'a, T, D>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
}
