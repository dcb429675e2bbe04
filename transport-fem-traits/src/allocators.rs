//! Helper traits for allocator trait bounds.
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, Scalar, U1};

/// An allocator for a single (spatial) dimension.
///
/// Allocators involving `Dyn` (e.g. `D x n` basis gradient matrices) are provided by nalgebra
/// for every `D: DimName` and need not be listed.
pub trait DimAllocator<T: Scalar, D: DimName>:
    Allocator<T, D> + Allocator<T, D, D> + Allocator<T, U1, D>
{
}

impl<T, D> DimAllocator<T, D> for DefaultAllocator
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D> + Allocator<T, D, D> + Allocator<T, U1, D>,
{
}
