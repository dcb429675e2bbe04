use crate::allocators::DimAllocator;
use crate::nalgebra::{DVector, DefaultAllocator, OPoint};
use crate::{Real, SmallDim};
use itertools::Itertools;

/// The largest distance between any two of the given points, clamped from below by machine
/// epsilon.
///
/// Used as the element size $h_K$ when given the corners of an element.
pub fn diameter<T, D>(points: &[OPoint<T, D>]) -> T
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    points
        .iter()
        .tuple_combinations()
        .map(|(x, y)| (y - x).norm())
        .fold(T::default_epsilon(), |a, b| a.max(b))
}

/// Gathers the element-local weights of a scalar field from a global vector.
///
/// # Panics
///
/// Panics if a node index is out of bounds.
pub fn extract_by_node_index<T: Real>(u: &DVector<T>, node_indices: &[usize]) -> DVector<T> {
    DVector::from_iterator(node_indices.len(), node_indices.iter().map(|&i| u[i]))
}
