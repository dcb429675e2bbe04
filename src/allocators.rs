//! Helper traits for allocator trait bounds.
pub use transport_fem_traits::allocators::*;
