use crate::allocators::DimAllocator;
use crate::nalgebra::{DMatrix, DVector, DefaultAllocator, DimName, Dyn, OMatrix, OPoint, OVector};
use crate::{Real, SmallDim};

mod advection_diffusion;
mod weak_dirichlet;

pub use advection_diffusion::*;
pub use weak_dirichlet::*;

/// Whether an element local state is used for interior or boundary integration.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Interior,
    Boundary,
}

/// Selects which element quantities are assembled.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum SolutionMode {
    /// Element matrices and vectors.
    #[default]
    Static,
    /// Element vectors only.
    RhsOnly,
}

impl SolutionMode {
    pub fn assembles_matrix(&self) -> bool {
        matches!(self, SolutionMode::Static)
    }
}

/// The finite element quantities an integrand needs the driver to supply at each point.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct IntegrandRequirements {
    /// Basis function Laplacians ([`FiniteElementPoint::basis_laplacians`]).
    pub second_derivatives: bool,
    /// Element corner coordinates ([`FiniteElementPoint::corners`]).
    pub element_corners: bool,
    /// Outward boundary normals.
    pub normals: bool,
}

impl IntegrandRequirements {
    /// Basis values, gradients, positions and integration weights only.
    pub const STANDARD: Self = Self {
        second_derivatives: false,
        element_corners: false,
        normals: false,
    };
}

/// Finite element data at a single quadrature point, as supplied by the driver.
///
/// Gradients and Laplacians are given with respect to physical coordinates, with one
/// column (entry) per element node.
#[derive(Debug, Clone)]
pub struct FiniteElementPoint<'a, T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    pub element_index: usize,
    pub basis_values: &'a DVector<T>,
    pub basis_gradients: &'a OMatrix<T, D, Dyn>,
    pub basis_laplacians: Option<&'a DVector<T>>,
    /// The quadrature weight multiplied by the absolute jacobian determinant.
    pub weight: T,
    pub position: OPoint<T, D>,
    pub corners: &'a [OPoint<T, D>],
}

impl<'a, T, D> FiniteElementPoint<'a, T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    /// # Panics
    ///
    /// Panics if the number of basis values does not match the number of gradient columns, or
    /// the length of the Laplacian vector when present.
    pub fn num_nodes(&self) -> usize {
        let n = self.basis_values.len();
        assert_eq!(
            self.basis_gradients.ncols(),
            n,
            "Number of basis gradients must match number of basis values"
        );
        if let Some(laplacians) = self.basis_laplacians {
            assert_eq!(laplacians.len(), n, "Number of basis Laplacians must match number of basis values");
        }
        n
    }

    /// The basis Laplacians, or zero if the driver did not supply second derivatives.
    pub fn laplacian(&self, node: usize) -> T {
        self.basis_laplacians
            .map(|laplacians| laplacians[node])
            .unwrap_or_else(T::zero)
    }

    /// Evaluates $u_h$ at this point from the element-local weights.
    pub fn interpolate(&self, u_element: &DVector<T>) -> T {
        self.basis_values.dot(u_element)
    }

    /// Evaluates $\nabla u_h$ at this point from the element-local weights.
    pub fn interpolate_gradient(&self, u_element: &DVector<T>) -> OVector<T, D> {
        self.basis_gradients * u_element
    }

    /// Evaluates $\Delta u_h$ at this point, or zero without second derivatives.
    pub fn interpolate_laplacian(&self, u_element: &DVector<T>) -> T {
        self.basis_laplacians
            .map(|laplacians| laplacians.dot(u_element))
            .unwrap_or_else(T::zero)
    }
}

/// Element matrix and vector, each present only if the solution mode asks for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementMatrices<T: Real> {
    num_nodes: usize,
    matrix: Option<DMatrix<T>>,
    vector: Option<DVector<T>>,
}

impl<T: Real> ElementMatrices<T> {
    pub fn new(num_nodes: usize, with_matrix: bool, with_vector: bool) -> Self {
        Self {
            num_nodes,
            matrix: with_matrix.then(|| DMatrix::zeros(num_nodes, num_nodes)),
            vector: with_vector.then(|| DVector::zeros(num_nodes)),
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn matrix(&self) -> Option<&DMatrix<T>> {
        self.matrix.as_ref()
    }

    pub fn vector(&self) -> Option<&DVector<T>> {
        self.vector.as_ref()
    }

    pub fn matrix_mut(&mut self) -> Option<&mut DMatrix<T>> {
        self.matrix.as_mut()
    }

    pub fn vector_mut(&mut self) -> Option<&mut DVector<T>> {
        self.vector.as_mut()
    }

    pub fn into_parts(self) -> (Option<DMatrix<T>>, Option<DVector<T>>) {
        (self.matrix, self.vector)
    }
}

/// A weak form integrand evaluated point by point on a single element.
///
/// The driver creates one local state per element, feeds it interior (and, for boundary
/// elements, boundary) quadrature points, finalizes it and then assembles the result. Distinct
/// elements have distinct local states, so elements may be processed concurrently as long as
/// the integrand itself is shared immutably.
///
/// Evaluation errors signal configuration contract violations, such as a field required by the
/// active terms not being set. They are deterministic and the driver should abort the pass.
pub trait Integrand<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    type LocalState;

    fn requirements(&self) -> IntegrandRequirements;

    /// Whether the integrand contributes anything at interior points.
    fn has_interior_terms(&self) -> bool {
        true
    }

    /// Creates a fresh local state for the element with the given global index and
    /// local-to-global node correspondence.
    fn create_local_state(&self, element_index: usize, element_nodes: &[usize], kind: ElementKind)
        -> Self::LocalState;

    fn evaluate_interior(&self, state: &mut Self::LocalState, point: &FiniteElementPoint<T, D>) -> eyre::Result<()>;

    fn evaluate_boundary(
        &self,
        state: &mut Self::LocalState,
        point: &FiniteElementPoint<T, D>,
        normal: &OVector<T, D>,
    ) -> eyre::Result<()> {
        let _ = (state, point, normal);
        Ok(())
    }

    /// Finalizes the local state after all interior points have been visited.
    fn finalize_element(&self, state: &mut Self::LocalState) -> eyre::Result<()> {
        let _ = state;
        Ok(())
    }
}

/// Grouped, human-readable names of the quantities produced by an integrand.
///
/// Groups are numbered from one, quantities within a group from zero.
pub trait NamedQuantities {
    fn num_groups(&self) -> usize;

    /// The number of quantities in the given group, zero for groups that do not exist.
    fn group_size(&self, group: usize) -> usize;

    /// # Panics
    ///
    /// Panics if the group or index does not exist.
    fn quantity_name(&self, group: usize, index: usize, prefix: Option<&str>) -> String;
}

pub(crate) fn prefixed_name(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix} {name}"),
        None => name.to_string(),
    }
}

pub(crate) fn component_suffix<D: DimName>(index: usize) -> String {
    assert!(index < D::dim(), "Component index {} out of bounds for dimension {}", index, D::dim());
    match index {
        0 => "x".to_string(),
        1 => "y".to_string(),
        2 => "z".to_string(),
        _ => format!("{}", index + 1),
    }
}
