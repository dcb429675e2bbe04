use crate::allocators::DimAllocator;
use crate::assembly::local::{
    ElementKind, ElementMatrices, FiniteElementPoint, Integrand, IntegrandRequirements, SolutionMode,
};
use crate::fields::{ScalarField, VectorField};
use crate::nalgebra::{DefaultAllocator, OVector};
use crate::properties::{FluidProperties, WeakDirichletSettings};
use crate::util::diameter;
use crate::{Real, SmallDim, Symmetry};
use eyre::bail;
use log::error;

/// Weakly imposed Dirichlet condition $u = g$ on the boundary, following Nitsche's method.
///
/// At each boundary point with outward normal $\vec n$, the integrand adds
/// <div>$$
/// \begin{aligned}
///   A_{ij} &\mathrel{+}= w \left[
///       \left(\frac{C_{BI}}{h} - \min(\vec U \cdot \vec n, 0)\right) \varphi_i \varphi_j
///       - \kappa \varphi_i (\nabla \varphi_j \cdot \vec n)
///       - \gamma \kappa (\nabla \varphi_i \cdot \vec n) \varphi_j \right], \\\\
///   b_i &\mathrel{+}= w \left[
///       \left(\frac{C_{BI}}{h} - \min(\vec U \cdot \vec n, 0)\right) g \varphi_i
///       - \gamma \kappa g (\nabla \varphi_i \cdot \vec n) \right],
/// \end{aligned}
/// $$</div>
/// where $h$ is the diameter of the element. With $\gamma = 1$, the diffusive part of the
/// element matrix is symmetric.
pub struct WeakDirichlet<'a, T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    cbi: T,
    gamma: T,
    properties: FluidProperties<T>,
    mode: SolutionMode,
    advection: Option<VectorField<'a, T, D>>,
    flux: Option<ScalarField<'a, T, D>>,
}

impl<'a, T, D> WeakDirichlet<'a, T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    pub fn new(cbi: T, gamma: T) -> Self {
        Self::from_settings(&WeakDirichletSettings {
            cbi,
            gamma,
            ..Default::default()
        })
    }

    pub fn from_settings(settings: &WeakDirichletSettings<T>) -> Self {
        Self {
            cbi: settings.cbi,
            gamma: settings.gamma,
            properties: settings.properties,
            mode: SolutionMode::default(),
            advection: None,
            flux: None,
        }
    }

    pub fn cbi(&self) -> T {
        self.cbi
    }

    pub fn gamma(&self) -> T {
        self.gamma
    }

    pub fn properties(&self) -> &FluidProperties<T> {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut FluidProperties<T> {
        &mut self.properties
    }

    pub fn set_mode(&mut self, mode: SolutionMode) {
        self.mode = mode;
    }

    pub fn set_advection_field(&mut self, advection: VectorField<'a, T, D>) {
        self.advection = Some(advection);
    }

    /// Sets the prescribed boundary value $g$.
    pub fn set_flux(&mut self, flux: ScalarField<'a, T, D>) {
        self.flux = Some(flux);
    }

    /// Symmetric if and only if $\gamma = 1$.
    pub fn symmetry(&self) -> Symmetry {
        if self.gamma == T::one() {
            Symmetry::Symmetric
        } else {
            Symmetry::NonSymmetric
        }
    }
}

impl<'a, T, D> Integrand<T, D> for WeakDirichlet<'a, T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    type LocalState = ElementMatrices<T>;

    fn requirements(&self) -> IntegrandRequirements {
        IntegrandRequirements {
            second_derivatives: false,
            element_corners: true,
            normals: true,
        }
    }

    fn has_interior_terms(&self) -> bool {
        false
    }

    fn create_local_state(&self, _element_index: usize, element_nodes: &[usize], _kind: ElementKind) -> ElementMatrices<T> {
        ElementMatrices::new(element_nodes.len(), self.mode.assembles_matrix(), true)
    }

    fn evaluate_interior(&self, _state: &mut ElementMatrices<T>, _point: &FiniteElementPoint<T, D>) -> eyre::Result<()> {
        Ok(())
    }

    #[allow(non_snake_case)]
    fn evaluate_boundary(
        &self,
        state: &mut ElementMatrices<T>,
        point: &FiniteElementPoint<T, D>,
        normal: &OVector<T, D>,
    ) -> eyre::Result<()> {
        let n = point.num_nodes();
        assert_eq!(n, state.num_nodes(), "Number of basis functions must match element node count");

        let (Some(advection), Some(flux)) = (self.advection, self.flux) else {
            error!(
                "Element {}: weak Dirichlet conditions require both an advection field and a boundary value",
                point.element_index
            );
            bail!("Advection field or boundary value not set for weak Dirichlet condition");
        };
        if point.corners.is_empty() {
            error!("Element {}: no element corners supplied for weak Dirichlet condition", point.element_index);
            bail!("Weak Dirichlet condition on element {} requires element corners", point.element_index);
        }

        let x = &point.position;
        let w = point.weight;
        let kappa = self.properties.diffusivity;
        let h = diameter(point.corners);
        let U = advection(x) * self.properties.advection_constant;
        let inflow = U.dot(normal).min(T::zero());
        let penalty = self.cbi / h - inflow;

        let phi = point.basis_values;
        let dphi_dn = point.basis_gradients.tr_mul(normal);

        if let Some(matrix) = state.matrix_mut() {
            matrix.ger(w * penalty, phi, phi, T::one());
            matrix.ger(-w * kappa, phi, &dphi_dn, T::one());
            matrix.ger(-w * self.gamma * kappa, &dphi_dn, phi, T::one());
        }
        if let Some(vector) = state.vector_mut() {
            let g = flux(x);
            vector.axpy(w * g * penalty, phi, T::one());
            vector.axpy(-w * self.gamma * kappa * g, &dphi_dn, T::one());
        }
        Ok(())
    }
}
