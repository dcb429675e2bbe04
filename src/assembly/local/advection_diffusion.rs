use crate::allocators::DimAllocator;
use crate::assembly::local::{
    component_suffix, prefixed_name, ElementKind, ElementMatrices, FiniteElementPoint, Integrand,
    IntegrandRequirements, NamedQuantities, SolutionMode,
};
use crate::define_thread_local_workspace;
use crate::fields::{ScalarField, VectorField};
use crate::nalgebra::{DMatrix, DVector, DefaultAllocator, OPoint, OVector};
use crate::properties::{AdvectionDiffusionSettings, FluidProperties};
use crate::stabilization::{compute_tau, ElementTau, Stabilization, VelocityAccumulator};
use crate::util::diameter;
use crate::workspace::with_thread_local_workspace;
use crate::{Real, SmallDim};
use eyre::bail;
use itertools::izip;
use log::{debug, error};

/// Element local state for [`AdvectionDiffusion`].
///
/// Besides the Galerkin element matrix and vector, the state holds the stabilization terms
/// *without* the factor $\tau$, since $\tau$ depends on the element-averaged velocity and is
/// only known once all interior points have been visited.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementInfo<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    element_index: usize,
    kind: ElementKind,
    galerkin: ElementMatrices<T>,
    stabilized_matrix: Option<DMatrix<T>>,
    stabilized_vector: Option<DVector<T>>,
    velocity: VelocityAccumulator<T, D>,
    element_size: T,
}

impl<T, D> ElementInfo<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    pub fn new(
        element_index: usize,
        num_nodes: usize,
        kind: ElementKind,
        with_matrix: bool,
        stabilized: bool,
    ) -> Self {
        Self {
            element_index,
            kind,
            galerkin: ElementMatrices::new(num_nodes, with_matrix, true),
            stabilized_matrix: (stabilized && with_matrix).then(|| DMatrix::zeros(num_nodes, num_nodes)),
            stabilized_vector: stabilized.then(|| DVector::zeros(num_nodes)),
            velocity: VelocityAccumulator::default(),
            element_size: T::zero(),
        }
    }

    pub fn element_index(&self) -> usize {
        self.element_index
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn num_nodes(&self) -> usize {
        self.galerkin.num_nodes()
    }

    pub fn element_size(&self) -> T {
        self.element_size
    }

    /// Overrides the element size $h_K$ otherwise computed from the element corners.
    pub fn set_element_size(&mut self, element_size: T) {
        self.element_size = element_size;
    }

    pub fn velocity(&self) -> &VelocityAccumulator<T, D> {
        &self.velocity
    }

    pub fn matrix(&self) -> Option<&DMatrix<T>> {
        self.galerkin.matrix()
    }

    pub fn vector(&self) -> Option<&DVector<T>> {
        self.galerkin.vector()
    }

    pub fn stabilized_matrix(&self) -> Option<&DMatrix<T>> {
        self.stabilized_matrix.as_ref()
    }

    pub fn stabilized_vector(&self) -> Option<&DVector<T>> {
        self.stabilized_vector.as_ref()
    }

    /// Returns the assembled element matrix and vector.
    pub fn into_element_matrices(self) -> ElementMatrices<T> {
        self.galerkin
    }

    /// The stabilization parameter for this element, based on the element-averaged velocity.
    pub fn compute_tau(&self, diffusivity: T, cinv: T, order: usize) -> T {
        let speed = self.velocity.mean_velocity().norm();
        compute_tau(speed, self.element_size, diffusivity, cinv, order)
    }

    /// Adds the stabilization terms, scaled by `tau`, to the element matrix and vector.
    pub fn apply_stabilization(&mut self, tau: T) {
        if let (Some(matrix), Some(stabilized)) = (self.galerkin.matrix_mut(), &self.stabilized_matrix) {
            *matrix += stabilized * tau;
        }
        if let (Some(vector), Some(stabilized)) = (self.galerkin.vector_mut(), &self.stabilized_vector) {
            vector.axpy(tau, stabilized, T::one());
        }
    }
}

/// Integrand for the scalar advection-diffusion-reaction equation
/// $$ \vec U \cdot \nabla u - \nabla \cdot (\kappa \nabla u) + r u = f. $$
///
/// At interior points, the Galerkin terms
/// <div>$$
///   \int_K \kappa \nabla \varphi_i \cdot \nabla \varphi_j
///     + \varphi_i (\vec U \cdot \nabla \varphi_j)
///     + r \varphi_i \varphi_j \d{\vec x},
///   \qquad \int_K f \varphi_i \d{\vec x}
/// $$</div>
/// are accumulated, together with the residual-based terms of the selected [`Stabilization`].
/// The stabilization terms are scaled by $\tau$ and added in
/// [`finalize_element`](Integrand::finalize_element), which also stores $\tau$ in the attached
/// [`ElementTau`] buffer. On boundary elements, the integrand contributes the Neumann flux
/// $\int \varphi_i g \d{s}$.
pub struct AdvectionDiffusion<'a, T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    stabilization: Stabilization,
    cinv: T,
    order: usize,
    properties: FluidProperties<T>,
    mode: SolutionMode,
    advection: Option<VectorField<'a, T, D>>,
    reaction: Option<ScalarField<'a, T, D>>,
    source: Option<ScalarField<'a, T, D>>,
    flux: Option<ScalarField<'a, T, D>>,
    element_tau: Option<&'a ElementTau<T>>,
}

impl<'a, T, D> AdvectionDiffusion<'a, T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    pub fn new(stabilization: Stabilization) -> Self {
        Self::from_settings(&AdvectionDiffusionSettings {
            stabilization,
            ..Default::default()
        })
    }

    pub fn from_settings(settings: &AdvectionDiffusionSettings<T>) -> Self {
        Self {
            stabilization: settings.stabilization,
            cinv: settings.cinv,
            order: settings.order,
            properties: settings.properties,
            mode: SolutionMode::default(),
            advection: None,
            reaction: None,
            source: None,
            flux: None,
            element_tau: None,
        }
    }

    pub fn settings(&self) -> AdvectionDiffusionSettings<T> {
        AdvectionDiffusionSettings {
            stabilization: self.stabilization,
            cinv: self.cinv,
            order: self.order,
            properties: self.properties,
        }
    }

    pub fn stabilization(&self) -> Stabilization {
        self.stabilization
    }

    pub fn set_stabilization(&mut self, stabilization: Stabilization) {
        self.stabilization = stabilization;
    }

    pub fn cinv(&self) -> T {
        self.cinv
    }

    pub fn set_cinv(&mut self, cinv: T) {
        self.cinv = cinv;
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// # Panics
    ///
    /// Panics if `order` is zero.
    pub fn set_order(&mut self, order: usize) {
        assert!(order >= 1, "Basis order must be at least 1");
        self.order = order;
    }

    pub fn properties(&self) -> &FluidProperties<T> {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut FluidProperties<T> {
        &mut self.properties
    }

    pub fn mode(&self) -> SolutionMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SolutionMode) {
        self.mode = mode;
    }

    pub fn set_advection_field(&mut self, advection: VectorField<'a, T, D>) {
        self.advection = Some(advection);
    }

    pub fn set_reaction_field(&mut self, reaction: ScalarField<'a, T, D>) {
        self.reaction = Some(reaction);
    }

    pub fn set_source(&mut self, source: ScalarField<'a, T, D>) {
        self.source = Some(source);
    }

    pub fn set_flux(&mut self, flux: ScalarField<'a, T, D>) {
        self.flux = Some(flux);
    }

    /// Attaches the buffer that finalized elements write their stabilization parameter into.
    pub fn set_element_tau(&mut self, element_tau: &'a ElementTau<T>) {
        self.element_tau = Some(element_tau);
    }

    /// The stabilization parameter stored for the given element, or zero if there is none.
    pub fn element_tau(&self, element_index: usize) -> T {
        self.element_tau
            .map(|taus| taus.get(element_index))
            .unwrap_or_else(T::zero)
    }

    /// The scaled advection velocity $\vec U(\vec x)$, zero if no advection field is set.
    pub fn advection_velocity(&self, x: &OPoint<T, D>) -> OVector<T, D> {
        self.advection
            .map(|field| field(x) * self.properties.advection_constant)
            .unwrap_or_else(OVector::zeros)
    }

    /// The scaled reaction coefficient $r(\vec x)$, zero if no reaction field is set.
    pub fn reaction_coefficient(&self, x: &OPoint<T, D>) -> T {
        self.reaction
            .map(|field| field(x) * self.properties.reaction_constant)
            .unwrap_or_else(T::zero)
    }

    /// The scaled source $f(\vec x)$, zero if no source is set.
    pub fn source_term(&self, x: &OPoint<T, D>) -> T {
        self.source
            .map(|field| field(x) * self.properties.source_constant)
            .unwrap_or_else(T::zero)
    }

    /// Evaluates the secondary solution $\nabla u_h$ at the given point.
    ///
    /// # Panics
    ///
    /// Panics if the length of `u_element` does not match the number of nodes of the point.
    pub fn evaluate_solution_gradient(&self, point: &FiniteElementPoint<T, D>, u_element: &DVector<T>) -> OVector<T, D> {
        assert_eq!(u_element.len(), point.num_nodes(), "Element solution dimension mismatch");
        point.interpolate_gradient(u_element)
    }
}

#[derive(Debug)]
struct AdvectionDiffusionWorkspace<T: Real> {
    advection: DVector<T>,
    residual: DVector<T>,
    test: DVector<T>,
}

impl<T: Real> Default for AdvectionDiffusionWorkspace<T> {
    fn default() -> Self {
        Self {
            advection: DVector::zeros(0),
            residual: DVector::zeros(0),
            test: DVector::zeros(0),
        }
    }
}

define_thread_local_workspace!(WORKSPACE);

impl<'a, T, D> Integrand<T, D> for AdvectionDiffusion<'a, T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    type LocalState = ElementInfo<T, D>;

    fn requirements(&self) -> IntegrandRequirements {
        if self.stabilization.is_stabilized() {
            IntegrandRequirements {
                second_derivatives: self.order > 1,
                element_corners: true,
                normals: false,
            }
        } else {
            IntegrandRequirements::STANDARD
        }
    }

    fn create_local_state(&self, element_index: usize, element_nodes: &[usize], kind: ElementKind) -> ElementInfo<T, D> {
        let with_matrix = kind == ElementKind::Interior && self.mode.assembles_matrix();
        let stabilized = kind == ElementKind::Interior && self.stabilization.is_stabilized();
        ElementInfo::new(element_index, element_nodes.len(), kind, with_matrix, stabilized)
    }

    #[allow(non_snake_case)]
    fn evaluate_interior(&self, state: &mut ElementInfo<T, D>, point: &FiniteElementPoint<T, D>) -> eyre::Result<()> {
        let n = point.num_nodes();
        assert_eq!(n, state.num_nodes(), "Number of basis functions must match element node count");

        if self.stabilization.is_stabilized() && self.advection.is_none() {
            error!(
                "Element {}: {:?} stabilization requires an advection field",
                state.element_index, self.stabilization
            );
            bail!("No advection field set for {:?} stabilization", self.stabilization);
        }
        if self.stabilization.is_stabilized() && state.element_size == T::zero() && point.corners.is_empty() {
            error!(
                "Element {}: {:?} stabilization requires element corners or an explicit element size",
                state.element_index, self.stabilization
            );
            bail!("No element size available for {:?} stabilization", self.stabilization);
        }

        let x = &point.position;
        let w = point.weight;
        let kappa = self.properties.diffusivity;
        let U = self.advection_velocity(x);
        let r = self.reaction_coefficient(x);
        let f = self.source_term(x);
        let phi = point.basis_values;
        let phi_grad = point.basis_gradients;

        with_thread_local_workspace(&WORKSPACE, |ws: &mut AdvectionDiffusionWorkspace<T>| {
            // Streamline derivatives U . grad phi_j
            ws.advection.resize_vertically_mut(n, T::zero());
            phi_grad.tr_mul_to(&U, &mut ws.advection);

            if let Some(matrix) = state.galerkin.matrix_mut() {
                matrix.gemm_tr(w * kappa, phi_grad, phi_grad, T::one());
                matrix.ger(w, phi, &ws.advection, T::one());
                matrix.ger(w * r, phi, phi, T::one());
            }
            if let Some(vector) = state.galerkin.vector_mut() {
                vector.axpy(w * f, phi, T::one());
            }

            if !self.stabilization.is_stabilized() {
                return;
            }

            // L phi_j = U . grad phi_j - kappa lap phi_j + r phi_j
            ws.residual.resize_vertically_mut(n, T::zero());
            ws.test.resize_vertically_mut(n, T::zero());
            let nodes = izip!(0..n, ws.residual.iter_mut(), ws.test.iter_mut(), ws.advection.iter(), phi.iter());
            for (j, residual_j, test_j, &advection_j, &phi_j) in nodes {
                let diffusion_j = kappa * point.laplacian(j);
                let reaction_j = r * phi_j;
                *residual_j = advection_j - diffusion_j + reaction_j;
                *test_j = match self.stabilization {
                    Stabilization::Supg => advection_j,
                    Stabilization::Gls => advection_j - diffusion_j + reaction_j,
                    // Adjoint operator -L^*, i.e. GLS plus the fine-scale correction 2 (kappa lap - r)
                    Stabilization::Ms => advection_j + diffusion_j - reaction_j,
                    Stabilization::None => T::zero(),
                };
            }

            if let Some(stabilized) = state.stabilized_matrix.as_mut() {
                stabilized.ger(w, &ws.test, &ws.residual, T::one());
            }
            if let Some(stabilized) = state.stabilized_vector.as_mut() {
                stabilized.axpy(w * f, &ws.test, T::one());
            }
        });

        if self.stabilization.is_stabilized() {
            state.velocity.accumulate(&U, w);
            if state.element_size == T::zero() && !point.corners.is_empty() {
                state.element_size = diameter(point.corners);
            }
        }

        Ok(())
    }

    fn evaluate_boundary(
        &self,
        state: &mut ElementInfo<T, D>,
        point: &FiniteElementPoint<T, D>,
        _normal: &OVector<T, D>,
    ) -> eyre::Result<()> {
        let n = point.num_nodes();
        assert_eq!(n, state.num_nodes(), "Number of basis functions must match element node count");
        let Some(flux) = self.flux else {
            error!("Element {}: no flux field set for boundary integration", state.element_index);
            bail!("No flux field set for boundary integration");
        };

        if let Some(vector) = state.galerkin.vector_mut() {
            let g = flux(&point.position);
            vector.axpy(point.weight * g, point.basis_values, T::one());
        }
        Ok(())
    }

    fn finalize_element(&self, state: &mut ElementInfo<T, D>) -> eyre::Result<()> {
        if state.kind != ElementKind::Interior || !self.stabilization.is_stabilized() {
            return Ok(());
        }

        let tau = state.compute_tau(self.properties.diffusivity, self.cinv, self.order);
        debug!("Element {}: tau = {}", state.element_index, tau);
        state.apply_stabilization(tau);

        match self.element_tau {
            Some(taus) => taus.store(state.element_index, tau),
            None => debug!(
                "Element {}: no element tau buffer attached, tau is not stored",
                state.element_index
            ),
        }
        Ok(())
    }
}

impl<'a, T, D> NamedQuantities for AdvectionDiffusion<'a, T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    /// The primary solution $u$ (group 1) and its gradient (group 2).
    fn num_groups(&self) -> usize {
        2
    }

    fn group_size(&self, group: usize) -> usize {
        match group {
            1 => 1,
            2 => D::dim(),
            _ => 0,
        }
    }

    fn quantity_name(&self, group: usize, index: usize, prefix: Option<&str>) -> String {
        match group {
            1 => {
                assert_eq!(index, 0, "The primary solution has a single component");
                prefixed_name(prefix, "u")
            }
            2 => prefixed_name(prefix, &format!("u_{}", component_suffix::<D>(index))),
            _ => panic!("Field group {} does not exist", group),
        }
    }
}
