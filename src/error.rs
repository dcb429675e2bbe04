//! Energy norms, error norms and residual-based error estimates.
//!
//! The norms are integrated element by element with the same driver protocol as the assembly
//! integrands in [`assembly::local`](crate::assembly::local), so [`AdvectionDiffusionNorm`]
//! implements [`Integrand`]. All values are accumulated *squared* and stored in
//! [`ElementNorms`]. The norm pass must run after the assembly pass, since the residual estimate
//! reuses the stabilization parameter $\tau$ stored by the assembly finalizer.
use crate::allocators::DimAllocator;
use crate::assembly::local::{
    prefixed_name, AdvectionDiffusion, ElementKind, FiniteElementPoint, Integrand, IntegrandRequirements,
    NamedQuantities,
};
use crate::fields::AnalyticalSolution;
use crate::nalgebra::{DVector, DefaultAllocator, OVector};
use crate::util::extract_by_node_index;
use crate::{Real, SmallDim};
use itertools::izip;

/// $|||u_h|||^2$.
pub const ENERGY: usize = 0;
/// $\norm{u_h}^2_{L^2}$.
pub const L2: usize = 1;
/// $\norm{R(u_h)}^2_\tau$.
pub const RESIDUAL_ESTIMATE: usize = 2;
/// $|||u|||^2$.
pub const EXACT_ENERGY: usize = 3;
/// $|||u - u_h|||^2$.
pub const ERROR_ENERGY: usize = 4;
/// $\norm{u - u_h}^2_{L^2}$.
pub const ERROR_L2: usize = 5;
/// The effectivity index of the residual estimate.
pub const EFFECTIVITY: usize = 6;

const NUMERICAL_NORM_NAMES: [&str; 3] = ["a(u^h,u^h)^0.5", "(u^h,u^h)^0.5", "|R(u^h)|_tau"];
const ANALYTICAL_NORM_NAMES: [&str; 4] = [
    "a(u,u)^0.5",
    "a(e,e)^0.5, e=u-u^h",
    "(e,e)^0.5, e=u-u^h",
    "effectivity index",
];

/// Computes the effectivity index $\eta / \norm{e}$ of an error estimate.
///
/// If both the estimate and the true error are negligible, the estimate is considered exact and
/// the index is one.
pub fn effectivity_index<T: Real>(estimate: T, error: T) -> T {
    let tolerance = T::default_epsilon().sqrt();
    if estimate <= tolerance && error <= tolerance {
        T::one()
    } else {
        estimate / error
    }
}

/// Norm values integrated over a single element.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementNorms<T: Real> {
    element_index: usize,
    u_element: DVector<T>,
    values: DVector<T>,
}

impl<T: Real> ElementNorms<T> {
    pub fn element_index(&self) -> usize {
        self.element_index
    }

    /// The element-local weights of the numerical solution.
    pub fn u_element(&self) -> &DVector<T> {
        &self.u_element
    }

    /// The raw values, indexed by [`ENERGY`], [`L2`] and so on. Norms are stored squared.
    pub fn values(&self) -> &DVector<T> {
        &self.values
    }

    pub fn has_analytical_norms(&self) -> bool {
        self.values.len() > RESIDUAL_ESTIMATE + 1
    }

    /// The norm with the given group and index, as named by
    /// [`NamedQuantities::quantity_name`].
    ///
    /// # Panics
    ///
    /// Panics if the group or index does not exist for these norms.
    pub fn norm(&self, group: usize, index: usize) -> T {
        let offset = match group {
            1 => {
                assert!(index < NUMERICAL_NORM_NAMES.len(), "Norm index {} out of bounds", index);
                0
            }
            2 => {
                assert!(self.has_analytical_norms(), "No analytical norms were computed");
                assert!(index < ANALYTICAL_NORM_NAMES.len(), "Norm index {} out of bounds", index);
                EXACT_ENERGY
            }
            _ => panic!("Norm group {} does not exist", group),
        };
        value_to_norm(offset + index, self.values[offset + index])
    }
}

fn value_to_norm<T: Real>(value_index: usize, value: T) -> T {
    if value_index == EFFECTIVITY {
        value
    } else {
        value.max(T::zero()).sqrt()
    }
}

/// Sums element norms into global norms, in the same layout as [`ElementNorms::values`].
///
/// The global effectivity index is computed from the summed estimate and error rather than
/// summed. Returns `None` if the iterator is empty.
pub fn accumulate_norms<'b, T: Real>(element_norms: impl IntoIterator<Item = &'b ElementNorms<T>>) -> Option<DVector<T>> {
    let mut global: Option<DVector<T>> = None;
    for norms in element_norms {
        match global.as_mut() {
            Some(global) => {
                assert_eq!(global.len(), norms.values.len(), "All element norms must have the same layout");
                *global += &norms.values;
            }
            None => global = Some(norms.values.clone()),
        }
    }
    global.map(|mut global| {
        if global.len() > EFFECTIVITY {
            global[EFFECTIVITY] = effectivity_index(global[RESIDUAL_ESTIMATE].sqrt(), global[ERROR_ENERGY].sqrt());
        }
        global
    })
}

/// Integrand for norms of the advection-diffusion-reaction solution.
///
/// With the energy norm
/// $$ |||v|||^2 = \int \kappa |\nabla v|^2 + r v^2 + \tau (\vec U \cdot \nabla v)^2 \d{\vec x}, $$
/// computes $|||u_h|||^2$, $\norm{u_h}^2_{L^2}$ and the residual estimate
/// $\tau \norm{f - \vec U \cdot \nabla u_h + \kappa \Delta u_h - r u_h}^2_{L^2}$ and, given an analytical
/// solution $u$, also $|||u|||^2$, $|||e|||^2$ and $\norm{e}^2_{L^2}$ with $e = u_h - u$, together with the
/// effectivity index of the residual estimate.
pub struct AdvectionDiffusionNorm<'a, T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    problem: &'a AdvectionDiffusion<'a, T, D>,
    u_h: &'a DVector<T>,
    analytical: Option<AnalyticalSolution<'a, T, D>>,
}

impl<'a, T, D> AdvectionDiffusionNorm<'a, T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    /// Creates a norm integrand for the global solution vector `u_h` of the given problem.
    pub fn new(problem: &'a AdvectionDiffusion<'a, T, D>, u_h: &'a DVector<T>) -> Self {
        Self {
            problem,
            u_h,
            analytical: None,
        }
    }

    pub fn with_analytical_solution(self, analytical: AnalyticalSolution<'a, T, D>) -> Self {
        Self {
            analytical: Some(analytical),
            ..self
        }
    }

    pub fn has_analytical_solution(&self) -> bool {
        self.analytical.is_some()
    }

    /// The number of values in each [`ElementNorms`].
    pub fn num_values(&self) -> usize {
        if self.has_analytical_solution() {
            EFFECTIVITY + 1
        } else {
            RESIDUAL_ESTIMATE + 1
        }
    }

    /// Computes the squared energy norm density at a point.
    #[allow(non_snake_case)]
    fn energy_density(&self, kappa: T, U: &OVector<T, D>, r: T, tau: T, v: T, v_grad: &OVector<T, D>) -> T {
        let streamline = U.dot(v_grad);
        kappa * v_grad.norm_squared() + r * v * v + tau * streamline * streamline
    }
}

impl<'a, T, D> Integrand<T, D> for AdvectionDiffusionNorm<'a, T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    type LocalState = ElementNorms<T>;

    fn requirements(&self) -> IntegrandRequirements {
        IntegrandRequirements {
            second_derivatives: self.problem.order() > 1,
            ..IntegrandRequirements::STANDARD
        }
    }

    /// # Panics
    ///
    /// Panics if a node index is out of bounds for the global solution vector.
    fn create_local_state(&self, element_index: usize, element_nodes: &[usize], _kind: ElementKind) -> ElementNorms<T> {
        ElementNorms {
            element_index,
            u_element: extract_by_node_index(self.u_h, element_nodes),
            values: DVector::zeros(self.num_values()),
        }
    }

    #[allow(non_snake_case)]
    fn evaluate_interior(&self, state: &mut ElementNorms<T>, point: &FiniteElementPoint<T, D>) -> eyre::Result<()> {
        assert_eq!(
            point.num_nodes(),
            state.u_element.len(),
            "Number of basis functions must match element node count"
        );

        let x = &point.position;
        let w = point.weight;
        let kappa = self.problem.properties().diffusivity;
        let U = self.problem.advection_velocity(x);
        let r = self.problem.reaction_coefficient(x);
        let f = self.problem.source_term(x);
        let tau = self.problem.element_tau(state.element_index);

        let u_h = point.interpolate(&state.u_element);
        let u_h_grad = point.interpolate_gradient(&state.u_element);
        let u_h_laplacian = point.interpolate_laplacian(&state.u_element);

        let residual = f - U.dot(&u_h_grad) + kappa * u_h_laplacian - r * u_h;
        let numerical = [
            self.energy_density(kappa, &U, r, tau, u_h, &u_h_grad),
            u_h * u_h,
            tau * residual * residual,
        ];
        for (value, density) in izip!(state.values.iter_mut(), numerical) {
            *value += w * density;
        }

        if let Some(analytical) = &self.analytical {
            let u = (analytical.value)(x);
            let u_grad = (analytical.gradient)(x);
            let e = u_h - u;
            let e_grad = &u_h_grad - &u_grad;
            state.values[EXACT_ENERGY] += w * self.energy_density(kappa, &U, r, tau, u, &u_grad);
            state.values[ERROR_ENERGY] += w * self.energy_density(kappa, &U, r, tau, e, &e_grad);
            state.values[ERROR_L2] += w * e * e;
        }
        Ok(())
    }

    /// Computes the element effectivity index from the accumulated estimate and error.
    fn finalize_element(&self, state: &mut ElementNorms<T>) -> eyre::Result<()> {
        if state.has_analytical_norms() {
            let estimate = state.values[RESIDUAL_ESTIMATE].sqrt();
            let error = state.values[ERROR_ENERGY].sqrt();
            state.values[EFFECTIVITY] = effectivity_index(estimate, error);
        }
        Ok(())
    }
}

impl<'a, T, D> NamedQuantities for AdvectionDiffusionNorm<'a, T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn num_groups(&self) -> usize {
        if self.has_analytical_solution() {
            2
        } else {
            1
        }
    }

    fn group_size(&self, group: usize) -> usize {
        match group {
            1 => NUMERICAL_NORM_NAMES.len(),
            2 if self.has_analytical_solution() => ANALYTICAL_NORM_NAMES.len(),
            _ => 0,
        }
    }

    fn quantity_name(&self, group: usize, index: usize, prefix: Option<&str>) -> String {
        let name = match group {
            1 => NUMERICAL_NORM_NAMES.get(index),
            2 if self.has_analytical_solution() => ANALYTICAL_NORM_NAMES.get(index),
            _ => panic!("Norm group {} does not exist", group),
        };
        let name = name.unwrap_or_else(|| panic!("Norm index {} out of bounds for group {}", index, group));
        prefixed_name(prefix, name)
    }
}
