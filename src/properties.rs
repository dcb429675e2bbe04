//! Physical parameters and serializable integrand settings.
use crate::stabilization::Stabilization;
use crate::Real;
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};

/// Physical properties of the transported quantity and the carrier fluid.
///
/// Besides the diffusivity $\kappa$, the properties carry scaling constants for the advection,
/// reaction and source terms, so that non-dimensionalized problems can reuse the same
/// fields. With all constants equal to one, the strong form reads
/// $$ \vec U \cdot \nabla u - \nabla \cdot (\kappa \nabla u) + r u = f. $$
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, bound(deserialize = "T: Real + Deserialize<'de>"))]
pub struct FluidProperties<T> {
    pub diffusivity: T,
    pub advection_constant: T,
    pub reaction_constant: T,
    pub source_constant: T,
}

impl<T> Default for FluidProperties<T>
where
    T: Real,
{
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn default() -> Self {
        Self {
            diffusivity: 1.0,
            advection_constant: 1.0,
            reaction_constant: 1.0,
            source_constant: 1.0,
        }
    }
}

/// Settings for [`AdvectionDiffusion`](crate::assembly::local::AdvectionDiffusion).
///
/// Fields are borrowed from the caller and are therefore not part of the settings.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, bound(deserialize = "T: Real + Deserialize<'de>"))]
pub struct AdvectionDiffusionSettings<T> {
    pub stabilization: Stabilization,
    /// Inverse-estimate constant used in the stabilization parameter.
    pub cinv: T,
    /// Polynomial order of the basis.
    pub order: usize,
    pub properties: FluidProperties<T>,
}

impl<T> Default for AdvectionDiffusionSettings<T>
where
    T: Real,
{
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn default() -> Self {
        Self {
            stabilization: Stabilization::None,
            cinv: 5.0,
            order: 1,
            properties: FluidProperties::default(),
        }
    }
}

/// Settings for [`WeakDirichlet`](crate::assembly::local::WeakDirichlet).
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, bound(deserialize = "T: Real + Deserialize<'de>"))]
pub struct WeakDirichletSettings<T> {
    /// Penalty constant $C_{BI}$.
    pub cbi: T,
    /// Adjoint factor $\gamma$. One gives the symmetric Nitsche form, zero the non-symmetric one.
    pub gamma: T,
    pub properties: FluidProperties<T>,
}

impl<T> Default for WeakDirichletSettings<T>
where
    T: Real,
{
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn default() -> Self {
        Self {
            cbi: 4.0,
            gamma: 1.0,
            properties: FluidProperties::default(),
        }
    }
}
