//! Residual-based stabilization: the stabilization parameter $\tau$ and its per-element storage.
use crate::allocators::DimAllocator;
use crate::nalgebra::{DefaultAllocator, OVector};
use crate::{Real, SmallDim};
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

/// The stabilization method applied to the Galerkin weak form.
///
/// With the residual operator $\mathcal{L} v = \vec U \cdot \nabla v - \kappa \Delta v + r v$,
/// each method adds $\sum_K \tau_K (\mathcal{T} \varphi_i, \mathcal{L} \varphi_j)_K$ to the element
/// matrix, where the test operator $\mathcal{T}$ is
///
/// - [`Supg`](Stabilization::Supg): $\mathcal{T} v = \vec U \cdot \nabla v$,
/// - [`Gls`](Stabilization::Gls): $\mathcal{T} v = \mathcal{L} v$,
/// - [`Ms`](Stabilization::Ms): $\mathcal{T} v = -\mathcal{L}^* v = \vec U \cdot \nabla v + \kappa \Delta v - r v$.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Stabilization {
    #[default]
    None,
    Supg,
    Gls,
    Ms,
}

impl Stabilization {
    pub fn is_stabilized(&self) -> bool {
        !matches!(self, Stabilization::None)
    }
}

/// Computes the stabilization parameter
/// $$
/// \tau = \left( C_1 \left(\frac{2 |\vec U|}{h_K}\right)^2
///             + C_2 C_{inv} \\, p^4 \left(\frac{\kappa}{h_K^2}\right)^2 \right)^{-1/2}
/// $$
/// with $C_1 = C_2 = 1$, where the inverse-estimate constant $C_{inv}$ carries the
/// calibration of the diffusive limit.
///
/// The element size is clamped from below by machine epsilon. If both the speed and the
/// diffusivity vanish, $\tau = 0$.
#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
pub fn compute_tau<T: Real>(speed: T, element_size: T, diffusivity: T, cinv: T, order: usize) -> T {
    let h = element_size.max(T::default_epsilon());
    let p = T::from_usize(order).expect("order must fit in T");
    let advective = 2.0 * speed / h;
    let diffusive = diffusivity / (h * h);
    let denominator = advective * advective + cinv * p.powi(4) * diffusive * diffusive;
    if denominator > 0.0 {
        1.0 / denominator.sqrt()
    } else {
        0.0
    }
}

/// Accumulates $\int_K \vec U \d{\vec x}$ and $|K|$ over the interior points of an element.
#[derive(Debug, Clone, PartialEq)]
pub struct VelocityAccumulator<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    velocity_integral: OVector<T, D>,
    measure: T,
}

impl<T, D> Default for VelocityAccumulator<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn default() -> Self {
        Self {
            velocity_integral: OVector::zeros(),
            measure: T::zero(),
        }
    }
}

impl<T, D> VelocityAccumulator<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    pub fn accumulate(&mut self, velocity: &OVector<T, D>, weight: T) {
        self.velocity_integral.axpy(weight, velocity, T::one());
        self.measure += weight;
    }

    pub fn measure(&self) -> T {
        self.measure
    }

    /// The element-averaged velocity, or zero if nothing has been accumulated.
    pub fn mean_velocity(&self) -> OVector<T, D> {
        if self.measure > T::zero() {
            &self.velocity_integral / self.measure
        } else {
            OVector::zeros()
        }
    }
}

/// Stabilization parameters stored per element, indexed by global element index.
///
/// The buffer is owned by the caller. It is sized once through
/// [`declare_element_count`](Self::declare_element_count), written by the element finalizer and
/// read back during norm integration. Each element writes only its own entry, so writes go
/// through a shared reference and elements may be finalized concurrently without locking.
///
/// Values are stored as `f64` bit patterns.
#[derive(Debug, Default)]
pub struct ElementTau<T> {
    values: Vec<AtomicU64>,
    marker: PhantomData<fn() -> T>,
}

impl<T: Real> ElementTau<T> {
    pub fn with_element_count(num_elements: usize) -> Self {
        let mut taus = Self {
            values: Vec::new(),
            marker: PhantomData,
        };
        taus.declare_element_count(num_elements);
        taus
    }

    /// Declares the global number of elements. All stored values are reset to zero.
    pub fn declare_element_count(&mut self, num_elements: usize) {
        self.values.clear();
        self.values
            .resize_with(num_elements, || AtomicU64::new(0.0f64.to_bits()));
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Stores the stabilization parameter of the given element.
    ///
    /// # Panics
    ///
    /// Panics if `element_index` is not smaller than the declared element count.
    pub fn store(&self, element_index: usize, tau: T) {
        assert!(
            element_index < self.values.len(),
            "Element index {} out of bounds: only {} elements declared",
            element_index,
            self.values.len()
        );
        let tau: f64 = nalgebra::try_convert(tau).expect("tau must be representable as f64");
        self.values[element_index].store(tau.to_bits(), Ordering::Relaxed);
    }

    /// Returns the stored stabilization parameter, or zero if the index is out of range.
    pub fn get(&self, element_index: usize) -> T {
        self.values
            .get(element_index)
            .map(|bits| nalgebra::convert(f64::from_bits(bits.load(Ordering::Relaxed))))
            .unwrap_or_else(T::zero)
    }

    pub fn to_vec(&self) -> Vec<T> {
        (0..self.len()).map(|i| self.get(i)).collect()
    }
}
