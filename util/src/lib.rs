//! Test helpers: owned quadrature point data for simple reference elements.
use nalgebra::{DVector, DefaultAllocator, Dyn, Matrix2, OMatrix, OPoint, OVector, Point1, Point2, Vector1, U1, U2};
use transport_fem::allocators::DimAllocator;
use transport_fem::assembly::local::{ElementKind, FiniteElementPoint, Integrand};
use transport_fem::SmallDim;

/// Poor man's approx assertion for matrices
#[macro_export]
macro_rules! assert_approx_matrix_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let diff = $x - $y;

        let max_absdiff = diff.abs().max();
        let approx_eq = max_absdiff <= $tol;

        if !approx_eq {
            println!("abstol: {:e}", $tol);
            println!("left: {}", $x);
            println!("right: {}", $y);
            println!("diff: {:e}", diff);
        }
        assert!(approx_eq);
    }};
}

#[macro_export]
macro_rules! assert_panics {
    ($e:expr) => {{
        use std::panic::catch_unwind;
        use std::stringify;
        let expr_string = stringify!($e);
        let result = catch_unwind(|| $e);
        if result.is_ok() {
            panic!("assert_panics!({}) failed.", expr_string);
        }
    }};
}

/// Owned data for a single quadrature point, from which a [`FiniteElementPoint`] can be borrowed.
#[derive(Debug, Clone)]
pub struct PointData<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    pub element_index: usize,
    pub basis_values: DVector<f64>,
    pub basis_gradients: OMatrix<f64, D, Dyn>,
    pub basis_laplacians: Option<DVector<f64>>,
    pub weight: f64,
    pub position: OPoint<f64, D>,
    pub corners: Vec<OPoint<f64, D>>,
    /// Outward unit normal, for boundary points only.
    pub normal: Option<OVector<f64, D>>,
}

impl<D> PointData<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    pub fn as_point(&self) -> FiniteElementPoint<'_, f64, D> {
        FiniteElementPoint {
            element_index: self.element_index,
            basis_values: &self.basis_values,
            basis_gradients: &self.basis_gradients,
            basis_laplacians: self.basis_laplacians.as_ref(),
            weight: self.weight,
            position: self.position.clone(),
            corners: &self.corners,
        }
    }

    /// # Panics
    ///
    /// Panics if the point has no normal.
    pub fn normal(&self) -> &OVector<f64, D> {
        self.normal.as_ref().expect("Boundary point must have a normal")
    }
}

/// Gauss-Legendre points and weights on $[-1, 1]$.
///
/// # Panics
///
/// Panics unless `num_points` is 1, 2 or 3.
pub fn gauss_legendre(num_points: usize) -> Vec<(f64, f64)> {
    match num_points {
        1 => vec![(2.0, 0.0)],
        2 => {
            let x = 1.0 / 3.0f64.sqrt();
            vec![(1.0, -x), (1.0, x)]
        }
        3 => {
            let x = (3.0f64 / 5.0).sqrt();
            vec![(5.0 / 9.0, -x), (8.0 / 9.0, 0.0), (5.0 / 9.0, x)]
        }
        _ => panic!("Unsupported number of Gauss points: {}", num_points),
    }
}

/// Interior quadrature points of the linear segment $[a, b]$.
pub fn segment2_interior_points(element_index: usize, a: f64, b: f64, num_points: usize) -> Vec<PointData<U1>> {
    let length = b - a;
    gauss_legendre(num_points)
        .into_iter()
        .map(|(w, xi)| PointData {
            element_index,
            basis_values: DVector::from_column_slice(&[0.5 * (1.0 - xi), 0.5 * (1.0 + xi)]),
            basis_gradients: OMatrix::<f64, U1, Dyn>::from_row_slice(&[-1.0 / length, 1.0 / length]),
            basis_laplacians: None,
            weight: 0.5 * w * length,
            position: Point1::new(a + 0.5 * (xi + 1.0) * length),
            corners: vec![Point1::new(a), Point1::new(b)],
            normal: None,
        })
        .collect()
}

/// Interior quadrature points of the quadratic segment $[a, b]$ with nodes $a$, $b$ and the midpoint,
/// including basis Laplacians.
pub fn segment3_interior_points(element_index: usize, a: f64, b: f64, num_points: usize) -> Vec<PointData<U1>> {
    let length = b - a;
    let dxi_dx = 2.0 / length;
    gauss_legendre(num_points)
        .into_iter()
        .map(|(w, xi)| {
            let values = [0.5 * xi * (xi - 1.0), 0.5 * xi * (xi + 1.0), 1.0 - xi * xi];
            let gradients = [(xi - 0.5) * dxi_dx, (xi + 0.5) * dxi_dx, -2.0 * xi * dxi_dx];
            let laplacians = [dxi_dx * dxi_dx, dxi_dx * dxi_dx, -2.0 * dxi_dx * dxi_dx];
            PointData {
                element_index,
                basis_values: DVector::from_column_slice(&values),
                basis_gradients: OMatrix::<f64, U1, Dyn>::from_row_slice(&gradients),
                basis_laplacians: Some(DVector::from_column_slice(&laplacians)),
                weight: 0.5 * w * length,
                position: Point1::new(a + 0.5 * (xi + 1.0) * length),
                corners: vec![Point1::new(a), Point1::new(b)],
                normal: None,
            }
        })
        .collect()
}

/// The boundary point at one end of the linear segment $[a, b]$: `end = 0` is $a$ with normal
/// $-1$ and `end = 1` is $b$ with normal $+1$.
///
/// # Panics
///
/// Panics if `end` is neither 0 nor 1.
pub fn segment2_boundary_point(element_index: usize, a: f64, b: f64, end: usize) -> PointData<U1> {
    let length = b - a;
    let (values, x, n) = match end {
        0 => ([1.0, 0.0], a, -1.0),
        1 => ([0.0, 1.0], b, 1.0),
        _ => panic!("Segment end must be 0 or 1"),
    };
    PointData {
        element_index,
        basis_values: DVector::from_column_slice(&values),
        basis_gradients: OMatrix::<f64, U1, Dyn>::from_row_slice(&[-1.0 / length, 1.0 / length]),
        basis_laplacians: None,
        weight: 1.0,
        position: Point1::new(x),
        corners: vec![Point1::new(a), Point1::new(b)],
        normal: Some(Vector1::new(n)),
    }
}

/// Interior quadrature points of the linear triangle with the given corners, using the
/// three-point rule that integrates quadratics exactly.
///
/// # Panics
///
/// Panics if the triangle is degenerate.
pub fn tri3_interior_points(element_index: usize, corners: [Point2<f64>; 3]) -> Vec<PointData<U2>> {
    let [x0, x1, x2] = corners;
    let jacobian = Matrix2::from_columns(&[x1 - x0, x2 - x0]);
    let area = 0.5 * jacobian.determinant().abs();
    let j_inv = jacobian
        .try_inverse()
        .expect("Triangle must not be degenerate");
    let grad1 = j_inv.row(0).transpose();
    let grad2 = j_inv.row(1).transpose();
    let grad0 = -(&grad1 + &grad2);
    let gradients = OMatrix::<f64, U2, Dyn>::from_columns(&[grad0, grad1, grad2]);

    let barycentric = [
        [2.0 / 3.0, 1.0 / 6.0, 1.0 / 6.0],
        [1.0 / 6.0, 2.0 / 3.0, 1.0 / 6.0],
        [1.0 / 6.0, 1.0 / 6.0, 2.0 / 3.0],
    ];
    barycentric
        .iter()
        .map(|lambda| PointData {
            element_index,
            basis_values: DVector::from_column_slice(lambda),
            basis_gradients: gradients.clone(),
            basis_laplacians: None,
            weight: area / 3.0,
            position: Point2::from(x0.coords * lambda[0] + x1.coords * lambda[1] + x2.coords * lambda[2]),
            corners: corners.to_vec(),
            normal: None,
        })
        .collect()
}

/// A uniform 1D mesh of `num_elements` linear segments on $[a, b]$, returned as the list of
/// vertex coordinates.
pub fn uniform_vertices(a: f64, b: f64, num_elements: usize) -> Vec<f64> {
    let h = (b - a) / num_elements as f64;
    (0..=num_elements).map(|i| a + i as f64 * h).collect()
}

/// Runs the interior part of the element protocol: creates a local state, evaluates all points
/// and finalizes the state.
pub fn integrate_interior<D, I>(
    integrand: &I,
    element_index: usize,
    element_nodes: &[usize],
    points: &[PointData<D>],
) -> eyre::Result<I::LocalState>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
    I: Integrand<f64, D>,
{
    let mut state = integrand.create_local_state(element_index, element_nodes, ElementKind::Interior);
    for point in points {
        integrand.evaluate_interior(&mut state, &point.as_point())?;
    }
    integrand.finalize_element(&mut state)?;
    Ok(state)
}

/// Runs the boundary part of the element protocol on the given boundary points.
///
/// # Panics
///
/// Panics if a point has no normal.
pub fn integrate_boundary<D, I>(
    integrand: &I,
    element_index: usize,
    element_nodes: &[usize],
    points: &[PointData<D>],
) -> eyre::Result<I::LocalState>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
    I: Integrand<f64, D>,
{
    let mut state = integrand.create_local_state(element_index, element_nodes, ElementKind::Boundary);
    for point in points {
        integrand.evaluate_boundary(&mut state, &point.as_point(), point.normal())?;
    }
    integrand.finalize_element(&mut state)?;
    Ok(state)
}
