use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector, Point1, Vector1, U1};
use std::f64::consts::PI;
use transport_fem::assembly::local::{AdvectionDiffusion, ElementMatrices, WeakDirichlet};
use transport_fem::error::{accumulate_norms, AdvectionDiffusionNorm, EFFECTIVITY, ERROR_ENERGY, ERROR_L2};
use transport_fem::fields::AnalyticalSolution;
use transport_fem::stabilization::{ElementTau, Stabilization};
use util::{integrate_boundary, integrate_interior, segment2_boundary_point, segment2_interior_points, uniform_vertices};

fn scatter(matrix: &mut DMatrix<f64>, rhs: &mut DVector<f64>, nodes: &[usize], element: ElementMatrices<f64>) {
    let (element_matrix, element_vector) = element.into_parts();
    if let Some(element_matrix) = element_matrix {
        for (i_local, &i) in nodes.iter().enumerate() {
            for (j_local, &j) in nodes.iter().enumerate() {
                matrix[(i, j)] += element_matrix[(i_local, j_local)];
            }
        }
    }
    if let Some(element_vector) = element_vector {
        for (i_local, &i) in nodes.iter().enumerate() {
            rhs[i] += element_vector[i_local];
        }
    }
}

fn assemble(problem: &AdvectionDiffusion<f64, U1>, vertices: &[f64]) -> (DMatrix<f64>, DVector<f64>) {
    let n = vertices.len();
    let mut matrix = DMatrix::zeros(n, n);
    let mut rhs = DVector::zeros(n);
    for (e, segment) in vertices.windows(2).enumerate() {
        let nodes = [e, e + 1];
        let points = segment2_interior_points(e, segment[0], segment[1], 3);
        let state = integrate_interior(problem, e, &nodes, &points).unwrap();
        scatter(&mut matrix, &mut rhs, &nodes, state.into_element_matrices());
    }
    (matrix, rhs)
}

fn add_weak_dirichlet(
    integrand: &WeakDirichlet<f64, U1>,
    vertices: &[f64],
    matrix: &mut DMatrix<f64>,
    rhs: &mut DVector<f64>,
) {
    let last = vertices.len() - 2;
    for (e, end) in [(0, 0), (last, 1)] {
        let nodes = [e, e + 1];
        let point = segment2_boundary_point(e, vertices[e], vertices[e + 1], end);
        let state = integrate_boundary(integrand, e, &nodes, &[point]).unwrap();
        scatter(matrix, rhs, &nodes, state);
    }
}

fn apply_strong_dirichlet(matrix: &mut DMatrix<f64>, rhs: &mut DVector<f64>, node: usize, value: f64) {
    matrix.row_mut(node).fill(0.0);
    matrix[(node, node)] = 1.0;
    rhs[node] = value;
}

fn solve(matrix: DMatrix<f64>, rhs: &DVector<f64>) -> DVector<f64> {
    matrix.lu().solve(rhs).expect("System must be non-singular")
}

#[test]
fn poisson_with_linear_elements_is_nodally_exact() {
    let source = |_: &Point1<f64>| 1.0;
    let mut problem = AdvectionDiffusion::<f64, U1>::new(Stabilization::None);
    problem.set_source(&source);

    let vertices = uniform_vertices(0.0, 1.0, 8);
    let (mut matrix, mut rhs) = assemble(&problem, &vertices);
    let n = vertices.len();
    apply_strong_dirichlet(&mut matrix, &mut rhs, 0, 0.0);
    apply_strong_dirichlet(&mut matrix, &mut rhs, n - 1, 0.0);
    let u_h = solve(matrix, &rhs);

    let u_exact = DVector::from_iterator(n, vertices.iter().map(|x| 0.5 * x * (1.0 - x)));
    assert_matrix_eq!(u_h, u_exact, comp = abs, tol = 1e-12);
}

#[test]
fn weak_dirichlet_reproduces_linear_solution_for_all_stabilizations() {
    // U u' - kappa u'' = 2 with u = 1 + 2x
    let velocity = |_: &Point1<f64>| Vector1::new(1.0);
    let source = |_: &Point1<f64>| 2.0;
    let u = |x: &Point1<f64>| 1.0 + 2.0 * x.x;
    let u_grad = |_: &Point1<f64>| Vector1::new(2.0);

    let vertices = uniform_vertices(0.0, 1.0, 6);
    let num_elements = vertices.len() - 1;
    let u_exact = DVector::from_iterator(vertices.len(), vertices.iter().map(|&x| 1.0 + 2.0 * x));

    let mut nitsche = WeakDirichlet::<f64, U1>::new(4.0, 1.0);
    nitsche.properties_mut().diffusivity = 0.1;
    nitsche.set_advection_field(&velocity);
    nitsche.set_flux(&u);

    for stabilization in [Stabilization::None, Stabilization::Supg, Stabilization::Gls, Stabilization::Ms] {
        let taus = ElementTau::with_element_count(num_elements);
        let mut problem = AdvectionDiffusion::<f64, U1>::new(stabilization);
        problem.properties_mut().diffusivity = 0.1;
        problem.set_advection_field(&velocity);
        problem.set_source(&source);
        problem.set_element_tau(&taus);

        let (mut matrix, mut rhs) = assemble(&problem, &vertices);
        add_weak_dirichlet(&nitsche, &vertices, &mut matrix, &mut rhs);
        let u_h = solve(matrix, &rhs);
        assert_matrix_eq!(u_h, u_exact, comp = abs, tol = 1e-10);

        if stabilization.is_stabilized() {
            assert!(taus.to_vec().iter().all(|&tau| tau > 0.0));
        }

        let norm = AdvectionDiffusionNorm::new(&problem, &u_h).with_analytical_solution(AnalyticalSolution::new(&u, &u_grad));
        let element_norms: Vec<_> = vertices
            .windows(2)
            .enumerate()
            .map(|(e, segment)| {
                let points = segment2_interior_points(e, segment[0], segment[1], 2);
                integrate_interior(&norm, e, &[e, e + 1], &points).unwrap()
            })
            .collect();
        let global = accumulate_norms(&element_norms).unwrap();
        assert!(global[ERROR_ENERGY].abs() < 1e-16);
        assert!(global[ERROR_L2].abs() < 1e-16);
        assert!((global[EFFECTIVITY] - 1.0).abs() < 1e-12);
    }
}

#[test]
fn supg_suppresses_oscillations_at_high_peclet_number() {
    // Boundary layer at x = 1 with mesh Peclet number U h / (2 kappa) = 5
    let velocity = |_: &Point1<f64>| Vector1::new(1.0);
    let vertices = uniform_vertices(0.0, 1.0, 10);
    let n = vertices.len();

    let solve_with = |stabilization| {
        let mut problem = AdvectionDiffusion::<f64, U1>::new(stabilization);
        problem.properties_mut().diffusivity = 0.01;
        problem.set_advection_field(&velocity);
        let (mut matrix, mut rhs) = assemble(&problem, &vertices);
        apply_strong_dirichlet(&mut matrix, &mut rhs, 0, 0.0);
        apply_strong_dirichlet(&mut matrix, &mut rhs, n - 1, 1.0);
        solve(matrix, &rhs)
    };

    let galerkin = solve_with(Stabilization::None);
    assert!(galerkin.min() < -1e-2);

    for stabilization in [Stabilization::Supg, Stabilization::Gls, Stabilization::Ms] {
        let u_h = solve_with(stabilization);
        assert!(u_h.min() >= -1e-12);
        assert!(u_h.max() <= 1.0 + 1e-12);
        assert!(u_h
            .as_slice()
            .windows(2)
            .all(|pair| pair[0] <= pair[1] + 1e-12));
    }
}

#[test]
fn l2_error_converges_quadratically() {
    let source = |x: &Point1<f64>| PI * PI * (PI * x.x).sin();
    let u = |x: &Point1<f64>| (PI * x.x).sin();
    let u_grad = |x: &Point1<f64>| Vector1::new(PI * (PI * x.x).cos());
    let mut problem = AdvectionDiffusion::<f64, U1>::new(Stabilization::None);
    problem.set_source(&source);

    let l2_error = |num_elements: usize| {
        let vertices = uniform_vertices(0.0, 1.0, num_elements);
        let n = vertices.len();
        let (mut matrix, mut rhs) = assemble(&problem, &vertices);
        apply_strong_dirichlet(&mut matrix, &mut rhs, 0, 0.0);
        apply_strong_dirichlet(&mut matrix, &mut rhs, n - 1, 0.0);
        let u_h = solve(matrix, &rhs);

        let norm = AdvectionDiffusionNorm::new(&problem, &u_h).with_analytical_solution(AnalyticalSolution::new(&u, &u_grad));
        let element_norms: Vec<_> = vertices
            .windows(2)
            .enumerate()
            .map(|(e, segment)| {
                let points = segment2_interior_points(e, segment[0], segment[1], 3);
                integrate_interior(&norm, e, &[e, e + 1], &points).unwrap()
            })
            .collect();
        accumulate_norms(&element_norms).unwrap()[ERROR_L2].sqrt()
    };

    let coarse = l2_error(8);
    let fine = l2_error(16);
    assert!(coarse < 2e-2);
    assert!(coarse / fine > 3.5);
}
