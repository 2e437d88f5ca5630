use cutfem::element::{AffineTriangle, LagrangeTriangle, TimeLagrangeBasis};
use matrixcompare::{assert_scalar_eq, prop_assert_scalar_eq};
use nalgebra::{Point2, Vector2};
use proptest::prelude::*;

fn sample_barycentric() -> Vec<[f64; 3]> {
    vec![
        [1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0],
        [0.1, 0.2, 0.7],
        [0.6, 0.3, 0.1],
        [0.0, 0.5, 0.5],
        [1.0, 0.0, 0.0],
    ]
}

macro_rules! lagrange_triangle_tests {
    ($($order:literal),*) => {
        $(
            paste::paste! {
                #[test]
                fn [<lagrange_triangle_order_ $order _is_nodal>]() {
                    let element = LagrangeTriangle::new($order).unwrap();
                    assert_eq!(element.num_nodes(), ($order + 1) * ($order + 2) / 2);
                    let n = element.num_nodes();
                    let mut basis = vec![0.0; n];
                    for node in 0..n {
                        element.populate_basis(&mut basis, &element.node_barycentric(node));
                        for (i, &phi) in basis.iter().enumerate() {
                            let expected = if i == node { 1.0 } else { 0.0 };
                            assert_scalar_eq!(phi, expected, comp = abs, tol = 1e-12);
                        }
                    }
                }

                #[test]
                fn [<lagrange_triangle_order_ $order _partition_of_unity>]() {
                    let element = LagrangeTriangle::new($order).unwrap();
                    let triangle = AffineTriangle::from_vertices([
                        Point2::new(0.2, -0.1),
                        Point2::new(1.3, 0.4),
                        Point2::new(0.1, 0.9),
                    ]);
                    let lambda_gradients = triangle.barycentric_gradients();
                    let n = element.num_nodes();
                    let mut basis = vec![0.0; n];
                    let mut gradients = vec![Vector2::zeros(); n];
                    for lambda in sample_barycentric() {
                        element.populate_basis_and_gradients(&mut basis, &mut gradients, &lambda, &lambda_gradients);
                        let sum: f64 = basis.iter().sum();
                        let gradient_sum: Vector2<f64> = gradients.iter().sum();
                        assert_scalar_eq!(sum, 1.0, comp = abs, tol = 1e-12);
                        assert_scalar_eq!(gradient_sum.norm(), 0.0, comp = abs, tol = 1e-10);
                    }
                }
            }
        )*
    };
}

lagrange_triangle_tests!(1, 2, 3, 4);

#[test]
fn lagrange_triangle_rejects_unsupported_orders() {
    assert!(LagrangeTriangle::new(0).unwrap_err().is_configuration());
    assert!(LagrangeTriangle::new(100).unwrap_err().is_configuration());
}

#[test]
fn quadratic_basis_reproduces_quadratic_gradient() {
    // u(x, y) = x^2 + x y, interpolated exactly by the quadratic basis
    let u = |x: &Point2<f64>| x.x * x.x + x.x * x.y;
    let grad_u = |x: &Point2<f64>| Vector2::new(2.0 * x.x + x.y, x.x);
    let element = LagrangeTriangle::new(2).unwrap();
    let triangle = AffineTriangle::from_vertices([Point2::new(0.0, 0.0), Point2::new(1.0, 0.2), Point2::new(0.3, 1.1)]);
    let coefficients: Vec<f64> = (0..element.num_nodes())
        .map(|node| u(&triangle.map_barycentric(&element.node_barycentric(node))))
        .collect();

    let lambda = [0.2, 0.5, 0.3];
    let mut basis = vec![0.0; element.num_nodes()];
    let mut gradients = vec![Vector2::zeros(); element.num_nodes()];
    element.populate_basis_and_gradients(&mut basis, &mut gradients, &lambda, &triangle.barycentric_gradients());
    let x = triangle.map_barycentric(&lambda);
    let value: f64 = coefficients.iter().zip(&basis).map(|(c, phi)| c * phi).sum();
    let gradient: Vector2<f64> = coefficients.iter().zip(&gradients).map(|(c, g)| g * *c).sum();
    assert_scalar_eq!(value, u(&x), comp = abs, tol = 1e-12);
    assert_scalar_eq!((gradient - grad_u(&x)).norm(), 0.0, comp = abs, tol = 1e-12);
}

#[test]
fn affine_triangle_barycentric_round_trip() {
    let triangle =
        AffineTriangle::from_vertices([Point2::new(-1.0, 0.0), Point2::new(2.0, 0.5), Point2::new(0.0, 3.0)]);
    let x = Point2::new(0.3, 0.9);
    let lambda = triangle.barycentric(&x);
    assert_scalar_eq!(lambda.iter().sum::<f64>(), 1.0, comp = abs, tol = 1e-12);
    let y = triangle.map_barycentric(&lambda);
    assert_scalar_eq!((x - y).norm(), 0.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(triangle.area(), 4.25, comp = abs, tol = 1e-12);
}

#[test]
fn constant_time_basis_sits_at_the_midpoint() {
    let basis = TimeLagrangeBasis::new(0).unwrap();
    assert_eq!(basis.nodes(), &[0.5]);
    let mut values = [0.0];
    let mut derivatives = [1.0];
    basis.populate_basis_and_derivatives(&mut values, &mut derivatives, 0.9);
    assert_eq!(values, [1.0]);
    assert_eq!(derivatives, [0.0]);
}

#[test]
fn linear_time_basis_values_and_derivatives() {
    let basis = TimeLagrangeBasis::new(1).unwrap();
    assert_eq!(basis.nodes(), &[0.0, 1.0]);
    let mut values = [0.0; 2];
    let mut derivatives = [0.0; 2];
    basis.populate_basis_and_derivatives(&mut values, &mut derivatives, 0.25);
    assert_scalar_eq!(values[0], 0.75, comp = abs, tol = 1e-14);
    assert_scalar_eq!(values[1], 0.25, comp = abs, tol = 1e-14);
    assert_scalar_eq!(derivatives[0], -1.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(derivatives[1], 1.0, comp = abs, tol = 1e-14);
}

proptest! {
    #[test]
    fn time_basis_derivatives_sum_to_zero(order in 0usize..5, t in 0.0..1.0f64) {
        let basis = TimeLagrangeBasis::new(order).unwrap();
        let mut values = vec![0.0; basis.num_nodes()];
        let mut derivatives = vec![0.0; basis.num_nodes()];
        basis.populate_basis_and_derivatives(&mut values, &mut derivatives, t);
        prop_assert_scalar_eq!(values.iter().sum::<f64>(), 1.0, comp = abs, tol = 1e-10);
        prop_assert_scalar_eq!(derivatives.iter().sum::<f64>(), 0.0, comp = abs, tol = 1e-8);
    }
}
