use cutfem_quadrature::integrate;
use cutfem_quadrature::univariate::{gauss, gauss_for_strength};
use cutfem_quadrature::{Error, MAX_STRENGTH};

use matrixcompare::assert_scalar_eq;

fn monomial_integral_1d(alpha: i32) -> f64 {
    (1.0 - (-1.0f64).powi(alpha + 1)) / (alpha as f64 + 1.0)
}

#[test]
fn gauss_rules_satisfy_expected_accuracy() {
    for n in 1..=40 {
        let expected_polynomial_degree = 2 * n - 1;
        let rule = gauss(n);

        assert!(rule.0.iter().all(|&w| w > 0.0));
        assert!(rule.1.windows(2).all(|pair| pair[0][0] < pair[1][0]));

        for alpha in 0..=expected_polynomial_degree as i32 {
            let estimated_integral = integrate(&rule, |x| x[0].powi(alpha));
            assert_scalar_eq!(estimated_integral, monomial_integral_1d(alpha), comp = abs, tol = 1e-13);
        }
    }
}

#[test]
fn gauss_for_strength_uses_minimal_number_of_points() {
    assert_eq!(gauss_for_strength(0).unwrap().0.len(), 1);
    assert_eq!(gauss_for_strength(1).unwrap().0.len(), 1);
    assert_eq!(gauss_for_strength(2).unwrap().0.len(), 2);
    assert_eq!(gauss_for_strength(3).unwrap().0.len(), 2);
    assert_eq!(gauss_for_strength(4).unwrap().0.len(), 3);
}

#[test]
fn gauss_for_strength_rejects_excessive_strength() {
    let error = gauss_for_strength(MAX_STRENGTH + 1).unwrap_err();
    assert_eq!(
        error,
        Error::NoRuleAvailable {
            requested_strength: MAX_STRENGTH + 1
        }
    );
}
