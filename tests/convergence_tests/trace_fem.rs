//! Convergence of TraceFEM for the Laplace-Beltrami problem `-Δ_Γ u + u = f` on a circle.
use super::common::{unit_square_mesh, ErrorSummary};
use cutfem::deformation::MeshDeformationConfig;
use cutfem::levelset::Circle;
use cutfem::problems::{solve_trace_fem, TraceFemConfig};
use nalgebra::Point2;

const RADIUS: f64 = 0.3;

fn center() -> Point2<f64> {
    Point2::new(0.49, 0.505)
}

/// `cos(theta)`, extended constantly along rays from the center.
fn exact(x: &Point2<f64>) -> f64 {
    let d = x - center();
    d.x / d.norm()
}

/// `cos(theta)` is an eigenfunction of `-Δ_Γ` with eigenvalue `1 / R^2`.
fn source(x: &Point2<f64>) -> f64 {
    (1.0 + 1.0 / (RADIUS * RADIUS)) * exact(x)
}

fn solve_and_estimate_error(resolution: usize, config: &TraceFemConfig) -> f64 {
    let mesh = unit_square_mesh(resolution);
    let circle = Circle {
        center: center(),
        radius: RADIUS,
    };
    let solution = solve_trace_fem(&mesh, &circle, source, config).unwrap();
    solution.L2_error(&mesh, exact).unwrap()
}

#[test]
fn linear_trace_fem_converges_quadratically() {
    let resolutions = [8, 16, 32, 64];
    let config = TraceFemConfig::default();
    let h: Vec<f64> = resolutions.iter().map(|&n| 1.0 / n as f64).collect();
    let errors: Vec<f64> = resolutions
        .iter()
        .map(|&n| solve_and_estimate_error(n, &config))
        .collect();
    let summary = ErrorSummary::new("trace_fem_p1", h, errors);
    summary.write("trace_fem");
    summary.assert_decreasing();
    assert!(summary.rate > 1.5, "L2 rate {}", summary.rate);
}

#[test]
fn quadratic_trace_fem_on_deformed_geometry() {
    let resolutions = [8, 16, 32];
    let config = TraceFemConfig {
        order: 2,
        deformation: Some(MeshDeformationConfig::with_order(2)),
        ..TraceFemConfig::default()
    };
    let h: Vec<f64> = resolutions.iter().map(|&n| 1.0 / n as f64).collect();
    let errors: Vec<f64> = resolutions
        .iter()
        .map(|&n| solve_and_estimate_error(n, &config))
        .collect();
    let summary = ErrorSummary::new("trace_fem_p2_deformed", h, errors);
    summary.write("trace_fem");
    summary.assert_decreasing();
    assert!(summary.rate > 1.5, "L2 rate {}", summary.rate);
}
