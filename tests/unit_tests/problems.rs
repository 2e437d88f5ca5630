use crate::export_vtk;
use cutfem::active_set::active_dofs_of;
use cutfem::cut_info::ElementCategory;
use cutfem::io::vtk::CutMeshDataSetBuilder;
use cutfem::levelset::{Circle, FnLevelSet};
use cutfem::mesh::procedural::create_rectangular_uniform_tri_mesh_2d;
use cutfem::mesh::TriangleMesh2d;
use cutfem::problems::{
    solve_interface_poisson, solve_trace_fem, InterfacePoissonConfig, InterfacePoissonData, TraceFemConfig,
};
use cutfem::space::{PerSubdomain, Subdomain};
use nalgebra::Point2;

type ScalarFn = fn(&Point2<f64>) -> f64;

const INTERFACE_POSITION: f64 = 0.37;

fn zero(_: &Point2<f64>) -> f64 {
    0.0
}

// Piecewise linear solution with a kink at the interface, satisfying
// 1 * du_neg/dx = 2 * du_pos/dx and continuity at x = 0.37
fn kinked_neg(x: &Point2<f64>) -> f64 {
    2.0 * x.x
}

fn kinked_pos(x: &Point2<f64>) -> f64 {
    x.x + INTERFACE_POSITION
}

fn unit_square_mesh(n: usize) -> TriangleMesh2d<f64> {
    create_rectangular_uniform_tri_mesh_2d(&Point2::new(0.0, 0.0), &Point2::new(1.0, 1.0), n, n).unwrap()
}

#[test]
fn interface_problem_reproduces_piecewise_linear_solutions() {
    let mesh = unit_square_mesh(5);
    let levelset = FnLevelSet::new(|x: &Point2<f64>| x.x - INTERFACE_POSITION);
    let exact: PerSubdomain<ScalarFn> = PerSubdomain::new(kinked_neg, kinked_pos);
    let data = InterfacePoissonData {
        source: PerSubdomain::new(zero as ScalarFn, zero as ScalarFn),
        dirichlet: exact,
    };
    for order in [1, 2] {
        let config = InterfacePoissonConfig {
            order,
            diffusion: PerSubdomain::new(1.0, 2.0),
            ..InterfacePoissonConfig::default()
        };
        let solution = solve_interface_poisson(&mesh, &levelset, &data, &config).unwrap();
        let error = solution.L2_error(&mesh, &exact).unwrap();
        assert!(error < 1e-9, "order {} has error {:e}", order, error);

        // Free dofs are active and never on the boundary
        let component = solution.space.component_space();
        let boundary = component.boundary_dofs(&mesh).unwrap();
        for subdomain in Subdomain::ALL {
            let category = ElementCategory::from(subdomain);
            let active = active_dofs_of(component, &solution.cut_info, category).unwrap();
            for dof in 0..component.num_dofs() {
                let global = solution.space.global_dof(subdomain, dof);
                if solution.free_dofs.contains(global) {
                    assert!(active.contains(dof));
                    assert!(!boundary.contains(dof));
                }
            }
        }
    }
}

#[test]
fn interface_problem_on_a_curved_interface() {
    let mesh = unit_square_mesh(10);
    let circle = Circle {
        center: Point2::new(0.5, 0.5),
        radius: 0.3,
    };
    // u = r^2 / alpha_i - (1 / alpha_neg - 1 / alpha_pos) R^2 on the positive side is
    // continuous with continuous flux, and -alpha_i Δu = -4
    let (alpha_neg, alpha_pos) = (1.0, 10.0);
    let r2 = |x: &Point2<f64>| (x - Point2::new(0.5, 0.5)).norm_squared();
    let exact_neg = move |x: &Point2<f64>| r2(x) / alpha_neg;
    let exact_pos = move |x: &Point2<f64>| r2(x) / alpha_pos + (1.0 / alpha_neg - 1.0 / alpha_pos) * 0.09;
    let source = |_: &Point2<f64>| -4.0;
    let exact: PerSubdomain<&(dyn Fn(&Point2<f64>) -> f64 + Sync)> = PerSubdomain::new(&exact_neg, &exact_pos);
    let data = InterfacePoissonData {
        source: PerSubdomain::new(source, source),
        dirichlet: exact,
    };
    let config = InterfacePoissonConfig {
        order: 2,
        diffusion: PerSubdomain::new(alpha_neg, alpha_pos),
        ..InterfacePoissonConfig::default()
    };
    let solution = solve_interface_poisson(&mesh, &circle, &data, &config).unwrap();
    let error = solution.L2_error(&mesh, &exact).unwrap();
    assert!(error < 1e-2, "error {:e}", error);

    let neg = solution.space.component(&solution.coefficients, Subdomain::Neg);
    let builder = CutMeshDataSetBuilder::from_mesh(&mesh)
        .with_levelset(&solution.levelset)
        .unwrap()
        .with_cut_info(&solution.cut_info)
        .unwrap()
        .with_solution("u_neg", solution.space.component_space(), &neg)
        .unwrap();
    export_vtk("interface_problem_on_a_curved_interface", "solution", &builder);
}

#[test]
fn interface_config_defaults() {
    let config: InterfacePoissonConfig = serde_json::from_str(r#"{"order": 1, "nitsche_penalty": 40.0}"#).unwrap();
    assert_eq!(config.order, 1);
    assert_eq!(config.nitsche_penalty, 40.0);
    assert_eq!(config.diffusion, InterfacePoissonConfig::default().diffusion);
    assert!(config.deformation.is_none());
}

#[test]
fn trace_fem_solves_on_cut_elements_only() {
    let mesh = unit_square_mesh(16);
    let center = Point2::new(0.5, 0.5);
    let radius = 0.3;
    let circle = Circle { center, radius };
    // u = cos(theta) is an eigenfunction of -Δ_Γ with eigenvalue 1 / R^2
    let exact = move |x: &Point2<f64>| (x.x - center.x) / (x - center).norm();
    let source = move |x: &Point2<f64>| (1.0 + 1.0 / (radius * radius)) * exact(x);
    let solution = solve_trace_fem(&mesh, &circle, source, &TraceFemConfig::default()).unwrap();

    let cut_dofs = active_dofs_of(&solution.space, &solution.cut_info, ElementCategory::If).unwrap();
    assert_eq!(solution.free_dofs, cut_dofs);
    for dof in 0..solution.space.num_dofs() {
        if !cut_dofs.contains(dof) {
            assert_eq!(solution.coefficients[dof], 0.0);
        }
    }
    let error = solution.L2_error(&mesh, exact).unwrap();
    assert!(error < 5e-2, "error {:e}", error);
}

#[test]
fn trace_fem_rejects_invalid_orders() {
    let mesh = unit_square_mesh(4);
    let circle = Circle {
        center: Point2::new(0.5, 0.5),
        radius: 0.3,
    };
    let config = TraceFemConfig {
        order: 0,
        ..TraceFemConfig::default()
    };
    let error = solve_trace_fem(&mesh, &circle, |_: &Point2<f64>| 1.0, &config).unwrap_err();
    assert!(error.downcast_ref::<cutfem::CutFemError>().unwrap().is_configuration());
}
