use cutfem::cut_info::{CutInfo, ZeroSign};
use cutfem::cut_quadrature::{CutDomain, LevelSetDomain};
use cutfem::deformation::{IsoparametricCorrector, MeshDeformation, MeshDeformationConfig};
use cutfem::levelset::{Circle, FnLevelSet, LevelSetField, LevelSetFunction};
use cutfem::mesh::procedural::create_rectangular_uniform_tri_mesh_2d;
use cutfem::mesh::TriangleMesh2d;
use cutfem::space::LagrangeSpace;
use matrixcompare::assert_scalar_eq;
use nalgebra::{Point2, Vector2};
use std::f64::consts::PI;

fn unit_square_mesh(n: usize) -> TriangleMesh2d<f64> {
    create_rectangular_uniform_tri_mesh_2d(&Point2::new(0.0, 0.0), &Point2::new(1.0, 1.0), n, n).unwrap()
}

fn circle() -> Circle<f64> {
    Circle {
        center: Point2::new(0.51, 0.48),
        radius: 0.3,
    }
}

#[test]
fn linear_level_sets_need_no_correction() {
    let mesh = unit_square_mesh(6);
    let levelset = FnLevelSet::new(|x: &Point2<f64>| 0.3 * x.x - 0.7 * x.y + 0.2);
    let field = LevelSetField::interpolate(&mesh, &levelset);
    let cut_info = CutInfo::new(&mesh, &field, ZeroSign::default()).unwrap();
    let deformation = IsoparametricCorrector::new(MeshDeformationConfig::with_order(3))
        .compute(&mesh, &levelset, &field, &cut_info)
        .unwrap();
    assert_eq!(deformation.order(), 3);
    assert_scalar_eq!(deformation.max_displacement(), 0.0, comp = abs, tol = 1e-12);
}

#[test]
fn corrected_nodes_lie_on_the_exact_level_sets() {
    let mesh = unit_square_mesh(8);
    let levelset = circle();
    let field = LevelSetField::interpolate(&mesh, &levelset);
    let cut_info = CutInfo::new(&mesh, &field, ZeroSign::default()).unwrap();
    let config = MeshDeformationConfig::default();
    let deformation = IsoparametricCorrector::new(config)
        .compute(&mesh, &levelset, &field, &cut_info)
        .unwrap();
    assert!(deformation.max_displacement() > 0.0);
    assert!(deformation.max_displacement() <= config.max_relative_displacement * mesh.max_diameter());

    // The linear interpolant is exact at vertices, so vertices do not move
    for d in deformation.vertex_displacements(&mesh) {
        assert!(d.norm() < 1e-10);
    }

    // Nodes of cut elements are mapped onto the level set of their interpolated value
    let space = deformation.space();
    let nodes = space.node_positions(&mesh).unwrap();
    let cut = cut_info.elements(cutfem::cut_info::ElementCategory::If);
    for e in cut.iter() {
        for (local, &dof) in space.element_dofs(e).iter().enumerate() {
            let lambda = space.element().node_barycentric(local);
            let target = field.evaluate(&mesh, e, &lambda);
            let moved = nodes[dof] + deformation.displacements()[dof];
            assert_scalar_eq!(levelset.evaluate(&moved), target, comp = abs, tol = 1e-9);
        }
    }
}

#[test]
fn deformation_improves_the_enclosed_area() {
    let mesh = unit_square_mesh(10);
    let levelset = circle();
    let field = LevelSetField::interpolate(&mesh, &levelset);
    let cut_info = CutInfo::new(&mesh, &field, ZeroSign::default()).unwrap();
    let deformation = IsoparametricCorrector::new(MeshDeformationConfig::with_order(2))
        .compute(&mesh, &levelset, &field, &cut_info)
        .unwrap();

    let exact_area = PI * 0.3 * 0.3;
    let exact_length = 2.0 * PI * 0.3;
    let linear = CutDomain::new(&mesh, &field, &cut_info).unwrap();
    let curved = linear.with_deformation(&deformation).unwrap();
    let linear_area_error = (linear.measure(&LevelSetDomain::neg(), None).unwrap() - exact_area).abs();
    let curved_area_error = (curved.measure(&LevelSetDomain::neg(), None).unwrap() - exact_area).abs();
    let curved_length_error = (curved.measure(&LevelSetDomain::interface(), None).unwrap() - exact_length).abs();
    assert!(
        curved_area_error < 0.5 * linear_area_error,
        "curved error {:e}, linear error {:e}",
        curved_area_error,
        linear_area_error
    );
    assert!(curved_length_error < 1e-2 * exact_length);

    // The deformed regions still tile the square
    let total =
        curved.measure(&LevelSetDomain::neg(), None).unwrap() + curved.measure(&LevelSetDomain::pos(), None).unwrap();
    assert_scalar_eq!(total, 1.0, comp = abs, tol = 1e-10);
}

#[test]
fn deformations_go_stale_with_the_level_set() {
    let mesh = unit_square_mesh(6);
    let levelset = circle();
    let mut field = LevelSetField::interpolate(&mesh, &levelset);
    let cut_info = CutInfo::new(&mesh, &field, ZeroSign::default()).unwrap();
    let deformation = IsoparametricCorrector::default()
        .compute(&mesh, &levelset, &field, &cut_info)
        .unwrap();
    assert_eq!(deformation.levelset_generation(), field.generation());
    assert_eq!(deformation.mesh_generation(), mesh.generation());

    let moved = Circle {
        center: Point2::new(0.5, 0.5),
        radius: 0.25,
    };
    field.update(&mesh, &moved).unwrap();
    let new_cut_info = CutInfo::new(&mesh, &field, ZeroSign::default()).unwrap();
    let error = CutDomain::new(&mesh, &field, &new_cut_info)
        .unwrap()
        .with_deformation(&deformation)
        .err()
        .unwrap();
    assert!(error.is_stale_state());

    // The corrector itself refuses an outdated classification
    let error = IsoparametricCorrector::default()
        .compute(&mesh, &moved, &field, &cut_info)
        .unwrap_err();
    assert!(error.is_stale_state());
}

#[test]
fn invalid_deformations_are_rejected() {
    let mesh = unit_square_mesh(2);
    let space = LagrangeSpace::new(&mesh, 2).unwrap();
    let field = LevelSetField::interpolate(&mesh, &circle());
    let error = MeshDeformation::from_displacements(&mesh, space.clone(), vec![Vector2::zeros(); 3], field.generation())
        .unwrap_err();
    assert!(error.is_configuration());
    let zero = MeshDeformation::from_displacements(
        &mesh,
        space.clone(),
        vec![Vector2::zeros(); space.num_dofs()],
        field.generation(),
    )
    .unwrap();
    assert_eq!(zero.max_displacement(), 0.0);

    let cut_info = CutInfo::new(&mesh, &field, ZeroSign::default()).unwrap();
    let config = MeshDeformationConfig {
        threshold: 0.0,
        ..MeshDeformationConfig::default()
    };
    let error = IsoparametricCorrector::new(config)
        .compute(&mesh, &circle(), &field, &cut_info)
        .unwrap_err();
    assert!(error.is_configuration());
}

#[test]
fn configuration_defaults_fill_missing_fields() {
    let config: MeshDeformationConfig = serde_json::from_str(r#"{"order": 3}"#).unwrap();
    assert_eq!(config, MeshDeformationConfig::with_order(3));
}
