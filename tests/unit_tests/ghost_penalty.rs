use cutfem::assembly::{spmv, CsrAssembler};
use cutfem::cut_info::{CutInfo, ElementCategory, ElementType, ZeroSign};
use cutfem::ghost_penalty::{ghost_penalty_facets, GhostPenaltyConfig, GhostPenaltyKind, GhostPenaltyStabilizer};
use cutfem::levelset::{Circle, LevelSetField, TimeSlab};
use cutfem::mask::FacetSet;
use cutfem::mesh::procedural::create_rectangular_uniform_tri_mesh_2d;
use cutfem::mesh::TriangleMesh2d;
use cutfem::space::{LagrangeSpace, SpaceTimeSpace, Subdomain};
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DVector, Point2};
use proptest::collection::vec;
use proptest::prelude::*;

fn circle_setup() -> (TriangleMesh2d<f64>, CutInfo<f64>) {
    let mesh = create_rectangular_uniform_tri_mesh_2d(&Point2::new(0.0, 0.0), &Point2::new(1.0, 1.0), 6, 6).unwrap();
    let circle = Circle {
        center: Point2::new(0.5, 0.45),
        radius: 0.28,
    };
    let field = LevelSetField::interpolate(&mesh, &circle);
    let cut_info = CutInfo::new(&mesh, &field, ZeroSign::default()).unwrap();
    (mesh, cut_info)
}

#[test]
fn ghost_penalty_facets_border_cut_elements() {
    let (mesh, cut_info) = circle_setup();
    for subdomain in Subdomain::ALL {
        let facets = ghost_penalty_facets(&mesh, &cut_info, subdomain).unwrap();
        assert!(facets.count() > 0);
        let touching = cut_info.elements(ElementCategory::from(subdomain));
        for f in facets.iter() {
            let [e1, e2] = mesh.facets()[f].interior_elements().unwrap();
            assert!(touching.contains(e1) && touching.contains(e2));
            assert!(cut_info.element_type(e1) == ElementType::Cut || cut_info.element_type(e2) == ElementType::Cut);
        }
    }
}

fn assert_polynomials_are_not_penalized(kind: GhostPenaltyKind, order: usize) {
    let (mesh, cut_info) = circle_setup();
    let space = LagrangeSpace::new(&mesh, order).unwrap();
    let facets = ghost_penalty_facets(&mesh, &cut_info, Subdomain::Neg).unwrap();
    let config = GhostPenaltyConfig {
        kind,
        ..GhostPenaltyConfig::default()
    };
    let stabilizer = GhostPenaltyStabilizer::new(&mesh, &space, &facets, config).unwrap();
    assert_eq!(stabilizer.facets().len(), facets.count());
    let matrix = CsrAssembler::default().assemble(&stabilizer).unwrap();
    assert_matrix_eq!(matrix, matrix.transpose(), comp = abs, tol = 1e-10);

    let k = order as i32;
    let p = |x: &Point2<f64>| 0.5 - x.x.powi(k) + 3.0 * x.y.powi(k) + x.x.powi(k - 1) * x.y;
    let nodes = space.node_positions(&mesh).unwrap();
    let interpolant = DVector::from_iterator(nodes.len(), nodes.iter().map(p));
    assert_scalar_eq!(spmv(&matrix, &interpolant).amax(), 0.0, comp = abs, tol = 1e-9);

    // A kink across the interface is penalized
    let kink = DVector::from_iterator(nodes.len(), nodes.iter().map(|x| (x.x - 0.5).abs()));
    assert!(kink.dot(&spmv(&matrix, &kink)) > 0.0);
}

#[test]
fn jump_penalty_vanishes_on_polynomials() {
    assert_polynomials_are_not_penalized(GhostPenaltyKind::Jump, 1);
    assert_polynomials_are_not_penalized(GhostPenaltyKind::Jump, 2);
}

#[test]
fn gradient_jump_penalty_vanishes_on_polynomials() {
    assert_polynomials_are_not_penalized(GhostPenaltyKind::GradientJump, 1);
    assert_polynomials_are_not_penalized(GhostPenaltyKind::GradientJump, 2);
}

#[test]
fn default_scaling_depends_on_the_kind() {
    let jump = GhostPenaltyConfig::default();
    assert_eq!(jump.kind, GhostPenaltyKind::Jump);
    assert_eq!(jump.effective_h_power(), -2);
    let gradient = GhostPenaltyConfig {
        kind: GhostPenaltyKind::GradientJump,
        ..jump
    };
    assert_eq!(gradient.effective_h_power(), 1);
    let custom = GhostPenaltyConfig {
        h_power: Some(0),
        ..jump
    };
    assert_eq!(custom.effective_h_power(), 0);

    let parsed: GhostPenaltyConfig = serde_json::from_str(r#"{"weight": 0.5}"#).unwrap();
    assert_eq!(parsed.weight, 0.5);
    assert_eq!(parsed.kind, GhostPenaltyKind::Jump);
}

#[test]
fn invalid_configurations_are_rejected() {
    let (mesh, cut_info) = circle_setup();
    let space = LagrangeSpace::new(&mesh, 1).unwrap();
    let facets = ghost_penalty_facets(&mesh, &cut_info, Subdomain::Pos).unwrap();
    let negative_weight = GhostPenaltyConfig {
        weight: -1.0,
        ..GhostPenaltyConfig::default()
    };
    let error = GhostPenaltyStabilizer::new(&mesh, &space, &facets, negative_weight).err().unwrap();
    assert!(error.is_configuration());

    let wrong_length = FacetSet::new(3);
    let error = GhostPenaltyStabilizer::new(&mesh, &space, &wrong_length, GhostPenaltyConfig::default())
        .err()
        .unwrap();
    assert!(error.is_configuration());

    // Space-time spaces need a slab, spatial spaces must not get one
    let space_time = SpaceTimeSpace::new(space.clone(), 1).unwrap();
    let slab = TimeSlab::new(0.0, 0.1).unwrap();
    assert!(GhostPenaltyStabilizer::new(&mesh, &space_time, &facets, GhostPenaltyConfig::default()).is_err());
    let config = GhostPenaltyConfig::default();
    assert!(GhostPenaltyStabilizer::space_time(&mesh, &space, &facets, config, slab).is_err());
    assert!(GhostPenaltyStabilizer::space_time(&mesh, &space_time, &facets, config, slab).is_ok());
}

#[test]
fn space_time_penalty_scales_with_the_slab_length() {
    let (mesh, cut_info) = circle_setup();
    let space = SpaceTimeSpace::new(LagrangeSpace::new(&mesh, 1).unwrap(), 1).unwrap();
    let facets = ghost_penalty_facets(&mesh, &cut_info, Subdomain::Neg).unwrap();
    let config = GhostPenaltyConfig::default();
    let assembler = CsrAssembler::default();
    let penalty_matrix = |dt: f64| {
        let slab = TimeSlab::new(0.0, dt).unwrap();
        let stabilizer = GhostPenaltyStabilizer::space_time(&mesh, &space, &facets, config, slab).unwrap();
        assembler.assemble(&stabilizer).unwrap()
    };
    let short = penalty_matrix(0.1);
    let long = penalty_matrix(0.2);
    let doubled = &short * 2.0;
    assert_matrix_eq!(long, doubled, comp = abs, tol = 1e-10);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]
    #[test]
    fn penalty_is_positive_semidefinite(values in vec(-1.0..1.0, 49)) {
        let (mesh, cut_info) = circle_setup();
        let space = LagrangeSpace::new(&mesh, 1).unwrap();
        prop_assume!(space.num_dofs() == values.len());
        let facets = ghost_penalty_facets(&mesh, &cut_info, Subdomain::Pos).unwrap();
        let stabilizer = GhostPenaltyStabilizer::new(&mesh, &space, &facets, GhostPenaltyConfig::default()).unwrap();
        let matrix = CsrAssembler::default().assemble(&stabilizer).unwrap();
        let v = DVector::from_vec(values);
        prop_assert!(v.dot(&spmv(&matrix, &v)) >= -1e-12);
    }
}
