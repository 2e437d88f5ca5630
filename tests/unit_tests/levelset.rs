use cutfem::levelset::{
    Circle, FnLevelSet, FnSpaceTimeLevelSet, LevelSetField, LevelSetFunction, MovingCircle, SpaceTimeLevelSetField,
    SpaceTimeLevelSetFunction, SuperEllipse, TimeSlab,
};
use cutfem::mesh::procedural::create_square_tri_mesh_2d;
use matrixcompare::assert_scalar_eq;
use nalgebra::{Point2, Vector2};

#[test]
fn field_interpolates_vertex_values() {
    let mesh = create_square_tri_mesh_2d(1.0, 0.25).unwrap();
    let circle = Circle {
        center: Point2::new(0.1, -0.2),
        radius: 0.5,
    };
    let field = LevelSetField::interpolate(&mesh, &circle);
    assert_eq!(field.values().len(), mesh.num_vertices());
    for (value, x) in field.values().iter().zip(mesh.vertices()) {
        assert_scalar_eq!(*value, circle.evaluate(x), comp = abs, tol = 1e-14);
    }
}

#[test]
fn linear_levelset_is_reproduced_inside_elements() {
    let mesh = create_square_tri_mesh_2d(1.0, 0.5).unwrap();
    let linear = FnLevelSet::new(|x: &Point2<f64>| 2.0 * x.x - x.y + 0.1);
    let field = LevelSetField::interpolate(&mesh, &linear);
    let lambda = [0.2, 0.3, 0.5];
    for e in 0..mesh.num_elements() {
        let x = mesh.element(e).map_barycentric(&lambda);
        assert_scalar_eq!(field.evaluate(&mesh, e, &lambda), linear.evaluate(&x), comp = abs, tol = 1e-12);
        let gradient = field.element_gradient(&mesh, e);
        assert_scalar_eq!((gradient - Vector2::new(2.0, -1.0)).norm(), 0.0, comp = abs, tol = 1e-12);
    }
}

#[test]
fn update_draws_new_generation() {
    let mesh = create_square_tri_mesh_2d(1.0, 0.5).unwrap();
    let mut field = LevelSetField::interpolate(&mesh, &FnLevelSet::new(|x: &Point2<f64>| x.x));
    let before = field.generation();
    field.update(&mesh, &FnLevelSet::new(|x: &Point2<f64>| x.y)).unwrap();
    assert_ne!(field.generation(), before);

    // Fields are tied to the topology they were built on
    let refined = mesh.refine_uniformly().unwrap();
    let err = field.update(&refined, &FnLevelSet::new(|x: &Point2<f64>| x.y)).unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn superellipse_gradient_matches_finite_differences() {
    let shape = SuperEllipse::<f64> {
        exponent: 4.0,
        radius: 1.0,
    };
    let x = Point2::new(0.7, -0.4);
    let h = 1e-6;
    let fd = Vector2::new(
        (shape.evaluate(&Point2::new(x.x + h, x.y)) - shape.evaluate(&Point2::new(x.x - h, x.y))) / (2.0 * h),
        (shape.evaluate(&Point2::new(x.x, x.y + h)) - shape.evaluate(&Point2::new(x.x, x.y - h))) / (2.0 * h),
    );
    assert_scalar_eq!((LevelSetFunction::<f64>::gradient(&shape, &x) - fd).norm(), 0.0, comp = abs, tol = 1e-6);
}

#[test]
fn space_time_field_restricts_to_slab_ends() {
    let mesh = create_square_tri_mesh_2d(1.0, 0.5).unwrap();
    let moving = MovingCircle {
        radius: 0.5,
        center_path: |t: f64| Point2::new(t, 0.0),
    };
    let slab = TimeSlab::new(0.5, 0.25).unwrap();
    let field = SpaceTimeLevelSetField::interpolate(&mesh, &moving, slab, 1).unwrap();

    let bottom = field.restrict(0.0).unwrap();
    let top = field.restrict(1.0).unwrap();
    for (v, x) in mesh.vertices().iter().enumerate() {
        assert_scalar_eq!(bottom.values()[v], moving.evaluate(x, 0.5), comp = abs, tol = 1e-14);
        assert_scalar_eq!(top.values()[v], moving.evaluate(x, 0.75), comp = abs, tol = 1e-14);
    }
    assert_ne!(bottom.generation(), top.generation());
}

#[test]
fn restriction_interpolates_linearly_in_time() {
    let mesh = create_square_tri_mesh_2d(1.0, 0.5).unwrap();
    // Linear in time, so the linear temporal interpolant is exact
    let levelset = FnSpaceTimeLevelSet::new(|x: &Point2<f64>, t: f64| x.x - 0.5 + t);
    let slab = TimeSlab::new(1.0, 0.5).unwrap();
    let field = SpaceTimeLevelSetField::interpolate(&mesh, &levelset, slab, 1).unwrap();
    let middle = field.restrict(0.5).unwrap();
    for (value, x) in middle.values().iter().zip(mesh.vertices()) {
        assert_scalar_eq!(*value, x.x - 0.5 + 1.25, comp = abs, tol = 1e-14);
    }
}

#[test]
fn restriction_outside_the_slab_is_rejected() {
    let mesh = create_square_tri_mesh_2d(1.0, 0.5).unwrap();
    let levelset = FnSpaceTimeLevelSet::new(|x: &Point2<f64>, t: f64| x.x - t);
    let slab = TimeSlab::new(0.0, 0.1).unwrap();
    let field = SpaceTimeLevelSetField::interpolate(&mesh, &levelset, slab, 1).unwrap();
    assert!(field.restrict(1.5).unwrap_err().is_configuration());
    assert!(field.restrict(-0.1).unwrap_err().is_configuration());
}

#[test]
fn space_time_fields_need_linear_time_order_and_positive_steps() {
    let mesh = create_square_tri_mesh_2d(1.0, 0.5).unwrap();
    let levelset = FnSpaceTimeLevelSet::new(|x: &Point2<f64>, t: f64| x.x - t);
    let slab = TimeSlab::new(0.0, 0.1).unwrap();
    assert!(SpaceTimeLevelSetField::interpolate(&mesh, &levelset, slab, 0)
        .unwrap_err()
        .is_configuration());
    assert!(TimeSlab::new(0.0, 0.0).unwrap_err().is_configuration());
}

#[test]
fn space_time_update_moves_the_slab() {
    let mesh = create_square_tri_mesh_2d(1.0, 0.5).unwrap();
    let levelset = FnSpaceTimeLevelSet::new(|x: &Point2<f64>, t: f64| x.x - t);
    let mut field = SpaceTimeLevelSetField::interpolate(&mesh, &levelset, TimeSlab::new(0.0, 0.1).unwrap(), 1).unwrap();
    let before = field.generation();
    field.update(&mesh, &levelset, TimeSlab::new(0.1, 0.1).unwrap()).unwrap();
    assert_ne!(field.generation(), before);
    assert_scalar_eq!(field.slab().t_new(), 0.2, comp = abs, tol = 1e-14);
    let bottom = field.restrict(0.0).unwrap();
    for (value, x) in bottom.values().iter().zip(mesh.vertices()) {
        assert_scalar_eq!(*value, x.x - 0.1, comp = abs, tol = 1e-14);
    }
}
