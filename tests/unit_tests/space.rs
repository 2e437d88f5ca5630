use cutfem::mesh::procedural::create_rectangular_uniform_tri_mesh_2d;
use cutfem::space::{LagrangeSpace, PerSubdomain, SpaceTimeSpace, Subdomain, TwoDomainSpace};
use matrixcompare::assert_scalar_eq;
use nalgebra::{DVector, Point2};
use paste::paste;

fn unit_square_mesh(nx: usize, ny: usize) -> cutfem::mesh::TriangleMesh2d<f64> {
    create_rectangular_uniform_tri_mesh_2d(&Point2::new(0.0, 0.0), &Point2::new(1.0, 1.0), nx, ny).unwrap()
}

macro_rules! space_tests_for_order {
    ($order:expr) => {
        paste! {
            #[test]
            fn [<dof_counts_order_ $order>]() {
                let mesh = unit_square_mesh(2, 3);
                let space = LagrangeSpace::new(&mesh, $order).unwrap();
                let k: usize = $order;
                let expected = mesh.num_vertices()
                    + (k - 1) * mesh.num_facets()
                    + (k - 1) * k.saturating_sub(2) / 2 * mesh.num_elements();
                assert_eq!(space.num_dofs(), expected);
                assert_eq!(space.dofs_per_element(), (k + 1) * (k + 2) / 2);

                // Every dof belongs to some element
                let mut seen = vec![false; space.num_dofs()];
                for e in 0..mesh.num_elements() {
                    for &dof in space.element_dofs(e) {
                        seen[dof] = true;
                    }
                }
                assert!(seen.iter().all(|&s| s));
            }

            #[test]
            fn [<boundary_dofs_order_ $order>]() {
                let mesh = unit_square_mesh(2, 3);
                let space = LagrangeSpace::new(&mesh, $order).unwrap();
                let boundary = space.boundary_dofs(&mesh).unwrap();
                // 10 boundary vertices and 10 boundary edges
                assert_eq!(boundary.count(), 10 * $order);
                let nodes = space.node_positions(&mesh).unwrap();
                for dof in boundary.iter() {
                    let x = nodes[dof];
                    let on_boundary = x.x.abs() < 1e-12
                        || (x.x - 1.0).abs() < 1e-12
                        || x.y.abs() < 1e-12
                        || (x.y - 1.0).abs() < 1e-12;
                    assert!(on_boundary, "dof {} at {:?} is not on the boundary", dof, x);
                }
            }

            #[test]
            fn [<nodal_interpolation_reproduces_polynomials_order_ $order>]() {
                let mesh = unit_square_mesh(3, 2);
                let space = LagrangeSpace::new(&mesh, $order).unwrap();
                let k: i32 = $order;
                let f = |x: &Point2<f64>| 1.0 + x.x.powi(k) - 2.0 * x.y.powi(k) + 0.5 * x.x.powi(k - 1) * x.y;
                let nodes = space.node_positions(&mesh).unwrap();
                let coefficients = DVector::from_iterator(nodes.len(), nodes.iter().map(&f));
                let lambda = [0.2, 0.3, 0.5];
                for e in 0..mesh.num_elements() {
                    let x = mesh.element(e).map_barycentric(&lambda);
                    assert_scalar_eq!(space.evaluate(&coefficients, e, &lambda), f(&x), comp = abs, tol = 1e-12);
                }
            }
        }
    };
}

space_tests_for_order!(1);
space_tests_for_order!(2);
space_tests_for_order!(3);

#[test]
fn vertex_dofs_come_first() {
    let mesh = unit_square_mesh(2, 2);
    let space = LagrangeSpace::new(&mesh, 2).unwrap();
    for e in 0..mesh.num_elements() {
        let vertices = mesh.connectivity()[e].0;
        assert_eq!(&space.element_dofs(e)[..3], &vertices);
    }
}

#[test]
fn spaces_reject_other_meshes() {
    let mesh = unit_square_mesh(2, 2);
    let space = LagrangeSpace::new(&mesh, 1).unwrap();
    let refined = mesh.refine_uniformly().unwrap();
    assert!(space.check_mesh(&mesh).is_ok());
    assert!(space.check_mesh(&refined).unwrap_err().is_configuration());
    assert!(LagrangeSpace::new(&mesh, 0).unwrap_err().is_configuration());
}

#[test]
fn two_domain_space_layout() {
    let mesh = unit_square_mesh(2, 2);
    let space = TwoDomainSpace::new(LagrangeSpace::new(&mesh, 1).unwrap());
    let n = space.component_space().num_dofs();
    assert_eq!(space.num_dofs(), 2 * n);
    assert_eq!(space.global_dof(Subdomain::Neg, 3), 3);
    assert_eq!(space.global_dof(Subdomain::Pos, 3), n + 3);

    let coefficients = DVector::from_fn(2 * n, |i, _| i as f64);
    let pos = space.component(&coefficients, Subdomain::Pos);
    assert_eq!(pos.len(), n);
    assert_eq!(pos[0], n as f64);

    assert_eq!(Subdomain::Neg.jump_sign::<f64>(), 1.0);
    assert_eq!(Subdomain::Pos.jump_sign::<f64>(), -1.0);
    assert_eq!(Subdomain::Neg.other(), Subdomain::Pos);
    let values = PerSubdomain::from_fn(|s| if s == Subdomain::Neg { 1.0 } else { 2.0 });
    assert_eq!(values[Subdomain::Pos], 2.0);
    assert_eq!(values.map(|v| 2.0 * v), PerSubdomain::new(2.0, 4.0));
}

#[test]
fn space_time_dofs_are_time_node_major() {
    let mesh = unit_square_mesh(1, 1);
    let spatial = LagrangeSpace::new(&mesh, 1).unwrap();
    let space = SpaceTimeSpace::new(spatial, 1).unwrap();
    assert_eq!(space.num_dofs(), 8);
    assert_eq!(space.dofs_per_element(), 6);
    assert_eq!(space.global_dof(2, 1), 6);

    let mut dofs = vec![0; 6];
    space.populate_element_dofs(&mut dofs, 0);
    let spatial_dofs = space.spatial().element_dofs(0).to_vec();
    assert_eq!(&dofs[..3], spatial_dofs.as_slice());
    let shifted: Vec<_> = spatial_dofs.iter().map(|d| d + 4).collect();
    assert_eq!(&dofs[3..], shifted.as_slice());
}

#[test]
fn restriction_to_time_interpolates_between_nodes() {
    let mesh = unit_square_mesh(1, 1);
    let space = SpaceTimeSpace::new(LagrangeSpace::new(&mesh, 1).unwrap(), 1).unwrap();
    // Value 1 at the bottom of the slab and 3 at the top
    let coefficients = DVector::from_fn(8, |i, _| if i < 4 { 1.0 } else { 3.0 });
    let bottom = space.restrict_to_time(&coefficients, 0.0).unwrap();
    let middle = space.restrict_to_time(&coefficients, 0.5).unwrap();
    let top = space.restrict_to_time(&coefficients, 1.0).unwrap();
    assert_eq!(bottom, DVector::from_element(4, 1.0));
    assert_scalar_eq!((middle - DVector::from_element(4, 2.0)).amax(), 0.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!((top - DVector::from_element(4, 3.0)).amax(), 0.0, comp = abs, tol = 1e-14);

    assert!(space.restrict_to_time(&coefficients, 1.5).unwrap_err().is_configuration());
    assert!(space
        .restrict_to_time(&DVector::zeros(3), 0.5)
        .unwrap_err()
        .is_configuration());
}
