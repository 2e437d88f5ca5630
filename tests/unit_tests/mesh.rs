use cutfem::deformation::MeshDeformation;
use cutfem::mesh::procedural::{create_rectangular_uniform_tri_mesh_2d, create_square_tri_mesh_2d};
use cutfem::mesh::BackgroundMesh;
use cutfem::space::LagrangeSpace;
use cutfem::util::Generation;
use matrixcompare::assert_scalar_eq;
use nalgebra::{Point2, Vector2};

#[test]
fn rectangular_mesh_topology() {
    let mesh = create_rectangular_uniform_tri_mesh_2d(&Point2::new(0.0, 0.0), &Point2::new(2.0, 3.0), 2, 3).unwrap();
    assert_eq!(mesh.num_vertices(), 12);
    assert_eq!(mesh.num_elements(), 12);
    // Horizontal, vertical and diagonal edges
    assert_eq!(mesh.num_facets(), 2 * 4 + 3 * 3 + 2 * 3);
    let num_boundary = mesh.facets().iter().filter(|f| f.is_boundary()).count();
    assert_eq!(num_boundary, 2 * (2 + 3));

    let boundary_vertices = mesh.boundary_vertices();
    assert_eq!(boundary_vertices.iter().filter(|&&b| b).count(), 10);

    let total_area: f64 = (0..mesh.num_elements()).map(|e| mesh.element(e).area()).sum();
    assert_scalar_eq!(total_area, 6.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(mesh.element_diameter(0), 2.0f64.sqrt(), comp = abs, tol = 1e-12);
}

#[test]
fn element_facets_are_consistent_with_facet_elements() {
    let mesh = create_square_tri_mesh_2d(1.0, 0.5).unwrap();
    for e in 0..mesh.num_elements() {
        for facet_index in mesh.element_facets(e) {
            let (a, b) = mesh.facets()[facet_index].elements();
            assert!(a == e || b == Some(e));
        }
    }
}

#[test]
fn invalid_meshes_are_rejected() {
    let min = Point2::new(0.0, 0.0);
    assert!(create_rectangular_uniform_tri_mesh_2d(&min, &Point2::new(1.0, 1.0), 0, 1)
        .unwrap_err()
        .is_configuration());
    assert!(create_rectangular_uniform_tri_mesh_2d(&min, &Point2::new(-1.0, 1.0), 1, 1)
        .unwrap_err()
        .is_configuration());
}

#[test]
fn uniform_refinement_quadruples_elements_and_preserves_area() {
    let mesh = create_square_tri_mesh_2d(1.0, 0.5).unwrap();
    let refined = mesh.refine_uniformly().unwrap();
    assert_eq!(refined.num_elements(), 4 * mesh.num_elements());
    assert_eq!(refined.num_vertices(), mesh.num_vertices() + mesh.num_facets());
    assert_ne!(refined.generation(), mesh.generation());

    let area = |m: &cutfem::mesh::TriangleMesh2d<f64>| (0..m.num_elements()).map(|e| m.element(e).area()).sum::<f64>();
    assert_scalar_eq!(area(&refined), area(&mesh), comp = abs, tol = 1e-12);
    assert_scalar_eq!(refined.max_diameter(), 0.5 * mesh.max_diameter(), comp = abs, tol = 1e-12);
}

#[test]
fn background_mesh_refinement_requires_unset_deformation() {
    let mesh = create_square_tri_mesh_2d(1.0, 0.5).unwrap();
    let space = LagrangeSpace::new(&mesh, 1).unwrap();
    let displacements = vec![Vector2::zeros(); space.num_dofs()];
    let deformation = MeshDeformation::from_displacements(&mesh, space, displacements, Generation::next()).unwrap();

    let mut background = BackgroundMesh::new(mesh);
    background.set_deformation(deformation).unwrap();
    let err = background.refine_uniformly().unwrap_err();
    assert!(err.is_stale_state());

    let deformation = background.unset_deformation().unwrap();
    background.refine_uniformly().unwrap();
    // The old deformation belongs to the old topology
    assert!(background.set_deformation(deformation).unwrap_err().is_configuration());
}
