use cutfem::mesh::procedural::create_rectangular_uniform_tri_mesh_2d;
use cutfem::mesh::TriangleMesh2d;
use cutfem::util::estimate_convergence_rate;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::PathBuf;

/// For serializing to JSON for subsequent analysis/plots
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub name: String,
    /// Mesh sizes, measured as the cell width of the uniform background mesh.
    pub resolutions: Vec<f64>,
    pub errors: Vec<f64>,
    pub rate: f64,
}

impl ErrorSummary {
    pub fn new(name: impl Into<String>, resolutions: Vec<f64>, errors: Vec<f64>) -> Self {
        assert_eq!(resolutions.len(), errors.len());
        let rate = estimate_convergence_rate(&resolutions, &errors);
        Self {
            name: name.into(),
            resolutions,
            errors,
            rate,
        }
    }

    pub fn assert_decreasing(&self) {
        for pair in self.errors.windows(2) {
            assert!(pair[1] < pair[0], "Errors do not decrease: {:?}", self.errors);
        }
    }

    /// Writes the summary to `data/convergence_tests/<test_name>/<name>_summary.json`.
    pub fn write(&self, test_name: &str) {
        let base_path = PathBuf::from("data/convergence_tests/").join(test_name);
        std::fs::create_dir_all(&base_path).expect("Failed to create output directory");
        let mut summary_file = File::create(base_path.join(format!("{}_summary.json", self.name))).unwrap();
        serde_json::to_writer_pretty(&mut summary_file, self).expect("Failed to write JSON output to directory");
    }
}

pub fn unit_square_mesh(resolution: usize) -> TriangleMesh2d<f64> {
    create_rectangular_uniform_tri_mesh_2d(&Point2::new(0.0, 0.0), &Point2::new(1.0, 1.0), resolution, resolution)
        .unwrap()
}

/// Uniform mesh of `[-1.5, 1.5]^2` with `cells` cells per dimension, i.e. cell width
/// `3 / cells`.
pub fn centered_square_mesh(cells: usize) -> TriangleMesh2d<f64> {
    create_rectangular_uniform_tri_mesh_2d(&Point2::new(-1.5, -1.5), &Point2::new(1.5, 1.5), cells, cells).unwrap()
}

/// Empirical orders of convergence between successive levels.
pub fn successive_rates(resolutions: &[f64], errors: &[f64]) -> Vec<f64> {
    resolutions
        .windows(2)
        .zip(errors.windows(2))
        .map(|(h, e)| (e[1] / e[0]).ln() / (h[1] / h[0]).ln())
        .collect()
}
