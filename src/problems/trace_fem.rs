//! TraceFEM discretization of the Laplace-Beltrami problem `-Δ_Γ u + u = f` on a closed
//! interface.
//!
//! The unknowns are the dofs of the background space on cut elements. Tangential gradients
//! are taken with the discrete interface normal. A normal-diffusion term `rho/h (∇u·n)(∇v·n)`
//! on the full cut elements removes the kernel of the restricted system.
use crate::active_set::active_dofs_of;
use crate::assembly::{CsrAssembler, CutBilinearForm, CutLinearForm, ElementMatrixAssembler, Shape};
use crate::cut_info::{CutInfo, ElementCategory, ZeroSign};
use crate::cut_quadrature::{CutDomain, IntegrationPoint, LevelSetDomain};
use crate::deformation::{IsoparametricCorrector, MeshDeformation, MeshDeformationConfig};
use crate::error::CutFemError;
use crate::error_estimation::estimate_L2_error;
use crate::levelset::{LevelSetField, LevelSetFunction};
use crate::mask::DofMask;
use crate::mesh::TriangleMesh2d;
use crate::solve::{solve_restricted, LinearSolver};
use crate::space::LagrangeSpace;
use crate::util::convert_scalar;
use crate::Real;
use log::info;
use nalgebra::{DVector, Point2, Vector2};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceFemConfig {
    pub order: usize,
    /// Factor `rho` of the normal-diffusion stabilization `rho / h`.
    pub normal_stabilization: f64,
    pub zero_sign: ZeroSign,
    pub deformation: Option<MeshDeformationConfig>,
    pub solver: LinearSolver,
}

impl Default for TraceFemConfig {
    fn default() -> Self {
        Self {
            order: 1,
            normal_stabilization: 1.0,
            zero_sign: ZeroSign::default(),
            deformation: None,
            solver: LinearSolver::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TraceFemSolution<T: Real> {
    pub space: LagrangeSpace,
    pub levelset: LevelSetField<T>,
    pub cut_info: CutInfo<T>,
    pub deformation: Option<MeshDeformation<T>>,
    pub free_dofs: DofMask,
    pub coefficients: DVector<T>,
}

impl<T: Real> TraceFemSolution<T> {
    pub fn domain<'a>(&'a self, mesh: &'a TriangleMesh2d<T>) -> Result<CutDomain<'a, T>, CutFemError> {
        let domain = CutDomain::new(mesh, &self.levelset, &self.cut_info)?;
        match &self.deformation {
            Some(deformation) => domain.with_deformation(deformation),
            None => Ok(domain),
        }
    }

    /// L2 error on the discrete interface.
    #[allow(non_snake_case)]
    pub fn L2_error<F>(&self, mesh: &TriangleMesh2d<T>, exact: F) -> Result<T, CutFemError>
    where
        F: Fn(&Point2<T>) -> T + Sync,
    {
        estimate_L2_error(
            &self.domain(mesh)?,
            &self.space,
            &self.coefficients,
            &LevelSetDomain::interface(),
            None,
            exact,
        )
    }
}

/// Tangential part `(I - n n^T) g` of a vector.
fn tangential<T: Real>(g: &Vector2<T>, n: &Vector2<T>) -> Vector2<T> {
    g - n * n.dot(g)
}

pub fn solve_trace_fem<T, L, S>(
    mesh: &TriangleMesh2d<T>,
    levelset: &L,
    source: S,
    config: &TraceFemConfig,
) -> eyre::Result<TraceFemSolution<T>>
where
    T: Real,
    L: LevelSetFunction<T>,
    S: Fn(&Point2<T>) -> T + Sync,
{
    let field = LevelSetField::interpolate(mesh, levelset);
    let cut_info = CutInfo::new(mesh, &field, config.zero_sign)?;
    let deformation = config
        .deformation
        .map(|deformation_config| {
            IsoparametricCorrector::new(deformation_config).compute(mesh, levelset, &field, &cut_info)
        })
        .transpose()?;
    let space = LagrangeSpace::new(mesh, config.order)?;

    let (free_dofs, coefficients) = {
        let mut domain = CutDomain::new(mesh, &field, &cut_info)?;
        if let Some(deformation) = &deformation {
            domain = domain.with_deformation(deformation)?;
        }
        assemble_and_solve(domain, &field, &space, &source, config)?
    };

    Ok(TraceFemSolution {
        space,
        levelset: field,
        cut_info,
        deformation,
        free_dofs,
        coefficients,
    })
}

fn assemble_and_solve<T, S>(
    domain: CutDomain<'_, T>,
    field: &LevelSetField<T>,
    space: &LagrangeSpace,
    source: &S,
    config: &TraceFemConfig,
) -> eyre::Result<(DofMask, DVector<T>)>
where
    T: Real,
    S: Fn(&Point2<T>) -> T + Sync,
{
    let mesh = domain.mesh();
    let cut_elements = domain.cut_info().elements(ElementCategory::If);
    let rho = convert_scalar::<T>(config.normal_stabilization);

    let surface = CutBilinearForm::new(
        domain,
        space,
        space,
        LevelSetDomain::interface(),
        None,
        |point: &IntegrationPoint<T>, u: &Shape<T>, v: &Shape<T>| {
            let n = point.normal.unwrap_or_else(Vector2::zeros);
            tangential(&u.gradient, &n).dot(&tangential(&v.gradient, &n)) + u.value * v.value
        },
    )?;

    // The discrete normal in the bulk is the normalized gradient of the linear level set
    let normal_diffusion = |point: &IntegrationPoint<T>, u: &Shape<T>, v: &Shape<T>| {
        let gradient = field.element_gradient(mesh, point.element);
        let norm = gradient.norm();
        if norm == T::zero() {
            return T::zero();
        }
        let n = gradient / norm;
        rho / mesh.element_diameter(point.element) * u.gradient.dot(&n) * v.gradient.dot(&n)
    };
    let stabilization_neg = CutBilinearForm::new(
        domain,
        space,
        space,
        LevelSetDomain::neg(),
        Some(&cut_elements),
        normal_diffusion,
    )?;
    let stabilization_pos = CutBilinearForm::new(
        domain,
        space,
        space,
        LevelSetDomain::pos(),
        Some(&cut_elements),
        normal_diffusion,
    )?;

    let load = CutLinearForm::new(
        domain,
        space,
        LevelSetDomain::interface(),
        None,
        |point: &IntegrationPoint<T>, v: &Shape<T>| source(&point.point) * v.value,
    )?;

    let assembler = CsrAssembler::default();
    let matrix = assembler.assemble_sum(&[
        &surface as &(dyn Sync + ElementMatrixAssembler<T>),
        &stabilization_neg as &(dyn Sync + ElementMatrixAssembler<T>),
        &stabilization_pos as &(dyn Sync + ElementMatrixAssembler<T>),
    ])?;
    let rhs = assembler.assemble_vector(&load)?;

    let free = active_dofs_of(space, domain.cut_info(), ElementCategory::If)?;
    info!(
        "TraceFEM: {} cut elements, {} of {} dofs active",
        cut_elements.count(),
        free.count(),
        space.num_dofs()
    );
    let fixed = DVector::zeros(space.num_dofs());
    let coefficients = solve_restricted(&matrix, &rhs, &free, &fixed, &config.solver)?;
    Ok((free, coefficients))
}
