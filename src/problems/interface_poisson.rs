//! Unfitted Nitsche discretization of an elliptic interface problem.
//!
//! Solves `-div(alpha_i grad u_i) = f_i` in the subdomains `Omega_neg` and `Omega_pos` of a
//! background mesh, with the interface conditions `[u] = 0` and `[alpha du/dn] = 0` imposed
//! weakly and Dirichlet data on the outer boundary. Each subdomain carries its own copy of
//! the background space, restricted to the elements touching it. The average flux uses the
//! cut-ratio weights `kappa_neg = |T_neg| / |T|` and `kappa_pos = 1 - kappa_neg`, and the
//! interface penalty is `lambda k^2 alpha_avg / h`.
use crate::active_set::{active_component_dofs, free_dofs, product_mask};
use crate::assembly::{
    CsrAssembler, CutBilinearForm, CutLinearForm, ElementMatrixAssembler, ElementVectorAssembler, Shape,
};
use crate::cut_info::{CutInfo, ElementCategory, ZeroSign};
use crate::cut_quadrature::{CutDomain, IntegrationPoint, LevelSetDomain};
use crate::deformation::{IsoparametricCorrector, MeshDeformation, MeshDeformationConfig};
use crate::error::CutFemError;
use crate::error_estimation::estimate_two_domain_L2_error;
use crate::ghost_penalty::{ghost_penalty_facets, GhostPenaltyConfig, GhostPenaltyStabilizer};
use crate::levelset::{LevelSetField, LevelSetFunction};
use crate::mask::DofMask;
use crate::mesh::TriangleMesh2d;
use crate::solve::{solve_restricted, LinearSolver};
use crate::space::{LagrangeSpace, PerSubdomain, Subdomain, TwoDomainSpace};
use crate::util::convert_scalar;
use crate::Real;
use log::info;
use nalgebra::{DVector, Point2, Vector2};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfacePoissonConfig {
    /// Polynomial order of the finite element space.
    pub order: usize,
    /// Diffusion coefficient `alpha` on each side of the interface.
    pub diffusion: PerSubdomain<f64>,
    /// Nitsche penalty parameter `lambda`.
    pub nitsche_penalty: f64,
    pub ghost_penalty: GhostPenaltyConfig,
    pub zero_sign: ZeroSign,
    /// Isoparametric correction of the geometry. Without it, integration uses the piecewise
    /// linear interface.
    pub deformation: Option<MeshDeformationConfig>,
    pub solver: LinearSolver,
}

impl Default for InterfacePoissonConfig {
    fn default() -> Self {
        Self {
            order: 2,
            diffusion: PerSubdomain::new(1.0, 2.0),
            nitsche_penalty: 20.0,
            ghost_penalty: GhostPenaltyConfig::default(),
            zero_sign: ZeroSign::default(),
            deformation: None,
            solver: LinearSolver::default(),
        }
    }
}

/// Source terms and outer Dirichlet data, one function per subdomain.
#[derive(Debug, Clone)]
pub struct InterfacePoissonData<S, D> {
    pub source: PerSubdomain<S>,
    pub dirichlet: PerSubdomain<D>,
}

/// A solved interface problem together with the geometric state it was computed on.
#[derive(Debug, Clone)]
pub struct InterfacePoissonSolution<T: Real> {
    pub space: TwoDomainSpace,
    pub levelset: LevelSetField<T>,
    pub cut_info: CutInfo<T>,
    pub deformation: Option<MeshDeformation<T>>,
    /// Dofs of the product space that were solved for.
    pub free_dofs: DofMask,
    pub coefficients: DVector<T>,
}

impl<T: Real> InterfacePoissonSolution<T> {
    /// The integration domain the solution was computed on, including its deformation.
    pub fn domain<'a>(&'a self, mesh: &'a TriangleMesh2d<T>) -> Result<CutDomain<'a, T>, CutFemError> {
        let domain = CutDomain::new(mesh, &self.levelset, &self.cut_info)?;
        match &self.deformation {
            Some(deformation) => domain.with_deformation(deformation),
            None => Ok(domain),
        }
    }

    /// L2 error against the exact solution, each component measured on its own subdomain.
    #[allow(non_snake_case)]
    pub fn L2_error<F>(&self, mesh: &TriangleMesh2d<T>, exact: &PerSubdomain<F>) -> Result<T, CutFemError>
    where
        F: Fn(&Point2<T>) -> T + Sync,
    {
        estimate_two_domain_L2_error(&self.domain(mesh)?, &self.space, &self.coefficients, exact)
    }
}

/// Discretizes and solves the interface problem for the interface `levelset = 0`.
pub fn solve_interface_poisson<T, L, S, D>(
    mesh: &TriangleMesh2d<T>,
    levelset: &L,
    data: &InterfacePoissonData<S, D>,
    config: &InterfacePoissonConfig,
) -> eyre::Result<InterfacePoissonSolution<T>>
where
    T: Real,
    L: LevelSetFunction<T>,
    S: Fn(&Point2<T>) -> T + Sync,
    D: Fn(&Point2<T>) -> T,
{
    let field = LevelSetField::interpolate(mesh, levelset);
    let cut_info = CutInfo::new(mesh, &field, config.zero_sign)?;
    let deformation = config
        .deformation
        .map(|deformation_config| {
            IsoparametricCorrector::new(deformation_config).compute(mesh, levelset, &field, &cut_info)
        })
        .transpose()?;
    let space = TwoDomainSpace::new(LagrangeSpace::new(mesh, config.order)?);

    let (free_dofs, coefficients) = {
        let mut domain = CutDomain::new(mesh, &field, &cut_info)?;
        if let Some(deformation) = &deformation {
            domain = domain.with_deformation(deformation)?;
        }
        assemble_and_solve(domain, &space, data, config)?
    };

    Ok(InterfacePoissonSolution {
        space,
        levelset: field,
        cut_info,
        deformation,
        free_dofs,
        coefficients,
    })
}

fn assemble_and_solve<T, S, D>(
    domain: CutDomain<'_, T>,
    space: &TwoDomainSpace,
    data: &InterfacePoissonData<S, D>,
    config: &InterfacePoissonConfig,
) -> eyre::Result<(DofMask, DVector<T>)>
where
    T: Real,
    S: Fn(&Point2<T>) -> T + Sync,
    D: Fn(&Point2<T>) -> T,
{
    let mesh = domain.mesh();
    let cut_info = domain.cut_info();
    let component_space = space.component_space();
    let alpha: PerSubdomain<T> = config.diffusion.map(|&a| convert_scalar(a));
    let alpha_avg = (alpha.neg + alpha.pos) / convert_scalar::<T>(2.0);
    let k = convert_scalar::<T>(config.order as f64);
    let lambda = convert_scalar::<T>(config.nitsche_penalty) * k * k * alpha_avg;

    let mut volume_forms = Vec::new();
    let mut source_forms = Vec::new();
    let mut ghost_penalties = Vec::new();
    for subdomain in Subdomain::ALL {
        let alpha_i = alpha[subdomain];
        let region = LevelSetDomain::new(subdomain.into());
        volume_forms.push(
            CutBilinearForm::new(
                domain,
                component_space,
                component_space,
                region,
                None,
                move |_: &IntegrationPoint<T>, u: &Shape<T>, v: &Shape<T>| alpha_i * u.gradient.dot(&v.gradient),
            )?
            .in_product_space(space, subdomain, subdomain),
        );
        let f = &data.source[subdomain];
        source_forms.push(
            CutLinearForm::new(domain, component_space, region, None, move |point: &IntegrationPoint<T>, v: &Shape<T>| {
                f(&point.point) * v.value
            })?
            .in_product_space(space, subdomain),
        );
        let facets = ghost_penalty_facets(mesh, cut_info, subdomain)?;
        ghost_penalties.push(
            GhostPenaltyStabilizer::new(mesh, component_space, &facets, config.ghost_penalty)?
                .with_coefficient(alpha_i)
                .in_product_space(space, subdomain),
        );
    }

    // Nitsche coupling, one block per (trial, test) pair of components
    let mut nitsche_forms = Vec::new();
    for trial in Subdomain::ALL {
        for test in Subdomain::ALL {
            let integrand = move |point: &IntegrationPoint<T>, u: &Shape<T>, v: &Shape<T>| {
                let n = point.normal.unwrap_or_else(Vector2::zeros);
                let kappa_neg = cut_info.cut_ratio(point.element);
                let kappa = PerSubdomain::new(kappa_neg, T::one() - kappa_neg);
                let h = mesh.element_diameter(point.element);
                let (s_u, s_v) = (trial.jump_sign::<T>(), test.jump_sign::<T>());
                let flux_u = kappa[trial] * alpha[trial] * u.gradient.dot(&n);
                let flux_v = kappa[test] * alpha[test] * v.gradient.dot(&n);
                -flux_u * s_v * v.value - flux_v * s_u * u.value + lambda / h * s_u * s_v * u.value * v.value
            };
            nitsche_forms.push(
                CutBilinearForm::new(
                    domain,
                    component_space,
                    component_space,
                    LevelSetDomain::interface(),
                    None,
                    integrand,
                )?
                .in_product_space(space, trial, test),
            );
        }
    }

    let mut matrix_assemblers: Vec<&(dyn Sync + ElementMatrixAssembler<T>)> = Vec::new();
    matrix_assemblers.extend(volume_forms.iter().map(|form| form as &(dyn Sync + ElementMatrixAssembler<T>)));
    matrix_assemblers.extend(nitsche_forms.iter().map(|form| form as &(dyn Sync + ElementMatrixAssembler<T>)));
    matrix_assemblers.extend(
        ghost_penalties
            .iter()
            .map(|form| form as &(dyn Sync + ElementMatrixAssembler<T>)),
    );
    let vector_assemblers: Vec<&(dyn Sync + ElementVectorAssembler<T>)> = source_forms
        .iter()
        .map(|form| form as &(dyn Sync + ElementVectorAssembler<T>))
        .collect();

    let assembler = CsrAssembler::default();
    let matrix = assembler.assemble_sum(&matrix_assemblers)?;
    let rhs = assembler.assemble_vector_sum(&vector_assemblers)?;

    // Dirichlet data on the outer boundary, zero on inactive dofs
    let boundary = component_space.boundary_dofs(mesh)?;
    let active = active_component_dofs(space, cut_info)?;
    let interior = boundary.complement();
    let free_components = PerSubdomain::new(free_dofs(&interior, &active.neg)?, free_dofs(&interior, &active.pos)?);
    let free = product_mask(space, &free_components)?;
    let nodes = component_space.node_positions(mesh)?;
    let mut fixed = DVector::zeros(space.num_dofs());
    for subdomain in Subdomain::ALL {
        let g = &data.dirichlet[subdomain];
        for dof in boundary.iter() {
            fixed[space.global_dof(subdomain, dof)] = g(&nodes[dof]);
        }
    }

    info!(
        "Interface problem: {} cut elements, {} of {} dofs free, {} nonzeros",
        cut_info.count(ElementCategory::If),
        free.count(),
        space.num_dofs(),
        matrix.nnz()
    );
    let coefficients = solve_restricted(&matrix, &rhs, &free, &fixed, &config.solver)?;
    Ok((free, coefficients))
}
