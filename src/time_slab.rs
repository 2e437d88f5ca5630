//! Space-time discontinuous Galerkin time stepping on moving domains.
//!
//! Solves the convection-diffusion problem
//!
//! ```text
//! du/dt + w . grad u - alpha Δu = f   in Ω(t) = {phi(., t) < 0},
//! alpha du/dn = 0                     on the moving boundary,
//! ```
//!
//! slab by slab. On every slab `[t_old, t_old + dt]` the unknown is a tensor product of the
//! background space and a Lagrange basis in time, restricted to the elements that touch the
//! domain at some time during the slab. Slabs are coupled by upwinding in time: the bottom
//! trace of the new solution is weakly equal to the top trace of the previous one.
//!
//! [`TimeSlabDriver`] enforces the order of the per-slab transitions
//! `GeometryUpdated -> SystemAssembled -> Solved -> Finalized`; calling a transition out of
//! order is a [`CutFemError::StaleState`] error.
use crate::active_set::active_space_time_dofs;
use crate::assembly::{
    CsrAssembler, CutBilinearForm, CutLinearForm, ElementMatrixAssembler, ElementVectorAssembler, Shape,
};
use crate::cut_info::{CutInfo, ElementCategory, ZeroSign};
use crate::cut_quadrature::{CutDomain, IntegrationPoint, LevelSetDomain};
use crate::error::CutFemError;
use crate::error_estimation::estimate_L2_error;
use crate::ghost_penalty::{ghost_penalty_facets, GhostPenaltyConfig, GhostPenaltyStabilizer};
use crate::interpolate::interpolate;
use crate::levelset::{LevelSetField, SpaceTimeLevelSetField, SpaceTimeLevelSetFunction, TimeSlab};
use crate::mesh::TriangleMesh2d;
use crate::solve::{solve_restricted, LinearSolver};
use crate::space::{LagrangeSpace, SpaceTimeSpace, Subdomain};
use crate::util::{convert_scalar, to_f64, Generation};
use crate::Real;
use log::{debug, info};
use nalgebra::{DVector, Point2, Vector2};
use nalgebra_sparse::CsrMatrix;
use serde::{Deserialize, Serialize};

/// Data of a convection-diffusion problem on a moving domain.
///
/// The velocity is expected to be compatible with the motion of the domain, so that the
/// homogeneous Neumann condition on the moving boundary conserves mass.
pub trait MovingDomainProblem<T: Real>: Sync {
    type LevelSet: SpaceTimeLevelSetFunction<T>;

    /// The level set whose negative part is the physical domain.
    fn levelset(&self) -> &Self::LevelSet;

    fn diffusion(&self) -> T;

    fn velocity(&self, x: &Point2<T>, t: T) -> Vector2<T>;

    fn source(&self, x: &Point2<T>, t: T) -> T;

    fn initial_value(&self, x: &Point2<T>) -> T;

    /// The exact solution, if known. Used to report errors after every slab.
    fn exact_solution(&self, _x: &Point2<T>, _t: T) -> Option<T> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpaceTimeConfig {
    /// Spatial polynomial order.
    pub order: usize,
    /// Polynomial order in time of the discrete solution.
    pub time_order: usize,
    /// Polynomial order in time of the level-set approximation.
    pub levelset_time_order: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub dt: f64,
    pub ghost_penalty: GhostPenaltyConfig,
    pub zero_sign: ZeroSign,
    pub solver: LinearSolver,
}

impl Default for SpaceTimeConfig {
    fn default() -> Self {
        Self {
            order: 1,
            time_order: 1,
            levelset_time_order: 1,
            start_time: 0.0,
            end_time: 0.5,
            dt: 0.0625,
            ghost_penalty: GhostPenaltyConfig::default(),
            zero_sign: ZeroSign::default(),
            // The convection term makes the system non-symmetric
            solver: LinearSolver::DenseLu,
        }
    }
}

/// Position of a [`TimeSlabDriver`] in the per-slab cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlabState {
    GeometryUpdated,
    SystemAssembled,
    Solved,
    /// The previous slab (or the initial condition) is complete. The driver starts here.
    Finalized,
}

/// Summary of one completed slab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlabReport {
    pub index: usize,
    pub t_old: f64,
    pub t_new: f64,
    pub cut_elements: usize,
    pub active_dofs: usize,
    pub ghost_penalty_facets: usize,
    /// L2 error at the top of the slab, if the problem has an exact solution.
    pub l2_error: Option<f64>,
}

/// Geometry of the current slab: the space-time level set, its restrictions to the bottom
/// and top of the slab, and the matching classifications.
#[derive(Debug)]
struct SlabGeometry<T: Real> {
    slab: TimeSlab<T>,
    levelset: SpaceTimeLevelSetField<T>,
    cut_info: CutInfo<T>,
    bottom: LevelSetField<T>,
    bottom_cut_info: CutInfo<T>,
    top: LevelSetField<T>,
    top_cut_info: CutInfo<T>,
}

#[derive(Debug)]
struct SlabSystem<T: Real> {
    matrix: CsrMatrix<T>,
    rhs: DVector<T>,
    levelset_generation: Generation,
    ghost_penalty_facets: usize,
}

#[derive(Debug)]
pub struct TimeSlabDriver<'a, T: Real, P> {
    mesh: &'a TriangleMesh2d<T>,
    problem: &'a P,
    config: SpaceTimeConfig,
    space: SpaceTimeSpace,
    state: SlabState,
    time: T,
    dt: T,
    end_time: T,
    /// Spatial coefficients at `time`: the initial condition or the top trace of the
    /// previous slab.
    current: DVector<T>,
    geometry: Option<SlabGeometry<T>>,
    system: Option<SlabSystem<T>>,
    solution: Option<DVector<T>>,
    active_dofs: usize,
    reports: Vec<SlabReport>,
}

impl<'a, T, P> TimeSlabDriver<'a, T, P>
where
    T: Real,
    P: MovingDomainProblem<T>,
{
    pub fn new(mesh: &'a TriangleMesh2d<T>, problem: &'a P, config: SpaceTimeConfig) -> eyre::Result<Self> {
        if !(config.dt > 0.0) {
            return Err(CutFemError::configuration(format!("time step must be positive, got {}", config.dt)).into());
        }
        if config.end_time < config.start_time {
            return Err(CutFemError::configuration("end time lies before the start time").into());
        }
        let spatial = LagrangeSpace::new(mesh, config.order)?;
        let current = interpolate(&spatial, mesh, |x| problem.initial_value(x))?;
        let space = SpaceTimeSpace::new(spatial, config.time_order)?;
        Ok(Self {
            mesh,
            problem,
            space,
            state: SlabState::Finalized,
            time: convert_scalar(config.start_time),
            dt: convert_scalar(config.dt),
            end_time: convert_scalar(config.end_time),
            config,
            current,
            geometry: None,
            system: None,
            solution: None,
            active_dofs: 0,
            reports: Vec::new(),
        })
    }

    pub fn state(&self) -> SlabState {
        self.state
    }

    /// Start time of the next slab, or end time of the last finalized one.
    pub fn time(&self) -> T {
        self.time
    }

    pub fn space(&self) -> &SpaceTimeSpace {
        &self.space
    }

    pub fn config(&self) -> &SpaceTimeConfig {
        &self.config
    }

    /// Spatial coefficients of the solution at [`time`](Self::time).
    pub fn current_solution(&self) -> &DVector<T> {
        &self.current
    }

    /// Space-time coefficients of the last solved slab.
    pub fn slab_solution(&self) -> Option<&DVector<T>> {
        self.solution.as_ref()
    }

    /// The top level set of the current slab, which describes the domain at the end of the
    /// slab.
    pub fn top_levelset(&self) -> Option<&LevelSetField<T>> {
        self.geometry.as_ref().map(|geometry| &geometry.top)
    }

    pub fn reports(&self) -> &[SlabReport] {
        &self.reports
    }

    /// Whether the remaining time is less than half a time step, so no further slab is
    /// taken.
    pub fn is_finished(&self) -> bool {
        self.end_time - self.time < self.dt / convert_scalar(2.0)
    }

    fn expect_state(&self, expected: SlabState, transition: &str) -> Result<(), CutFemError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CutFemError::stale(format!(
                "cannot {} in state {:?}, expected {:?}",
                transition, self.state, expected
            )))
        }
    }

    /// Re-interpolates the level set on the next slab, restricts it to the bottom and top of
    /// the slab and reclassifies all elements.
    pub fn update_geometry(&mut self) -> eyre::Result<()> {
        self.expect_state(SlabState::Finalized, "update the geometry")?;
        if self.is_finished() {
            return Err(CutFemError::configuration("no time slab remains before the end time").into());
        }
        let slab = TimeSlab::new(self.time, self.dt)?;
        let levelset = match self.geometry.take() {
            Some(SlabGeometry { mut levelset, .. }) => {
                levelset.update(self.mesh, self.problem.levelset(), slab)?;
                levelset
            }
            None => SpaceTimeLevelSetField::interpolate(
                self.mesh,
                self.problem.levelset(),
                slab,
                self.config.levelset_time_order,
            )?,
        };
        let zero_sign = self.config.zero_sign;
        let cut_info = CutInfo::new_space_time(self.mesh, &levelset, zero_sign)?;
        let bottom = levelset.restrict(T::zero())?;
        let bottom_cut_info = CutInfo::new(self.mesh, &bottom, zero_sign)?;
        let top = levelset.restrict(T::one())?;
        let top_cut_info = CutInfo::new(self.mesh, &top, zero_sign)?;
        self.geometry = Some(SlabGeometry {
            slab,
            levelset,
            cut_info,
            bottom,
            bottom_cut_info,
            top,
            top_cut_info,
        });
        self.system = None;
        self.solution = None;
        self.state = SlabState::GeometryUpdated;
        Ok(())
    }

    fn geometry(&self) -> Result<&SlabGeometry<T>, CutFemError> {
        self.geometry
            .as_ref()
            .ok_or_else(|| CutFemError::stale("no slab geometry is available"))
    }

    /// Assembles the space-time system of the current slab on the elements touching the
    /// domain during the slab.
    pub fn assemble(&mut self) -> eyre::Result<()> {
        self.expect_state(SlabState::GeometryUpdated, "assemble")?;
        let geometry = self.geometry()?;
        let system = assemble_slab(self.mesh, self.problem, &self.space, geometry, &self.current, &self.config)?;
        self.system = Some(system);
        self.state = SlabState::SystemAssembled;
        Ok(())
    }

    /// Solves the assembled system for the dofs of elements touching the domain.
    ///
    /// A singular system is fatal: the error is returned and the driver stays in the
    /// assembled state.
    pub fn solve(&mut self) -> eyre::Result<()> {
        self.expect_state(SlabState::SystemAssembled, "solve")?;
        let geometry = self.geometry()?;
        let system = self
            .system
            .as_ref()
            .ok_or_else(|| CutFemError::stale("no assembled system is available"))?;
        if system.levelset_generation != geometry.levelset.generation() {
            return Err(CutFemError::stale("assembled system does not match the current slab geometry").into());
        }
        let elements = geometry.cut_info.elements(ElementCategory::HasNeg);
        let active = active_space_time_dofs(&self.space, &elements)?;
        let fixed = DVector::zeros(self.space.num_dofs());
        let solution = solve_restricted(&system.matrix, &system.rhs, &active, &fixed, &self.config.solver)?;
        self.active_dofs = active.count();
        self.solution = Some(solution);
        self.state = SlabState::Solved;
        Ok(())
    }

    /// Restricts the slab solution to the top of the slab, which becomes the initial data of
    /// the next slab, and reports the error at the end of the slab.
    pub fn finalize(&mut self) -> eyre::Result<&SlabReport> {
        self.expect_state(SlabState::Solved, "finalize")?;
        let geometry = self.geometry()?;
        let solution = self
            .solution
            .as_ref()
            .ok_or_else(|| CutFemError::stale("no slab solution is available"))?;
        let top_solution = self.space.restrict_to_time(solution, T::one())?;

        let t_new = geometry.slab.t_new();
        let problem = self.problem;
        let l2_error = if problem.exact_solution(&self.mesh.vertices()[0], t_new).is_some() {
            let top_domain = CutDomain::new(self.mesh, &geometry.top, &geometry.top_cut_info)?;
            let error = estimate_L2_error(
                &top_domain,
                self.space.spatial(),
                &top_solution,
                &LevelSetDomain::neg(),
                None,
                |x| problem.exact_solution(x, t_new).unwrap_or_else(T::zero),
            )?;
            Some(to_f64(error))
        } else {
            None
        };

        let report = SlabReport {
            index: self.reports.len(),
            t_old: to_f64(geometry.slab.t_old()),
            t_new: to_f64(t_new),
            cut_elements: geometry.cut_info.count(ElementCategory::If),
            active_dofs: self.active_dofs,
            ghost_penalty_facets: self.system.as_ref().map_or(0, |system| system.ghost_penalty_facets),
            l2_error,
        };
        info!(
            "Finalized slab {} on [{:.4}, {:.4}]: {} active dofs, L2 error {:?}",
            report.index, report.t_old, report.t_new, report.active_dofs, report.l2_error
        );

        self.current = top_solution;
        self.time = t_new;
        self.state = SlabState::Finalized;
        self.reports.push(report);
        let report = self
            .reports
            .last()
            .ok_or_else(|| CutFemError::stale("slab report was not recorded"))?;
        Ok(report)
    }

    /// Runs all four transitions of one slab.
    pub fn step(&mut self) -> eyre::Result<SlabReport> {
        self.update_geometry()?;
        self.assemble()?;
        self.solve()?;
        Ok(self.finalize()?.clone())
    }

    /// Steps until the remaining time is less than half a time step.
    pub fn run(&mut self) -> eyre::Result<&[SlabReport]> {
        while !self.is_finished() {
            self.step()?;
        }
        Ok(&self.reports)
    }
}

fn assemble_slab<T, P>(
    mesh: &TriangleMesh2d<T>,
    problem: &P,
    space: &SpaceTimeSpace,
    geometry: &SlabGeometry<T>,
    previous: &DVector<T>,
    config: &SpaceTimeConfig,
) -> eyre::Result<SlabSystem<T>>
where
    T: Real,
    P: MovingDomainProblem<T>,
{
    let slab = geometry.slab;
    let domain = CutDomain::space_time(mesh, &geometry.levelset, &geometry.cut_info)?;
    let bottom_domain = CutDomain::new(mesh, &geometry.bottom, &geometry.bottom_cut_info)?;
    let has_neg = geometry.cut_info.elements(ElementCategory::HasNeg);
    let alpha = problem.diffusion();
    let spatial = space.spatial();

    let bulk = CutBilinearForm::new(
        domain,
        space,
        space,
        LevelSetDomain::neg(),
        Some(&has_neg),
        |point: &IntegrationPoint<T>, u: &Shape<T>, v: &Shape<T>| {
            let t = slab.physical_time(point.time.unwrap_or_else(T::zero));
            let w = problem.velocity(&point.point, t);
            (u.time_derivative + w.dot(&u.gradient)) * v.value + alpha * u.gradient.dot(&v.gradient)
        },
    )?;
    let bottom = CutBilinearForm::at_time(
        bottom_domain,
        space,
        space,
        LevelSetDomain::neg(),
        None,
        T::zero(),
        |_: &IntegrationPoint<T>, u: &Shape<T>, v: &Shape<T>| u.value * v.value,
    )?;
    let facets = ghost_penalty_facets(mesh, &geometry.cut_info, Subdomain::Neg)?;
    let ghost_penalty = GhostPenaltyStabilizer::space_time(mesh, space, &facets, config.ghost_penalty, slab)?;

    let source = CutLinearForm::new(
        domain,
        space,
        LevelSetDomain::neg(),
        Some(&has_neg),
        |point: &IntegrationPoint<T>, v: &Shape<T>| {
            let t = slab.physical_time(point.time.unwrap_or_else(T::zero));
            problem.source(&point.point, t) * v.value
        },
    )?;
    let upwind = CutLinearForm::at_time(
        bottom_domain,
        space,
        LevelSetDomain::neg(),
        None,
        T::zero(),
        |point: &IntegrationPoint<T>, v: &Shape<T>| {
            spatial.evaluate(previous, point.element, &point.barycentric) * v.value
        },
    )?;

    let assembler = CsrAssembler::default();
    let matrix = assembler.assemble_sum(&[
        &bulk as &(dyn Sync + ElementMatrixAssembler<T>),
        &bottom as &(dyn Sync + ElementMatrixAssembler<T>),
        &ghost_penalty as &(dyn Sync + ElementMatrixAssembler<T>),
    ])?;
    let rhs = assembler.assemble_vector_sum(&[
        &source as &(dyn Sync + ElementVectorAssembler<T>),
        &upwind as &(dyn Sync + ElementVectorAssembler<T>),
    ])?;
    debug!(
        "Assembled slab [{}, {}]: {} elements touch the domain, {} ghost penalty facets, {} nonzeros",
        to_f64(slab.t_old()),
        to_f64(slab.t_new()),
        has_neg.count(),
        ghost_penalty.facets().len(),
        matrix.nnz()
    );
    Ok(SlabSystem {
        matrix,
        rhs,
        levelset_generation: geometry.levelset.generation(),
        ghost_penalty_facets: ghost_penalty.facets().len(),
    })
}
