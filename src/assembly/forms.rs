//! Closure-driven bilinear and linear forms over one region of a cut domain.
use crate::assembly::{ElementConnectivityAssembler, ElementMatrixAssembler, ElementVectorAssembler};
use crate::cut_quadrature::{CutDomain, IntegrationPoint, LevelSetDomain};
use crate::error::CutFemError;
use crate::mask::ElementSet;
use crate::mesh::TriangleMesh2d;
use crate::quadrature::QuadratureTable;
use crate::space::{check_reference_time, LagrangeSpace, SpaceTimeSpace, Subdomain, TwoDomainSpace};
use crate::Real;
use nalgebra::{DMatrixViewMut, DVectorViewMut, Vector2};
use std::cell::RefCell;
use thread_local::ThreadLocal;

/// The space of trial or test functions of a form.
#[derive(Debug, Clone, Copy)]
pub enum FormSpace<'a> {
    Spatial(&'a LagrangeSpace),
    SpaceTime(&'a SpaceTimeSpace),
}

impl<'a> From<&'a LagrangeSpace> for FormSpace<'a> {
    fn from(space: &'a LagrangeSpace) -> Self {
        FormSpace::Spatial(space)
    }
}

impl<'a> From<&'a SpaceTimeSpace> for FormSpace<'a> {
    fn from(space: &'a SpaceTimeSpace) -> Self {
        FormSpace::SpaceTime(space)
    }
}

impl<'a> FormSpace<'a> {
    pub fn spatial(&self) -> &'a LagrangeSpace {
        match self {
            FormSpace::Spatial(space) => space,
            FormSpace::SpaceTime(space) => space.spatial(),
        }
    }

    pub fn num_dofs(&self) -> usize {
        match self {
            FormSpace::Spatial(space) => space.num_dofs(),
            FormSpace::SpaceTime(space) => space.num_dofs(),
        }
    }

    pub fn dofs_per_element(&self) -> usize {
        match self {
            FormSpace::Spatial(space) => space.dofs_per_element(),
            FormSpace::SpaceTime(space) => space.dofs_per_element(),
        }
    }

    pub fn order(&self) -> usize {
        self.spatial().order()
    }

    pub fn time_order(&self) -> usize {
        match self {
            FormSpace::Spatial(_) => 0,
            FormSpace::SpaceTime(space) => space.time_basis().order(),
        }
    }

    pub fn is_space_time(&self) -> bool {
        matches!(self, FormSpace::SpaceTime(_))
    }

    pub fn populate_element_dofs(&self, output: &mut [usize], element_index: usize) {
        match self {
            FormSpace::Spatial(space) => output.copy_from_slice(space.element_dofs(element_index)),
            FormSpace::SpaceTime(space) => space.populate_element_dofs(output, element_index),
        }
    }
}

/// Value, physical gradient and time derivative of one (space-time) basis function at a
/// quadrature point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shape<T: Real> {
    pub value: T,
    pub gradient: Vector2<T>,
    /// Derivative with respect to physical time on space-time domains; with respect to
    /// reference time for space-time spaces evaluated at a fixed time.
    pub time_derivative: T,
}

impl<T: Real> Default for Shape<T> {
    fn default() -> Self {
        Self {
            value: T::zero(),
            gradient: Vector2::zeros(),
            time_derivative: T::zero(),
        }
    }
}

/// Scratch buffer with all basis functions of an element at one quadrature point.
///
/// For space-time spaces the shapes are ordered time node major, matching
/// [`SpaceTimeSpace::populate_element_dofs`].
#[derive(Debug, Clone)]
pub struct BasisValues<T: Real> {
    shapes: Vec<Shape<T>>,
    spatial_values: Vec<T>,
    spatial_gradients: Vec<Vector2<T>>,
    time_values: Vec<T>,
    time_derivatives: Vec<T>,
}

impl<T: Real> Default for BasisValues<T> {
    fn default() -> Self {
        Self {
            shapes: Vec::new(),
            spatial_values: Vec::new(),
            spatial_gradients: Vec::new(),
            time_values: Vec::new(),
            time_derivatives: Vec::new(),
        }
    }
}

impl<T: Real> BasisValues<T> {
    pub fn shapes(&self) -> &[Shape<T>] {
        &self.shapes
    }

    /// Evaluates the basis of `space` at a quadrature point.
    ///
    /// Gradients are taken with respect to the deformed geometry. For space-time spaces the
    /// time comes from the point, unless `fixed_time` is given. `dt` scales time derivatives
    /// to physical time.
    pub fn populate(
        &mut self,
        space: FormSpace<'_>,
        mesh: &TriangleMesh2d<T>,
        point: &IntegrationPoint<T>,
        fixed_time: Option<T>,
        dt: T,
    ) {
        let spatial = space.spatial();
        let element = spatial.element();
        let n = element.num_nodes();
        self.spatial_values.resize(n, T::zero());
        self.spatial_gradients.resize(n, Vector2::zeros());
        let lambda_gradients = mesh.element(point.element).barycentric_gradients();
        element.populate_basis_and_gradients(
            &mut self.spatial_values,
            &mut self.spatial_gradients,
            &point.barycentric,
            &lambda_gradients,
        );
        if point.deformation_gradient != nalgebra::Matrix2::identity() {
            if let Some(f_inv) = point.deformation_gradient.try_inverse() {
                let f_inv_t = f_inv.transpose();
                for gradient in &mut self.spatial_gradients {
                    *gradient = f_inv_t * *gradient;
                }
            }
        }

        match space {
            FormSpace::Spatial(_) => {
                self.shapes.clear();
                self.shapes.extend(
                    self.spatial_values
                        .iter()
                        .zip(&self.spatial_gradients)
                        .map(|(&value, &gradient)| Shape {
                            value,
                            gradient,
                            time_derivative: T::zero(),
                        }),
                );
            }
            FormSpace::SpaceTime(space_time) => {
                let time = space_time.time_basis();
                let t = fixed_time.or(point.time).unwrap_or_else(T::zero);
                self.time_values.resize(time.num_nodes(), T::zero());
                self.time_derivatives.resize(time.num_nodes(), T::zero());
                time.populate_basis_and_derivatives(&mut self.time_values, &mut self.time_derivatives, t);
                self.shapes.clear();
                for (&psi, &dpsi) in self.time_values.iter().zip(&self.time_derivatives) {
                    for (&phi, &grad) in self.spatial_values.iter().zip(&self.spatial_gradients) {
                        self.shapes.push(Shape {
                            value: psi * phi,
                            gradient: grad * psi,
                            time_derivative: dpsi * phi / dt,
                        });
                    }
                }
            }
        }
    }
}

/// Row/column placement of a form inside a (possibly larger) global system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Placement {
    offset: usize,
    total: usize,
}

#[derive(Debug)]
struct FormWorkspace<T: Real> {
    points: Vec<IntegrationPoint<T>>,
    trial: BasisValues<T>,
    test: BasisValues<T>,
}

impl<T: Real> Default for FormWorkspace<T> {
    fn default() -> Self {
        Self {
            points: Vec::new(),
            trial: BasisValues::default(),
            test: BasisValues::default(),
        }
    }
}

/// State shared by bilinear and linear forms: the domain, the region, the restricted
/// element list and the quadrature rules.
#[derive(Debug)]
struct FormCore<'a, T: Real> {
    domain: CutDomain<'a, T>,
    region: LevelSetDomain,
    elements: Vec<usize>,
    table: QuadratureTable<T>,
    fixed_time: Option<T>,
    dt: T,
}

impl<'a, T: Real> FormCore<'a, T> {
    fn new(
        domain: CutDomain<'a, T>,
        region: LevelSetDomain,
        subset: Option<&ElementSet>,
        spaces: &[FormSpace<'_>],
        fixed_time: Option<T>,
    ) -> Result<Self, CutFemError> {
        for space in spaces {
            space.spatial().check_mesh(domain.mesh())?;
        }
        let needs_time = spaces.iter().any(FormSpace::is_space_time);
        match fixed_time {
            Some(t_ref) => {
                check_reference_time(t_ref)?;
                if domain.is_space_time() {
                    return Err(CutFemError::configuration(
                        "fixed reference times are only meaningful on spatial domains",
                    ));
                }
            }
            None if needs_time && !domain.is_space_time() => {
                return Err(CutFemError::configuration(
                    "space-time spaces on a spatial domain need a fixed reference time",
                ));
            }
            None => {}
        }

        let spatial_degree: usize = spaces.iter().map(FormSpace::order).sum();
        let time_degree: usize = spaces.iter().map(FormSpace::time_order).sum::<usize>() + 2;
        let table = domain.quadrature_table(&region, spatial_degree, time_degree)?;
        let elements = domain.contributing_elements(region.domain_type, subset)?;
        let dt = domain.time_slab().map(|slab| slab.dt()).unwrap_or_else(T::one);
        Ok(Self {
            domain,
            region,
            elements,
            table,
            fixed_time,
            dt,
        })
    }

    fn collect_points(&self, element_index: usize, points: &mut Vec<IntegrationPoint<T>>) {
        points.clear();
        self.domain
            .element_rule(self.elements[element_index], self.region.domain_type, &self.table, points);
    }
}

/// A bilinear form `a(u, v) = sum_q w_q f(x_q, u, v)` over one region of a cut domain.
///
/// The integrand receives the quadrature point and the shapes of one trial function `u`
/// and one test function `v`. Only elements of the optional subset that intersect the
/// region are visited, so assembly cost scales with the active band.
pub struct CutBilinearForm<'a, T: Real, F> {
    core: FormCore<'a, T>,
    trial: FormSpace<'a>,
    test: FormSpace<'a>,
    rows: Placement,
    cols: Placement,
    integrand: F,
    workspace: ThreadLocal<RefCell<FormWorkspace<T>>>,
}

impl<'a, T, F> CutBilinearForm<'a, T, F>
where
    T: Real,
    F: Fn(&IntegrationPoint<T>, &Shape<T>, &Shape<T>) -> T + Sync,
{
    pub fn new(
        domain: CutDomain<'a, T>,
        trial: impl Into<FormSpace<'a>>,
        test: impl Into<FormSpace<'a>>,
        region: LevelSetDomain,
        subset: Option<&ElementSet>,
        integrand: F,
    ) -> Result<Self, CutFemError> {
        Self::with_fixed_time(domain, trial, test, region, subset, None, integrand)
    }

    /// A form evaluating space-time spaces at a fixed reference time on a spatial domain,
    /// e.g. for the traces at the bottom of a time slab.
    pub fn at_time(
        domain: CutDomain<'a, T>,
        trial: impl Into<FormSpace<'a>>,
        test: impl Into<FormSpace<'a>>,
        region: LevelSetDomain,
        subset: Option<&ElementSet>,
        t_ref: T,
        integrand: F,
    ) -> Result<Self, CutFemError> {
        Self::with_fixed_time(domain, trial, test, region, subset, Some(t_ref), integrand)
    }

    fn with_fixed_time(
        domain: CutDomain<'a, T>,
        trial: impl Into<FormSpace<'a>>,
        test: impl Into<FormSpace<'a>>,
        region: LevelSetDomain,
        subset: Option<&ElementSet>,
        fixed_time: Option<T>,
        integrand: F,
    ) -> Result<Self, CutFemError> {
        let trial = trial.into();
        let test = test.into();
        let core = FormCore::new(domain, region, subset, &[trial, test], fixed_time)?;
        Ok(Self {
            core,
            trial,
            test,
            rows: Placement {
                offset: 0,
                total: test.num_dofs(),
            },
            cols: Placement {
                offset: 0,
                total: trial.num_dofs(),
            },
            integrand,
            workspace: ThreadLocal::new(),
        })
    }

    /// Places the form in the block (`test`, `trial`) of a two-domain product space.
    pub fn in_product_space(mut self, space: &TwoDomainSpace, trial: Subdomain, test: Subdomain) -> Self {
        self.rows = Placement {
            offset: space.component_offset(test),
            total: space.num_dofs(),
        };
        self.cols = Placement {
            offset: space.component_offset(trial),
            total: space.num_dofs(),
        };
        self
    }

    pub fn num_active_elements(&self) -> usize {
        self.core.elements.len()
    }
}

impl<'a, T: Real, F> ElementConnectivityAssembler for CutBilinearForm<'a, T, F> {
    fn num_elements(&self) -> usize {
        self.core.elements.len()
    }

    fn num_rows(&self) -> usize {
        self.rows.total
    }

    fn num_cols(&self) -> usize {
        self.cols.total
    }

    fn element_row_count(&self, _element_index: usize) -> usize {
        self.test.dofs_per_element()
    }

    fn element_col_count(&self, _element_index: usize) -> usize {
        self.trial.dofs_per_element()
    }

    fn populate_element_rows(&self, output: &mut [usize], element_index: usize) {
        self.test
            .populate_element_dofs(output, self.core.elements[element_index]);
        output.iter_mut().for_each(|dof| *dof += self.rows.offset);
    }

    fn populate_element_cols(&self, output: &mut [usize], element_index: usize) {
        self.trial
            .populate_element_dofs(output, self.core.elements[element_index]);
        output.iter_mut().for_each(|dof| *dof += self.cols.offset);
    }
}

impl<'a, T, F> ElementMatrixAssembler<T> for CutBilinearForm<'a, T, F>
where
    T: Real,
    F: Fn(&IntegrationPoint<T>, &Shape<T>, &Shape<T>) -> T + Sync,
{
    fn assemble_element_matrix_into(&self, element_index: usize, mut output: DMatrixViewMut<T>) -> eyre::Result<()> {
        let ws = &mut *self.workspace.get_or_default().borrow_mut();
        let FormWorkspace {
            points, trial, test, ..
        } = ws;
        self.core.collect_points(element_index, points);
        let mesh = self.core.domain.mesh();
        for point in points.iter() {
            trial.populate(self.trial, mesh, point, self.core.fixed_time, self.core.dt);
            test.populate(self.test, mesh, point, self.core.fixed_time, self.core.dt);
            for (i, v) in test.shapes().iter().enumerate() {
                for (j, u) in trial.shapes().iter().enumerate() {
                    output[(i, j)] += point.weight * (self.integrand)(point, u, v);
                }
            }
        }
        Ok(())
    }
}

/// A linear form `l(v) = sum_q w_q f(x_q, v)` over one region of a cut domain.
pub struct CutLinearForm<'a, T: Real, F> {
    core: FormCore<'a, T>,
    test: FormSpace<'a>,
    rows: Placement,
    integrand: F,
    workspace: ThreadLocal<RefCell<FormWorkspace<T>>>,
}

impl<'a, T, F> CutLinearForm<'a, T, F>
where
    T: Real,
    F: Fn(&IntegrationPoint<T>, &Shape<T>) -> T + Sync,
{
    pub fn new(
        domain: CutDomain<'a, T>,
        test: impl Into<FormSpace<'a>>,
        region: LevelSetDomain,
        subset: Option<&ElementSet>,
        integrand: F,
    ) -> Result<Self, CutFemError> {
        Self::with_fixed_time(domain, test, region, subset, None, integrand)
    }

    pub fn at_time(
        domain: CutDomain<'a, T>,
        test: impl Into<FormSpace<'a>>,
        region: LevelSetDomain,
        subset: Option<&ElementSet>,
        t_ref: T,
        integrand: F,
    ) -> Result<Self, CutFemError> {
        Self::with_fixed_time(domain, test, region, subset, Some(t_ref), integrand)
    }

    fn with_fixed_time(
        domain: CutDomain<'a, T>,
        test: impl Into<FormSpace<'a>>,
        region: LevelSetDomain,
        subset: Option<&ElementSet>,
        fixed_time: Option<T>,
        integrand: F,
    ) -> Result<Self, CutFemError> {
        let test = test.into();
        // Data is not polynomial; integrate as if it had the degree of the test space
        let core = FormCore::new(domain, region, subset, &[test, test], fixed_time)?;
        Ok(Self {
            core,
            test,
            rows: Placement {
                offset: 0,
                total: test.num_dofs(),
            },
            integrand,
            workspace: ThreadLocal::new(),
        })
    }

    pub fn in_product_space(mut self, space: &TwoDomainSpace, test: Subdomain) -> Self {
        self.rows = Placement {
            offset: space.component_offset(test),
            total: space.num_dofs(),
        };
        self
    }
}

impl<'a, T: Real, F> ElementConnectivityAssembler for CutLinearForm<'a, T, F> {
    fn num_elements(&self) -> usize {
        self.core.elements.len()
    }

    fn num_rows(&self) -> usize {
        self.rows.total
    }

    fn num_cols(&self) -> usize {
        1
    }

    fn element_row_count(&self, _element_index: usize) -> usize {
        self.test.dofs_per_element()
    }

    fn element_col_count(&self, _element_index: usize) -> usize {
        1
    }

    fn populate_element_rows(&self, output: &mut [usize], element_index: usize) {
        self.test
            .populate_element_dofs(output, self.core.elements[element_index]);
        output.iter_mut().for_each(|dof| *dof += self.rows.offset);
    }

    fn populate_element_cols(&self, output: &mut [usize], _element_index: usize) {
        output.fill(0);
    }
}

impl<'a, T, F> ElementVectorAssembler<T> for CutLinearForm<'a, T, F>
where
    T: Real,
    F: Fn(&IntegrationPoint<T>, &Shape<T>) -> T + Sync,
{
    fn assemble_element_vector_into(&self, element_index: usize, mut output: DVectorViewMut<T>) -> eyre::Result<()> {
        let ws = &mut *self.workspace.get_or_default().borrow_mut();
        let FormWorkspace { points, test, .. } = ws;
        self.core.collect_points(element_index, points);
        let mesh = self.core.domain.mesh();
        for point in points.iter() {
            test.populate(self.test, mesh, point, self.core.fixed_time, self.core.dt);
            for (i, v) in test.shapes().iter().enumerate() {
                output[i] += point.weight * (self.integrand)(point, v);
            }
        }
        Ok(())
    }
}
