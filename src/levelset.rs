//! Level-set functions and their piecewise linear approximations on the background mesh.
//!
//! The interpolation always acts on the undeformed (reference) mesh geometry. A deformation
//! set for integration is never taken into account here.
use crate::element::TimeLagrangeBasis;
use crate::error::CutFemError;
use crate::mesh::TriangleMesh2d;
use crate::space::check_reference_time;
use crate::util::{convert_scalar, to_f64, Generation};
use crate::Real;
use log::debug;
use nalgebra::{Point2, Vector2};
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};

/// A scalar function whose zero level set defines an interface.
pub trait LevelSetFunction<T: Real>: Sync {
    fn evaluate(&self, x: &Point2<T>) -> T;

    /// Gradient of the function. Defaults to central differences.
    fn gradient(&self, x: &Point2<T>) -> Vector2<T> {
        central_difference_gradient(|y| self.evaluate(y), x)
    }
}

impl<'a, T: Real, L: LevelSetFunction<T> + ?Sized> LevelSetFunction<T> for &'a L {
    fn evaluate(&self, x: &Point2<T>) -> T {
        (**self).evaluate(x)
    }

    fn gradient(&self, x: &Point2<T>) -> Vector2<T> {
        (**self).gradient(x)
    }
}

#[replace_float_literals(T::from_f64(literal).unwrap())]
fn central_difference_gradient<T: Real>(f: impl Fn(&Point2<T>) -> T, x: &Point2<T>) -> Vector2<T> {
    let step = 1e-6 * (1.0 + x.coords.norm());
    let dx = Vector2::new(step, 0.0);
    let dy = Vector2::new(0.0, step);
    Vector2::new(
        (f(&(x + dx)) - f(&(x - dx))) / (2.0 * step),
        (f(&(x + dy)) - f(&(x - dy))) / (2.0 * step),
    )
}

/// Adapts a closure to [`LevelSetFunction`], with gradients by finite differences.
#[derive(Debug, Clone, Copy)]
pub struct FnLevelSet<F>(pub F);

impl<F> FnLevelSet<F> {
    pub fn new<T>(f: F) -> Self
    where
        T: Real,
        F: Fn(&Point2<T>) -> T + Sync,
    {
        Self(f)
    }
}

impl<T, F> LevelSetFunction<T> for FnLevelSet<F>
where
    T: Real,
    F: Fn(&Point2<T>) -> T + Sync,
{
    fn evaluate(&self, x: &Point2<T>) -> T {
        (self.0)(x)
    }
}

/// Signed distance to a circle, negative inside.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle<T: Real> {
    pub center: Point2<T>,
    pub radius: T,
}

impl<T: Real> LevelSetFunction<T> for Circle<T> {
    fn evaluate(&self, x: &Point2<T>) -> T {
        (x - self.center).norm() - self.radius
    }

    fn gradient(&self, x: &Point2<T>) -> Vector2<T> {
        let d = x - self.center;
        let norm = d.norm();
        if norm > T::zero() {
            d / norm
        } else {
            Vector2::zeros()
        }
    }
}

/// The level set `(|x|^p + |y|^p)^(1/p) - radius` of a centered superellipse.
///
/// For `p = 2` this is a circle; `p = 4` gives the rounded square used by interface
/// benchmarks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuperEllipse<T: Real> {
    pub exponent: T,
    pub radius: T,
}

impl<T: Real> LevelSetFunction<T> for SuperEllipse<T> {
    fn evaluate(&self, x: &Point2<T>) -> T {
        let p = self.exponent;
        let s = x.x.abs().powf(p) + x.y.abs().powf(p);
        s.powf(T::one() / p) - self.radius
    }

    fn gradient(&self, x: &Point2<T>) -> Vector2<T> {
        let p = self.exponent;
        let s = x.x.abs().powf(p) + x.y.abs().powf(p);
        if s <= T::zero() {
            return Vector2::zeros();
        }
        let outer = s.powf(T::one() / p - T::one());
        let component = |c: T| c.signum() * c.abs().powf(p - T::one()) * outer;
        Vector2::new(component(x.x), component(x.y))
    }
}

/// A time-dependent level-set function `phi(x, t)` in physical time.
pub trait SpaceTimeLevelSetFunction<T: Real>: Sync {
    fn evaluate(&self, x: &Point2<T>, t: T) -> T;

    /// Spatial gradient at a fixed time. Defaults to central differences.
    fn gradient(&self, x: &Point2<T>, t: T) -> Vector2<T> {
        central_difference_gradient(|y| self.evaluate(y, t), x)
    }
}

/// Adapts a closure `(x, t) -> phi` to [`SpaceTimeLevelSetFunction`].
#[derive(Debug, Clone, Copy)]
pub struct FnSpaceTimeLevelSet<F>(pub F);

impl<F> FnSpaceTimeLevelSet<F> {
    pub fn new<T>(f: F) -> Self
    where
        T: Real,
        F: Fn(&Point2<T>, T) -> T + Sync,
    {
        Self(f)
    }
}

impl<T, F> SpaceTimeLevelSetFunction<T> for FnSpaceTimeLevelSet<F>
where
    T: Real,
    F: Fn(&Point2<T>, T) -> T + Sync,
{
    fn evaluate(&self, x: &Point2<T>, t: T) -> T {
        (self.0)(x, t)
    }
}

/// A circle of fixed radius whose center follows a prescribed path.
#[derive(Debug, Clone, Copy)]
pub struct MovingCircle<T: Real, P> {
    pub radius: T,
    pub center_path: P,
}

impl<T, P> SpaceTimeLevelSetFunction<T> for MovingCircle<T, P>
where
    T: Real,
    P: Fn(T) -> Point2<T> + Sync,
{
    fn evaluate(&self, x: &Point2<T>, t: T) -> T {
        (x - (self.center_path)(t)).norm() - self.radius
    }

    fn gradient(&self, x: &Point2<T>, t: T) -> Vector2<T> {
        Circle {
            center: (self.center_path)(t),
            radius: self.radius,
        }
        .gradient(x)
    }
}

/// The physical time interval `[t_old, t_old + dt]` of one space-time slab, parameterized by
/// reference time `t_ref` in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSlab<T: Real> {
    t_old: T,
    dt: T,
}

impl<T: Real> TimeSlab<T> {
    pub fn new(t_old: T, dt: T) -> Result<Self, CutFemError> {
        if dt > T::zero() {
            Ok(Self { t_old, dt })
        } else {
            Err(CutFemError::configuration(format!(
                "time step must be positive, got {}",
                to_f64(dt)
            )))
        }
    }

    pub fn t_old(&self) -> T {
        self.t_old
    }

    pub fn t_new(&self) -> T {
        self.t_old + self.dt
    }

    pub fn dt(&self) -> T {
        self.dt
    }

    /// The affine map from reference time onto the slab.
    pub fn physical_time(&self, t_ref: T) -> T {
        self.t_old + t_ref * self.dt
    }
}

/// A piecewise linear level-set field: one value per mesh vertex.
///
/// Every update draws a new [`Generation`], so classifications and deformations derived
/// from an earlier state can be detected as stale.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelSetField<T: Real> {
    values: Vec<T>,
    mesh_generation: Generation,
    generation: Generation,
}

impl<T: Real> LevelSetField<T> {
    /// Nodal interpolation of a level-set function on the mesh vertices.
    pub fn interpolate(mesh: &TriangleMesh2d<T>, levelset: &impl LevelSetFunction<T>) -> Self {
        let values = mesh.vertices().iter().map(|x| levelset.evaluate(x)).collect();
        Self {
            values,
            mesh_generation: mesh.generation(),
            generation: Generation::next(),
        }
    }

    /// A field from explicit vertex values.
    pub fn from_values(mesh: &TriangleMesh2d<T>, values: Vec<T>) -> Result<Self, CutFemError> {
        if values.len() != mesh.num_vertices() {
            return Err(CutFemError::configuration(format!(
                "level set has {} values, but the mesh has {} vertices",
                values.len(),
                mesh.num_vertices()
            )));
        }
        Ok(Self {
            values,
            mesh_generation: mesh.generation(),
            generation: Generation::next(),
        })
    }

    /// Re-interpolates a (new) level-set function in place.
    ///
    /// Fails if the field was built for a different mesh topology.
    pub fn update(&mut self, mesh: &TriangleMesh2d<T>, levelset: &impl LevelSetFunction<T>) -> Result<(), CutFemError> {
        self.check_mesh(mesh)?;
        for (value, x) in self.values.iter_mut().zip(mesh.vertices()) {
            *value = levelset.evaluate(x);
        }
        self.generation = Generation::next();
        debug!("Updated level set field to generation {}", self.generation);
        Ok(())
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn mesh_generation(&self) -> Generation {
        self.mesh_generation
    }

    pub fn check_mesh(&self, mesh: &TriangleMesh2d<T>) -> Result<(), CutFemError> {
        if self.mesh_generation == mesh.generation() {
            Ok(())
        } else {
            Err(CutFemError::configuration(format!(
                "level set was built for mesh {}, but was used with mesh {}",
                self.mesh_generation,
                mesh.generation()
            )))
        }
    }

    /// Values at the three vertices of an element.
    pub fn element_values(&self, mesh: &TriangleMesh2d<T>, element_index: usize) -> [T; 3] {
        mesh.connectivity()[element_index].0.map(|v| self.values[v])
    }

    /// Evaluates the linear interpolant on an element at barycentric coordinates.
    pub fn evaluate(&self, mesh: &TriangleMesh2d<T>, element_index: usize, lambda: &[T; 3]) -> T {
        let [a, b, c] = self.element_values(mesh, element_index);
        a * lambda[0] + b * lambda[1] + c * lambda[2]
    }

    /// Gradient of the linear interpolant on an element.
    pub fn element_gradient(&self, mesh: &TriangleMesh2d<T>, element_index: usize) -> Vector2<T> {
        let values = self.element_values(mesh, element_index);
        let gradients = mesh.element(element_index).barycentric_gradients();
        gradients[0] * values[0] + gradients[1] * values[1] + gradients[2] * values[2]
    }
}

/// A space-time level-set field on one time slab: values per mesh vertex and temporal node.
///
/// Values are stored time-node major, i.e. the value at vertex `v` and temporal node `m` is
/// `values[m * num_vertices + v]`. Within the slab the field is linear in space and a
/// Lagrange polynomial of order `k_t >= 1` in reference time.
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceTimeLevelSetField<T: Real> {
    values: Vec<T>,
    num_vertices: usize,
    time: TimeLagrangeBasis,
    slab: TimeSlab<T>,
    mesh_generation: Generation,
    generation: Generation,
}

impl<T: Real> SpaceTimeLevelSetField<T> {
    pub fn interpolate(
        mesh: &TriangleMesh2d<T>,
        levelset: &impl SpaceTimeLevelSetFunction<T>,
        slab: TimeSlab<T>,
        time_order: usize,
    ) -> Result<Self, CutFemError> {
        if time_order == 0 {
            return Err(CutFemError::configuration(
                "space-time level sets need at least linear order in time",
            ));
        }
        let time = TimeLagrangeBasis::new(time_order)?;
        let mut field = Self {
            values: Vec::new(),
            num_vertices: mesh.num_vertices(),
            time,
            slab,
            mesh_generation: mesh.generation(),
            generation: Generation::next(),
        };
        field.fill(mesh, levelset);
        Ok(field)
    }

    /// Re-interpolates on a new slab in place.
    pub fn update(
        &mut self,
        mesh: &TriangleMesh2d<T>,
        levelset: &impl SpaceTimeLevelSetFunction<T>,
        slab: TimeSlab<T>,
    ) -> Result<(), CutFemError> {
        if self.mesh_generation != mesh.generation() {
            return Err(CutFemError::configuration(
                "space-time level set was built for a different mesh topology",
            ));
        }
        self.slab = slab;
        self.fill(mesh, levelset);
        self.generation = Generation::next();
        debug!(
            "Updated space-time level set on [{}, {}] to generation {}",
            to_f64(slab.t_old()),
            to_f64(slab.t_new()),
            self.generation
        );
        Ok(())
    }

    fn fill(&mut self, mesh: &TriangleMesh2d<T>, levelset: &impl SpaceTimeLevelSetFunction<T>) {
        self.values.clear();
        for &t_m in self.time.nodes() {
            let t = self.slab.physical_time(convert_scalar(t_m));
            self.values
                .extend(mesh.vertices().iter().map(|x| levelset.evaluate(x, t)));
        }
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn time_basis(&self) -> &TimeLagrangeBasis {
        &self.time
    }

    pub fn time_order(&self) -> usize {
        self.time.order()
    }

    pub fn slab(&self) -> &TimeSlab<T> {
        &self.slab
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn mesh_generation(&self) -> Generation {
        self.mesh_generation
    }

    /// Nodal values of one vertex at all temporal nodes.
    pub fn vertex_time_values(&self, vertex: usize) -> Vec<T> {
        (0..self.time.num_nodes())
            .map(|m| self.values[m * self.num_vertices + vertex])
            .collect()
    }

    /// Values at the vertices of an element at a fixed reference time.
    pub fn element_values_at(&self, mesh: &TriangleMesh2d<T>, element_index: usize, t_ref: T) -> [T; 3] {
        let mut psi = vec![T::zero(); self.time.num_nodes()];
        self.time.populate_basis(&mut psi, t_ref);
        mesh.connectivity()[element_index].0.map(|v| {
            psi.iter()
                .enumerate()
                .map(|(m, &psi_m)| psi_m * self.values[m * self.num_vertices + v])
                .fold(T::zero(), |a, b| a + b)
        })
    }

    /// Extracts the spatial field at a fixed reference time.
    ///
    /// Restriction at `0` and `1` yields the bottom and top geometry of the slab. Fails for
    /// reference times outside `[0, 1]`.
    pub fn restrict(&self, t_ref: T) -> Result<LevelSetField<T>, CutFemError> {
        check_reference_time(t_ref)?;
        let mut psi = vec![T::zero(); self.time.num_nodes()];
        self.time.populate_basis(&mut psi, t_ref);
        let values = (0..self.num_vertices)
            .map(|v| {
                psi.iter()
                    .enumerate()
                    .map(|(m, &psi_m)| psi_m * self.values[m * self.num_vertices + v])
                    .fold(T::zero(), |a, b| a + b)
            })
            .collect();
        Ok(LevelSetField {
            values,
            mesh_generation: self.mesh_generation,
            generation: Generation::next(),
        })
    }
}
