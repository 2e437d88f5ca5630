//! Integration over the negative region, the positive region and the interface of a cut
//! background mesh.
//!
//! Cut elements are split into signed sub-triangles along the zero level of the
//! piecewise linear level set, so regions bounded by a piecewise linear interface are
//! integrated exactly up to the order of the quadrature rule. Space-time elements are
//! additionally split in time wherever a vertex changes sign. With a mesh deformation set,
//! every quadrature point is pushed forward and the weights pick up the volume (`det F`)
//! or surface (Nanson) scaling of the deformation.
use crate::cut_info::{sample_time_polynomial, CutInfo, ElementType, ZeroSign, TIME_SAMPLES_PER_ORDER};
use crate::deformation::MeshDeformation;
use crate::element::{AffineTriangle, TimeLagrangeBasis};
use crate::error::CutFemError;
use crate::levelset::{LevelSetField, SpaceTimeLevelSetField, TimeSlab};
use crate::mask::ElementSet;
use crate::mesh::{BackgroundMesh, TriangleMesh2d};
use crate::quadrature::QuadratureTable;
use crate::space::Subdomain;
use crate::util::{cofactor_2x2, convert_scalar, triangle_area, Generation};
use crate::Real;
use nalgebra::{Matrix2, Point2, Vector2};
use numeric_literals::replace_float_literals;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// The region of integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DomainType {
    Neg,
    Pos,
    /// The interface (zero level set).
    If,
}

impl From<Subdomain> for DomainType {
    fn from(subdomain: Subdomain) -> Self {
        match subdomain {
            Subdomain::Neg => DomainType::Neg,
            Subdomain::Pos => DomainType::Pos,
        }
    }
}

/// Typed description of a level-set integration domain.
///
/// Orders left as `None` are inferred by the caller from the polynomial degree of the
/// integrand (for forms: trial order plus test order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSetDomain {
    pub domain_type: DomainType,
    /// Spatial quadrature strength.
    pub order: Option<usize>,
    /// Temporal quadrature strength (space-time domains only).
    pub time_order: Option<usize>,
}

impl LevelSetDomain {
    pub fn new(domain_type: DomainType) -> Self {
        Self {
            domain_type,
            order: None,
            time_order: None,
        }
    }

    pub fn neg() -> Self {
        Self::new(DomainType::Neg)
    }

    pub fn pos() -> Self {
        Self::new(DomainType::Pos)
    }

    pub fn interface() -> Self {
        Self::new(DomainType::If)
    }

    pub fn with_order(mut self, order: usize) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_time_order(mut self, time_order: usize) -> Self {
        self.time_order = Some(time_order);
        self
    }
}

/// Spatial and temporal integration strength used by [`CutDomain::integrate`] when the
/// domain does not specify one.
pub const DEFAULT_INTEGRATION_ORDER: usize = 2;

/// The piece of a linear interface inside one element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterfaceSegment<T: Real> {
    pub endpoints: [Point2<T>; 2],
    /// Unit normal pointing from the negative into the positive region.
    pub normal: Vector2<T>,
}

impl<T: Real> InterfaceSegment<T> {
    pub fn length(&self) -> T {
        (self.endpoints[1] - self.endpoints[0]).norm()
    }
}

/// Signed sub-triangulation of one triangle by a linear level set.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleDecomposition<T: Real> {
    neg: Vec<[Point2<T>; 3]>,
    pos: Vec<[Point2<T>; 3]>,
    interface: Option<InterfaceSegment<T>>,
    area: T,
}

impl<T: Real> TriangleDecomposition<T> {
    pub fn triangles(&self, subdomain: Subdomain) -> &[[Point2<T>; 3]] {
        match subdomain {
            Subdomain::Neg => &self.neg,
            Subdomain::Pos => &self.pos,
        }
    }

    pub fn interface(&self) -> Option<&InterfaceSegment<T>> {
        self.interface.as_ref()
    }

    pub fn measure(&self, domain_type: DomainType) -> T {
        let area = |triangles: &[[Point2<T>; 3]]| {
            triangles
                .iter()
                .fold(T::zero(), |acc, [a, b, c]| acc + triangle_area(a, b, c))
        };
        match domain_type {
            DomainType::Neg => area(&self.neg),
            DomainType::Pos => area(&self.pos),
            DomainType::If => self
                .interface
                .as_ref()
                .map(InterfaceSegment::length)
                .unwrap_or_else(T::zero),
        }
    }

    /// Area fraction of the negative part.
    pub fn negative_fraction(&self) -> T {
        if self.area > T::zero() {
            (self.measure(DomainType::Neg) / self.area).min(T::one())
        } else {
            T::zero()
        }
    }
}

/// Relative measure below which sub-cells produced by the zero tie-break are discarded.
const ZERO_MEASURE_TOLERANCE: f64 = 1e-14;

/// Splits a triangle along the zero level of the linear interpolant of `values`.
///
/// The vertex whose sign differs from the other two is cut off as a triangle, the
/// remaining quadrilateral is split into two triangles. All sub-triangles keep the
/// orientation of the input. Exact zeros are assigned a side by `zero_sign`; pieces of
/// (numerically) zero measure that this produces are dropped, so a vertex on the interface
/// never yields duplicated or degenerate sub-cells.
pub fn decompose_triangle<T: Real>(
    vertices: &[Point2<T>; 3],
    values: &[T; 3],
    zero_sign: ZeroSign,
) -> TriangleDecomposition<T> {
    let [x0, x1, x2] = vertices;
    let area = triangle_area(x0, x1, x2);
    let negative = values.map(|value| zero_sign.is_negative(value));
    let num_negative = negative.iter().filter(|&&n| n).count();

    let mut decomposition = TriangleDecomposition {
        neg: Vec::new(),
        pos: Vec::new(),
        interface: None,
        area,
    };
    match num_negative {
        0 => decomposition.pos.push(*vertices),
        3 => decomposition.neg.push(*vertices),
        _ => {
            let lone_is_negative = num_negative == 1;
            let a = (0..3)
                .find(|&i| negative[i] == lone_is_negative)
                .unwrap_or(0);
            let (b, c) = ((a + 1) % 3, (a + 2) % 3);
            let intersection = |i: usize, j: usize| {
                let t = values[i] / (values[i] - values[j]);
                vertices[i] + (vertices[j] - vertices[i]) * t
            };
            let p_ab = intersection(a, b);
            let p_ac = intersection(a, c);

            let tolerance = convert_scalar::<T>(ZERO_MEASURE_TOLERANCE) * area;
            let push = |target: &mut Vec<[Point2<T>; 3]>, triangle: [Point2<T>; 3]| {
                let [p, q, r] = &triangle;
                if triangle_area(p, q, r) > tolerance {
                    target.push(triangle);
                }
            };
            let (lone, rest) = if lone_is_negative {
                (&mut decomposition.neg, &mut decomposition.pos)
            } else {
                (&mut decomposition.pos, &mut decomposition.neg)
            };
            push(lone, [vertices[a], p_ab, p_ac]);
            push(rest, [p_ab, vertices[b], vertices[c]]);
            push(rest, [p_ab, vertices[c], p_ac]);

            let length_tolerance = convert_scalar::<T>(ZERO_MEASURE_TOLERANCE) * area.sqrt();
            if (p_ac - p_ab).norm() > length_tolerance {
                let gradients = AffineTriangle::from_vertices(*vertices).barycentric_gradients();
                let gradient = gradients[0] * values[0] + gradients[1] * values[1] + gradients[2] * values[2];
                let norm = gradient.norm();
                if norm > T::zero() {
                    decomposition.interface = Some(InterfaceSegment {
                        endpoints: [p_ab, p_ac],
                        normal: gradient / norm,
                    });
                }
            }
        }
    }
    decomposition
}

/// Reference times in `[0, 1]` at which the sign pattern of the element vertices may
/// change, including both end points, in increasing order.
///
/// For linear-in-time level sets the roots are exact. For higher temporal orders sign
/// changes are located on a uniform grid of `16 k_t` sub-intervals and refined by
/// bisection. A pair of roots inside the same sub-interval leaves no sign change on the
/// grid, so such a short excursion produces no breakpoints and is integrated as if the
/// vertex kept its sign.
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn time_breakpoints<T: Real>(time: &TimeLagrangeBasis, vertex_values: &[Vec<T>; 3], zero_sign: ZeroSign) -> Vec<T> {
    let mut breakpoints = vec![T::zero(), T::one()];
    for nodal in vertex_values {
        if time.order() <= 1 {
            let (v0, v1) = (nodal[0], nodal[nodal.len() - 1]);
            if zero_sign.is_negative(v0) != zero_sign.is_negative(v1) {
                breakpoints.push(v0 / (v0 - v1));
            }
        } else {
            let samples = sample_time_polynomial(time, nodal);
            let num_intervals = TIME_SAMPLES_PER_ORDER * time.order();
            let mut psi = vec![T::zero(); time.num_nodes()];
            let mut evaluate = |t: T| {
                time.populate_basis(&mut psi, t);
                psi.iter()
                    .zip(nodal)
                    .fold(T::zero(), |acc, (&p, &v)| acc + p * v)
            };
            for (i, pair) in samples.windows(2).enumerate() {
                let left_negative = zero_sign.is_negative(pair[0]);
                if left_negative == zero_sign.is_negative(pair[1]) {
                    continue;
                }
                let mut lo: T = convert_scalar(i as f64 / num_intervals as f64);
                let mut hi: T = convert_scalar((i + 1) as f64 / num_intervals as f64);
                for _ in 0..60 {
                    let mid = 0.5 * (lo + hi);
                    if zero_sign.is_negative(evaluate(mid)) == left_negative {
                        lo = mid;
                    } else {
                        hi = mid;
                    }
                }
                breakpoints.push(0.5 * (lo + hi));
            }
        }
    }
    breakpoints.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    breakpoints.dedup_by(|a, b| (*a - *b).abs() <= 1e-12);
    // Keep exact end points after deduplication
    if let Some(last) = breakpoints.last_mut() {
        *last = T::one();
    }
    breakpoints
}

/// A quadrature point of a cut rule on one background element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegrationPoint<T: Real> {
    pub element: usize,
    /// Weight including the measure of the sub-cell, the deformation scaling and, for
    /// space-time rules, the physical length of the time interval.
    pub weight: T,
    /// Point in the undeformed background element.
    pub reference_point: Point2<T>,
    /// Barycentric coordinates of `reference_point` with respect to the element.
    pub barycentric: [T; 3],
    /// Point in the deformed geometry (equal to `reference_point` without deformation).
    pub point: Point2<T>,
    /// Deformation gradient at the point (identity without deformation).
    pub deformation_gradient: Matrix2<T>,
    /// Unit normal from the negative into the positive region (interface rules only).
    pub normal: Option<Vector2<T>>,
    /// Reference time in `[0, 1]` (space-time rules only).
    pub time: Option<T>,
}

/// The level-set geometry a [`CutDomain`] integrates over.
#[derive(Debug, Clone, Copy)]
pub enum LevelSetGeometry<'a, T: Real> {
    Spatial(&'a LevelSetField<T>),
    SpaceTime(&'a SpaceTimeLevelSetField<T>),
}

impl<'a, T: Real> LevelSetGeometry<'a, T> {
    pub fn generation(&self) -> Generation {
        match self {
            LevelSetGeometry::Spatial(field) => field.generation(),
            LevelSetGeometry::SpaceTime(field) => field.generation(),
        }
    }

    pub fn mesh_generation(&self) -> Generation {
        match self {
            LevelSetGeometry::Spatial(field) => field.mesh_generation(),
            LevelSetGeometry::SpaceTime(field) => field.mesh_generation(),
        }
    }
}

/// A validated integration context: mesh, level-set geometry, a classification matching
/// that geometry and an optional mesh deformation.
///
/// Construction performs all consistency checks (mesh topology, classification and
/// deformation generations), so integration and assembly never run on stale data.
#[derive(Debug, Clone, Copy)]
pub struct CutDomain<'a, T: Real> {
    mesh: &'a TriangleMesh2d<T>,
    geometry: LevelSetGeometry<'a, T>,
    cut_info: &'a CutInfo<T>,
    deformation: Option<&'a MeshDeformation<T>>,
}

impl<'a, T: Real> CutDomain<'a, T> {
    pub fn new(
        mesh: &'a TriangleMesh2d<T>,
        levelset: &'a LevelSetField<T>,
        cut_info: &'a CutInfo<T>,
    ) -> Result<Self, CutFemError> {
        levelset.check_mesh(mesh)?;
        cut_info.check_current(mesh, levelset.generation())?;
        if cut_info.is_space_time() {
            return Err(CutFemError::configuration(
                "a space-time classification cannot be used with a spatial level set",
            ));
        }
        Ok(Self {
            mesh,
            geometry: LevelSetGeometry::Spatial(levelset),
            cut_info,
            deformation: None,
        })
    }

    pub fn space_time(
        mesh: &'a TriangleMesh2d<T>,
        levelset: &'a SpaceTimeLevelSetField<T>,
        cut_info: &'a CutInfo<T>,
    ) -> Result<Self, CutFemError> {
        if levelset.mesh_generation() != mesh.generation() {
            return Err(CutFemError::configuration(
                "space-time level set was built for a different mesh topology",
            ));
        }
        cut_info.check_current(mesh, levelset.generation())?;
        if !cut_info.is_space_time() {
            return Err(CutFemError::configuration(
                "a spatial classification cannot be used with a space-time level set",
            ));
        }
        Ok(Self {
            mesh,
            geometry: LevelSetGeometry::SpaceTime(levelset),
            cut_info,
            deformation: None,
        })
    }

    /// A domain on a background mesh, using its deformation if one is set.
    pub fn from_background(
        background: &'a BackgroundMesh<T>,
        levelset: &'a LevelSetField<T>,
        cut_info: &'a CutInfo<T>,
    ) -> Result<Self, CutFemError> {
        let domain = Self::new(background.mesh(), levelset, cut_info)?;
        match background.deformation() {
            Some(deformation) => domain.with_deformation(deformation),
            None => Ok(domain),
        }
    }

    /// Integrate on the geometry deformed by `deformation`.
    ///
    /// The deformation must belong to the same mesh topology and level-set state.
    pub fn with_deformation(mut self, deformation: &'a MeshDeformation<T>) -> Result<Self, CutFemError> {
        if deformation.mesh_generation() != self.mesh.generation() {
            return Err(CutFemError::configuration(
                "deformation was computed for a different mesh topology",
            ));
        }
        if matches!(self.geometry, LevelSetGeometry::SpaceTime(_)) {
            return Err(CutFemError::configuration(
                "mesh deformations are only supported for spatial level sets",
            ));
        }
        if deformation.levelset_generation() != self.geometry.generation() {
            return Err(CutFemError::stale(format!(
                "deformation was computed for level set {}, but the current level set is {}",
                deformation.levelset_generation(),
                self.geometry.generation()
            )));
        }
        self.deformation = Some(deformation);
        Ok(self)
    }

    pub fn mesh(&self) -> &'a TriangleMesh2d<T> {
        self.mesh
    }

    pub fn geometry(&self) -> LevelSetGeometry<'a, T> {
        self.geometry
    }

    pub fn cut_info(&self) -> &'a CutInfo<T> {
        self.cut_info
    }

    pub fn deformation(&self) -> Option<&'a MeshDeformation<T>> {
        self.deformation
    }

    pub fn is_space_time(&self) -> bool {
        matches!(self.geometry, LevelSetGeometry::SpaceTime(_))
    }

    pub fn time_slab(&self) -> Option<&'a TimeSlab<T>> {
        match self.geometry {
            LevelSetGeometry::Spatial(_) => None,
            LevelSetGeometry::SpaceTime(field) => Some(field.slab()),
        }
    }

    /// Quadrature rules for a domain, given the polynomial degrees of the integrand in
    /// space and time.
    ///
    /// A set deformation raises the spatial strength to account for its Jacobian.
    pub fn quadrature_table(
        &self,
        domain: &LevelSetDomain,
        spatial_degree: usize,
        time_degree: usize,
    ) -> Result<QuadratureTable<T>, CutFemError> {
        let deformation_bonus = self
            .deformation
            .map(|deformation| 2 * deformation.order().saturating_sub(1))
            .unwrap_or(0);
        let order = domain.order.unwrap_or(spatial_degree) + deformation_bonus;
        let time_order = domain.time_order.unwrap_or(time_degree);
        QuadratureTable::new(order, time_order)
    }

    /// Whether an element can contribute to integrals over the given region.
    pub fn contributes(&self, element_index: usize, domain_type: DomainType) -> bool {
        let element_type = self.cut_info.element_type(element_index);
        match domain_type {
            DomainType::Neg => element_type != ElementType::Pos,
            DomainType::Pos => element_type != ElementType::Neg,
            DomainType::If => element_type == ElementType::Cut,
        }
    }

    /// Elements of `subset` (all elements if `None`) that contribute to the region.
    pub fn contributing_elements(
        &self,
        domain_type: DomainType,
        subset: Option<&ElementSet>,
    ) -> Result<Vec<usize>, CutFemError> {
        if let Some(subset) = subset {
            if subset.len() != self.mesh.num_elements() {
                return Err(CutFemError::configuration(format!(
                    "element subset has length {}, but the mesh has {} elements",
                    subset.len(),
                    self.mesh.num_elements()
                )));
            }
        }
        Ok((0..self.mesh.num_elements())
            .filter(|&e| subset.map_or(true, |subset| subset.contains(e)))
            .filter(|&e| self.contributes(e, domain_type))
            .collect())
    }

    /// Appends the quadrature points of the region restricted to one element to `output`.
    pub fn element_rule(
        &self,
        element_index: usize,
        domain_type: DomainType,
        table: &QuadratureTable<T>,
        output: &mut Vec<IntegrationPoint<T>>,
    ) {
        if !self.contributes(element_index, domain_type) {
            return;
        }
        let element = self.mesh.element(element_index);
        let uncut = self.cut_info.element_type(element_index) != ElementType::Cut;
        match self.geometry {
            LevelSetGeometry::Spatial(field) => {
                if uncut {
                    self.push_full_element(element_index, &element, table, T::one(), None, output);
                } else {
                    let values = field.element_values(self.mesh, element_index);
                    self.push_cut_element(element_index, &element, &values, domain_type, table, T::one(), None, output);
                }
            }
            LevelSetGeometry::SpaceTime(field) => {
                let dt = field.slab().dt();
                let (time_weights, time_points) = table.time_rule();
                if uncut {
                    for (&w, &t) in time_weights.iter().zip(time_points) {
                        self.push_full_element(element_index, &element, table, w * dt, Some(t), output);
                    }
                    return;
                }
                let vertex_values = self.mesh.connectivity()[element_index]
                    .0
                    .map(|v| field.vertex_time_values(v));
                let breakpoints = time_breakpoints(field.time_basis(), &vertex_values, self.cut_info.zero_sign());
                for window in breakpoints.windows(2) {
                    let length = window[1] - window[0];
                    for (&w, &s) in time_weights.iter().zip(time_points) {
                        let t = window[0] + s * length;
                        let values = field.element_values_at(self.mesh, element_index, t);
                        self.push_cut_element(
                            element_index,
                            &element,
                            &values,
                            domain_type,
                            table,
                            w * length * dt,
                            Some(t),
                            output,
                        );
                    }
                }
            }
        }
    }

    fn push_full_element(
        &self,
        element_index: usize,
        element: &AffineTriangle<T>,
        table: &QuadratureTable<T>,
        scale: T,
        time: Option<T>,
        output: &mut Vec<IntegrationPoint<T>>,
    ) {
        let area = element.area();
        let (weights, points) = table.triangle_rule();
        for (&w, lambda) in weights.iter().zip(points) {
            let x = element.map_barycentric(lambda);
            self.push_point(element_index, *lambda, x, w * area * scale, None, time, output);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn push_cut_element(
        &self,
        element_index: usize,
        element: &AffineTriangle<T>,
        values: &[T; 3],
        domain_type: DomainType,
        table: &QuadratureTable<T>,
        scale: T,
        time: Option<T>,
        output: &mut Vec<IntegrationPoint<T>>,
    ) {
        let decomposition = decompose_triangle(element.vertices(), values, self.cut_info.zero_sign());
        match domain_type {
            DomainType::Neg | DomainType::Pos => {
                let subdomain = if domain_type == DomainType::Neg {
                    Subdomain::Neg
                } else {
                    Subdomain::Pos
                };
                for triangle in decomposition.triangles(subdomain) {
                    let [a, b, c] = triangle;
                    table.for_each_triangle_point(triangle, triangle_area(a, b, c), |x, w| {
                        let lambda = element.barycentric(&x);
                        self.push_point(element_index, lambda, x, w * scale, None, time, output);
                    });
                }
            }
            DomainType::If => {
                if let Some(segment) = decomposition.interface() {
                    let [a, b] = &segment.endpoints;
                    table.for_each_segment_point(a, b, |x, w| {
                        let lambda = element.barycentric(&x);
                        self.push_point(element_index, lambda, x, w * scale, Some(segment.normal), time, output);
                    });
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn push_point(
        &self,
        element_index: usize,
        barycentric: [T; 3],
        reference_point: Point2<T>,
        weight: T,
        normal: Option<Vector2<T>>,
        time: Option<T>,
        output: &mut Vec<IntegrationPoint<T>>,
    ) {
        let mut point = IntegrationPoint {
            element: element_index,
            weight,
            reference_point,
            barycentric,
            point: reference_point,
            deformation_gradient: Matrix2::identity(),
            normal,
            time,
        };
        if let Some(deformation) = self.deformation {
            let (displacement, gradient) = deformation.evaluate(self.mesh, element_index, &barycentric);
            let f = Matrix2::identity() + gradient;
            point.point = reference_point + displacement;
            point.deformation_gradient = f;
            match normal {
                None => point.weight *= f.determinant().abs(),
                Some(n) => {
                    // Nanson: n da = cof(F) N dA
                    let scaled = cofactor_2x2(&f) * n;
                    let norm = scaled.norm();
                    if norm > T::zero() {
                        point.weight *= norm;
                        point.normal = Some(scaled / norm);
                    }
                }
            }
        }
        output.push(point);
    }

    /// Integrates a scalar integrand over a region, restricted to an element subset.
    ///
    /// Elements are processed in parallel, each into a local sum that is then reduced.
    pub fn integrate<F>(
        &self,
        domain: &LevelSetDomain,
        subset: Option<&ElementSet>,
        integrand: F,
    ) -> Result<T, CutFemError>
    where
        F: Fn(&IntegrationPoint<T>) -> T + Sync,
    {
        let table = self.quadrature_table(domain, DEFAULT_INTEGRATION_ORDER, DEFAULT_INTEGRATION_ORDER)?;
        let elements = self.contributing_elements(domain.domain_type, subset)?;
        Ok(elements
            .par_iter()
            .map_init(Vec::new, |points, &element_index| {
                points.clear();
                self.element_rule(element_index, domain.domain_type, &table, points);
                points
                    .iter()
                    .fold(T::zero(), |acc, point| acc + point.weight * integrand(point))
            })
            .reduce(T::zero, |a, b| a + b))
    }

    /// Measure of a region (area, interface length, or their space-time integrals).
    pub fn measure(&self, domain: &LevelSetDomain, subset: Option<&ElementSet>) -> Result<T, CutFemError> {
        self.integrate(domain, subset, |_| T::one())
    }
}
