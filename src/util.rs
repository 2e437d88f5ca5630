//! Small shared helpers.
use crate::Real;
use nalgebra::{Matrix2, Point2, Vector2};
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// A process-wide unique stamp identifying one state of a mesh topology or a field.
///
/// Every mesh construction or refinement and every level-set update draws a fresh
/// generation. Derived data records the generation it was computed from, so that consumers
/// can reject stale combinations with a single comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Generation(u64);

impl Generation {
    pub fn next() -> Self {
        Self(NEXT_GENERATION.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Converts an `f64` into `T`.
///
/// Both `f32` and `f64` can represent every finite `f64` (the former with rounding), so the
/// conversion only fails for exotic scalar types, which the crate does not support.
pub fn convert_scalar<T: Real>(value: f64) -> T {
    T::from_f64(value).expect("Real scalar types must be constructible from f64")
}

pub fn to_f64<T: Real>(value: T) -> f64 {
    value.to_subset().unwrap_or(f64::NAN)
}

/// Twice the signed area of the triangle `(a, b, c)`, positive for counter-clockwise order.
pub fn doubled_signed_area<T: Real>(a: &Point2<T>, b: &Point2<T>, c: &Point2<T>) -> T {
    let ab = b - a;
    let ac = c - a;
    ab.x * ac.y - ab.y * ac.x
}

#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn triangle_area<T: Real>(a: &Point2<T>, b: &Point2<T>, c: &Point2<T>) -> T {
    0.5 * doubled_signed_area(a, b, c).abs()
}

/// Cofactor matrix `det(F) F^{-T}` of a 2x2 matrix.
///
/// Used for Nanson's formula, which maps reference normals times area elements to deformed
/// ones without inverting `F`.
pub fn cofactor_2x2<T: Real>(f: &Matrix2<T>) -> Matrix2<T> {
    Matrix2::new(f.m22, -f.m21, -f.m12, f.m11)
}

/// Counter-clockwise rotation of a 2D vector by 90 degrees.
pub fn perpendicular<T: Real>(v: &Vector2<T>) -> Vector2<T> {
    Vector2::new(-v.y, v.x)
}

/// Least-squares slope of `log(errors)` against `log(resolutions)`.
///
/// Returns the empirical order of convergence over all provided levels, which is far less
/// sensitive to the cut configuration of a single mesh than the ratio of two successive
/// errors.
pub fn estimate_convergence_rate(resolutions: &[f64], errors: &[f64]) -> f64 {
    assert_eq!(resolutions.len(), errors.len());
    assert!(resolutions.len() >= 2, "Need at least two levels to estimate a rate");
    let n = resolutions.len() as f64;
    let log_h: Vec<f64> = resolutions.iter().map(|h| h.ln()).collect();
    let log_e: Vec<f64> = errors.iter().map(|e| e.ln()).collect();
    let mean_h = log_h.iter().sum::<f64>() / n;
    let mean_e = log_e.iter().sum::<f64>() / n;
    let covariance: f64 = log_h
        .iter()
        .zip(&log_e)
        .map(|(h, e)| (h - mean_h) * (e - mean_e))
        .sum();
    let variance: f64 = log_h.iter().map(|h| (h - mean_h).powi(2)).sum();
    covariance / variance
}
