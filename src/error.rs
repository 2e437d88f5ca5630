//! Library-wide error type.
use std::fmt;
use std::fmt::{Display, Formatter};

/// Errors reported by the cut finite element engine.
///
/// Geometric degeneracies (nodes exactly on the interface, sub-cells of vanishing measure)
/// are never reported as errors. They are resolved by the tie-break documented on
/// [`ZeroSign`](crate::cut_info::ZeroSign).
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum CutFemError {
    /// Invalid input or configuration: malformed meshes, unsupported orders, reference times
    /// outside `[0, 1]`, or data belonging to a different mesh topology.
    Configuration(String),
    /// Derived state (classification, deformation, assembled system) does not match the
    /// current level-set generation or the driver state machine.
    StaleState(String),
    /// The restricted linear system is singular or the iterative solver did not converge.
    SingularSystem(String),
    /// No quadrature rule is available for the requested order.
    Quadrature(cutfem_quadrature::Error),
}

impl CutFemError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn stale(message: impl Into<String>) -> Self {
        Self::StaleState(message.into())
    }

    pub(crate) fn singular(message: impl Into<String>) -> Self {
        Self::SingularSystem(message.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    pub fn is_stale_state(&self) -> bool {
        matches!(self, Self::StaleState(_))
    }

    pub fn is_singular_system(&self) -> bool {
        matches!(self, Self::SingularSystem(_))
    }
}

impl Display for CutFemError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(message) => write!(f, "configuration error: {message}"),
            Self::StaleState(message) => write!(f, "stale state: {message}"),
            Self::SingularSystem(message) => write!(f, "singular system: {message}"),
            Self::Quadrature(error) => write!(f, "quadrature error: {error}"),
        }
    }
}

impl std::error::Error for CutFemError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Quadrature(error) => Some(error),
            _ => None,
        }
    }
}

impl From<cutfem_quadrature::Error> for CutFemError {
    fn from(error: cutfem_quadrature::Error) -> Self {
        Self::Quadrature(error)
    }
}
