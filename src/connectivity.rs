//! Index-based cell connectivity.
use serde::{Deserialize, Serialize};
use std::ops::Deref;

pub trait Connectivity: Clone {
    fn vertex_indices(&self) -> &[usize];
}

/// Connectivity for a linear triangle in two dimensions.
///
/// Vertices are ordered counter-clockwise. Local edge `i` connects vertices `i` and
/// `(i + 1) % 3`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tri3d2Connectivity(pub [usize; 3]);

impl Tri3d2Connectivity {
    /// Local vertex indices `(a, b)` of local edge `i`, in counter-clockwise direction.
    pub fn local_edge(i: usize) -> (usize, usize) {
        (i, (i + 1) % 3)
    }

    /// Global vertex indices of local edge `i`, in counter-clockwise direction.
    pub fn edge(&self, i: usize) -> Segment2d2Connectivity {
        let (a, b) = Self::local_edge(i);
        Segment2d2Connectivity([self.0[a], self.0[b]])
    }
}

impl Connectivity for Tri3d2Connectivity {
    fn vertex_indices(&self) -> &[usize] {
        &self.0
    }
}

impl Deref for Tri3d2Connectivity {
    type Target = [usize; 3];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Connectivity for a line segment in two dimensions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment2d2Connectivity(pub [usize; 2]);

impl Segment2d2Connectivity {
    /// The same segment with vertex indices in increasing order.
    pub fn sorted(&self) -> Self {
        let [a, b] = self.0;
        Self([a.min(b), a.max(b)])
    }
}

impl Connectivity for Segment2d2Connectivity {
    fn vertex_indices(&self) -> &[usize] {
        &self.0
    }
}

impl Deref for Segment2d2Connectivity {
    type Target = [usize; 2];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
