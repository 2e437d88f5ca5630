//! Bandwidth-reducing reordering of symmetric sparse systems.
use crate::error::CutFemError;
use nalgebra_sparse::pattern::SparsityPattern;
use std::collections::VecDeque;

/// A representation of an index permutation.
///
/// Given `n` objects stored contiguously, the permutation stores an array `perm` such that
/// for *target index* `i` in `0 .. n` the corresponding *source index* is `perm[i]`:
///
/// ```ignore
/// target[i] = source[perm[i]]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutation {
    perm: Vec<usize>,
}

impl Permutation {
    pub fn from_vec(perm: Vec<usize>) -> Result<Self, CutFemError> {
        let mut visited = vec![false; perm.len()];
        for &index in &perm {
            if index >= perm.len() || visited[index] {
                return Err(CutFemError::configuration(format!(
                    "index {} appears twice or is out of bounds in a permutation of length {}",
                    index,
                    perm.len()
                )));
            }
            visited[index] = true;
        }
        Ok(Self { perm })
    }

    pub fn identity(len: usize) -> Self {
        Self {
            perm: (0..len).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.perm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.perm.is_empty()
    }

    pub fn perm(&self) -> &[usize] {
        &self.perm
    }

    pub fn reverse(&mut self) {
        self.perm.reverse()
    }

    pub fn source_index(&self, target_index: usize) -> usize {
        self.perm[target_index]
    }

    pub fn inverse(&self) -> Permutation {
        let mut inverse_perm = vec![0; self.len()];
        for (target_index, &source_index) in self.perm.iter().enumerate() {
            inverse_perm[source_index] = target_index;
        }
        Self { perm: inverse_perm }
    }

    pub fn apply_to_slice<X: Clone>(&self, slice: &[X]) -> Vec<X> {
        assert_eq!(slice.len(), self.len(), "Slice and permutation must have the same size.");
        self.perm.iter().map(|&source_index| slice[source_index].clone()).collect()
    }
}

/// Create a permutation for a structurally symmetric sparsity pattern using the
/// Cuthill-McKee algorithm.
///
/// Disconnected components, such as the two fields of a product space away from the
/// interface, are traversed one after another, each starting from its unvisited vertex of
/// least degree.
pub fn cuthill_mckee(pattern: &SparsityPattern) -> Result<Permutation, CutFemError> {
    if pattern.major_dim() != pattern.minor_dim() {
        return Err(CutFemError::configuration("Cuthill-McKee ordering needs a square pattern"));
    }
    let n = pattern.major_dim();
    let degree = |vertex: usize| pattern.lane(vertex).len();

    // Candidate start vertices, from lowest to highest degree
    let mut starts: Vec<usize> = (0..n).collect();
    starts.sort_by_key(|&vertex| degree(vertex));

    let mut queue = VecDeque::new();
    let mut permutation = Vec::with_capacity(n);
    let mut visited = vec![false; n];
    let mut neighbors = Vec::new();

    for start in starts {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        queue.push_back(start);
        while let Some(vertex) = queue.pop_front() {
            permutation.push(vertex);
            // Breadth-first search visiting neighbors from lowest to highest degree
            neighbors.clear();
            neighbors.extend_from_slice(pattern.lane(vertex));
            neighbors.sort_unstable_by_key(|&neighbor| degree(neighbor));
            for &neighbor in &neighbors {
                if !visited[neighbor] {
                    visited[neighbor] = true;
                    queue.push_back(neighbor);
                }
            }
        }
    }
    Permutation::from_vec(permutation)
}

/// Create a permutation for a structurally symmetric sparsity pattern using the Reverse
/// Cuthill-McKee (RCM) algorithm.
pub fn reverse_cuthill_mckee(pattern: &SparsityPattern) -> Result<Permutation, CutFemError> {
    let mut perm = cuthill_mckee(pattern)?;
    perm.reverse();
    Ok(perm)
}
