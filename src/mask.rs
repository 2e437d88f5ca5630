//! Typed boolean masks over elements, facets and degrees of freedom.
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::ops::{BitAnd, BitOr, Not};

/// Marker for masks over mesh elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elements {}

/// Marker for masks over mesh facets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facets {}

/// Marker for masks over degrees of freedom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dofs {}

/// A boolean mask over an index range, tagged with the kind of entity it indexes.
///
/// The tag prevents e.g. an element set from being combined with a dof mask. Binary
/// operations panic on length mismatch, since that always indicates masks built for
/// different meshes or spaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct IndexMask<Kind> {
    mask: Vec<bool>,
    #[serde(skip)]
    marker: PhantomData<Kind>,
}

pub type ElementSet = IndexMask<Elements>;
pub type FacetSet = IndexMask<Facets>;
pub type DofMask = IndexMask<Dofs>;

impl<Kind> IndexMask<Kind> {
    /// An empty mask over `len` indices.
    pub fn new(len: usize) -> Self {
        Self::from_vec(vec![false; len])
    }

    /// A mask containing every index in `0 .. len`.
    pub fn full(len: usize) -> Self {
        Self::from_vec(vec![true; len])
    }

    pub fn from_vec(mask: Vec<bool>) -> Self {
        Self {
            mask,
            marker: PhantomData,
        }
    }

    pub fn from_fn(len: usize, f: impl FnMut(usize) -> bool) -> Self {
        Self::from_vec((0..len).map(f).collect())
    }

    /// A mask over `len` indices containing exactly the given indices.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of bounds.
    pub fn from_indices(len: usize, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut mask = Self::new(len);
        for index in indices {
            mask.insert(index);
        }
        mask
    }

    /// Number of indices the mask ranges over (not the number of members).
    pub fn len(&self) -> usize {
        self.mask.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.mask.get(index).copied().unwrap_or(false)
    }

    pub fn insert(&mut self, index: usize) {
        self.mask[index] = true;
    }

    pub fn remove(&mut self, index: usize) {
        self.mask[index] = false;
    }

    /// Number of members.
    pub fn count(&self) -> usize {
        self.mask.iter().filter(|&&member| member).count()
    }

    /// Iterates over the members in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.mask
            .iter()
            .enumerate()
            .filter_map(|(index, &member)| member.then_some(index))
    }

    /// Collects the members in increasing order.
    pub fn indices(&self) -> Vec<usize> {
        self.iter().collect()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.mask
    }

    pub fn union(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a || b)
    }

    pub fn intersection(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a && b)
    }

    pub fn difference(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a && !b)
    }

    pub fn complement(&self) -> Self {
        Self::from_vec(self.mask.iter().map(|member| !member).collect())
    }

    pub fn is_subset_of(&self, other: &Self) -> bool {
        assert_eq!(self.len(), other.len(), "Masks must range over the same indices");
        self.mask.iter().zip(&other.mask).all(|(&a, &b)| !a || b)
    }

    /// Stacks masks over consecutive index blocks, e.g. the components of a product space.
    pub fn concatenate<'a>(parts: impl IntoIterator<Item = &'a Self>) -> Self
    where
        Kind: 'a,
    {
        Self::from_vec(
            parts
                .into_iter()
                .flat_map(|part| part.mask.iter().copied())
                .collect(),
        )
    }

    fn zip_with(&self, other: &Self, op: impl Fn(bool, bool) -> bool) -> Self {
        assert_eq!(self.len(), other.len(), "Masks must range over the same indices");
        Self::from_vec(
            self.mask
                .iter()
                .zip(&other.mask)
                .map(|(&a, &b)| op(a, b))
                .collect(),
        )
    }
}

impl<'a, Kind> BitAnd for &'a IndexMask<Kind> {
    type Output = IndexMask<Kind>;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.intersection(rhs)
    }
}

impl<'a, Kind> BitOr for &'a IndexMask<Kind> {
    type Output = IndexMask<Kind>;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl<'a, Kind> Not for &'a IndexMask<Kind> {
    type Output = IndexMask<Kind>;

    fn not(self) -> Self::Output {
        self.complement()
    }
}
