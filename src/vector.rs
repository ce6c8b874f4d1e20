//! Sparse rational vectors.
//!
//! A [`SparseVector`] is a length-tagged element of ℚⁿ, stored as a sorted
//! list of `(index, value)` pairs with every stored value non-zero — an
//! "ordered list of entries" representation generalized from the presence
//! list a binary parity-check matrix row would use to a rational-valued
//! one.

use crate::rational::Rational;
use serde::{Deserialize, Serialize};

/// A sparse vector over ℚ with a fixed, explicit length.
///
/// Two vectors of different length are never equal, even if their non-zero
/// entries agree: `length` is part of the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseVector {
    length: usize,
    // Sorted strictly by index; no duplicate indices; no stored zero.
    entries: Vec<(usize, Rational)>,
}

impl SparseVector {
    /// The all-zero vector of length `n`.
    pub fn zero_vec(n: usize) -> SparseVector {
        SparseVector {
            length: n,
            entries: Vec::new(),
        }
    }

    /// Builds a vector from an already sorted, zero-free list of entries.
    ///
    /// # Panics
    /// Panics (in debug builds) if an index is out of range, an entry is
    /// zero, or entries are not sorted strictly by index. This is an
    /// internal-construction helper; public callers should build vectors
    /// with [`SparseVector::zero_vec`] and [`SparseVector::set_nth`].
    pub(crate) fn from_sorted_entries(length: usize, entries: Vec<(usize, Rational)>) -> SparseVector {
        debug_assert!(entries.iter().all(|(i, _)| *i < length));
        debug_assert!(entries.iter().all(|(_, v)| !v.is_zero()));
        debug_assert!(entries.windows(2).all(|w| w[0].0 < w[1].0));
        SparseVector { length, entries }
    }

    /// The declared length of the vector.
    pub fn length(&self) -> usize {
        self.length
    }

    /// The non-zero entries, in increasing index order.
    pub fn entries(&self) -> &[(usize, Rational)] {
        &self.entries
    }

    /// Number of non-zero entries.
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    /// Compares `length` against `k`, without materializing anything.
    pub fn compare_length_with(&self, k: usize) -> std::cmp::Ordering {
        self.length.cmp(&k)
    }

    /// Returns the value at index `i`, or zero if absent.
    ///
    /// # Panics
    /// Panics if `i >= self.length()`.
    pub fn nth(&self, i: usize) -> Rational {
        assert!(i < self.length, "index out of bounds");
        match self.entries.binary_search_by_key(&i, |(idx, _)| *idx) {
            Ok(pos) => self.entries[pos].1.clone(),
            Err(_) => Rational::zero(),
        }
    }

    /// Returns a new vector equal to `self` except at index `i`, which is
    /// set to `q`. If `q` is zero, any existing entry at `i` is removed
    /// (zero is never materialized).
    ///
    /// # Panics
    /// Panics if `i >= self.length()`.
    pub fn set_nth(&self, i: usize, q: Rational) -> SparseVector {
        assert!(i < self.length, "index out of bounds");
        let mut entries = self.entries.clone();
        match entries.binary_search_by_key(&i, |(idx, _)| *idx) {
            Ok(pos) => {
                if q.is_zero() {
                    entries.remove(pos);
                } else {
                    entries[pos].1 = q;
                }
            }
            Err(pos) => {
                if !q.is_zero() {
                    entries.insert(pos, (i, q));
                }
            }
        }
        SparseVector {
            length: self.length,
            entries,
        }
    }

    /// Returns the lowest-index non-zero entry, if any.
    pub fn find_first_nonzero(&self) -> Option<(usize, &Rational)> {
        self.entries.first().map(|(i, q)| (*i, q))
    }

    /// `true` iff at most the last coordinate (conventionally the constant
    /// column) is non-zero.
    pub fn is_const_vec(&self) -> bool {
        match self.entries.len() {
            0 => true,
            1 => self.entries[0].0 == self.length.saturating_sub(1),
            _ => false,
        }
    }

    /// Applies `f` to every non-zero entry, keeping zero fixed
    /// (`f(0) = 0`). Entries that map to zero are dropped.
    pub fn map_preserving_zero(&self, f: impl Fn(&Rational) -> Rational) -> SparseVector {
        let entries = self
            .entries
            .iter()
            .filter_map(|(i, q)| {
                let r = f(q);
                (!r.is_zero()).then_some((*i, r))
            })
            .collect();
        SparseVector {
            length: self.length,
            entries,
        }
    }

    /// Index-sensitive variant of [`SparseVector::map_preserving_zero`].
    pub fn mapi_preserving_zero(&self, f: impl Fn(usize, &Rational) -> Rational) -> SparseVector {
        let entries = self
            .entries
            .iter()
            .filter_map(|(i, q)| {
                let r = f(*i, q);
                (!r.is_zero()).then_some((*i, r))
            })
            .collect();
        SparseVector {
            length: self.length,
            entries,
        }
    }

    /// Scales every entry by `c` via `f` (commonly multiplication or
    /// division), preserving zero (`f(0, c) = 0`).
    pub fn apply_with_c_preserving_zero(&self, f: impl Fn(&Rational, &Rational) -> Rational, c: &Rational) -> SparseVector {
        self.map_preserving_zero(|q| f(q, c))
    }

    /// Merges two same-length vectors via `f`, preserving zero
    /// (`f(0, 0) = 0`).
    ///
    /// # Panics
    /// Panics if the two vectors have different lengths.
    pub fn map2_preserving_zero(&self, other: &SparseVector, f: impl Fn(&Rational, &Rational) -> Rational) -> SparseVector {
        assert_eq!(self.length, other.length, "length mismatch in map2");
        let mut entries = Vec::new();
        let (mut i, mut j) = (0, 0);
        let zero = Rational::zero();
        while i < self.entries.len() || j < other.entries.len() {
            let (idx, a, b) = match (self.entries.get(i), other.entries.get(j)) {
                (Some((ia, qa)), Some((ib, qb))) if ia == ib => {
                    i += 1;
                    j += 1;
                    (*ia, qa.clone(), qb.clone())
                }
                (Some((ia, qa)), Some((ib, _))) if ia < ib => {
                    i += 1;
                    (*ia, qa.clone(), zero.clone())
                }
                (Some((ia, _)), Some((ib, qb))) if ia > ib => {
                    j += 1;
                    (*ib, zero.clone(), qb.clone())
                }
                (Some((ia, qa)), None) => {
                    i += 1;
                    (*ia, qa.clone(), zero.clone())
                }
                (None, Some((ib, qb))) => {
                    j += 1;
                    (*ib, zero.clone(), qb.clone())
                }
                _ => unreachable!(),
            };
            let r = f(&a, &b);
            if !r.is_zero() {
                entries.push((idx, r));
            }
        }
        SparseVector {
            length: self.length,
            entries,
        }
    }

    /// Iterator over the non-zero entries, in increasing index order.
    pub fn iter(&self) -> impl Iterator<Item = &(usize, Rational)> {
        self.entries.iter()
    }
}

impl core::ops::Neg for &SparseVector {
    type Output = SparseVector;
    fn neg(self) -> SparseVector {
        self.map_preserving_zero(|q| q.neg())
    }
}

impl core::ops::Add for &SparseVector {
    type Output = SparseVector;
    fn add(self, rhs: &SparseVector) -> SparseVector {
        self.map2_preserving_zero(rhs, |a, b| a.add(b))
    }
}

impl core::ops::Sub for &SparseVector {
    type Output = SparseVector;
    fn sub(self, rhs: &SparseVector) -> SparseVector {
        self.map2_preserving_zero(rhs, |a, b| a.sub(b))
    }
}
