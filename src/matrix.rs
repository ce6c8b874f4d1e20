//! Sparse matrices over ℚ and the row-reduction primitives the affine
//! equalities domain is built from.
//!
//! Rows are stored as an ordered `Vec` and addressed by position, rather
//! than as a dense 2-D array — a row is itself a [`SparseVector`], and the
//! elimination routines in this module follow the usual Gaussian
//! swap/scale/eliminate structure, generalized to ℚ over an arbitrary
//! sparse layout and carried all the way to *reduced* row-echelon form
//! instead of stopping at triangular form.

use crate::error::Error;
use crate::rational::Rational;
use crate::vector::SparseVector;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A matrix of [`SparseVector`] rows sharing a common column count.
///
/// When used as a domain state's constraint system, a `SparseMatrix` is
/// expected to satisfy the reduced row-echelon invariant: every row has a
/// leading coefficient of exactly `1`, pivot columns strictly increase down
/// the rows, each pivot column has exactly one non-zero row, and there are
/// no all-zero rows. Column `cols - 1` is the constant column; a row
/// `(c_0, ..., c_{n-1}, k)` encodes the equality `sum_i c_i * x_i + k = 0`.
/// The empty matrix (no rows) represents the unconstrained top element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseMatrix {
    rows: Vec<SparseVector>,
    cols: usize,
}

impl SparseMatrix {
    /// The empty (no equalities) matrix over `cols` columns — top.
    pub fn empty(cols: usize) -> SparseMatrix {
        SparseMatrix {
            rows: Vec::new(),
            cols,
        }
    }

    /// Builds a matrix directly from a row list, without normalizing.
    ///
    /// # Panics
    /// Panics (in debug builds) if any row's length differs from `cols`.
    pub(crate) fn from_rows(rows: Vec<SparseVector>, cols: usize) -> SparseMatrix {
        debug_assert!(rows.iter().all(|r| r.length() == cols));
        SparseMatrix { rows, cols }
    }

    /// Number of rows (equalities).
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns (variables + the constant column).
    pub fn num_cols(&self) -> usize {
        self.cols
    }

    /// `true` iff there are no rows — no equality constrains the store.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The row at position `i`.
    pub fn get_row(&self, i: usize) -> &SparseVector {
        &self.rows[i]
    }

    /// All rows, in order.
    pub fn rows(&self) -> &[SparseVector] {
        &self.rows
    }

    /// The non-zero entries of column `j`, as `(row, value)` pairs in row
    /// order. Named after the triangular shape a column takes on once the
    /// matrix is in row-echelon form: at most one entry below the pivot
    /// diagonal.
    pub fn get_col_upper_triangular(&self, j: usize) -> Vec<(usize, Rational)> {
        self.rows
            .iter()
            .enumerate()
            .filter_map(|(i, r)| {
                let v = r.nth(j);
                (!v.is_zero()).then_some((i, v))
            })
            .collect()
    }

    /// Drops every row with no non-zero entries.
    pub fn remove_zero_rows(&self) -> SparseMatrix {
        SparseMatrix {
            rows: self.rows.iter().filter(|r| r.nnz() > 0).cloned().collect(),
            cols: self.cols,
        }
    }

    /// Inserts all-zero columns at the positions given by `new_idxs`
    /// (sorted, positions in the *new* column layout). Used when the
    /// environment grows with fresh variables.
    ///
    /// # Panics
    /// Panics (in debug builds) if `new_idxs` is not sorted or contains a
    /// duplicate or out-of-range position.
    pub fn add_empty_columns(&self, new_idxs: &[usize]) -> SparseMatrix {
        let new_cols = self.cols + new_idxs.len();
        debug_assert!(new_idxs.windows(2).all(|w| w[0] < w[1]));
        debug_assert!(new_idxs.iter().all(|&p| p < new_cols));
        let inserted: HashSet<usize> = new_idxs.iter().copied().collect();
        let mut old_to_new = vec![0usize; self.cols];
        let mut old_ptr = 0;
        for pos in 0..new_cols {
            if inserted.contains(&pos) {
                continue;
            }
            old_to_new[old_ptr] = pos;
            old_ptr += 1;
        }
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let entries = row
                    .entries()
                    .iter()
                    .map(|(i, q)| (old_to_new[*i], q.clone()))
                    .collect();
                SparseVector::from_sorted_entries(new_cols, entries)
            })
            .collect();
        SparseMatrix {
            rows,
            cols: new_cols,
        }
    }

    /// Deletes the columns at `idxs` (positions in the current layout).
    /// Any row left with no non-zero entries is dropped by
    /// [`SparseMatrix::remove_zero_rows`]. Callers that must preserve the
    /// equalities not mentioning the deleted variables should call
    /// [`SparseMatrix::reduce_col`] on each deleted column first.
    pub fn del_cols(&self, idxs: &[usize]) -> SparseMatrix {
        let removed: HashSet<usize> = idxs.iter().copied().collect();
        let new_cols = self.cols - removed.len();
        let mut old_to_new = vec![None; self.cols];
        let mut new_ptr = 0;
        for old in 0..self.cols {
            if removed.contains(&old) {
                continue;
            }
            old_to_new[old] = Some(new_ptr);
            new_ptr += 1;
        }
        let rows: Vec<SparseVector> = self
            .rows
            .iter()
            .map(|row| {
                let entries = row
                    .entries()
                    .iter()
                    .filter_map(|(i, q)| old_to_new[*i].map(|ni| (ni, q.clone())))
                    .collect();
                SparseVector::from_sorted_entries(new_cols, entries)
            })
            .collect();
        SparseMatrix {
            rows,
            cols: new_cols,
        }
        .remove_zero_rows()
    }

    /// Eliminates column `j` from every other row by pivoting on one row
    /// with a non-zero entry there, then drops that pivot row. This is the
    /// "forget a variable while keeping everything else" primitive: the
    /// equality used as the pivot is consumed to substitute the variable
    /// out of all remaining rows.
    ///
    /// If no row has a non-zero entry at `j` (the variable is already
    /// unconstrained), the matrix is returned unchanged.
    pub fn reduce_col(&self, j: usize) -> SparseMatrix {
        let Some(pivot) = self.rows.iter().position(|r| !r.nth(j).is_zero()) else {
            return self.clone();
        };
        let pivot_row = self.rows[pivot].clone();
        let pivot_val = pivot_row.nth(j);
        let rows: Vec<SparseVector> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != pivot)
            .map(|(_, r)| {
                let coeff = r.nth(j);
                if coeff.is_zero() {
                    r.clone()
                } else {
                    let factor = coeff.div(&pivot_val).expect("pivot entry is non-zero");
                    let scaled_pivot =
                        pivot_row.apply_with_c_preserving_zero(|q, c| q.mul(c), &factor);
                    r - &scaled_pivot
                }
            })
            .collect();
        SparseMatrix {
            rows,
            cols: self.cols,
        }
    }

    /// Adds `v` to an already-RREF matrix and re-normalizes.
    ///
    /// Returns `None` iff the resulting system is inconsistent.
    ///
    /// # Panics
    /// Panics if `v.length() != self.num_cols()`.
    pub fn rref_vec(&self, v: SparseVector) -> Option<SparseMatrix> {
        assert_eq!(v.length(), self.cols, "column count mismatch");
        let mut rows = self.rows.clone();
        rows.push(v);
        SparseMatrix::normalize(rows, self.cols)
    }

    /// Conjoins two RREF systems over the same columns and re-normalizes.
    ///
    /// Returns `None` iff the resulting system is inconsistent. This is the
    /// basis of `meet`.
    ///
    /// # Panics
    /// Panics if the column counts differ.
    pub fn rref_matrix(&self, other: &SparseMatrix) -> Option<SparseMatrix> {
        assert_eq!(self.cols, other.cols, "column count mismatch");
        let mut rows = self.rows.clone();
        rows.extend(other.rows.iter().cloned());
        SparseMatrix::normalize(rows, self.cols)
    }

    /// Gaussian-eliminates an arbitrary list of rows (not assumed to be in
    /// any particular form already) into reduced row-echelon form.
    ///
    /// Returns `None` iff a row reduces to `0 = k` with `k != 0` — the
    /// system is inconsistent and the caller should map this to bottom.
    /// Column `cols - 1` (the constant column) is never used as a pivot
    /// column.
    ///
    /// # Panics
    /// Panics if `cols == 0`, or if any row's length differs from `cols`.
    pub fn normalize(rows: Vec<SparseVector>, cols: usize) -> Option<SparseMatrix> {
        Self::try_normalize(rows, cols).ok()
    }

    /// The checked form of [`SparseMatrix::normalize`]: same elimination,
    /// but reports the inconsistency as [`Error::Inconsistent`] rather than
    /// collapsing it to `None` directly. `normalize` (and, through it,
    /// `rref_vec`/`rref_matrix`) is a thin wrapper over this that the
    /// `state`/`transfer` layer's callers then read as ⊥.
    ///
    /// # Panics
    /// Panics if `cols == 0`, or if any row's length differs from `cols`.
    pub(crate) fn try_normalize(mut rows: Vec<SparseVector>, cols: usize) -> Result<SparseMatrix, Error> {
        assert!(cols > 0, "a matrix always has at least the constant column");
        assert!(rows.iter().all(|r| r.length() == cols));
        let const_col = cols - 1;
        let mut pivot_row = 0;
        let mut pivot_col = 0;
        while pivot_col < const_col && pivot_row < rows.len() {
            let Some(sel) = (pivot_row..rows.len()).find(|&r| !rows[r].nth(pivot_col).is_zero())
            else {
                pivot_col += 1;
                continue;
            };
            rows.swap(pivot_row, sel);
            let pivot_val = rows[pivot_row].nth(pivot_col);
            if !pivot_val.is_one() {
                let inv = Rational::one().div(&pivot_val).expect("pivot is non-zero");
                rows[pivot_row] = rows[pivot_row].apply_with_c_preserving_zero(|q, c| q.mul(c), &inv);
            }
            for r in 0..rows.len() {
                if r == pivot_row {
                    continue;
                }
                let coeff = rows[r].nth(pivot_col);
                if !coeff.is_zero() {
                    let scaled_pivot =
                        rows[pivot_row].apply_with_c_preserving_zero(|q, c| q.mul(c), &coeff);
                    rows[r] = &rows[r] - &scaled_pivot;
                }
            }
            pivot_row += 1;
            pivot_col += 1;
        }
        // Every row from `pivot_row` on has, by construction, an all-zero
        // variable part; only the constant column can still be non-zero.
        for row in &rows[pivot_row..] {
            if !row.nth(const_col).is_zero() {
                return Err(Error::Inconsistent);
            }
        }
        rows.truncate(pivot_row);
        Ok(SparseMatrix { rows, cols })
    }

    /// Computes the smallest affine subspace containing the union of the
    /// solution sets of `self` and `other` — the basis of `join`.
    ///
    /// Implemented via Karr's homogenization trick: an equality system's
    /// solution set, embedded at constant-column height `1`, spans a linear
    /// subspace of the homogeneous space whose basis is exactly this
    /// matrix's nullspace ([`kernel_basis`]). The affine hull of the union
    /// of two such solution sets corresponds to the *sum* of their
    /// homogenized linear subspaces, i.e. the span of the union of their
    /// nullspace bases. Re-deriving the equalities that characterize that
    /// sum is, by the same duality, another nullspace computation — this
    /// time of the combined generator set.
    ///
    /// # Panics
    /// Panics if the column counts differ.
    pub fn linear_disjunct(&self, other: &SparseMatrix) -> SparseMatrix {
        assert_eq!(self.cols, other.cols, "column count mismatch");
        if self == other {
            return self.clone();
        }
        let dim = self.cols;
        let mut generators = kernel_basis(&self.rows, dim);
        generators.extend(kernel_basis(&other.rows, dim));
        let constraint_rows = kernel_basis(&generators, dim);
        SparseMatrix::normalize(constraint_rows, dim)
            .expect("join of two consistent systems is always consistent")
    }

    /// `true` iff every row of `self` (read as a linear equality) lies in
    /// the row span of `sup`, which must already be in RREF. Used for `⊑`.
    ///
    /// # Panics
    /// Panics if the column counts differ.
    pub fn is_covered_by(&self, sup: &SparseMatrix) -> bool {
        assert_eq!(self.cols, sup.cols, "column count mismatch");
        self.rows.iter().all(|r| sup.reduces_to_zero(r))
    }

    /// Reduces `r` by `self`'s rows (assumed RREF) and reports whether it
    /// vanishes, i.e. whether `r` lies in `self`'s row span.
    fn reduces_to_zero(&self, r: &SparseVector) -> bool {
        let mut r = r.clone();
        for row in &self.rows {
            let Some((pivot, _)) = row.find_first_nonzero() else {
                continue;
            };
            let coeff = r.nth(pivot);
            if !coeff.is_zero() {
                let scaled = row.apply_with_c_preserving_zero(|q, c| q.mul(c), &coeff);
                r = &r - &scaled;
            }
        }
        r.nnz() == 0
    }
}

/// Computes a basis of `{ x in Q^dim : row . x = 0 for every row in rows }`.
///
/// This is the same Gaussian-elimination machinery as
/// [`SparseMatrix::normalize`], but over the full `dim` columns (no
/// distinguished constant column, since this is a purely linear — not
/// affine — computation) and without an inconsistency check (a linear
/// system over its own nullspace is never inconsistent: the zero vector
/// always solves it).
pub(crate) fn kernel_basis(rows: &[SparseVector], dim: usize) -> Vec<SparseVector> {
    let reduced = rref_rows(rows.to_vec(), dim);
    let mut is_pivot = vec![false; dim];
    let mut pivot_cols = Vec::with_capacity(reduced.len());
    for row in &reduced {
        let (p, _) = row.find_first_nonzero().expect("rref_rows drops zero rows");
        is_pivot[p] = true;
        pivot_cols.push(p);
    }
    let mut basis = Vec::new();
    for free in 0..dim {
        if is_pivot[free] {
            continue;
        }
        let mut v = SparseVector::zero_vec(dim).set_nth(free, Rational::one());
        for (row, &p) in reduced.iter().zip(pivot_cols.iter()) {
            let a = row.nth(free);
            if !a.is_zero() {
                v = v.set_nth(p, a.neg());
            }
        }
        basis.push(v);
    }
    basis
}

/// Row-echelon-reduces `rows` over all `dim` columns (no constant column
/// exclusion), dropping zero rows. Shared by [`kernel_basis`].
fn rref_rows(mut rows: Vec<SparseVector>, dim: usize) -> Vec<SparseVector> {
    let mut pivot_row = 0;
    for pivot_col in 0..dim {
        if pivot_row >= rows.len() {
            break;
        }
        let Some(sel) = (pivot_row..rows.len()).find(|&r| !rows[r].nth(pivot_col).is_zero())
        else {
            continue;
        };
        rows.swap(pivot_row, sel);
        let pivot_val = rows[pivot_row].nth(pivot_col);
        if !pivot_val.is_one() {
            let inv = Rational::one().div(&pivot_val).expect("pivot is non-zero");
            rows[pivot_row] = rows[pivot_row].apply_with_c_preserving_zero(|q, c| q.mul(c), &inv);
        }
        for r in 0..rows.len() {
            if r == pivot_row {
                continue;
            }
            let coeff = rows[r].nth(pivot_col);
            if !coeff.is_zero() {
                let scaled_pivot =
                    rows[pivot_row].apply_with_c_preserving_zero(|q, c| q.mul(c), &coeff);
                rows[r] = &rows[r] - &scaled_pivot;
            }
        }
        pivot_row += 1;
    }
    rows.truncate(pivot_row);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cols: usize, entries: &[(usize, i64)]) -> SparseVector {
        let mut v = SparseVector::zero_vec(cols);
        for &(i, val) in entries {
            v = v.set_nth(i, Rational::from_i64(val));
        }
        v
    }

    #[test]
    fn normalize_reduces_to_rref() {
        // x + y + 1 = 0 ; x - y - 1 = 0  (cols: x, y, const)
        let rows = vec![row(3, &[(0, 1), (1, 1), (2, 1)]), row(3, &[(0, 1), (1, -1), (2, -1)])];
        let m = SparseMatrix::normalize(rows, 3).unwrap();
        assert_eq!(m.num_rows(), 2);
        // x = -1, y = 0 => rows should read x + 1 = 0 and y = 0
        assert_eq!(m.get_row(0).nth(0), Rational::one());
        assert_eq!(m.get_row(0).nth(2), Rational::one());
        assert_eq!(m.get_row(1).nth(1), Rational::one());
        assert_eq!(m.get_row(1).nth(2), Rational::zero());
    }

    #[test]
    fn normalize_detects_inconsistency() {
        // x = 0 and x = 1 simultaneously (cols: x, const)
        let rows = vec![row(2, &[(0, 1), (1, 0)]), row(2, &[(0, 1), (1, -1)])];
        assert!(SparseMatrix::normalize(rows, 2).is_none());
    }

    #[test]
    fn try_normalize_reports_inconsistent_error() {
        let rows = vec![row(2, &[(0, 1), (1, 0)]), row(2, &[(0, 1), (1, -1)])];
        assert_eq!(SparseMatrix::try_normalize(rows, 2), Err(Error::Inconsistent));
    }

    #[test]
    fn reduce_col_eliminates_variable_and_drops_pivot_row() {
        // x = y ; (cols: x, y, const), forget x
        let rows = vec![row(3, &[(0, 1), (1, -1)])];
        let m = SparseMatrix { rows, cols: 3 };
        let reduced = m.reduce_col(0);
        assert_eq!(reduced.num_rows(), 0);
    }

    #[test]
    fn reduce_col_substitutes_into_other_rows() {
        // x - y = 0 ; x + z + 1 = 0. Forgetting x should leave
        // -y + z + 1 = 0 (i.e. z - y + 1 = 0 up to sign).
        let rows = vec![
            row(4, &[(0, 1), (1, -1)]),
            row(4, &[(0, 1), (2, 1), (3, 1)]),
        ];
        let m = SparseMatrix { rows, cols: 4 };
        let reduced = m.reduce_col(0);
        assert_eq!(reduced.num_rows(), 1);
        let r = reduced.get_row(0);
        assert_eq!(r.nth(0), Rational::zero());
        assert_eq!(r.nth(1), Rational::from_i64(-1));
        assert_eq!(r.nth(2), Rational::from_i64(1));
        assert_eq!(r.nth(3), Rational::from_i64(1));
    }

    #[test]
    fn is_covered_by_detects_row_span_membership() {
        let sup = SparseMatrix::normalize(vec![row(3, &[(0, 1), (1, 1), (2, 0)])], 3).unwrap();
        // 2x + 2y = 0 is in the span of x + y = 0
        let sub = SparseMatrix {
            rows: vec![row(3, &[(0, 2), (1, 2), (2, 0)])],
            cols: 3,
        };
        assert!(sub.is_covered_by(&sup));
        let not_covered = SparseMatrix {
            rows: vec![row(3, &[(0, 1), (1, 0), (2, 0)])],
            cols: 3,
        };
        assert!(!not_covered.is_covered_by(&sup));
    }

    #[test]
    fn linear_disjunct_of_two_points_drops_all_equalities() {
        // x = 1 versus x = 2; their affine hull is all of Q (no constraint survives).
        let a = SparseMatrix::normalize(vec![row(2, &[(0, 1), (1, -1)])], 2).unwrap();
        let b = SparseMatrix::normalize(vec![row(2, &[(0, 1), (1, -2)])], 2).unwrap();
        let joined = a.linear_disjunct(&b);
        assert!(joined.is_empty());
    }

    #[test]
    fn linear_disjunct_keeps_shared_equalities() {
        // x = 1, y = 3  versus  x = 2, y = 3: shared equality y = 3 survives.
        let a = SparseMatrix::normalize(
            vec![row(3, &[(0, 1), (2, -1)]), row(3, &[(1, 1), (2, -3)])],
            3,
        )
        .unwrap();
        let b = SparseMatrix::normalize(
            vec![row(3, &[(0, 1), (2, -2)]), row(3, &[(1, 1), (2, -3)])],
            3,
        )
        .unwrap();
        let joined = a.linear_disjunct(&b);
        assert_eq!(joined.num_rows(), 1);
        let r = joined.get_row(0);
        assert_eq!(r.nth(0), Rational::zero());
        assert_eq!(r.nth(1), Rational::one());
        assert_eq!(r.nth(2), Rational::from_i64(-3));
    }

    #[test]
    fn add_and_del_cols_roundtrip_reindexes() {
        let rows = vec![row(3, &[(0, 1), (2, 5)])];
        let m = SparseMatrix { rows, cols: 3 };
        let grown = m.add_empty_columns(&[1]);
        assert_eq!(grown.num_cols(), 4);
        assert_eq!(grown.get_row(0).nth(0), Rational::one());
        assert_eq!(grown.get_row(0).nth(1), Rational::zero());
        assert_eq!(grown.get_row(0).nth(3), Rational::from_i64(5));
        let shrunk = grown.del_cols(&[1]);
        assert_eq!(shrunk, m);
    }
}
