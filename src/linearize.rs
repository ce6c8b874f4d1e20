//! Expression trees and their reduction to affine form.
//!
//! The domain only ever manipulates linear equalities, but callers think in
//! terms of ordinary arithmetic expressions over program variables. This
//! module is the boundary between the two: [`Expr`] is the caller-facing
//! expression dialect, and [`linearize`] is the one function that turns an
//! `Expr` into a coefficient vector the matrix layer understands, folding in
//! any variable whose value is already pinned to a constant by the state's
//! current equalities (so `x + 1` linearizes to a plain number once `x = 0`
//! is already known).
//!
//! The shape here is a small AST plus one reducing function: a description
//! gets folded down to one concrete artifact, a [`crate::vector::SparseVector`]
//! rather than a parity-check matrix.

use crate::environment::{Environment, VarId};
use crate::error::Error;
use crate::matrix::SparseMatrix;
use crate::rational::Rational;
use crate::vector::SparseVector;

/// An arithmetic expression over program variables and rational constants.
///
/// Only the operators that can appear in an affine expression are
/// represented: no division, no multiplication of two non-constant
/// subexpressions. `Cast` exists to mirror a source language's int/real
/// coercions; it is semantically transparent to this domain (ℚ already
/// contains the integers) and is kept only so callers don't need to strip
/// casts before handing an expression over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr<V> {
    /// A literal rational constant.
    Const(Rational),
    /// A reference to a tracked variable.
    Var(V),
    /// Unary negation.
    Neg(Box<Expr<V>>),
    /// An int/real coercion, semantically a no-op in this domain.
    Cast(Box<Expr<V>>),
    /// Sum of two subexpressions.
    Add(Box<Expr<V>>, Box<Expr<V>>),
    /// Difference of two subexpressions.
    Sub(Box<Expr<V>>, Box<Expr<V>>),
    /// Product of two subexpressions. Affine only if at least one side
    /// linearizes to a constant.
    Mul(Box<Expr<V>>, Box<Expr<V>>),
}

impl<V> Expr<V> {
    /// Convenience constructor for [`Expr::Add`].
    pub fn add(l: Expr<V>, r: Expr<V>) -> Expr<V> {
        Expr::Add(Box::new(l), Box::new(r))
    }

    /// Convenience constructor for [`Expr::Sub`].
    pub fn sub(l: Expr<V>, r: Expr<V>) -> Expr<V> {
        Expr::Sub(Box::new(l), Box::new(r))
    }

    /// Convenience constructor for [`Expr::Mul`].
    pub fn mul(l: Expr<V>, r: Expr<V>) -> Expr<V> {
        Expr::Mul(Box::new(l), Box::new(r))
    }

    /// Convenience constructor for [`Expr::Neg`].
    pub fn neg(e: Expr<V>) -> Expr<V> {
        Expr::Neg(Box::new(e))
    }

    /// Convenience constructor for [`Expr::Cast`].
    pub fn cast(e: Expr<V>) -> Expr<V> {
        Expr::Cast(Box::new(e))
    }
}

/// A comparison operator for a guard/assertion on a linearized expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
    /// `expr == 0`
    Eq,
    /// `expr != 0`
    Diseq,
    /// `expr > 0`
    Sup,
    /// `expr >= 0`
    SupEq,
}

/// A linear constraint `expr OP 0`, in the caller's expression dialect.
/// [`crate::transfer::meet_tcons`] linearizes `expr` and refines a state by
/// it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tcons<V> {
    /// The expression being compared against zero.
    pub expr: Expr<V>,
    /// The comparison operator.
    pub op: CompOp,
}

impl<V> Tcons<V> {
    /// Builds a constraint `expr OP 0`.
    pub fn new(expr: Expr<V>, op: CompOp) -> Tcons<V> {
        Tcons { expr, op }
    }
}

/// Reduces `expr` to an affine coefficient vector over `env`'s columns
/// (plus one trailing constant column), substituting in the constant value
/// of any variable already pinned by an equality row of `known`.
///
/// # Errors
/// Returns [`Error::NotAffine`] if `expr` contains a variable not tracked
/// by `env`, or a product of two genuinely non-constant subexpressions.
pub fn linearize<E: Environment<Var = V>, V>(
    expr: &Expr<V>,
    env: &E,
    known: Option<&SparseMatrix>,
) -> Result<SparseVector, Error>
where
    V: Clone,
{
    let n = env.size();
    match expr {
        Expr::Const(c) => Ok(SparseVector::zero_vec(n + 1).set_nth(n, c.clone())),
        Expr::Var(v) => {
            let dim = env.dim_of_var(v).ok_or(Error::NotAffine)?;
            if let Some(c) = known.and_then(|m| constant_value_of(m, dim)) {
                Ok(SparseVector::zero_vec(n + 1).set_nth(n, c))
            } else {
                Ok(SparseVector::zero_vec(n + 1).set_nth(dim, Rational::one()))
            }
        }
        Expr::Neg(e) => Ok(linearize(e, env, known)?.map_preserving_zero(|q| q.neg())),
        Expr::Cast(e) => linearize(e, env, known),
        Expr::Add(l, r) => {
            let lv = linearize(l, env, known)?;
            let rv = linearize(r, env, known)?;
            Ok(lv.map2_preserving_zero(&rv, |a, b| a.add(b)))
        }
        Expr::Sub(l, r) => {
            let lv = linearize(l, env, known)?;
            let rv = linearize(r, env, known)?;
            Ok(lv.map2_preserving_zero(&rv, |a, b| a.sub(b)))
        }
        Expr::Mul(l, r) => {
            let lv = linearize(l, env, known)?;
            let rv = linearize(r, env, known)?;
            if let Some(c) = as_constant(&lv, n) {
                Ok(rv.map_preserving_zero(|q| q.mul(&c)))
            } else if let Some(c) = as_constant(&rv, n) {
                Ok(lv.map_preserving_zero(|q| q.mul(&c)))
            } else {
                Err(Error::NotAffine)
            }
        }
    }
}

/// `Some(c)` iff `v` is the constant vector `c * e_n` (only the trailing
/// column non-zero, or the zero vector, meaning `c = 0`).
fn as_constant(v: &SparseVector, n: usize) -> Option<Rational> {
    if v.is_const_vec() {
        Some(v.nth(n))
    } else {
        None
    }
}

/// If `matrix` has a row that pins column `dim` to a constant (a row whose
/// only non-zero entries are `dim` itself, with unit coefficient, and the
/// trailing constant column), returns that constant.
fn constant_value_of(matrix: &SparseMatrix, dim: usize) -> Option<Rational> {
    let const_col = matrix.num_cols() - 1;
    matrix.rows().iter().find_map(|row| {
        let entries = row.entries();
        match entries {
            [(i, coeff)] if *i == dim => {
                debug_assert!(coeff == &Rational::one());
                Some(row.nth(const_col).neg())
            }
            [(i, coeff), (j, _)] if *i == dim && *j == const_col => {
                debug_assert!(coeff == &Rational::one());
                Some(row.nth(const_col).neg())
            }
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{VarEnv, VarKind};

    fn env_xy() -> VarEnv {
        VarEnv::new()
            .with_var(VarId::Named("x".into()), VarKind::Int)
            .unwrap()
            .with_var(VarId::Named("y".into()), VarKind::Int)
            .unwrap()
    }

    #[test]
    fn linearizes_simple_sum() {
        let env = env_xy();
        let expr = Expr::add(
            Expr::Var(VarId::Named("x".into())),
            Expr::Const(Rational::from_i64(3)),
        );
        let v = linearize(&expr, &env, None).unwrap();
        assert_eq!(v.nth(0), Rational::one());
        assert_eq!(v.nth(2), Rational::from_i64(3));
    }

    #[test]
    fn rejects_untracked_variable() {
        let env = env_xy();
        let expr = Expr::Var(VarId::Named("z".into()));
        assert_eq!(linearize(&expr, &env, None), Err(Error::NotAffine));
    }

    #[test]
    fn rejects_product_of_two_variables() {
        let env = env_xy();
        let expr = Expr::mul(
            Expr::Var(VarId::Named("x".into())),
            Expr::Var(VarId::Named("y".into())),
        );
        assert_eq!(linearize(&expr, &env, None), Err(Error::NotAffine));
    }

    #[test]
    fn substitutes_known_constant_variable() {
        let env = env_xy();
        // x - 5 = 0  =>  x is pinned to 5.
        let row = SparseVector::zero_vec(3)
            .set_nth(0, Rational::one())
            .set_nth(2, Rational::from_i64(-5));
        let known = SparseMatrix::empty(3).rref_vec(row).unwrap();
        let expr = Expr::mul(
            Expr::Var(VarId::Named("x".into())),
            Expr::Const(Rational::from_i64(2)),
        );
        let v = linearize(&expr, &env, Some(&known)).unwrap();
        assert!(v.is_const_vec());
        assert_eq!(v.nth(2), Rational::from_i64(10));
    }
}
