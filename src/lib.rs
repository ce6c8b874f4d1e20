//! # affine-equalities
//!
//! A relational numeric abstract domain for static analysis: abstract
//! states are conjunctions of affine equalities over program variables,
//! tracked exactly (no floating point, no rounding) as a row-reduced
//! sparse matrix over ℚ. This is Karr's construction: the reachable
//! values of a set of variables are approximated by the affine subspace
//! of ℚⁿ they are known to lie in, updated by the same transfer
//! functions — assignment, substitution, guard, join, widening — that
//! any relational abstract domain exposes to an analyzer.
//!
//! ## Layout
//!
//! - [`rational`] — exact scalar arithmetic (`ℚ`, arbitrary precision).
//! - [`vector`] — sparse vectors over [`rational::Rational`].
//! - [`matrix`] — sparse matrices, reduced row-echelon form, and the
//!   meet/join/covers primitives built on it.
//! - [`environment`] — naming: the map from program variables to matrix
//!   columns, and the machinery to grow/shrink/merge environments.
//! - [`linearize`] — reducing a caller's expression tree to the affine
//!   coefficient vector the matrix layer understands.
//! - [`state`] — the abstract domain element itself: an environment
//!   paired with an (optional) equality system.
//! - [`transfer`] — the domain's public operations: `leq`, `meet`,
//!   `join`, `widen`, `narrow`, `assign_exp`, `substitute_exp`,
//!   `meet_tcons`, `bound_texpr`, `invariant`, and environment edits.
//! - [`error`] — the crate's error taxonomy.
//!
//! Most callers only need [`prelude`].

pub mod environment;
pub mod error;
pub mod linearize;
pub mod matrix;
pub mod rational;
pub mod state;
pub mod transfer;
pub mod vector;

/// Re-exports of the types and functions most callers need, for
/// `use affine_equalities::prelude::*;`.
pub mod prelude {
    pub use crate::environment::{Environment, VarEnv, VarId, VarKind};
    pub use crate::error::{Error, Result};
    pub use crate::linearize::{linearize, CompOp, Expr, Tcons};
    pub use crate::rational::Rational;
    pub use crate::state::State;
    pub use crate::transfer::{
        add_vars, assert_constraint, assign_exp, assign_var, assign_var_parallel, bound_texpr,
        forget_vars, invariant, leq, meet, meet_tcons, narrow, remove_vars, substitute_exp, unify,
        widen,
    };
}
