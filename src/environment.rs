//! Variable environments.
//!
//! The mapping from program variables to matrix columns is treated as an
//! external collaborator, fixed here as a trait so a caller can supply a
//! richer environment of its own. The shape follows a `Config`-owns-its-
//! algorithm idiom (a small plain-data type plus a handful of methods that
//! compute the column-edit scripts the matrix layer needs), together with
//! one concrete, in-crate implementation (`VarEnv`) so the rest of the
//! crate is self-contained and testable without a second crate supplying a
//! richer environment.

use crate::error::Error;
use crate::state::State;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An ordered, typed set of program variables determining the column layout
/// of a domain state's matrix.
pub trait Environment: Clone + PartialEq + Eq + fmt::Debug {
    /// The variable identifier type this environment tracks.
    type Var: Clone + PartialEq + Eq + fmt::Debug;

    /// Number of tracked variables (and thus matrix columns minus one).
    fn size(&self) -> usize;

    /// The column index of `var`, or `None` if it is not tracked.
    fn dim_of_var(&self, var: &Self::Var) -> Option<usize>;

    /// The tracked variables, in column order.
    fn vars(&self) -> &[Self::Var];

    /// The least common extension of `self` and `other`: the smallest
    /// environment both embed into in an order-preserving way.
    ///
    /// # Errors
    /// Returns [`Error::EnvIncompatible`] if `self` and `other` disagree on
    /// the declared kind of a variable they both track.
    fn lce(&self, other: &Self) -> Result<Self, Error>
    where
        Self: Sized;

    /// The column-edit script that reshapes a matrix built for `self` into
    /// one built for `to`, assuming `self`'s variables are a subset of
    /// `to`'s (a pure growth).
    ///
    /// # Errors
    /// Returns [`Error::EnvIncompatible`] if `self` is not a subset of `to`
    /// (so columns would need to be removed, which this variant refuses).
    fn dimchange(&self, to: &Self) -> Result<DimChange, Error>;

    /// The general column-edit script (both additions and removals) that
    /// reshapes a matrix built for `self` into one built for `to`.
    fn dimchange2(&self, to: &Self) -> DimChange;

    /// Returns a new environment with `var` tracked at a fresh trailing
    /// column, declared with kind `kind`.
    ///
    /// # Errors
    /// Returns [`Error::EnvIncompatible`] if `var` is already tracked with a
    /// different kind.
    fn try_add_var(&self, var: Self::Var, kind: VarKind) -> Result<Self, Error>
    where
        Self: Sized;

    /// Returns a new environment with `var` no longer tracked. A no-op
    /// (returns a clone) if `var` was not tracked.
    fn remove_var(&self, var: &Self::Var) -> Self
    where
        Self: Sized;

    /// Returns a new environment extending `self` with one fresh variable
    /// guaranteed disjoint from every variable `self` (or any environment
    /// built the same way) could ever track, together with that variable's
    /// identifier. Used by [`crate::transfer::assign_var_parallel`] to build
    /// its "primed" columns for simultaneous assignment.
    fn add_fresh_var(&self) -> (Self, Self::Var)
    where
        Self: Sized;
}

/// A column-edit script: positions to add (in the new layout) and positions
/// to remove (in the old layout), consumed by
/// [`crate::matrix::SparseMatrix::add_empty_columns`] and
/// [`crate::matrix::SparseMatrix::del_cols`] respectively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimChange {
    /// Positions, in the new column layout, of freshly inserted zero columns.
    pub add: Vec<usize>,
    /// Positions, in the old column layout, of columns to delete.
    pub remove: Vec<usize>,
}

/// The declared kind of a tracked variable. Two environments that disagree
/// on the kind of a shared variable are [`Error::EnvIncompatible`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarKind {
    /// An integer-valued program variable.
    Int,
    /// A rational/real-valued program variable.
    Real,
}

/// A variable identifier: either a real, caller-named program variable, or
/// a "primed" placeholder reserved for [`crate::transfer`]'s parallel
/// assignment implementation.
///
/// Textual fresh names like `"0'"` risk colliding with a caller's own
/// identifiers; `Primed` sidesteps that with a reserved, disjoint
/// sub-namespace instead. By construction no [`VarEnv::fresh_primed`]
/// result can ever equal a `Named` variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VarId {
    /// A caller-supplied program variable.
    Named(String),
    /// A fresh variable reserved for an internal construction (e.g.
    /// simultaneous assignment), identified by a generation counter.
    Primed(usize),
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarId::Named(s) => write!(f, "{s}"),
            VarId::Primed(n) => write!(f, "{n}'"),
        }
    }
}

/// A concrete [`Environment`] over [`VarId`]s, ordered by insertion.
///
/// Variables and their kinds are kept in parallel vectors (rather than a
/// single `Vec<(VarId, VarKind)>`) so that [`Environment::vars`] can hand
/// back a plain borrowed slice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarEnv {
    vars: Vec<VarId>,
    kinds: Vec<VarKind>,
}

impl VarEnv {
    /// The empty environment.
    pub fn new() -> VarEnv {
        VarEnv {
            vars: Vec::new(),
            kinds: Vec::new(),
        }
    }

    /// Builds an environment from an ordered list of (variable, kind) pairs.
    pub fn from_vars(vars: Vec<(VarId, VarKind)>) -> VarEnv {
        let (vars, kinds) = vars.into_iter().unzip();
        VarEnv { vars, kinds }
    }

    /// Returns a new environment with `var` appended, or an error if
    /// already tracked with a different kind.
    pub fn with_var(&self, var: VarId, kind: VarKind) -> Result<VarEnv, Error> {
        if let Some(k) = self.kind_of(&var) {
            return if k == kind {
                Ok(self.clone())
            } else {
                Err(Error::EnvIncompatible)
            };
        }
        let mut vars = self.vars.clone();
        let mut kinds = self.kinds.clone();
        vars.push(var);
        kinds.push(kind);
        Ok(VarEnv { vars, kinds })
    }

    /// The declared kind of `var`, if tracked.
    pub fn kind_of(&self, var: &VarId) -> Option<VarKind> {
        self.dim_of_var(var).map(|i| self.kinds[i])
    }

    /// A fresh [`VarId::Primed`] guaranteed disjoint from every variable
    /// this environment (or any environment built from named variables)
    /// could ever track. `n` distinguishes concurrently-live fresh
    /// variables within a single construction (e.g. one per pair in a
    /// parallel assignment).
    pub fn fresh_primed(&self, n: usize) -> VarId {
        VarId::Primed(self.vars.len() + n)
    }
}

impl Environment for VarEnv {
    type Var = VarId;

    fn size(&self) -> usize {
        self.vars.len()
    }

    fn dim_of_var(&self, var: &VarId) -> Option<usize> {
        self.vars.iter().position(|v| v == var)
    }

    fn vars(&self) -> &[VarId] {
        &self.vars
    }

    fn lce(&self, other: &VarEnv) -> Result<VarEnv, Error> {
        let mut vars = self.vars.clone();
        let mut kinds = self.kinds.clone();
        for (v, k) in other.vars.iter().zip(&other.kinds) {
            match self.kind_of(v) {
                Some(existing) if existing != *k => return Err(Error::EnvIncompatible),
                Some(_) => {}
                None => {
                    vars.push(v.clone());
                    kinds.push(*k);
                }
            }
        }
        Ok(VarEnv { vars, kinds })
    }

    fn dimchange(&self, to: &VarEnv) -> Result<DimChange, Error> {
        for (v, k) in self.vars.iter().zip(&self.kinds) {
            match to.kind_of(v) {
                Some(k2) if k2 == *k => {}
                _ => return Err(Error::EnvIncompatible),
            }
        }
        let add = (0..to.size())
            .filter(|&pos| self.dim_of_var(&to.vars[pos]).is_none())
            .collect();
        Ok(DimChange {
            add,
            remove: Vec::new(),
        })
    }

    fn dimchange2(&self, to: &VarEnv) -> DimChange {
        let add = (0..to.size())
            .filter(|&pos| self.dim_of_var(&to.vars[pos]).is_none())
            .collect();
        let remove = (0..self.size())
            .filter(|&pos| to.dim_of_var(&self.vars[pos]).is_none())
            .collect();
        DimChange { add, remove }
    }

    fn try_add_var(&self, var: VarId, kind: VarKind) -> Result<VarEnv, Error> {
        self.with_var(var, kind)
    }

    fn remove_var(&self, var: &VarId) -> VarEnv {
        match self.dim_of_var(var) {
            None => self.clone(),
            Some(i) => {
                let mut vars = self.vars.clone();
                let mut kinds = self.kinds.clone();
                vars.remove(i);
                kinds.remove(i);
                VarEnv { vars, kinds }
            }
        }
    }

    fn add_fresh_var(&self) -> (VarEnv, VarId) {
        let v = self.fresh_primed(0);
        let env = self
            .with_var(v.clone(), VarKind::Int)
            .expect("a fresh primed variable cannot collide with a tracked one");
        (env, v)
    }
}

/// Adds `vars` (with their declared kinds) as fresh zero columns, leaving
/// the matrix otherwise unchanged. If `t` is bottom, only the environment
/// grows.
///
/// # Errors
/// Returns [`Error::EnvIncompatible`] if a variable in `vars` is already
/// tracked with a different kind than requested.
pub fn add_vars<E: Environment>(t: &State<E>, vars: &[(E::Var, VarKind)]) -> Result<State<E>, Error> {
    let mut env = t.env().clone();
    for (v, k) in vars {
        env = env.try_add_var(v.clone(), *k)?;
    }
    match t.matrix() {
        None => Ok(State::bot(env)),
        Some(m) => {
            let dc = t.env().dimchange(&env).expect("add_vars only ever grows the environment");
            Ok(State::from_matrix(m.add_empty_columns(&dc.add), env))
        }
    }
}

/// Drops `vars` from the tracked environment, using
/// [`crate::matrix::SparseMatrix::reduce_col`] before deleting the columns
/// so equalities that did not mention the removed variables survive.
pub fn remove_vars<E: Environment>(t: &State<E>, vars: &[E::Var]) -> State<E> {
    let old_env = t.env().clone();
    let new_env = vars.iter().fold(old_env.clone(), |e, v| e.remove_var(v));
    let dc = old_env.dimchange2(&new_env);
    match t.matrix() {
        None => State::bot(new_env),
        Some(m) => {
            let mut m = m.clone();
            for v in vars {
                if let Some(dim) = old_env.dim_of_var(v) {
                    m = m.reduce_col(dim);
                }
            }
            let m = m.remove_zero_rows().del_cols(&dc.remove);
            State::from_matrix(m, new_env)
        }
    }
}

/// Grows `t` to the super-environment `sup_env`, inserting empty columns at
/// the positions [`Environment::dimchange`] reports. A pure extension,
/// never a removal.
///
/// # Panics
/// Panics if `sup_env` is not a superset of `t`'s environment with matching
/// variable kinds.
pub fn dimchange2_add<E: Environment>(t: &State<E>, sup_env: &E) -> State<E> {
    if t.env() == sup_env {
        return t.clone();
    }
    let dc = t
        .env()
        .dimchange(sup_env)
        .expect("dimchange2_add requires sup_env to be a superset of t's environment");
    match t.matrix() {
        None => State::bot(sup_env.clone()),
        Some(m) => State::from_matrix(m.add_empty_columns(&dc.add), sup_env.clone()),
    }
}
