//! Lattice operations and transfer functions over [`State`].
//!
//! This is the module a caller (the out-of-scope fixpoint solver) actually
//! drives: `leq`/`meet`/`join`/`widen`/`narrow` implement the lattice, and
//! `assign_exp`/`meet_tcons`/`forget_vars`/`assign_var_parallel` implement
//! the transfer functions. Everything here is built out of
//! [`crate::matrix::SparseMatrix`]'s row-reduction primitives plus
//! [`crate::linearize::linearize`]; none of it touches rows directly.
//!
//! Grounded in style on a handful of free functions dispatching over a
//! state-plus-context pair, with explicit multi-branch `match`/`Result`
//! control flow rather than a trait-object dispatch table.

use crate::environment::{add_vars as env_add_vars, dimchange2_add, remove_vars as env_remove_vars, Environment, VarKind};
use crate::linearize::{linearize, CompOp, Expr, Tcons};
use crate::matrix::SparseMatrix;
use crate::rational::Rational;
use crate::state::State;
use crate::vector::SparseVector;
use num_bigint::BigInt;

/// `⊥ ⊑ x ⊑ ⊤` for all `x`; `false` if the environments are not comparable
/// with `a`'s a sub-environment of `b`'s.
pub fn leq<E: Environment>(a: &State<E>, b: &State<E>) -> bool {
    if a.is_bot() {
        return true;
    }
    if b.is_bot() {
        return false;
    }
    let Ok(dc) = a.env().dimchange(b.env()) else {
        return false;
    };
    let am = a.matrix().expect("checked not bot above").add_empty_columns(&dc.add);
    let bm = b.matrix().expect("checked not bot above");
    bm.is_covered_by(&am)
}

/// Conjoins `a` and `b` over the least common extension of their
/// environments; `⊥` if either is, or if the combined system is
/// inconsistent.
pub fn meet<E: Environment>(a: &State<E>, b: &State<E>) -> State<E> {
    let Ok(lce) = a.env().lce(b.env()) else {
        return State::bot(a.env().clone());
    };
    let ga = dimchange2_add(a, &lce);
    let gb = dimchange2_add(b, &lce);
    if ga.is_bot() || gb.is_bot() {
        return State::bot(lce);
    }
    if ga.is_top() {
        return gb;
    }
    if gb.is_top() {
        return ga;
    }
    match ga.matrix().unwrap().rref_matrix(gb.matrix().unwrap()) {
        Some(m) => State::from_matrix(m, lce),
        None => State::bot(lce),
    }
}

/// The affine hull of the union of `a` and `b`'s solution sets, over the
/// least common extension of their environments.
pub fn join<E: Environment>(a: &State<E>, b: &State<E>) -> State<E> {
    let Ok(lce) = a.env().lce(b.env()) else {
        return State::top(a.env().clone());
    };
    let ga = dimchange2_add(a, &lce);
    let gb = dimchange2_add(b, &lce);
    if ga.is_bot() {
        return gb;
    }
    if gb.is_bot() {
        return ga;
    }
    if ga == gb {
        return ga;
    }
    if ga.is_top() || gb.is_top() {
        return State::top(lce);
    }
    let m = ga.matrix().unwrap().linear_disjunct(gb.matrix().unwrap());
    State::from_matrix(m, lce)
}

/// For a fixed environment, `join` already has finite ascending chains
/// (Karr's lattice admits only finitely many affine subspaces per
/// dimension), so it doubles as widening. Across differing environments
/// there is no useful extrapolation to perform, so this simply returns
/// `b` rather than inventing a strict one.
pub fn widen<E: Environment>(a: &State<E>, b: &State<E>) -> State<E> {
    if a.env() == b.env() {
        join(a, b)
    } else {
        b.clone()
    }
}

/// The domain has no narrowing operator of its own; `narrow(a, b) = a`.
pub fn narrow<E: Environment>(a: &State<E>, _b: &State<E>) -> State<E> {
    a.clone()
}

/// Alias for [`meet`]. `unify` is the name callers reach for when combining
/// states that may be expressed over different environments at a control-
/// flow merge; here that is exactly what `meet` already does via `lce`.
pub fn unify<E: Environment>(a: &State<E>, b: &State<E>) -> State<E> {
    meet(a, b)
}

/// Existentially quantifies `vars` out of `t`, keeping every equality that
/// did not mention them.
pub fn forget_vars<E: Environment>(t: &State<E>, vars: &[E::Var]) -> State<E> {
    let Some(m) = t.matrix() else {
        return t.clone();
    };
    if m.is_empty() {
        return t.clone();
    }
    let mut m = m.clone();
    for v in vars {
        if let Some(dim) = t.env().dim_of_var(v) {
            m = m.reduce_col(dim);
        }
    }
    State::from_matrix(m.remove_zero_rows(), t.env().clone())
}

/// Adds `vars` as fresh, unconstrained columns. See
/// [`crate::environment::add_vars`].
pub fn add_vars<E: Environment>(t: &State<E>, vars: &[(E::Var, VarKind)]) -> State<E> {
    env_add_vars(t, vars).unwrap_or_else(|_| State::bot(t.env().clone()))
}

/// Drops `vars` from the tracked environment. See
/// [`crate::environment::remove_vars`].
pub fn remove_vars<E: Environment>(t: &State<E>, vars: &[E::Var]) -> State<E> {
    env_remove_vars(t, vars)
}

/// Rewrites `m`'s rows for the *invertible* assignment `x := e`, where `v`
/// is `e`'s linearization and `v`'s coefficient at `dim_x` is non-zero.
///
/// Derivation: writing `e`'s coefficient of `x` as `v_x`, the post-
/// assignment value of every other row can be expressed purely in terms of
/// the *new* store by solving `new_x = v_x * old_x + (rest of e)` for
/// `old_x` and substituting. Scaling row `r` by `t = r[dim_x] / v_x` and
/// subtracting `t * (v with its `dim_x` entry replaced by `v_x - 1`)`
/// realizes exactly that substitution; see the crate's test suite for a
/// worked example.
fn assign_invertible(m: &SparseMatrix, dim_x: usize, v: &SparseVector) -> SparseMatrix {
    let v_x = v.nth(dim_x);
    let w = v.set_nth(dim_x, v_x.sub(&Rational::one()));
    let new_rows: Vec<SparseVector> = m
        .rows()
        .iter()
        .map(|r| {
            let coeff = r.nth(dim_x);
            if coeff.is_zero() {
                r.clone()
            } else {
                let t = coeff.div(&v_x).expect("v_x is non-zero in the invertible case");
                let scaled_w = w.apply_with_c_preserving_zero(|q, c| q.mul(c), &t);
                r - &scaled_w
            }
        })
        .collect();
    SparseMatrix::normalize(new_rows, m.num_cols())
        .expect("an invertible linear substitution of a consistent system stays consistent")
}

/// Rewrites `m` for the *non-invertible* assignment `x := e` (`v`'s
/// coefficient at `dim_x` is zero): drops any row pinning `x`, then adds
/// the equality `x - v = 0`.
fn assign_noninvertible(m: &SparseMatrix, dim_x: usize, v: &SparseVector) -> Option<SparseMatrix> {
    let reduced = m.reduce_col(dim_x);
    let unit_x = SparseVector::zero_vec(v.length()).set_nth(dim_x, Rational::one());
    reduced.rref_vec(&unit_x - v)
}

/// Assigns `x := e`. Havocs `x` (via [`forget_vars`]) if `e` is not affine
/// or `x` is untracked; otherwise dispatches to the invertible or
/// non-invertible substitution.
pub fn assign_exp<E: Environment>(t: &State<E>, x: &E::Var, e: &Expr<E::Var>) -> State<E> {
    if t.is_bot() {
        return t.clone();
    }
    let env = t.env().clone();
    let Some(dim_x) = env.dim_of_var(x) else {
        return t.clone();
    };
    let m = t.matrix().expect("checked not bot above");
    match linearize(e, &env, Some(m)) {
        Err(_) => forget_vars(t, std::slice::from_ref(x)),
        Ok(v) => {
            let v_x = v.nth(dim_x);
            if !v_x.is_zero() {
                State::from_matrix(assign_invertible(m, dim_x, &v), env)
            } else {
                match assign_noninvertible(m, dim_x, &v) {
                    Some(m2) => State::from_matrix(m2, env),
                    None => State::bot(env),
                }
            }
        }
    }
}

/// Assigns `x := y` for two tracked variables.
pub fn assign_var<E: Environment>(t: &State<E>, x: &E::Var, y: &E::Var) -> State<E> {
    assign_exp(t, x, &Expr::Var(y.clone()))
}

/// Simultaneous assignment `(x_1, ..., x_k) := (y_1, ..., y_k)`.
///
/// Introduces one fresh column per pair (via [`Environment::add_fresh_var`],
/// rather than a collision-prone textual `"0'"` convention), pins each to
/// the corresponding `y_i` sequentially (those assignments are
/// non-invertible by construction, since a fresh column starts out
/// unconstrained), then overwrites every `x_i` from its fresh counterpart,
/// and finally forgets and deletes the fresh columns. Because each fresh
/// column captures its `y_i` before any `x_i` is overwritten, this
/// realizes simultaneous semantics even when the `x`s and `y`s overlap
/// (e.g. a swap).
///
/// If any intermediate step collapses the state to `⊥`, that is returned
/// immediately over the original environment.
pub fn assign_var_parallel<E: Environment>(t: &State<E>, pairs: &[(E::Var, E::Var)]) -> State<E> {
    if t.is_bot() || pairs.is_empty() {
        return t.clone();
    }
    let orig_env = t.env().clone();
    let mut env = orig_env.clone();
    let mut primed = Vec::with_capacity(pairs.len());
    for _ in pairs {
        let (env2, fresh) = env.add_fresh_var();
        env = env2;
        primed.push(fresh);
    }
    let grown = dimchange2_add(t, &env);
    let mut state = grown;
    for (fresh, (_, y)) in primed.iter().zip(pairs) {
        state = assign_exp(&state, fresh, &Expr::Var(y.clone()));
        if state.is_bot() {
            return State::bot(orig_env);
        }
    }
    for (fresh, (x, _)) in primed.iter().zip(pairs) {
        state = assign_exp(&state, x, &Expr::Var(fresh.clone()));
        if state.is_bot() {
            return State::bot(orig_env);
        }
    }
    let state = forget_vars(&state, &primed);
    let dc_back = env.dimchange2(&orig_env);
    let m = state
        .matrix()
        .expect("checked not bot above")
        .del_cols(&dc_back.remove);
    State::from_matrix(m, orig_env)
}

/// In-place convenience variant of [`assign_var_parallel`]: mutates a
/// caller's cell with the newly computed pair directly. Not a concurrency
/// primitive; the caller must have exclusive access to `cell`.
pub fn assign_var_parallel_with<E: Environment>(cell: &mut State<E>, pairs: &[(E::Var, E::Var)]) {
    let updated = assign_var_parallel(cell, pairs);
    *cell = updated;
}

/// Backward assignment / weakest-precondition style inverse image:
/// `assign_exp` followed by forgetting `x`.
pub fn substitute_exp<E: Environment>(t: &State<E>, x: &E::Var, e: &Expr<E::Var>) -> State<E> {
    forget_vars(&assign_exp(t, x, e), std::slice::from_ref(x))
}

/// Refines `t` by the linear constraint `c`. Non-affine constraints are a
/// no-op (guard-ignore); a constant linearization is decided directly;
/// otherwise dispatches to the exact `EQ` case or the lossy
/// `DISEQ`/`SUP`/`SUPEQ` cases below.
pub fn meet_tcons<E: Environment>(t: &State<E>, c: &Tcons<E::Var>) -> State<E> {
    if t.is_bot() {
        return t.clone();
    }
    let env = t.env().clone();
    let m = t.matrix().expect("checked not bot above");
    let v = match linearize(&c.expr, &env, Some(m)) {
        Ok(v) => v,
        Err(_) => return t.clone(),
    };
    if v.is_const_vec() {
        let c0 = v.nth(env.size());
        let unsatisfiable = match c.op {
            CompOp::Eq => !c0.is_zero(),
            CompOp::Diseq => c0.is_zero(),
            CompOp::Sup => !c0.is_positive(),
            CompOp::SupEq => c0.is_negative(),
        };
        return if unsatisfiable { State::bot(env) } else { t.clone() };
    }
    match c.op {
        CompOp::Eq => match m.rref_vec(v) {
            Some(m2) => State::from_matrix(m2, env),
            None => State::bot(env),
        },
        // The domain cannot represent a strict or non-equality constraint
        // precisely, so `>=` always over-approximates to `t` unchanged.
        CompOp::SupEq => t.clone(),
        CompOp::Diseq | CompOp::Sup => match m.rref_vec(v) {
            // Adding `expr = 0` is itself inconsistent with `t`: `t` already
            // proves `expr != 0`, so the guard holds unconditionally.
            None => t.clone(),
            // Adding `expr = 0` changed nothing: `t` already implies
            // `expr = 0`, so the guard is unsatisfiable.
            Some(m2) if &m2 == m => State::bot(env),
            // Adding `expr = 0` strictly refines `t`: neither provably true
            // nor provably false, so this over-approximates to `t`.
            Some(_) => t.clone(),
        },
    }
}

/// Asserts that `e` is non-zero (`negate = false`, the C "if (e)" truthy
/// branch) or zero (`negate = true`, the falsy branch).
pub fn assert_constraint<E: Environment>(t: &State<E>, e: &Expr<E::Var>, negate: bool) -> State<E> {
    let op = if negate { CompOp::Eq } else { CompOp::Diseq };
    meet_tcons(t, &Tcons::new(e.clone(), op))
}

/// Linearizes `e`; if it reduces to an integer constant, returns it as both
/// the lower and upper bound. The domain never derives interval bounds
/// from its equalities, so any non-constant or non-integer result is
/// `(None, None)`.
pub fn bound_texpr<E: Environment>(t: &State<E>, e: &Expr<E::Var>) -> (Option<BigInt>, Option<BigInt>) {
    if t.is_bot() {
        return (None, None);
    }
    match linearize(e, t.env(), t.matrix()) {
        Ok(v) if v.is_const_vec() => match v.nth(t.env().size()).to_integer() {
            Some(i) => (Some(i.clone()), Some(i)),
            None => (None, None),
        },
        _ => (None, None),
    }
}

/// Converts `t`'s rows back into the caller's linear-constraint form, one
/// `EQ` constraint per row. Empty for `⊥` and `⊤`.
pub fn invariant<E: Environment>(t: &State<E>) -> Vec<Tcons<E::Var>> {
    let Some(m) = t.matrix() else {
        return Vec::new();
    };
    let n = t.env().size();
    let vars = t.env().vars();
    m.rows()
        .iter()
        .map(|row| {
            let mut expr: Option<Expr<E::Var>> = None;
            for (i, coeff) in row.entries() {
                if *i == n {
                    continue;
                }
                let var = vars[*i].clone();
                let term = if coeff.is_one() {
                    Expr::Var(var)
                } else {
                    Expr::mul(Expr::Const(coeff.clone()), Expr::Var(var))
                };
                expr = Some(match expr {
                    None => term,
                    Some(acc) => Expr::add(acc, term),
                });
            }
            let k = row.nth(n);
            let expr = match expr {
                None => Expr::Const(k),
                Some(acc) if k.is_zero() => acc,
                Some(acc) => Expr::add(acc, Expr::Const(k)),
            };
            Tcons::new(expr, CompOp::Eq)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{VarEnv, VarId};

    fn env(names: &[&str]) -> VarEnv {
        names.iter().fold(VarEnv::new(), |e, n| {
            e.try_add_var(VarId::Named((*n).to_string()), VarKind::Int).unwrap()
        })
    }

    fn var(name: &str) -> VarId {
        VarId::Named(name.to_string())
    }

    fn meet_eq(t: &State<VarEnv>, row: SparseVector) -> State<VarEnv> {
        meet_tcons(
            t,
            &Tcons::new(row_to_expr(t.env(), &row), CompOp::Eq),
        )
    }

    // Helper that turns a raw row back into an Expr, for building test
    // fixtures out of concrete equalities without hand-writing ASTs twice.
    fn row_to_expr(e: &VarEnv, row: &SparseVector) -> Expr<VarId> {
        let n = e.size();
        let mut expr: Option<Expr<VarId>> = None;
        for (i, c) in row.entries() {
            if *i == n {
                continue;
            }
            let term = Expr::mul(Expr::Const(c.clone()), Expr::Var(e.vars()[*i].clone()));
            expr = Some(match expr {
                None => term,
                Some(acc) => Expr::add(acc, term),
            });
        }
        let k = row.nth(n);
        match expr {
            None => Expr::Const(k),
            Some(acc) => Expr::add(acc, Expr::Const(k)),
        }
    }

    #[test]
    fn leq_reflexive_and_top_bottom() {
        let e = env(&["x"]);
        let top = State::top(e.clone());
        let bot = State::bot(e);
        assert!(leq(&top, &top));
        assert!(leq(&bot, &top));
        assert!(!leq(&top, &bot));
    }

    #[test]
    fn top_then_equality_scenario() {
        // start from top, meet x - y = 0.
        let e = env(&["x", "y", "z"]);
        let top = State::top(e.clone());
        let row = SparseVector::zero_vec(4).set_nth(0, Rational::one()).set_nth(1, Rational::from_i64(-1));
        let refined = meet_eq(&top, row);
        assert_eq!(refined.show(), "[| x-y=0 |]");
        assert!(leq(&refined, &top));
        assert!(!leq(&top, &refined));
    }

    #[test]
    fn inconsistency_scenario() {
        // x = 0 then x = 1 is bottom.
        let e = env(&["x", "y", "z"]);
        let top = State::top(e);
        let r0 = SparseVector::zero_vec(4).set_nth(0, Rational::one());
        let t1 = meet_eq(&top, r0);
        let r1 = SparseVector::zero_vec(4).set_nth(0, Rational::one()).set_nth(3, Rational::from_i64(-1));
        let t2 = meet_eq(&t1, r1);
        assert!(t2.is_bot());
        assert_eq!(t2.show(), "Bottom Env");
    }

    #[test]
    fn invertible_assign_scenario() {
        // {x = y + 1}; assign x := x + z -> {x = y + z + 1}.
        let e = env(&["x", "y", "z"]);
        let top = State::top(e.clone());
        // x - y - 1 = 0
        let row = SparseVector::zero_vec(4)
            .set_nth(0, Rational::one())
            .set_nth(1, Rational::from_i64(-1))
            .set_nth(3, Rational::from_i64(-1));
        let t = meet_eq(&top, row);
        let assigned = assign_exp(&t, &var("x"), &Expr::add(Expr::Var(var("x")), Expr::Var(var("z"))));
        let m = assigned.matrix().unwrap();
        assert_eq!(m.num_rows(), 1);
        let r = m.get_row(0);
        assert_eq!(r.nth(0), Rational::one());
        assert_eq!(r.nth(1), Rational::from_i64(-1));
        assert_eq!(r.nth(2), Rational::from_i64(-1));
        assert_eq!(r.nth(3), Rational::from_i64(-1));
    }

    #[test]
    fn noninvertible_assign_scenario() {
        // {x = y}; assign y := 2. reduce_col(y) consumes the sole row
        // `x - y = 0` as its own pivot (there is no other row left to
        // receive the substitution), so x becomes unconstrained and only
        // `y = 2` survives: {y = 2}, x free.
        let e = env(&["x", "y"]);
        let top = State::top(e.clone());
        let row = SparseVector::zero_vec(3).set_nth(0, Rational::one()).set_nth(1, Rational::from_i64(-1));
        let t = meet_eq(&top, row);
        let assigned = assign_exp(&t, &var("y"), &Expr::Const(Rational::from_i64(2)));
        assert_eq!(assigned.show(), "[| y-2=0 |]");
    }

    #[test]
    fn parallel_assign_swap_scenario() {
        // {x = 1, y = 2}; swap(x, y) -> {x = 2, y = 1}.
        let e = env(&["x", "y"]);
        let top = State::top(e.clone());
        let rx = SparseVector::zero_vec(3).set_nth(0, Rational::one()).set_nth(2, Rational::from_i64(-1));
        let ry = SparseVector::zero_vec(3).set_nth(1, Rational::one()).set_nth(2, Rational::from_i64(-2));
        let t = meet_eq(&meet_eq(&top, rx), ry);
        let swapped = assign_var_parallel(&t, &[(var("x"), var("y")), (var("y"), var("x"))]);
        assert_eq!(swapped.env(), &e);
        assert_eq!(swapped.show(), "[| x-2=0; y-1=0 |]");
    }

    #[test]
    fn join_of_two_points_drops_equality() {
        // {x=1} join {x=2} = top (over env).
        let e = env(&["x"]);
        let top = State::top(e.clone());
        let a = meet_eq(&top, SparseVector::zero_vec(2).set_nth(0, Rational::one()).set_nth(1, Rational::from_i64(-1)));
        let b = meet_eq(&top, SparseVector::zero_vec(2).set_nth(0, Rational::one()).set_nth(1, Rational::from_i64(-2)));
        let joined = join(&a, &b);
        assert!(joined.is_top());
        assert!(leq(&a, &joined));
        assert!(leq(&b, &joined));
    }

    #[test]
    fn meet_is_glb_and_idempotent() {
        let e = env(&["x", "y"]);
        let top = State::top(e.clone());
        let a = meet_eq(&top, SparseVector::zero_vec(3).set_nth(0, Rational::one()));
        let b = meet_eq(&top, SparseVector::zero_vec(3).set_nth(1, Rational::one()));
        let m = meet(&a, &b);
        assert!(leq(&m, &a));
        assert!(leq(&m, &b));
        assert_eq!(meet(&a, &a), a);
    }

    #[test]
    fn widen_on_same_env_is_join() {
        let e = env(&["x"]);
        let top = State::top(e);
        let a = meet_eq(&top, SparseVector::zero_vec(2).set_nth(0, Rational::one()));
        assert_eq!(widen(&a, &top), join(&a, &top));
    }

    #[test]
    fn forget_vars_projects_out_cleanly() {
        let e = env(&["x", "y"]);
        let top = State::top(e);
        // x - y = 0
        let row = SparseVector::zero_vec(3).set_nth(0, Rational::one()).set_nth(1, Rational::from_i64(-1));
        let t = meet_eq(&top, row);
        let forgotten = forget_vars(&t, &[var("x")]);
        assert!(forgotten.is_top());
    }

    #[test]
    fn meet_tcons_diseq_unsatisfiable_when_already_implied() {
        let e = env(&["x"]);
        let top = State::top(e);
        let t = meet_eq(&top, SparseVector::zero_vec(2).set_nth(0, Rational::one()));
        let c = Tcons::new(Expr::Var(var("x")), CompOp::Diseq);
        assert!(meet_tcons(&t, &c).is_bot());
    }

    #[test]
    fn meet_tcons_supeq_is_always_an_overapproximation() {
        let e = env(&["x", "y"]);
        let top = State::top(e);
        let c = Tcons::new(Expr::Var(var("x")), CompOp::SupEq);
        assert_eq!(meet_tcons(&top, &c), top);
    }

    #[test]
    fn bound_texpr_only_resolves_constants() {
        let e = env(&["x"]);
        let top = State::top(e);
        let t = meet_eq(&top, SparseVector::zero_vec(2).set_nth(0, Rational::one()).set_nth(1, Rational::from_i64(-5)));
        let (lo, hi) = bound_texpr(&t, &Expr::Var(var("x")));
        assert_eq!(lo, Some(BigInt::from(5)));
        assert_eq!(hi, Some(BigInt::from(5)));
        let (lo2, hi2) = bound_texpr(&top_unbound(), &Expr::Var(var("x")));
        assert_eq!((lo2, hi2), (None, None));
    }

    fn top_unbound() -> State<VarEnv> {
        State::top(env(&["x"]))
    }

    #[test]
    fn invariant_round_trips_through_meet_tcons() {
        let e = env(&["x", "y"]);
        let top = State::top(e.clone());
        let row = SparseVector::zero_vec(3).set_nth(0, Rational::one()).set_nth(1, Rational::from_i64(-1));
        let t = meet_eq(&top, row);
        let cs = invariant(&t);
        assert_eq!(cs.len(), 1);
        let mut rebuilt = State::top(e);
        for c in &cs {
            rebuilt = meet_tcons(&rebuilt, c);
        }
        assert_eq!(rebuilt, t);
    }
}
