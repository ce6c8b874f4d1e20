//! Abstract states: an environment paired with an optional equality system.
//!
//! A [`State`] is the domain element itself — what an analysis actually
//! stores at each program point. It pairs a [`crate::matrix::SparseMatrix`]
//! (or its absence, meaning bottom) with the [`Environment`] that gives its
//! columns meaning, the same "algorithm state plus the context it runs
//! over" pairing a decoder uses for its working belief vector and the code
//! it decodes against, generalized from a fixed code description to a
//! variable environment that can itself grow and shrink as variables come
//! in and out of scope.

use crate::environment::Environment;
use crate::matrix::SparseMatrix;
use crate::rational::Rational;
use crate::vector::SparseVector;
use num_bigint::BigInt;
use num_integer::Integer;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An affine-equalities abstract state over environment `E`.
///
/// `d = None` represents bottom (the empty/unreachable state); `d =
/// Some(m)` with `m.is_empty()` represents top (no constraint at all, i.e.
/// all of `Q^n`). Every other `Some(m)` is an RREF system of equalities.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(serialize = "E: Serialize", deserialize = "E: DeserializeOwned"))]
pub struct State<E: Environment> {
    pub(crate) d: Option<SparseMatrix>,
    pub(crate) env: E,
}

impl<E: Environment> State<E> {
    /// The top element over `env`: no constraint, every variable
    /// unconstrained.
    pub fn top(env: E) -> State<E> {
        let cols = env.size() + 1;
        State {
            d: Some(SparseMatrix::empty(cols)),
            env,
        }
    }

    /// The bottom element over `env`: unreachable.
    pub fn bot(env: E) -> State<E> {
        State { d: None, env }
    }

    /// Alias for [`State::bot`], for call sites that want to emphasize the
    /// environment is still meaningful even though the state carries no
    /// equalities.
    pub fn bot_env(env: E) -> State<E> {
        State::bot(env)
    }

    /// The environment this state is expressed over.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// `true` iff this is the bottom state (no matrix at all).
    pub fn is_bot(&self) -> bool {
        self.d.is_none()
    }

    /// `true` iff this is the top state (a matrix with no rows).
    pub fn is_top(&self) -> bool {
        matches!(&self.d, Some(m) if m.is_empty())
    }

    /// `true` iff bottom, with an environment that has no tracked variables
    /// either — the fully-collapsed case some callers special-case.
    pub fn is_bot_env(&self) -> bool {
        self.is_bot() && self.env.size() == 0
    }

    /// `true` iff top, with an environment that has no tracked variables.
    pub fn is_top_env(&self) -> bool {
        self.is_top() && self.env.size() == 0
    }

    /// Borrows the underlying equality system, if any.
    pub fn matrix(&self) -> Option<&SparseMatrix> {
        self.d.as_ref()
    }

    /// Builds a state directly from a matrix already in RREF over `env`.
    ///
    /// # Panics
    /// Panics if `m.num_cols() != env.size() + 1`.
    pub(crate) fn from_matrix(m: SparseMatrix, env: E) -> State<E> {
        assert_eq!(m.num_cols(), env.size() + 1, "matrix/environment size mismatch");
        State { d: Some(m), env }
    }
}

impl<E: Environment + Serialize> State<E> {
    /// Serializes this state into an exact, self-contained byte encoding
    /// (not the diagnostic [`State::show`] form). `unmarshal` on the
    /// resulting bytes reproduces this state exactly, matrix and
    /// environment alike.
    pub fn marshal(&self) -> Vec<u8> {
        bincode::serialize(self).expect("State has no types that fail to serialize")
    }
}

impl<E: Environment + DeserializeOwned> State<E> {
    /// Inverse of [`State::marshal`].
    ///
    /// # Errors
    /// Returns a `bincode` decode error if `bytes` was not produced by
    /// `marshal` (or was produced for a different `E`).
    pub fn unmarshal(bytes: &[u8]) -> Result<State<E>, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

impl<E: Environment> State<E>
where
    E::Var: fmt::Display,
{
    /// The canonical diagnostic rendering: `[| a1*x1+...+k=0; ... |]`, each
    /// row scaled to an integer vector with gcd 1 and a positive leading
    /// coefficient, in environment (column) order. `⊤` renders as its
    /// glyph; bottom renders as `Bottom Env` regardless of environment.
    pub fn show(&self) -> String {
        let Some(m) = &self.d else {
            return "Bottom Env".to_string();
        };
        if m.is_empty() {
            return "\u{22a4}".to_string();
        }
        let vars = self.env.vars();
        let rows: Vec<String> = m.rows().iter().map(|row| canonical_row(row, vars)).collect();
        format!("[| {} |]", rows.join("; "))
    }
}

/// Scales `row` to an integer vector with gcd 1 and a positive leading
/// coefficient, then renders it as `a1*x1+...+k=0` (coefficients of 1 or -1
/// print without a leading magnitude).
fn canonical_row<V: fmt::Display>(row: &SparseVector, vars: &[V]) -> String {
    let n = vars.len();
    let mut denom_lcm = BigInt::from(1);
    for (_, q) in row.entries() {
        denom_lcm = denom_lcm.lcm(q.denominator());
    }
    let mut scaled: Vec<(usize, BigInt)> = row
        .entries()
        .iter()
        .map(|(i, q)| {
            let scaled_rat = q.mul(&Rational::from_integer(denom_lcm.clone()));
            (*i, scaled_rat.numerator().clone())
        })
        .collect();
    let mut g = BigInt::from(0);
    for (_, v) in &scaled {
        g = g.gcd(v);
    }
    if g == BigInt::from(0) {
        g = BigInt::from(1);
    }
    for (_, v) in scaled.iter_mut() {
        *v = v.clone() / g.clone();
    }
    if let Some((_, first)) = scaled.first() {
        if *first < BigInt::from(0) {
            for (_, v) in scaled.iter_mut() {
                *v = -v.clone();
            }
        }
    }

    let mut out = String::new();
    let mut first = true;
    for (i, coeff) in &scaled {
        if *i == n {
            continue;
        }
        push_term(&mut out, coeff, Some(&vars[*i].to_string()), &mut first);
    }
    let k = scaled
        .iter()
        .find(|(i, _)| *i == n)
        .map(|(_, v)| v.clone())
        .unwrap_or_else(|| BigInt::from(0));
    if k != BigInt::from(0) || first {
        push_term(&mut out, &k, None, &mut first);
    }
    out.push_str("=0");
    out
}

fn push_term(out: &mut String, coeff: &BigInt, name: Option<&str>, first: &mut bool) {
    let neg = *coeff < BigInt::from(0);
    let abs = if neg { -coeff.clone() } else { coeff.clone() };
    if !*first {
        out.push_str(if neg { "-" } else { "+" });
    } else if neg {
        out.push('-');
    }
    *first = false;
    match name {
        Some(n) => {
            if abs == BigInt::from(1) {
                out.push_str(n);
            } else {
                out.push_str(&abs.to_string());
                out.push('*');
                out.push_str(n);
            }
        }
        None => out.push_str(&abs.to_string()),
    }
}

impl<E: Environment> PartialEq for State<E> {
    fn eq(&self, other: &Self) -> bool {
        self.env == other.env && self.d == other.d
    }
}

impl<E: Environment> fmt::Display for State<E>
where
    E::Var: fmt::Display,
{
    /// Delegates to [`State::show`], the domain's one canonical textual form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.show())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{VarEnv, VarId, VarKind};
    use crate::rational::Rational;
    use crate::vector::SparseVector;

    fn env_x() -> VarEnv {
        VarEnv::new().with_var(VarId::Named("x".into()), VarKind::Int).unwrap()
    }

    #[test]
    fn marshal_unmarshal_roundtrips_an_equality() {
        let env = env_x();
        let row = SparseVector::zero_vec(2)
            .set_nth(0, Rational::one())
            .set_nth(1, Rational::from_i64(-7));
        let t = State::from_matrix(SparseMatrix::empty(2).rref_vec(row).unwrap(), env);
        let bytes = t.marshal();
        let back: State<VarEnv> = State::unmarshal(&bytes).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn marshal_unmarshal_roundtrips_bottom_and_top() {
        let bot = State::bot(env_x());
        assert_eq!(State::<VarEnv>::unmarshal(&bot.marshal()).unwrap(), bot);
        let top = State::top(env_x());
        assert_eq!(State::<VarEnv>::unmarshal(&top.marshal()).unwrap(), top);
    }

    #[test]
    fn top_has_empty_matrix_and_bot_has_none() {
        let top = State::top(env_x());
        assert!(top.is_top());
        assert!(!top.is_bot());
        let bot = State::bot(env_x());
        assert!(bot.is_bot());
        assert!(!bot.is_top());
    }

    #[test]
    fn equality_respects_environment() {
        let a = State::top(env_x());
        let b = State::top(VarEnv::new());
        assert_ne!(a, b);
    }

    #[test]
    fn show_renders_bottom_and_top() {
        assert_eq!(State::bot(env_x()).show(), "Bottom Env");
        assert_eq!(State::top(env_x()).show(), "\u{22a4}");
        // bottom renders as "Bottom Env" regardless of environment.
        assert_eq!(State::bot(VarEnv::new()).show(), "Bottom Env");
    }

    #[test]
    fn display_delegates_to_show() {
        assert_eq!(format!("{}", State::top(env_x())), State::top(env_x()).show());
    }

    #[test]
    fn show_renders_single_equality_canonically() {
        let env = env_x();
        let row = SparseVector::zero_vec(2)
            .set_nth(0, Rational::one())
            .set_nth(1, Rational::from_i64(-1));
        let m = SparseMatrix::empty(2).rref_vec(row).unwrap();
        let s = State::from_matrix(m, env);
        assert_eq!(s.show(), "[| x-1=0 |]");
    }

    #[test]
    fn show_scales_fractional_rows_to_integer_gcd_one() {
        // x/2 + y/3 + 5/6 = 0; the LCM of the denominators is 6, so scaling
        // by 6 gives the integer row 3x + 2y + 5 = 0, already at gcd 1 with
        // a positive leading coefficient.
        let env = VarEnv::new()
            .with_var(VarId::Named("x".into()), VarKind::Int)
            .unwrap()
            .with_var(VarId::Named("y".into()), VarKind::Int)
            .unwrap();
        let row = SparseVector::zero_vec(3)
            .set_nth(0, Rational::new(BigInt::from(1), BigInt::from(2)).unwrap())
            .set_nth(1, Rational::new(BigInt::from(1), BigInt::from(3)).unwrap())
            .set_nth(2, Rational::new(BigInt::from(5), BigInt::from(6)).unwrap());
        assert_eq!(canonical_row(&row, env.vars()), "3*x+2*y+5=0");
    }

    #[test]
    fn show_normalizes_negative_leading_coefficient() {
        let env = env_x();
        let row = SparseVector::zero_vec(2)
            .set_nth(0, Rational::from_i64(-3))
            .set_nth(1, Rational::from_i64(6));
        assert_eq!(canonical_row(&row, env.vars()), "x-2=0");
    }
}
