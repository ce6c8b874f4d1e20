//! Error taxonomy for the affine-equalities domain.
//!
//! Normalization failures collapse to the bottom state, environment
//! mismatches are reported to the caller, non-affine expressions fall back
//! to a conservative answer, and division by zero in the scalar layer is
//! treated as a bug indicator rather than a recoverable condition.

use thiserror::Error;

/// Errors that can arise while manipulating affine-equality states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum Error {
    /// Row reduction proved `0 = k` for some `k != 0`: the system has no
    /// solution. Internal callers map this to the bottom state; it never
    /// escapes the public transfer-function surface as an `Err`.
    #[error("system of affine equalities is inconsistent")]
    Inconsistent,
    /// Two environments disagree on the declared kind of a shared variable.
    #[error("environments are not compatible")]
    EnvIncompatible,
    /// An expression could not be reduced to a linear form.
    #[error("expression is not affine")]
    NotAffine,
    /// Division by zero in the rational scalar layer.
    #[error("division by zero")]
    Arithmetic,
}

/// Convenience result alias used throughout the crate's internal layers.
pub type Result<T> = core::result::Result<T, Error>;
