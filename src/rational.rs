//! Exact rational scalar arithmetic.
//!
//! Every arithmetic operation on [`Rational`] is exact over ℚ: there is no
//! rounding, and equality is structural. The type is a thin newtype over
//! [`BigRational`] so that the rest of the crate can depend on
//! [`num_traits::Zero`]/[`num_traits::One`] the same way any scalar layer
//! built on the `num-*` family does.

use crate::error::Error;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// An element of ℚ, represented as an arbitrary-precision fraction in
/// lowest terms.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Rational(BigRational);

impl Rational {
    /// The additive identity.
    pub fn zero() -> Rational {
        Rational(BigRational::zero())
    }

    /// The multiplicative identity.
    pub fn one() -> Rational {
        Rational(BigRational::one())
    }

    /// Builds a rational from a numerator and a denominator.
    ///
    /// # Errors
    /// Returns [`Error::Arithmetic`] if `den` is zero.
    pub fn new(num: BigInt, den: BigInt) -> Result<Rational, Error> {
        if den.is_zero() {
            return Err(Error::Arithmetic);
        }
        Ok(Rational(BigRational::new(num, den)))
    }

    /// Builds an integer-valued rational.
    pub fn from_integer(n: BigInt) -> Rational {
        Rational(BigRational::from_integer(n))
    }

    /// Builds the exact rational representation of a machine `i64`.
    pub fn from_i64(n: i64) -> Rational {
        Rational(BigRational::from_integer(BigInt::from(n)))
    }

    /// Builds the *exact* rational representation of an `f64`, i.e. the
    /// rational number with precisely the same value as the IEEE-754 bit
    /// pattern of `f` (no decimal rounding is introduced).
    ///
    /// Returns `None` for NaN and infinities, which have no rational value.
    pub fn from_f64(f: f64) -> Option<Rational> {
        BigRational::from_float(f).map(Rational)
    }

    /// The numerator, in lowest terms.
    pub fn numerator(&self) -> &BigInt {
        self.0.numer()
    }

    /// The denominator, in lowest terms. Always strictly positive.
    pub fn denominator(&self) -> &BigInt {
        self.0.denom()
    }

    /// `true` iff this rational denotes an integer (`den() == 1`).
    pub fn is_integer(&self) -> bool {
        self.0.is_integer()
    }

    /// `true` iff this is the additive identity.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Additive inverse.
    pub fn neg(&self) -> Rational {
        Rational(-&self.0)
    }

    /// Exact sum.
    pub fn add(&self, other: &Rational) -> Rational {
        Rational(&self.0 + &other.0)
    }

    /// Exact difference.
    pub fn sub(&self, other: &Rational) -> Rational {
        Rational(&self.0 - &other.0)
    }

    /// Exact product.
    pub fn mul(&self, other: &Rational) -> Rational {
        Rational(&self.0 * &other.0)
    }

    /// Exact quotient.
    ///
    /// # Errors
    /// Returns [`Error::Arithmetic`] if `other` is zero.
    pub fn div(&self, other: &Rational) -> Result<Rational, Error> {
        if other.is_zero() {
            return Err(Error::Arithmetic);
        }
        Ok(Rational(&self.0 / &other.0))
    }

    /// `true` iff strictly less than zero.
    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    /// `true` iff strictly greater than zero.
    pub fn is_positive(&self) -> bool {
        self.0.is_positive()
    }

    /// Absolute value.
    pub fn abs(&self) -> Rational {
        Rational(self.0.abs())
    }

    /// Rounds an integer-valued rational down to a [`BigInt`], or `None` if
    /// the value is not an integer.
    pub fn to_integer(&self) -> Option<BigInt> {
        self.is_integer().then(|| self.0.to_integer())
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Zero for Rational {
    fn zero() -> Rational {
        Rational::zero()
    }

    fn is_zero(&self) -> bool {
        Rational::is_zero(self)
    }
}

impl One for Rational {
    fn one() -> Rational {
        Rational::one()
    }

    fn is_one(&self) -> bool {
        self.0.is_one()
    }
}

impl Neg for Rational {
    type Output = Rational;
    fn neg(self) -> Rational {
        Rational::neg(&self)
    }
}

impl Add for Rational {
    type Output = Rational;
    fn add(self, rhs: Rational) -> Rational {
        Rational::add(&self, &rhs)
    }
}

impl Sub for Rational {
    type Output = Rational;
    fn sub(self, rhs: Rational) -> Rational {
        Rational::sub(&self, &rhs)
    }
}

impl Mul for Rational {
    type Output = Rational;
    fn mul(self, rhs: Rational) -> Rational {
        Rational::mul(&self, &rhs)
    }
}

impl Div for Rational {
    type Output = Rational;
    /// Panics on division by zero; use [`Rational::div`] for a checked
    /// version. Kept for ergonomic use with generic numeric trait bounds
    /// that require an unchecked `Div` impl.
    fn div(self, rhs: Rational) -> Rational {
        Rational::div(&self, &rhs).expect("division by zero")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_arithmetic() {
        let a = Rational::from_i64(3);
        let b = Rational::from_i64(4);
        assert_eq!(a.add(&b), Rational::from_i64(7));
        assert_eq!(a.sub(&b), Rational::from_i64(-1));
        assert_eq!(a.mul(&b), Rational::from_i64(12));
        assert_eq!(a.div(&b).unwrap(), Rational::new(BigInt::from(3), BigInt::from(4)).unwrap());
    }

    #[test]
    fn division_by_zero_is_arithmetic_error() {
        let a = Rational::from_i64(1);
        assert_eq!(a.div(&Rational::zero()), Err(Error::Arithmetic));
    }

    #[test]
    fn integer_detection() {
        assert!(Rational::from_i64(4).is_integer());
        assert!(!Rational::new(BigInt::from(1), BigInt::from(2)).unwrap().is_integer());
    }

    #[test]
    fn exact_float_roundtrip() {
        let q = Rational::from_f64(0.5).unwrap();
        assert_eq!(q, Rational::new(BigInt::from(1), BigInt::from(2)).unwrap());
    }

    #[test]
    fn zero_one_identities() {
        assert!(Rational::zero().is_zero());
        assert!(Rational::one().is_one());
    }
}
