//! Small prime field used for every aggregate, contribution, and public input.
//!
//! - `Fp64<P>`: prime field modulo a 64-bit prime `P` (const generic).
//! - [`Fe`]: the Goldilocks instantiation `p = 2^64 - 2^32 + 1` used throughout.
//!
//! Division only happens through [`Fp64::checked_inv`]; there is no floating
//! point anywhere in the fold path.

use core::fmt;
use core::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Goldilocks prime `p = 2^64 - 2^32 + 1`.
pub const GOLDILOCKS: u64 = 0xffff_ffff_0000_0001;

/// Field element type used by fedagg.
pub type Fe = Fp64<GOLDILOCKS>;

/// A serialized residue was not in canonical `[0, P)` form.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("non-canonical field encoding: {0}")]
pub struct NonCanonical(pub u64);

/// 64-bit prime field element (const generic modulus).
///
/// On the wire this is a plain `u64`; values `>= P` are rejected on decode.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Fp64<const P: u64>(u64);

impl<const P: u64> Fp64<P> {
    /// Zero (the canonical start of every fold).
    pub const ZERO: Self = Self(0);

    /// One.
    #[inline]
    #[must_use]
    pub const fn one() -> Self {
        Self(1 % P)
    }

    /// From `u64` reduced mod `P`.
    #[inline]
    #[must_use]
    pub const fn from_u64(x: u64) -> Self {
        Self(x % P)
    }

    /// From signed `i64` (two's-complement mapping into the field).
    #[inline]
    #[must_use]
    pub fn from_i64(x: i64) -> Self {
        Self((i128::from(x)).rem_euclid(i128::from(P)) as u64)
    }

    /// Canonical representative in `[0, P)`.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Whether this is the additive identity.
    #[inline]
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Into little-endian 8 bytes (canonical for this field).
    #[inline]
    #[must_use]
    pub const fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    /// Exponentiation by squaring.
    #[must_use]
    pub fn pow(self, mut e: u64) -> Self {
        let mut base = self;
        let mut acc = Self::one();
        while e > 0 {
            if e & 1 == 1 {
                acc *= base;
            }
            base *= base;
            e >>= 1;
        }
        acc
    }

    /// Multiplicative inverse, `None` for zero (P assumed prime).
    #[inline]
    #[must_use]
    pub fn checked_inv(self) -> Option<Self> {
        if self.is_zero() {
            None
        } else {
            Some(self.pow(P - 2))
        }
    }

    #[inline]
    const fn add_raw(a: u64, b: u64) -> u64 {
        let s = (a as u128) + (b as u128);
        let s = if s >= (P as u128) { s - (P as u128) } else { s };
        s as u64
    }

    #[inline]
    const fn sub_raw(a: u64, b: u64) -> u64 {
        if a >= b {
            a - b
        } else {
            ((a as u128) + (P as u128) - (b as u128)) as u64
        }
    }

    #[inline]
    const fn mul_raw(a: u64, b: u64) -> u64 {
        let prod = (a as u128) * (b as u128);
        (prod % (P as u128)) as u64
    }
}

impl<const P: u64> Default for Fp64<P> {
    #[inline]
    fn default() -> Self {
        Self::ZERO
    }
}

impl<const P: u64> TryFrom<u64> for Fp64<P> {
    type Error = NonCanonical;

    fn try_from(x: u64) -> Result<Self, Self::Error> {
        if x < P {
            Ok(Self(x))
        } else {
            Err(NonCanonical(x))
        }
    }
}

impl<const P: u64> From<Fp64<P>> for u64 {
    #[inline]
    fn from(x: Fp64<P>) -> Self {
        x.0
    }
}

impl<const P: u64> fmt::Display for Fp64<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<const P: u64> Add for Fp64<P> {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(Self::add_raw(self.0, rhs.0))
    }
}
impl<const P: u64> Sub for Fp64<P> {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self(Self::sub_raw(self.0, rhs.0))
    }
}
impl<const P: u64> Mul for Fp64<P> {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self(Self::mul_raw(self.0, rhs.0))
    }
}
impl<const P: u64> AddAssign for Fp64<P> {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}
impl<const P: u64> SubAssign for Fp64<P> {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}
impl<const P: u64> MulAssign for Fp64<P> {
    #[inline]
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}
impl<const P: u64> Neg for Fp64<P> {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        if self.0 == 0 {
            self
        } else {
            Self(P - self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    const P: u64 = 97;

    #[test]
    fn small_field_arithmetic() {
        let a = Fp64::<P>::from_u64(90);
        let b = Fp64::<P>::from_u64(10);
        assert_eq!((a + b).value(), 3);
        assert_eq!((b - a).value(), 17);
        assert_eq!((-b + b), Fp64::<P>::ZERO);
        assert_eq!(Fp64::<P>::from_i64(-1).value(), 96);
    }

    #[test]
    fn inverse_is_exact() {
        let two = Fe::from_u64(2);
        let half = two.checked_inv().unwrap();
        assert_eq!(half * two, Fe::one());
        assert_eq!(Fe::ZERO.checked_inv(), None);
        // (5 + 10) / 2 in the field, multiplied back by 2.
        let avg = (Fe::from_u64(5) + Fe::from_u64(10)) * half;
        assert_eq!(avg * two, Fe::from_u64(15));
    }

    #[test]
    fn serde_rejects_non_canonical() {
        let ok: Fe = serde_json::from_str("27").unwrap();
        assert_eq!(ok, Fe::from_u64(27));
        assert!(serde_json::from_str::<Fe>(&GOLDILOCKS.to_string()).is_err());
        assert_eq!(serde_json::to_string(&ok).unwrap(), "27");
    }
}
