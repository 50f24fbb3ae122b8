//! Unsigned arbitrary-precision account balance.
//!
//! Balances never wrap: addition grows the magnitude, and subtraction below
//! zero is reported as an error instead of silently producing garbage.

use crate::{Error, Result};
use basalt_codec::{Decode, Decoder, Encode, Encoder};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::str::FromStr;

/// An unsigned arbitrary-precision balance.
///
/// # Example
///
/// ```rust
/// use basalt_types::Balance;
///
/// let a = Balance::from(100u64);
/// let b = Balance::from(42u64);
/// assert_eq!(a.clone() + b.clone(), Balance::from(142u64));
/// assert_eq!(a.checked_sub(&b), Some(Balance::from(58u64)));
/// assert_eq!(b.checked_sub(&a), None);
/// ```
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Balance(BigUint);

impl Balance {
    /// The zero balance.
    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    /// Checks whether the balance is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Subtracts `other`, returning `None` on underflow.
    #[must_use]
    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        if self.0 >= other.0 {
            Some(Self(&self.0 - &other.0))
        } else {
            None
        }
    }

    /// Clamps the balance into a `u64` gas budget.
    ///
    /// Fees beyond `u64::MAX` units buy no additional execution.
    pub fn as_gas(&self) -> u64 {
        self.0.to_u64().unwrap_or(u64::MAX)
    }

    /// Parses the decimal text form.
    pub fn from_decimal(s: &str) -> Result<Self> {
        let value = BigUint::from_str(s).map_err(|e| Error::InvalidBalance(e.to_string()))?;
        Ok(Self(value))
    }
}

impl Add for Balance {
    type Output = Balance;

    fn add(self, rhs: Balance) -> Balance {
        Balance(self.0 + rhs.0)
    }
}

impl<'a> Add<&'a Balance> for Balance {
    type Output = Balance;

    fn add(self, rhs: &'a Balance) -> Balance {
        Balance(self.0 + &rhs.0)
    }
}

impl Sum for Balance {
    fn sum<I: Iterator<Item = Balance>>(iter: I) -> Balance {
        iter.fold(Balance::zero(), Add::add)
    }
}

impl From<u64> for Balance {
    fn from(v: u64) -> Self {
        Self(BigUint::from(v))
    }
}

impl From<u128> for Balance {
    fn from(v: u128) -> Self {
        Self(BigUint::from(v))
    }
}

impl fmt::Debug for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Balance({})", self.0)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Balance {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_decimal(s)
    }
}

impl Encode for Balance {
    fn encode(&self, enc: &mut Encoder) {
        if self.0.is_zero() {
            enc.write_bytes(&[]);
        } else {
            enc.write_bytes(&self.0.to_bytes_le());
        }
    }
}

impl Decode for Balance {
    fn decode(dec: &mut Decoder<'_>) -> basalt_codec::Result<Self> {
        let bytes = dec.read_bytes()?;
        if bytes.last() == Some(&0) {
            return Err(basalt_codec::Error::InvalidValue {
                type_name: "Balance",
                reason: "non-minimal magnitude encoding".into(),
            });
        }
        Ok(Self(BigUint::from_bytes_le(&bytes)))
    }
}

impl Serialize for Balance {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Balance {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_decimal(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addition_grows_without_wrapping() {
        let max = Balance::from(u64::MAX);
        let sum = max.clone() + Balance::from(1u64);
        assert!(sum > max);
    }

    #[test]
    fn checked_sub_detects_underflow() {
        let small = Balance::from(5u64);
        let big = Balance::from(6u64);
        assert_eq!(small.checked_sub(&big), None);
        assert_eq!(big.checked_sub(&small), Some(Balance::from(1u64)));
    }

    #[test]
    fn gas_clamps_to_u64() {
        let huge = Balance::from(u128::MAX);
        assert_eq!(huge.as_gas(), u64::MAX);
        assert_eq!(Balance::from(21_000u64).as_gas(), 21_000);
    }

    #[test]
    fn codec_round_trip() {
        for v in [0u64, 1, 255, 256, u64::MAX] {
            let balance = Balance::from(v);
            let bytes = basalt_codec::to_bytes(&balance);
            assert_eq!(basalt_codec::from_bytes::<Balance>(&bytes).unwrap(), balance);
        }
        let wide = Balance::from(u128::MAX);
        let bytes = basalt_codec::to_bytes(&wide);
        assert_eq!(basalt_codec::from_bytes::<Balance>(&bytes).unwrap(), wide);
    }

    #[test]
    fn non_minimal_encoding_is_rejected() {
        let mut enc = basalt_codec::Encoder::new();
        enc.write_bytes(&[1, 0]);
        assert!(basalt_codec::from_bytes::<Balance>(&enc.into_bytes()).is_err());
    }

    #[test]
    fn decimal_round_trip() {
        let balance: Balance = "340282366920938463463374607431768211456".parse().unwrap();
        assert_eq!(balance.to_string(), "340282366920938463463374607431768211456");
    }
}
