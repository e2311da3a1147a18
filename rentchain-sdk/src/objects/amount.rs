//! On-chain amounts.

use alloy_primitives::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// An amount of wei (1 ETH = 10^18 wei), the full `uint256` range of the chain.
///
/// Serialized as a base-10 string, since JSON numbers lose precision past 2^53.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Wei(pub U256);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid wei amount {0:?}: expected a base-10 integer")]
pub struct ParseWeiError(String);

impl Wei {
    pub const PER_ETHER: u128 = 1_000_000_000_000_000_000;
    const ETHER_DECIMALS: u32 = 18;

    /// Convert an ether amount to wei.
    ///
    /// Returns `None` for negative amounts and amounts with more than 18
    /// decimal places.
    pub fn from_ether(ether: Decimal) -> Option<Self> {
        if ether.is_sign_negative() {
            return None;
        }
        let ether = ether.normalize();
        let scale = ether.scale();
        if scale > Self::ETHER_DECIMALS {
            return None;
        }
        let mantissa = u128::try_from(ether.mantissa()).ok()?;
        let factor = U256::from(10u128.pow(Self::ETHER_DECIMALS - scale));
        U256::from(mantissa).checked_mul(factor).map(Wei)
    }

    /// Convert back to ether, if it fits in a `Decimal`.
    pub fn to_ether(self) -> Option<Decimal> {
        let value = i128::try_from(self.0).ok()?;
        Decimal::try_from_i128_with_scale(value, Self::ETHER_DECIMALS)
            .ok()
            .map(|d| d.normalize())
    }
}

impl From<u128> for Wei {
    fn from(value: u128) -> Self {
        Wei(U256::from(value))
    }
}

impl From<U256> for Wei {
    fn from(value: U256) -> Self {
        Wei(value)
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Wei {
    type Err = ParseWeiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseWeiError(s.to_string()));
        }
        U256::from_str_radix(digits, 10)
            .map(Wei)
            .map_err(|_| ParseWeiError(s.to_string()))
    }
}

impl Serialize for Wei {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Wei {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
