//! Basis-point rates and their checked application to base-unit amounts.
//!
//! All token quantities in the stack are `u128` base units. Rates are
//! expressed in basis points (1 bps = 0.01%), the whole being 10 000.
//! Application widens into `u128` checked arithmetic so that a corrupt
//! rate or an absurd amount surfaces as `None` instead of wrapping.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A fee or tolerance rate in basis points, validated to at most 10 000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BasisPoints(u16);

impl BasisPoints {
    /// The whole: 100% expressed in basis points.
    pub const WHOLE: u16 = 10_000;

    /// A zero rate.
    pub const ZERO: BasisPoints = BasisPoints(0);

    /// Create a rate, validating it does not exceed the whole.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidBasisPoints`] for values above
    /// 10 000.
    pub fn new(bps: u16) -> Result<Self, ValidationError> {
        if bps > Self::WHOLE {
            return Err(ValidationError::InvalidBasisPoints(bps));
        }
        Ok(Self(bps))
    }

    /// The raw basis-point value.
    pub fn value(&self) -> u16 {
        self.0
    }

    /// Whether this rate is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Apply the rate to an amount: `amount * bps / 10_000`, rounding down.
    ///
    /// Returns `None` on multiplication overflow.
    pub fn apply(&self, amount: u128) -> Option<u128> {
        amount
            .checked_mul(u128::from(self.0))
            .map(|scaled| scaled / u128::from(Self::WHOLE))
    }

    /// The complementary rate: `10_000 - bps`.
    pub fn complement(&self) -> BasisPoints {
        BasisPoints(Self::WHOLE - self.0)
    }
}

impl<'de> Deserialize<'de> for BasisPoints {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = u16::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for BasisPoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}bps", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_rates_above_whole() {
        assert!(BasisPoints::new(10_000).is_ok());
        assert!(BasisPoints::new(10_001).is_err());
    }

    #[test]
    fn apply_rounds_down() {
        let one_percent = BasisPoints::new(100).unwrap();
        assert_eq!(one_percent.apply(10_000), Some(100));
        assert_eq!(one_percent.apply(99), Some(0));
    }

    #[test]
    fn whole_rate_is_identity() {
        let whole = BasisPoints::new(BasisPoints::WHOLE).unwrap();
        assert_eq!(whole.apply(123_456), Some(123_456));
    }

    #[test]
    fn apply_overflow_is_none() {
        let rate = BasisPoints::new(2).unwrap();
        assert!(rate.apply(u128::MAX).is_none());
    }

    #[test]
    fn complement_sums_to_whole() {
        let rate = BasisPoints::new(250).unwrap();
        assert_eq!(rate.value() + rate.complement().value(), BasisPoints::WHOLE);
    }

    #[test]
    fn deserialize_validates() {
        let ok: Result<BasisPoints, _> = serde_json::from_str("500");
        assert!(ok.is_ok());
        let bad: Result<BasisPoints, _> = serde_json::from_str("20000");
        assert!(bad.is_err());
    }

    proptest! {
        #[test]
        fn applied_share_never_exceeds_amount(bps in 0u16..=10_000, amount in 0u128..=u128::MAX / 10_000) {
            let rate = BasisPoints::new(bps).unwrap();
            let share = rate.apply(amount).unwrap();
            prop_assert!(share <= amount);
        }
    }
}
