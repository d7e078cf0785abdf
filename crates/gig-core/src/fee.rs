//! Platform fee split applied when escrowed payment is released.
//!
//! # Precision
//!
//! The fee is `floor(price × percent / 100)` computed in `u128`, and the
//! freelancer receives the remainder, so `payout + fee == price` holds for
//! every price. Rounding favours the freelancer: a price of 1 at 2% pays no
//! fee at all.

use serde::{Deserialize, Serialize};

use crate::{Amount, CoreError};

/// Fee percentage the platform takes on release.
pub const DEFAULT_PLATFORM_FEE_PERCENT: u8 = 2;

/// How a released price is divided between freelancer and platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    /// Amount paid to the freelancer.
    pub payout: Amount,
    /// Amount retained by the platform.
    pub fee: Amount,
}

impl FeeSplit {
    /// Total of both legs; always equals the price that was split.
    #[must_use]
    pub const fn total(&self) -> Amount {
        Amount::new(self.payout.units() + self.fee.units())
    }
}

/// A fixed platform fee rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    percent: u8,
}

impl FeeSchedule {
    /// Creates a schedule taking `percent` of each released price.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidFeePercent` if `percent` exceeds 100.
    pub const fn new(percent: u8) -> Result<Self, CoreError> {
        if percent > 100 {
            return Err(CoreError::InvalidFeePercent(percent));
        }
        Ok(Self { percent })
    }

    /// Returns the fee percentage.
    #[must_use]
    pub const fn percent(&self) -> u8 {
        self.percent
    }

    /// Splits `price` into freelancer payout and platform fee.
    ///
    /// # Examples
    /// ```
    /// use gig_core::{Amount, FeeSchedule};
    ///
    /// let split = FeeSchedule::default().split(Amount::new(800));
    /// assert_eq!(split.fee, Amount::new(16));
    /// assert_eq!(split.payout, Amount::new(784));
    /// ```
    #[must_use]
    pub const fn split(&self, price: Amount) -> FeeSplit {
        let fee = price.percent_floor(self.percent);
        FeeSplit {
            payout: price.saturating_sub(fee),
            fee,
        }
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            percent: DEFAULT_PLATFORM_FEE_PERCENT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case(1000, 20, 980 ; "round thousand")]
    #[test_case(800, 16, 784 ; "discounted bid")]
    #[test_case(1, 0, 1 ; "single unit pays no fee")]
    #[test_case(49, 0, 49 ; "below fee threshold")]
    #[test_case(50, 1, 49 ; "first unit of fee")]
    #[test_case(99, 1, 98 ; "truncates toward zero")]
    fn default_schedule_splits(price: u64, fee: u64, payout: u64) {
        let split = FeeSchedule::default().split(Amount::new(price));
        assert_eq!(split.fee, Amount::new(fee));
        assert_eq!(split.payout, Amount::new(payout));
    }

    #[test]
    fn rejects_percent_above_hundred() {
        assert_eq!(FeeSchedule::new(101), Err(CoreError::InvalidFeePercent(101)));
        assert!(FeeSchedule::new(100).is_ok());
        assert!(FeeSchedule::new(0).is_ok());
    }

    #[test]
    fn zero_percent_pays_everything_out() {
        let schedule = FeeSchedule::new(0).expect("valid");
        let split = schedule.split(Amount::new(12_345));
        assert_eq!(split.fee, Amount::ZERO);
        assert_eq!(split.payout, Amount::new(12_345));
    }

    proptest! {
        #[test]
        fn split_sums_to_price(price in 1u64..=u64::MAX, percent in 0u8..=100) {
            let schedule = FeeSchedule::new(percent).expect("valid percent");
            let split = schedule.split(Amount::new(price));
            prop_assert_eq!(split.payout.units() + split.fee.units(), price);
            prop_assert_eq!(split.total(), Amount::new(price));
        }

        #[test]
        fn fee_matches_floor_formula(price in 1u64..=u64::MAX) {
            let split = FeeSchedule::default().split(Amount::new(price));
            let expected = (u128::from(price) * 2 / 100) as u64;
            prop_assert_eq!(split.fee.units(), expected);
        }
    }
}
