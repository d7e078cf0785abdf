//! Ratings exchanged between clients and freelancers.
//!
//! A profile's rating is an integer running average on a 0..=5 scale. New
//! profiles start at 0 (unrated). Each new rating is folded in with the
//! ratee's completed-job count as its weight:
//!
//! `new = floor((old × completed_jobs + rating) / (completed_jobs + 1))`
//!
//! The weight is the completed-job counter, not a count of ratings received,
//! so a profile that completes jobs without being rated carries more inertia
//! than its rating history alone would suggest.

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Lowest rating a participant may give.
pub const MIN_RATING: u8 = 1;

/// Highest rating a participant may give.
pub const MAX_RATING: u8 = 5;

/// A single rating in `MIN_RATING..=MAX_RATING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    /// Creates a rating.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidRating` if `value` is outside 1..=5.
    pub const fn new(value: u8) -> Result<Self, CoreError> {
        if value < MIN_RATING || value > MAX_RATING {
            return Err(CoreError::InvalidRating(value));
        }
        Ok(Self(value))
    }

    /// Returns the raw rating value.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Rating {
    type Error = CoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

/// Folds `incoming` into `current` using `weight` as the prior count.
///
/// Truncates toward zero. With `current <= 5` the result never exceeds 5,
/// and once `current >= 1` the result never drops below 1.
#[must_use]
pub const fn running_average(current: u8, weight: u64, incoming: Rating) -> u8 {
    let weight = weight as u128;
    let numerator = current as u128 * weight + incoming.0 as u128;
    let averaged = numerator / (weight + 1);
    if averaged > MAX_RATING as u128 {
        MAX_RATING
    } else {
        averaged as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rating(v: u8) -> Rating {
        Rating::new(v).expect("valid rating")
    }

    #[test]
    fn rating_rejects_out_of_range() {
        assert_eq!(Rating::new(0), Err(CoreError::InvalidRating(0)));
        assert_eq!(Rating::new(6), Err(CoreError::InvalidRating(6)));
        assert_eq!(rating(1).value(), 1);
        assert_eq!(rating(5).value(), 5);
    }

    #[test]
    fn first_rating_with_no_completed_jobs_is_taken_verbatim() {
        assert_eq!(running_average(0, 0, rating(4)), 4);
    }

    #[test]
    fn weight_comes_from_completed_jobs() {
        // one completed job, never rated: the unrated zero counts as a prior sample
        assert_eq!(running_average(0, 1, rating(4)), 2);
        assert_eq!(running_average(0, 1, rating(1)), 0);
        // (4 * 3 + 5) / 4 = 4.25
        assert_eq!(running_average(4, 3, rating(5)), 4);
        // (5 * 1 + 1) / 2 = 3
        assert_eq!(running_average(5, 1, rating(1)), 3);
    }

    #[test]
    fn serde_validates_range() {
        assert!(serde_json::from_str::<Rating>("0").is_err());
        assert_eq!(serde_json::from_str::<Rating>("3").expect("valid"), rating(3));
        assert_eq!(serde_json::to_string(&rating(5)).expect("serialize"), "5");
    }

    proptest! {
        #[test]
        fn average_never_exceeds_max(
            ratings in prop::collection::vec(1u8..=5, 1..50),
            start_weight in 0u64..1000,
        ) {
            let mut current = 0u8;
            let mut weight = start_weight;
            for r in ratings {
                current = running_average(current, weight, rating(r));
                weight += 1;
                prop_assert!(current <= MAX_RATING);
            }
        }

        #[test]
        fn rated_profile_stays_within_one_to_five(
            start in 1u8..=5,
            ratings in prop::collection::vec(1u8..=5, 1..50),
            weight in 0u64..10_000,
        ) {
            let mut current = start;
            for r in ratings {
                current = running_average(current, weight, rating(r));
                prop_assert!((MIN_RATING..=MAX_RATING).contains(&current));
            }
        }
    }
}
