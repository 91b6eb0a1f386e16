//! Fuzz target for period arithmetic
//!
//! Tests invariants:
//! - the computed index's window contains `now`
//! - non-positive lengths are always rejected
//! - `next_period_start` is the upper edge of the window
//!
//! Run with: cargo test --release -p grant-program-fuzz period_clock

use crate::*;
use grant_program::utils::period::{next_period_start, period_index_at};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2000))]

    #[test]
    fn fuzz_period_index(input in any::<PeriodClockInput>()) {
        let result = period_index_at(input.start_ts, input.period_seconds, input.now);

        prop_assert_eq!(
            check_invalid_length_rejected(input.period_seconds, result.is_ok()),
            PeriodInvariantResult::Valid
        );

        if let Ok(index) = result {
            prop_assert_eq!(
                check_period_window(input.start_ts, input.period_seconds, input.now, index),
                PeriodInvariantResult::Valid,
                "input: {:?}", input
            );
        }
    }

    #[test]
    fn fuzz_next_period_start_bounds_window(
        start_ts in 1_600_000_000i64..1_900_000_000i64,
        period_seconds in 1i64..10_000_000i64,
        offset in 0i64..1_000_000_000i64,
    ) {
        let now = start_ts + offset;
        let index = period_index_at(start_ts, period_seconds, now).unwrap();
        let next = next_period_start(start_ts, period_seconds, index).unwrap();

        prop_assert!(next > now);
        prop_assert_eq!(period_index_at(start_ts, period_seconds, next).unwrap(), index + 1);
        prop_assert_eq!(period_index_at(start_ts, period_seconds, next - 1).unwrap(), index);
    }

    #[test]
    fn fuzz_exact_multiples(
        start_ts in 0i64..1_900_000_000i64,
        period_seconds in 1i64..100_000i64,
        k in 0u64..10_000u64,
    ) {
        let now = start_ts + k as i64 * period_seconds;
        prop_assert_eq!(period_index_at(start_ts, period_seconds, now).unwrap(), k);
    }
}
