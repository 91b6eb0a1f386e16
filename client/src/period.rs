use grant_program::errors::GrantError;
use grant_program::state::Grant;
use grant_program::utils::period::{next_period_start, period_index_at};

use crate::error::ClaimError;

/// Period arithmetic for one grant schedule.
///
/// Before `start_ts` the clock reports period 0 so a claimant can prepare
/// the first claim; the ledger still refuses it until the grant starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodClock {
    start_ts: i64,
    period_seconds: i64,
}

impl PeriodClock {
    pub fn new(start_ts: i64, period_seconds: i64) -> Result<Self, ClaimError> {
        if period_seconds <= 0 {
            return Err(ClaimError::InvalidPeriod { period_seconds });
        }
        Ok(Self {
            start_ts,
            period_seconds,
        })
    }

    pub fn for_grant(grant: &Grant) -> Result<Self, ClaimError> {
        Self::new(grant.start_ts, grant.period_seconds)
    }

    pub fn start_ts(&self) -> i64 {
        self.start_ts
    }

    pub fn period_seconds(&self) -> i64 {
        self.period_seconds
    }

    pub fn period_index(&self, now: i64) -> Result<u64, ClaimError> {
        if now < self.start_ts {
            return Ok(0);
        }
        period_index_at(self.start_ts, self.period_seconds, now).map_err(|err| self.map_err(err))
    }

    /// First second at which `period_index + 1` can be claimed.
    pub fn next_eligible_time(&self, period_index: u64) -> Result<i64, ClaimError> {
        next_period_start(self.start_ts, self.period_seconds, period_index)
            .map_err(|err| self.map_err(err))
    }

    /// `[start, end)` of the given period.
    pub fn window(&self, period_index: u64) -> Result<(i64, i64), ClaimError> {
        let end = self.next_eligible_time(period_index)?;
        Ok((end - self.period_seconds, end))
    }

    fn map_err(&self, err: GrantError) -> ClaimError {
        match err {
            GrantError::InvalidPeriod => ClaimError::InvalidPeriod {
                period_seconds: self.period_seconds,
            },
            _ => ClaimError::PeriodOverflow {
                start_ts: self.start_ts,
                period_seconds: self.period_seconds,
            },
        }
    }
}

pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_before_start_is_period_zero() {
        let clock = PeriodClock::new(1_000, 60).unwrap();
        assert_eq!(clock.period_index(0).unwrap(), 0);
        assert_eq!(clock.period_index(999).unwrap(), 0);
    }

    #[test]
    fn test_exact_multiples() {
        let clock = PeriodClock::new(1_000, 60).unwrap();
        for k in 0..10u64 {
            assert_eq!(clock.period_index(1_000 + 60 * k as i64).unwrap(), k);
            assert_eq!(clock.period_index(1_059 + 60 * k as i64).unwrap(), k);
        }
    }

    #[test]
    fn test_non_positive_length_rejected() {
        assert!(matches!(
            PeriodClock::new(0, 0),
            Err(ClaimError::InvalidPeriod { period_seconds: 0 })
        ));
        assert!(matches!(
            PeriodClock::new(0, -1),
            Err(ClaimError::InvalidPeriod { .. })
        ));
    }

    #[test]
    fn test_next_eligible_and_window() {
        let clock = PeriodClock::new(1_000, 60).unwrap();
        assert_eq!(clock.next_eligible_time(0).unwrap(), 1_060);
        assert_eq!(clock.window(2).unwrap(), (1_120, 1_180));
    }

    #[test]
    fn test_overflow_is_reported_as_period_error() {
        let clock = PeriodClock::new(i64::MAX - 10, 60).unwrap();
        assert!(matches!(
            clock.next_eligible_time(0),
            Err(ClaimError::PeriodOverflow {
                start_ts,
                period_seconds: 60,
            }) if start_ts == i64::MAX - 10
        ));
        let clock = PeriodClock::new(0, 60).unwrap();
        assert!(matches!(
            clock.next_eligible_time(u64::MAX),
            Err(ClaimError::PeriodOverflow { .. })
        ));
    }

    #[test]
    fn test_from_grant() {
        let grant = Grant {
            start_ts: 10,
            period_seconds: 0,
            ..Default::default()
        };
        assert!(PeriodClock::for_grant(&grant).is_err());
    }
}
