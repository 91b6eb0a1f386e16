//! Period arithmetic shared by the program and off-chain clients

use crate::errors::GrantError;

/// Index of the period containing `now`.
///
/// Fails with `InvalidPeriod` for a non-positive period length and with
/// `GrantNotStarted` before `start_ts`. Off-chain callers that want the
/// grace-period behaviour (index 0 before start) handle that case first.
pub fn period_index_at(start_ts: i64, period_seconds: i64, now: i64) -> Result<u64, GrantError> {
    if period_seconds <= 0 {
        return Err(GrantError::InvalidPeriod);
    }
    if now < start_ts {
        return Err(GrantError::GrantNotStarted);
    }
    let elapsed = now
        .checked_sub(start_ts)
        .ok_or(GrantError::ArithmeticOverflow)?;
    // elapsed >= 0 and period_seconds > 0
    Ok((elapsed / period_seconds) as u64)
}

/// First timestamp of the period after `period_index`.
pub fn next_period_start(
    start_ts: i64,
    period_seconds: i64,
    period_index: u64,
) -> Result<i64, GrantError> {
    if period_seconds <= 0 {
        return Err(GrantError::InvalidPeriod);
    }
    let next = i64::try_from(period_index)
        .ok()
        .and_then(|index| index.checked_add(1))
        .ok_or(GrantError::ArithmeticOverflow)?;
    next.checked_mul(period_seconds)
        .and_then(|offset| start_ts.checked_add(offset))
        .ok_or(GrantError::ArithmeticOverflow)
}
