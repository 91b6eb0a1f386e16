//! Protocol invariant checking for fuzz testing

use std::collections::HashSet;

/// Period clock invariant results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodInvariantResult {
    Valid,
    IndexBeforeStart { now: i64, start_ts: i64 },
    OutsideWindow { index: u64, now: i64 },
    AcceptedInvalidLength { period_seconds: i64 },
}

/// Vault invariant results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultInvariantResult {
    Valid,
    ConservationViolation { funded: u128, paid_plus_balance: u128 },
    PartialPayment { paid: u64, amount_per_period: u64 },
}

/// Receipt invariant results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptInvariantResult {
    Valid,
    DoublePayment { claimer: [u8; 32], period_index: u64 },
    PaymentWithoutReceipt { payments: usize, receipts: usize },
}

/// PoP chain invariant results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainInvariantResult {
    Valid,
    HeadMismatch { expected: [u8; 32], actual: [u8; 32] },
    EntryCountMismatch { expected: u64, actual: u64 },
    BrokenLink { position: usize },
}

// ============================================================================
// Period clock
// ============================================================================

/// A computed index `k` must satisfy `start + k*len <= now < start + (k+1)*len`
pub fn check_period_window(
    start_ts: i64,
    period_seconds: i64,
    now: i64,
    index: u64,
) -> PeriodInvariantResult {
    if now < start_ts {
        return PeriodInvariantResult::IndexBeforeStart { now, start_ts };
    }
    let start = start_ts as i128;
    let len = period_seconds as i128;
    let lower = start + index as i128 * len;
    let upper = lower + len;
    let now_wide = now as i128;
    if now_wide < lower || now_wide >= upper {
        PeriodInvariantResult::OutsideWindow { index, now }
    } else {
        PeriodInvariantResult::Valid
    }
}

pub fn check_invalid_length_rejected(period_seconds: i64, accepted: bool) -> PeriodInvariantResult {
    if period_seconds <= 0 && accepted {
        PeriodInvariantResult::AcceptedInvalidLength { period_seconds }
    } else {
        PeriodInvariantResult::Valid
    }
}

// ============================================================================
// Vault
// ============================================================================

/// Everything funded is either still in the vault or was paid out.
pub fn check_vault_conservation(funded: u64, paid: &[u64], balance: u64) -> VaultInvariantResult {
    let paid_total: u128 = paid.iter().map(|p| *p as u128).sum();
    let paid_plus_balance = paid_total + balance as u128;
    if paid_plus_balance != funded as u128 {
        VaultInvariantResult::ConservationViolation {
            funded: funded as u128,
            paid_plus_balance,
        }
    } else {
        VaultInvariantResult::Valid
    }
}

/// Every payment is exactly one allotment.
pub fn check_whole_payments(paid: &[u64], amount_per_period: u64) -> VaultInvariantResult {
    match paid.iter().find(|p| **p != amount_per_period) {
        Some(p) => VaultInvariantResult::PartialPayment {
            paid: *p,
            amount_per_period,
        },
        None => VaultInvariantResult::Valid,
    }
}

// ============================================================================
// Receipts
// ============================================================================

/// At most one payment per (claimer, period), and one receipt per payment.
pub fn check_receipt_uniqueness(
    payments: &[([u8; 32], u64)],
    receipts: &HashSet<([u8; 32], u64)>,
) -> ReceiptInvariantResult {
    let mut seen = HashSet::new();
    for (claimer, period_index) in payments {
        if !seen.insert((*claimer, *period_index)) {
            return ReceiptInvariantResult::DoublePayment {
                claimer: *claimer,
                period_index: *period_index,
            };
        }
    }
    if payments.len() != receipts.len() {
        return ReceiptInvariantResult::PaymentWithoutReceipt {
            payments: payments.len(),
            receipts: receipts.len(),
        };
    }
    ReceiptInvariantResult::Valid
}

// ============================================================================
// PoP chain
// ============================================================================

/// Each accepted entry links to its predecessor and the head is the last one.
pub fn check_chain_continuity(
    links: &[([u8; 32], [u8; 32])],
    head: [u8; 32],
    entries: u64,
) -> ChainInvariantResult {
    if links.len() as u64 != entries {
        return ChainInvariantResult::EntryCountMismatch {
            expected: links.len() as u64,
            actual: entries,
        };
    }
    let mut expected_prev = [0u8; 32];
    for (position, (prev, entry_hash)) in links.iter().enumerate() {
        if *prev != expected_prev {
            return ChainInvariantResult::BrokenLink { position };
        }
        expected_prev = *entry_hash;
    }
    if expected_prev != head {
        return ChainInvariantResult::HeadMismatch {
            expected: expected_prev,
            actual: head,
        };
    }
    ChainInvariantResult::Valid
}
