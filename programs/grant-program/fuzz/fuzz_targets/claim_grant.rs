//! Fuzz target for claim sequences against one grant
//!
//! Tests invariants:
//! - at most one payment per (claimer, period)
//! - vault conservation: funded == paid + balance
//! - every payment is a whole allotment
//! - the PoP chain head always equals the last accepted entry
//!
//! Run with: cargo test --release -p grant-program-fuzz claim_grant

use crate::*;
use grant_program::utils::period::period_index_at;
use proptest::prelude::*;

const NOW: i64 = 1_700_000_000;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn fuzz_claim_sequence(input in any::<ClaimGrantInput>()) {
        let mut grant = simulated_grant(
            input.amount_per_period,
            input.period_seconds,
            NOW + input.start_offset,
        );
        grant.paused = input.paused;
        let mut ledger = SimulatedLedger::new(grant, input.vault_balance);

        let mut now = NOW;
        let mut last_proof = None;

        for attempt in &input.attempts {
            now += attempt.advance_seconds;
            let claimer = claimer_key(attempt.claimer);
            let current = period_index_at(ledger.grant.start_ts, ledger.grant.period_seconds, now)
                .unwrap_or(0);
            let period_index = if attempt.wrong_period { current + 1 } else { current };

            let proof = match (&last_proof, attempt.replay_last_proof) {
                (Some(previous), true) => *previous,
                _ => match ledger.issue_proof(&claimer, period_index, now, attempt.version) {
                    Ok(proof) => proof,
                    Err(_) => continue,
                },
            };

            let result = ledger.claim(&claimer, period_index, &proof, now);
            prop_assert!(!result.is_invariant_violation(), "{:?}", result);

            if result.is_success() {
                prop_assert!(!input.paused);
                prop_assert!(!attempt.wrong_period);
                last_proof = Some(proof);
            }
        }

        prop_assert_eq!(
            check_receipt_uniqueness(&ledger.payments, &ledger.receipts),
            ReceiptInvariantResult::Valid
        );
        prop_assert_eq!(
            check_vault_conservation(ledger.funded, &ledger.paid_amounts, ledger.vault_balance),
            VaultInvariantResult::Valid
        );
        prop_assert_eq!(
            check_whole_payments(&ledger.paid_amounts, input.amount_per_period),
            VaultInvariantResult::Valid
        );
        prop_assert_eq!(
            check_chain_continuity(&ledger.chain, ledger.pop_state.last_global_hash, ledger.pop_state.entries),
            ChainInvariantResult::Valid
        );
    }

    /// Retrying the same period any number of times pays once.
    #[test]
    fn fuzz_retry_never_double_pays(retries in 1usize..20usize) {
        let mut ledger = SimulatedLedger::new(simulated_grant(1_000, 60, NOW - 5), 1_000_000);
        let claimer = claimer_key(0);
        let mut successes = 0;

        for i in 0..retries {
            let now = NOW + (i as i64 % 50);
            let proof = ledger.issue_proof(&claimer, 0, now, 2).unwrap();
            if ledger.claim(&claimer, 0, &proof, now).is_success() {
                successes += 1;
            }
        }

        prop_assert_eq!(successes, 1);
        prop_assert_eq!(ledger.vault_balance, 1_000_000 - 1_000);
    }
}
