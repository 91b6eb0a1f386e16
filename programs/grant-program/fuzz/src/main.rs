//! Fuzz test runner for the recurring grant program
//!
//! Run with: cargo run --release -p grant-program-fuzz
//! Or: cargo test -p grant-program-fuzz (for property-based tests)

use grant_program::utils::period::period_index_at;
use grant_program_fuzz::*;
use proptest::prelude::*;
use std::time::Instant;

const NOW: i64 = 1_700_000_000;

fn main() {
    println!("=== Recurring Grant Program Fuzz Testing ===\n");

    let start = Instant::now();
    let mut total_tests = 0;
    let mut passed = 0;
    let mut failed = 0;

    println!("Running period clock fuzz tests...");
    let (p, f) = run_period_clock_fuzz(1000);
    passed += p;
    failed += f;
    total_tests += p + f;

    println!("Running claim sequence fuzz tests...");
    let (p, f) = run_claim_sequence_fuzz(200);
    passed += p;
    failed += f;
    total_tests += p + f;

    println!("Running double-claim tests...");
    let (p, f) = run_double_claim_tests();
    passed += p;
    failed += f;
    total_tests += p + f;

    let duration = start.elapsed();

    println!("\n=== Fuzz Testing Complete ===");
    println!("Total tests: {}", total_tests);
    println!("Passed: {}", passed);
    println!("Failed: {}", failed);
    println!("Duration: {:?}", duration);

    if failed > 0 {
        std::process::exit(1);
    }
}

fn run_period_clock_fuzz(iterations: usize) -> (usize, usize) {
    let mut passed = 0;
    let mut failed = 0;
    let mut runner = proptest::test_runner::TestRunner::default();

    for i in 0..iterations {
        let input = match any::<PeriodClockInput>().new_tree(&mut runner) {
            Ok(tree) => tree.current(),
            Err(reason) => {
                println!("  [{}] generation failed: {}", i, reason);
                failed += 1;
                continue;
            }
        };

        let result = period_index_at(input.start_ts, input.period_seconds, input.now);
        let length_ok = check_invalid_length_rejected(input.period_seconds, result.is_ok())
            == PeriodInvariantResult::Valid;
        let window_ok = match result {
            Ok(index) => {
                check_period_window(input.start_ts, input.period_seconds, input.now, index)
                    == PeriodInvariantResult::Valid
            }
            Err(_) => true,
        };

        if length_ok && window_ok {
            passed += 1;
        } else {
            println!("  [{}] FAILED: {:?}", i, input);
            failed += 1;
        }
    }

    println!("  {} passed, {} failed", passed, failed);
    (passed, failed)
}

fn run_claim_sequence_fuzz(iterations: usize) -> (usize, usize) {
    let mut passed = 0;
    let mut failed = 0;
    let mut runner = proptest::test_runner::TestRunner::default();

    for i in 0..iterations {
        let input = match any::<ClaimGrantInput>().new_tree(&mut runner) {
            Ok(tree) => tree.current(),
            Err(reason) => {
                println!("  [{}] generation failed: {}", i, reason);
                failed += 1;
                continue;
            }
        };

        let grant = simulated_grant(
            input.amount_per_period,
            input.period_seconds,
            NOW + input.start_offset,
        );
        let mut ledger = SimulatedLedger::new(grant, input.vault_balance);
        let mut now = NOW;
        let mut violation = None;

        for attempt in &input.attempts {
            now += attempt.advance_seconds;
            let claimer = claimer_key(attempt.claimer);
            let period_index =
                period_index_at(ledger.grant.start_ts, ledger.grant.period_seconds, now)
                    .unwrap_or(0);
            let Ok(proof) = ledger.issue_proof(&claimer, period_index, now, attempt.version) else {
                continue;
            };
            if let SimulationResult::InvariantViolation(reason) =
                ledger.claim(&claimer, period_index, &proof, now)
            {
                violation = Some(reason);
                break;
            }
        }

        let checks_hold = check_receipt_uniqueness(&ledger.payments, &ledger.receipts)
            == ReceiptInvariantResult::Valid
            && check_vault_conservation(ledger.funded, &ledger.paid_amounts, ledger.vault_balance)
                == VaultInvariantResult::Valid
            && check_chain_continuity(
                &ledger.chain,
                ledger.pop_state.last_global_hash,
                ledger.pop_state.entries,
            ) == ChainInvariantResult::Valid;

        match violation {
            None if checks_hold => passed += 1,
            other => {
                println!("  [{}] FAILED: {:?} ({:?})", i, other, input);
                failed += 1;
            }
        }
    }

    println!("  {} passed, {} failed", passed, failed);
    (passed, failed)
}

fn run_double_claim_tests() -> (usize, usize) {
    let mut passed = 0;
    let mut failed = 0;

    let mut ledger = SimulatedLedger::new(simulated_grant(1_000, 60, NOW - 5), 10_000);
    let claimer = claimer_key(0);

    let outcomes: Vec<bool> = (0..5)
        .filter_map(|i| {
            let now = NOW + i;
            ledger
                .issue_proof(&claimer, 0, now, 2)
                .ok()
                .map(|proof| ledger.claim(&claimer, 0, &proof, now).is_success())
        })
        .collect();

    if outcomes.iter().filter(|ok| **ok).count() == 1 && ledger.vault_balance == 9_000 {
        passed += 1;
    } else {
        println!("  FAILED: repeated claims paid {:?}", outcomes);
        failed += 1;
    }

    let mut empty = SimulatedLedger::new(simulated_grant(1_000, 60, NOW - 5), 0);
    let result = match empty.issue_proof(&claimer, 0, NOW, 2) {
        Ok(proof) => empty.claim(&claimer, 0, &proof, NOW),
        Err(err) => err.into(),
    };
    if result.error_name() == Some("InsufficientFunds") && !empty.pop_state.initialized {
        passed += 1;
    } else {
        println!("  FAILED: empty vault returned {:?}", result);
        failed += 1;
    }

    println!("  {} passed, {} failed", passed, failed);
    (passed, failed)
}
