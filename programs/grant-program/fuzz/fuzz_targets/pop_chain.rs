//! Fuzz target for the PoP hash chain
//!
//! Tests invariants:
//! - a chain built by an honest authority is accepted entry by entry
//! - every entry hash survives the wire message round trip
//! - any single-byte change to a signed message is rejected
//!
//! Run with: cargo test --release -p grant-program-fuzz pop_chain

use crate::*;
use anchor_lang::prelude::Pubkey;
use grant_program::instructions::claim_helpers::{
    advance_pop_state, check_pop_chain, check_pop_message,
};
use grant_program::state::{PopState, ZERO_HASH};
use grant_program::utils::pop::{PopEntry, PopMessage};
use proptest::prelude::*;

const NOW: i64 = 1_700_000_000;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn fuzz_pop_chain(input in any::<PopChainInput>()) {
        let grant = Pubkey::new_from_array(input.grant);
        let mut state = PopState::default();
        let mut links = Vec::new();

        for (position, version) in input.versions.iter().enumerate() {
            let claimer = Pubkey::new_from_array(input.claimers[position % input.claimers.len()]);
            let (prev, stream_prev) = if state.initialized {
                (state.last_global_hash, state.last_stream_hash)
            } else {
                (ZERO_HASH, ZERO_HASH)
            };
            let mut audit = input.audit;
            audit[0] |= 1;
            let sealed = PopMessage::seal(PopEntry {
                version: *version,
                prev_hash: prev,
                stream_prev_hash: stream_prev,
                audit_hash: if *version == 1 { ZERO_HASH } else { audit },
                grant,
                claimer,
                period_index: position as u64,
                issued_at: NOW + position as i64,
            }).unwrap();

            let mut bytes = sealed.to_bytes();
            let tampered = match input.tamper {
                Some((at, byte)) if at == position && byte < bytes.len() => {
                    bytes[byte] ^= 0x01;
                    true
                }
                _ => false,
            };

            let outcome = PopMessage::parse(&bytes).and_then(|parsed| {
                check_pop_message(&parsed, &grant, &claimer, position as u64, NOW + position as i64)?;
                check_pop_chain(&state, &grant, &parsed)?;
                Ok(parsed)
            });

            if tampered {
                prop_assert!(outcome.is_err(), "tampered message accepted at {}", position);
                break;
            }

            let parsed = outcome.unwrap();
            prop_assert_eq!(parsed, sealed);
            advance_pop_state(&mut state, grant, &parsed, 255).unwrap();
            links.push((prev, parsed.entry_hash));
        }

        prop_assert_eq!(
            check_chain_continuity(&links, state.last_global_hash, state.entries),
            ChainInvariantResult::Valid
        );
    }

    #[test]
    fn fuzz_unknown_version_never_parses(version in 3u8..=255u8, len in 0usize..300usize) {
        let mut bytes = vec![0u8; len.max(1)];
        bytes[0] = version;
        prop_assert!(PopMessage::parse(&bytes).is_err());
    }
}
