//! Arbitrary input generators for fuzz testing
//!
//! Produces grant parameters, clock readings and claim sequences with a bias
//! towards the edges the program has to reject.

use proptest::prelude::*;

/// Arbitrary 32-byte value (pubkey seed, hash)
pub fn arb_hash() -> impl Strategy<Value = [u8; 32]> {
    prop::array::uniform32(any::<u8>())
}

/// Amount per period with edge cases
pub fn arb_amount() -> impl Strategy<Value = u64> {
    prop_oneof![
        Just(0u64),
        Just(1u64),
        Just(u64::MAX),
        1u64..1_000u64,
        1_000u64..1_000_000_000u64,
    ]
}

/// Period length, including invalid non-positive values
pub fn arb_period_seconds() -> impl Strategy<Value = i64> {
    prop_oneof![
        Just(0i64),
        Just(-1i64),
        Just(1i64),
        Just(60i64),
        Just(2_592_000i64),
        Just(i64::MAX),
        1i64..100_000i64,
    ]
}

/// Realistic unix timestamp with occasional extremes
pub fn arb_timestamp() -> impl Strategy<Value = i64> {
    prop_oneof![
        Just(0i64),
        Just(i64::MAX),
        Just(i64::MIN),
        1_600_000_000i64..1_900_000_000i64,
    ]
}

/// Offset of "now" relative to a grant start
pub fn arb_clock_offset() -> impl Strategy<Value = i64> {
    prop_oneof![
        Just(0i64),
        Just(-1i64),
        -10_000i64..0i64,
        0i64..10_000_000i64,
    ]
}

/// PoP message version, mostly valid
pub fn arb_pop_version() -> impl Strategy<Value = u8> {
    prop_oneof![
        4 => 1u8..=2u8,
        1 => Just(0u8),
        1 => 3u8..=255u8,
    ]
}

/// Inputs for the period clock target
#[derive(Debug, Clone)]
pub struct PeriodClockInput {
    pub start_ts: i64,
    pub period_seconds: i64,
    pub now: i64,
}

impl Arbitrary for PeriodClockInput {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (arb_timestamp(), arb_period_seconds(), arb_timestamp())
            .prop_map(|(start_ts, period_seconds, now)| PeriodClockInput {
                start_ts,
                period_seconds,
                now,
            })
            .boxed()
    }
}

/// One attempted claim inside a scenario
#[derive(Debug, Clone)]
pub struct ClaimAttempt {
    /// Index into the scenario's claimer set
    pub claimer: u8,
    /// Seconds to advance the clock before the attempt
    pub advance_seconds: i64,
    /// Re-send the previous proof instead of requesting a fresh one
    pub replay_last_proof: bool,
    /// Claim a period other than the current one
    pub wrong_period: bool,
    pub version: u8,
}

impl Arbitrary for ClaimAttempt {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            0u8..4u8,
            prop_oneof![Just(0i64), 0i64..120i64, 0i64..3_600i64],
            prop::bool::weighted(0.1),
            prop::bool::weighted(0.1),
            arb_pop_version(),
        )
            .prop_map(
                |(claimer, advance_seconds, replay_last_proof, wrong_period, version)| {
                    ClaimAttempt {
                        claimer,
                        advance_seconds,
                        replay_last_proof,
                        wrong_period,
                        version,
                    }
                },
            )
            .boxed()
    }
}

/// Inputs for a multi-claim scenario against one grant
#[derive(Debug, Clone)]
pub struct ClaimGrantInput {
    pub amount_per_period: u64,
    pub period_seconds: i64,
    /// Start relative to the first attempt's clock
    pub start_offset: i64,
    pub vault_balance: u64,
    pub paused: bool,
    pub attempts: Vec<ClaimAttempt>,
}

impl Arbitrary for ClaimGrantInput {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            prop_oneof![Just(1_000u64), 1u64..1_000_000u64],
            prop_oneof![Just(60i64), 1i64..3_600i64],
            prop_oneof![Just(-5i64), -10_000i64..100i64],
            prop_oneof![Just(0u64), 0u64..10_000_000u64],
            prop::bool::weighted(0.05),
            prop::collection::vec(any::<ClaimAttempt>(), 1..24),
        )
            .prop_map(
                |(amount_per_period, period_seconds, start_offset, vault_balance, paused, attempts)| {
                    ClaimGrantInput {
                        amount_per_period,
                        period_seconds,
                        start_offset,
                        vault_balance,
                        paused,
                        attempts,
                    }
                },
            )
            .boxed()
    }
}

/// Inputs for the PoP chain target
#[derive(Debug, Clone)]
pub struct PopChainInput {
    pub grant: [u8; 32],
    pub claimers: Vec<[u8; 32]>,
    pub versions: Vec<u8>,
    pub audit: [u8; 32],
    /// Flip one byte of this entry's message before verification
    pub tamper: Option<(usize, usize)>,
}

impl Arbitrary for PopChainInput {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            arb_hash(),
            prop::collection::vec(arb_hash(), 1..8),
            prop::collection::vec(1u8..=2u8, 1..16),
            arb_hash(),
            proptest::option::of((0usize..16usize, 0usize..209usize)),
        )
            .prop_map(|(grant, claimers, versions, audit, tamper)| PopChainInput {
                grant,
                claimers,
                versions,
                audit,
                tamper,
            })
            .boxed()
    }
}
