//! Property-based fuzz testing for the recurring grant program
//!
//! Drives the program's pure claim, period and PoP helpers through a
//! simulated ledger and checks protocol invariants after every step.
//!
//! # Usage
//!
//! ```bash
//! # Run all property-based tests
//! cargo test --release -p grant-program-fuzz
//!
//! # Run the fuzz test runner
//! cargo run --release -p grant-program-fuzz
//!
//! # Run with more iterations
//! PROPTEST_CASES=10000 cargo test --release -p grant-program-fuzz
//! ```

pub mod arbitrary;
pub mod invariants;
pub mod scenarios;

pub use arbitrary::*;
pub use invariants::*;
pub use scenarios::*;

// Include fuzz targets as test modules
#[cfg(test)]
#[path = "../fuzz_targets/claim_grant.rs"]
mod claim_grant_tests;

#[cfg(test)]
#[path = "../fuzz_targets/period_clock.rs"]
mod period_clock_tests;

#[cfg(test)]
#[path = "../fuzz_targets/pop_chain.rs"]
mod pop_chain_tests;
