#![forbid(unsafe_code)]
//! Off-ledger client for the recurring grant program.
//!
//! The claim pipeline resolves a grant, checks eligibility, obtains a signed
//! proof of participation, builds the claim transaction, has the claimer
//! sign it and then submits and confirms it. The organizer side creates the
//! funding token and grant and administers it afterwards.

pub mod allowlist;
pub mod authority;
pub mod claim;
pub mod client;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod instructions;
pub mod issuer;
pub mod ledger;
pub mod pda;
pub mod period;
pub mod pop;
pub mod signer;
pub mod submit;

pub use allowlist::AllowlistTree;
pub use authority::{HttpPopAuthority, LocalPopAuthority, PopAuthority};
pub use claim::{BuiltClaim, ClaimRequest, ClaimTransactionBuilder};
pub use client::{ClaimClient, ClaimOutcome, ClaimStatus};
pub use config::{BootstrapPolicy, ClientConfig, ConfigError, SubmitPolicy};
pub use eligibility::ClaimEligibilityChecker;
pub use error::{ClaimError, ErrorKind};
pub use issuer::{GrantIssuer, GrantParams, GrantSetup, TokenSetup};
pub use ledger::{LedgerRpc, SolanaLedger};
pub use pda::{AddressDeriver, ClaimAddresses, GrantCoordinates};
pub use period::PeriodClock;
pub use pop::{PopChainBuilder, PopChainHead, PopProof, PopVersion};
pub use signer::{ClaimSigner, RedirectBridge, RedirectSession};
pub use submit::{SubmitOutcome, TransactionSubmitter};
