//! Instruction handlers for the recurring grant program

pub mod claim_helpers;
pub mod token_helpers;

pub mod claim_grant;
pub mod claim_grant_with_proof;
pub mod close_grant;
pub mod create_grant;
pub mod fund_grant;
pub mod set_allowlist_root;
pub mod set_paused;
pub mod upsert_pop_config;

#[allow(ambiguous_glob_reexports)]
pub use claim_grant::*;
#[allow(ambiguous_glob_reexports)]
pub use claim_grant_with_proof::*;
#[allow(ambiguous_glob_reexports)]
pub use close_grant::*;
#[allow(ambiguous_glob_reexports)]
pub use create_grant::*;
#[allow(ambiguous_glob_reexports)]
pub use fund_grant::*;
#[allow(ambiguous_glob_reexports)]
pub use set_allowlist_root::*;
#[allow(ambiguous_glob_reexports)]
pub use set_paused::*;
#[allow(ambiguous_glob_reexports)]
pub use upsert_pop_config::*;
