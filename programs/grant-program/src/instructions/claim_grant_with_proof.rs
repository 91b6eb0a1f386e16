//! Claim from a grant gated by a Merkle allowlist

use crate::errors::GrantError;
use crate::instructions::claim_grant::ClaimGrant;
use crate::instructions::claim_helpers::{settle_claim, verify_and_record_pop_proof};
use crate::utils::allowlist::{allowlist_leaf, verify_merkle_sorted, MAX_PROOF_LEN};
use anchor_lang::prelude::*;

pub fn handler(ctx: Context<ClaimGrant>, period_index: u64, proof: Vec<[u8; 32]>) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    let pop_state_bump = ctx.bumps.pop_state;
    let accounts = ctx.accounts;

    require!(!accounts.grant.paused, GrantError::Paused);
    require!(
        accounts.grant.allowlist_enabled(),
        GrantError::AllowlistNotEnabled
    );
    require!(
        proof.len() <= MAX_PROOF_LEN,
        GrantError::AllowlistProofTooLong
    );

    let leaf = allowlist_leaf(&accounts.claimer.key());
    require!(
        verify_merkle_sorted(&accounts.grant.merkle_root, leaf, &proof),
        GrantError::NotInAllowlist
    );

    let message = verify_and_record_pop_proof(accounts, period_index, now, pop_state_bump)?;
    settle_claim(accounts, period_index, now, message.entry_hash)
}
