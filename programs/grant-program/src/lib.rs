#![allow(unexpected_cfgs)]
//! Recurring Grant Program
//!
//! An organizer funds a vault; each eligible claimer withdraws one allotment
//! per period. Every claim carries an ed25519-signed proof of participation
//! that extends a per-grant hash chain, and a receipt account created in the
//! same instruction makes a second claim for the same period impossible.

use anchor_lang::prelude::*;

declare_id!("Gr4ntPxYq8c2mS5vR9dK7wLh3tJ6nB1eF8aZ4uQyVhMo");

pub mod errors;
pub mod events;
pub mod instructions;
pub mod state;
pub mod utils;

use instructions::*;

#[program]
pub mod grant_program {
    use super::*;

    /// Create a grant and its vault.
    ///
    /// # Arguments
    /// * `grant_id` - Caller-chosen id, part of the grant address
    /// * `amount_per_period` - Base units paid per claim
    /// * `period_seconds` - Period length (> 0)
    /// * `start_ts` - Origin of period arithmetic, at most 365 days ahead
    /// * `expires_at` - Expiry timestamp (0 = never)
    pub fn create_grant(
        ctx: Context<CreateGrant>,
        grant_id: u64,
        amount_per_period: u64,
        period_seconds: i64,
        start_ts: i64,
        expires_at: i64,
    ) -> Result<()> {
        instructions::create_grant::handler(
            ctx,
            grant_id,
            amount_per_period,
            period_seconds,
            start_ts,
            expires_at,
        )
    }

    /// Deposit tokens into the vault. Can be called repeatedly.
    pub fn fund_grant(ctx: Context<FundGrant>, amount: u64) -> Result<()> {
        instructions::fund_grant::handler(ctx, amount)
    }

    /// Claim the current period's allotment.
    /// Must be preceded by an ed25519 instruction carrying the PoP proof.
    pub fn claim_grant(ctx: Context<ClaimGrant>, period_index: u64) -> Result<()> {
        instructions::claim_grant::handler(ctx, period_index)
    }

    /// Claim from an allowlisted grant with a sorted-pair Merkle proof.
    pub fn claim_grant_with_proof(
        ctx: Context<ClaimGrant>,
        period_index: u64,
        proof: Vec<[u8; 32]>,
    ) -> Result<()> {
        instructions::claim_grant_with_proof::handler(ctx, period_index, proof)
    }

    /// Refund the vault to the authority and close both accounts.
    pub fn close_grant(ctx: Context<CloseGrant>) -> Result<()> {
        instructions::close_grant::handler(ctx)
    }

    pub fn set_paused(ctx: Context<SetPaused>, paused: bool) -> Result<()> {
        instructions::set_paused::handler(ctx, paused)
    }

    /// Set the allowlist root; all zeros disables the allowlist.
    pub fn set_allowlist_root(ctx: Context<SetAllowlistRoot>, merkle_root: [u8; 32]) -> Result<()> {
        instructions::set_allowlist_root::handler(ctx, merkle_root)
    }

    /// Create or rotate the authority's trusted PoP signer.
    pub fn upsert_pop_config(ctx: Context<UpsertPopConfig>, signer_pubkey: Pubkey) -> Result<()> {
        instructions::upsert_pop_config::handler(ctx, signer_pubkey)
    }
}
