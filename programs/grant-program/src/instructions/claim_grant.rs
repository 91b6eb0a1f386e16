//! Claim one period's allotment from an open (non-allowlisted) grant

use crate::errors::GrantError;
use crate::instructions::claim_helpers::{settle_claim, verify_and_record_pop_proof};
use crate::state::{
    ClaimReceipt, Grant, PopConfig, PopState, GRANT_SEED, POP_CONFIG_SEED, POP_STATE_SEED,
    RECEIPT_SEED, VAULT_SEED,
};
use anchor_lang::prelude::*;
use anchor_lang::solana_program::sysvar::instructions as instructions_sysvar;
use anchor_spl::token::{Mint, Token, TokenAccount};

/// Accounts for both claim instructions. The order is part of the client
/// wire contract.
#[derive(Accounts)]
#[instruction(period_index: u64)]
pub struct ClaimGrant<'info> {
    #[account(
        mut,
        seeds = [GRANT_SEED, grant.authority.as_ref(), grant.mint.as_ref(), &grant.grant_id.to_le_bytes()],
        bump = grant.bump,
        has_one = mint @ GrantError::MintMismatch,
        has_one = vault
    )]
    pub grant: Account<'info, Grant>,

    pub mint: Account<'info, Mint>,

    #[account(
        mut,
        seeds = [VAULT_SEED, grant.key().as_ref()],
        bump
    )]
    pub vault: Account<'info, TokenAccount>,

    #[account(mut)]
    pub claimer: Signer<'info>,

    #[account(
        mut,
        constraint = claimer_ata.mint == mint.key() @ GrantError::MintMismatch,
        constraint = claimer_ata.owner == claimer.key() @ GrantError::Unauthorized
    )]
    pub claimer_ata: Account<'info, TokenAccount>,

    /// `init` fails if this period was already paid to this claimer
    #[account(
        init,
        payer = claimer,
        space = ClaimReceipt::SIZE,
        seeds = [RECEIPT_SEED, grant.key().as_ref(), claimer.key().as_ref(), &period_index.to_le_bytes()],
        bump
    )]
    pub receipt: Account<'info, ClaimReceipt>,

    #[account(
        init_if_needed,
        payer = claimer,
        space = PopState::SIZE,
        seeds = [POP_STATE_SEED, grant.key().as_ref()],
        bump
    )]
    pub pop_state: Account<'info, PopState>,

    #[account(
        seeds = [POP_CONFIG_SEED, grant.authority.as_ref()],
        bump = pop_config.bump,
        constraint = pop_config.authority == grant.authority @ GrantError::InvalidPopConfigAuthority
    )]
    pub pop_config: Account<'info, PopConfig>,

    /// CHECK: address-constrained to the instructions sysvar
    #[account(address = instructions_sysvar::ID)]
    pub instructions_sysvar: UncheckedAccount<'info>,

    pub token_program: Program<'info, Token>,
    pub system_program: Program<'info, System>,
    pub rent: Sysvar<'info, Rent>,
}

pub fn handler(ctx: Context<ClaimGrant>, period_index: u64) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    let pop_state_bump = ctx.bumps.pop_state;
    let accounts = ctx.accounts;

    require!(!accounts.grant.paused, GrantError::Paused);
    require!(
        !accounts.grant.allowlist_enabled(),
        GrantError::AllowlistRequired
    );

    let message = verify_and_record_pop_proof(accounts, period_index, now, pop_state_bump)?;
    settle_claim(accounts, period_index, now, message.entry_hash)
}
