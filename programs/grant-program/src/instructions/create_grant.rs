//! Create a grant and its program-owned vault

use crate::errors::GrantError;
use crate::events::GrantCreated;
use crate::state::{Grant, GRANT_SEED, MAX_START_LEAD_SECONDS, VAULT_SEED};
use anchor_lang::prelude::*;
use anchor_spl::token::{Mint, Token, TokenAccount};

#[derive(Accounts)]
#[instruction(grant_id: u64)]
pub struct CreateGrant<'info> {
    #[account(
        init_if_needed,
        payer = authority,
        space = Grant::SIZE,
        seeds = [GRANT_SEED, authority.key().as_ref(), mint.key().as_ref(), &grant_id.to_le_bytes()],
        bump
    )]
    pub grant: Account<'info, Grant>,

    pub mint: Account<'info, Mint>,

    /// Vault token account; its token authority is the grant PDA
    #[account(
        init_if_needed,
        payer = authority,
        token::mint = mint,
        token::authority = grant,
        seeds = [VAULT_SEED, grant.key().as_ref()],
        bump
    )]
    pub vault: Account<'info, TokenAccount>,

    #[account(mut)]
    pub authority: Signer<'info>,

    pub token_program: Program<'info, Token>,
    pub system_program: Program<'info, System>,
    pub rent: Sysvar<'info, Rent>,
}

/// Validate grant parameters against the ledger clock.
pub fn validate_grant_params(
    amount_per_period: u64,
    period_seconds: i64,
    start_ts: i64,
    expires_at: i64,
    now: i64,
) -> std::result::Result<(), GrantError> {
    if amount_per_period == 0 {
        return Err(GrantError::InvalidAmount);
    }
    if period_seconds <= 0 {
        return Err(GrantError::InvalidPeriod);
    }
    let latest_start = now
        .checked_add(MAX_START_LEAD_SECONDS)
        .ok_or(GrantError::ArithmeticOverflow)?;
    if start_ts > latest_start {
        return Err(GrantError::InvalidStartTs);
    }
    if expires_at != 0 && expires_at <= start_ts {
        return Err(GrantError::InvalidExpiry);
    }
    Ok(())
}

/// A grant account is live once its vault is recorded; it is never
/// re-created over.
pub fn ensure_uninitialized(grant: &Grant) -> std::result::Result<(), GrantError> {
    if grant.vault != Pubkey::default() {
        return Err(GrantError::GrantAlreadyInitialized);
    }
    Ok(())
}

pub fn handler(
    ctx: Context<CreateGrant>,
    grant_id: u64,
    amount_per_period: u64,
    period_seconds: i64,
    start_ts: i64,
    expires_at: i64,
) -> Result<()> {
    let clock = Clock::get()?;
    validate_grant_params(
        amount_per_period,
        period_seconds,
        start_ts,
        expires_at,
        clock.unix_timestamp,
    )?;

    let grant = &mut ctx.accounts.grant;
    ensure_uninitialized(grant)?;

    grant.authority = ctx.accounts.authority.key();
    grant.mint = ctx.accounts.mint.key();
    grant.vault = ctx.accounts.vault.key();
    grant.grant_id = grant_id;
    grant.amount_per_period = amount_per_period;
    grant.period_seconds = period_seconds;
    grant.start_ts = start_ts;
    grant.expires_at = expires_at;
    grant.merkle_root = [0u8; 32];
    grant.paused = false;
    grant.bump = ctx.bumps.grant;

    emit!(GrantCreated {
        grant: grant.key(),
        authority: grant.authority,
        mint: grant.mint,
        grant_id,
        amount_per_period,
        period_seconds,
        start_ts,
        expires_at,
        timestamp: clock.unix_timestamp,
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_valid_params() {
        assert!(validate_grant_params(1_000, 60, NOW - 5, 0, NOW).is_ok());
        assert!(validate_grant_params(1, 1, NOW + MAX_START_LEAD_SECONDS, 0, NOW).is_ok());
    }

    #[test]
    fn test_zero_amount_rejected() {
        assert!(matches!(
            validate_grant_params(0, 60, NOW, 0, NOW),
            Err(GrantError::InvalidAmount)
        ));
    }

    #[test]
    fn test_non_positive_period_rejected() {
        assert!(matches!(
            validate_grant_params(1, 0, NOW, 0, NOW),
            Err(GrantError::InvalidPeriod)
        ));
        assert!(matches!(
            validate_grant_params(1, -60, NOW, 0, NOW),
            Err(GrantError::InvalidPeriod)
        ));
    }

    #[test]
    fn test_far_future_start_rejected() {
        assert!(matches!(
            validate_grant_params(1, 60, NOW + MAX_START_LEAD_SECONDS + 1, 0, NOW),
            Err(GrantError::InvalidStartTs)
        ));
    }

    #[test]
    fn test_live_grant_cannot_be_recreated() {
        assert!(ensure_uninitialized(&Grant::default()).is_ok());
        let live = Grant {
            vault: Pubkey::new_unique(),
            amount_per_period: 1_000,
            ..Grant::default()
        };
        assert!(matches!(
            ensure_uninitialized(&live),
            Err(GrantError::GrantAlreadyInitialized)
        ));
    }

    #[test]
    fn test_expiry_must_follow_start() {
        assert!(matches!(
            validate_grant_params(1, 60, NOW, NOW, NOW),
            Err(GrantError::InvalidExpiry)
        ));
        assert!(validate_grant_params(1, 60, NOW, NOW + 1, NOW).is_ok());
    }
}
