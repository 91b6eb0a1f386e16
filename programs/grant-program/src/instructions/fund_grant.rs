//! Deposit tokens into a grant vault (initial funding or top-up)

use crate::errors::GrantError;
use crate::events::GrantFunded;
use crate::state::{Grant, GRANT_SEED, VAULT_SEED};
use anchor_lang::prelude::*;
use anchor_spl::token::{self, Mint, Token, TokenAccount, TransferChecked};

#[derive(Accounts)]
pub struct FundGrant<'info> {
    #[account(
        mut,
        has_one = authority,
        has_one = mint @ GrantError::MintMismatch,
        has_one = vault,
        seeds = [GRANT_SEED, authority.key().as_ref(), mint.key().as_ref(), &grant.grant_id.to_le_bytes()],
        bump = grant.bump
    )]
    pub grant: Account<'info, Grant>,

    pub mint: Account<'info, Mint>,

    #[account(
        mut,
        seeds = [VAULT_SEED, grant.key().as_ref()],
        bump,
        constraint = vault.mint == mint.key() @ GrantError::MintMismatch
    )]
    pub vault: Account<'info, TokenAccount>,

    #[account(
        mut,
        constraint = from_ata.mint == mint.key() @ GrantError::MintMismatch,
        constraint = from_ata.owner == funder.key() @ GrantError::Unauthorized
    )]
    pub from_ata: Account<'info, TokenAccount>,

    #[account(mut)]
    pub funder: Signer<'info>,

    /// CHECK: only compared against `grant.authority`
    pub authority: UncheckedAccount<'info>,

    pub token_program: Program<'info, Token>,
}

pub fn handler(ctx: Context<FundGrant>, amount: u64) -> Result<()> {
    require!(amount > 0, GrantError::InvalidAmount);

    token::transfer_checked(
        CpiContext::new(
            ctx.accounts.token_program.to_account_info(),
            TransferChecked {
                from: ctx.accounts.from_ata.to_account_info(),
                mint: ctx.accounts.mint.to_account_info(),
                to: ctx.accounts.vault.to_account_info(),
                authority: ctx.accounts.funder.to_account_info(),
            },
        ),
        amount,
        ctx.accounts.mint.decimals,
    )
    .map_err(|_| GrantError::TokenTransferFailed)?;

    ctx.accounts.vault.reload()?;
    let clock = Clock::get()?;

    emit!(GrantFunded {
        grant: ctx.accounts.grant.key(),
        funder: ctx.accounts.funder.key(),
        amount,
        vault_balance: ctx.accounts.vault.amount,
        timestamp: clock.unix_timestamp,
    });

    Ok(())
}
