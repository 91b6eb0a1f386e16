//! Close a grant: refund the vault to the authority and reclaim rent

use crate::errors::GrantError;
use crate::events::GrantClosed;
use crate::instructions::token_helpers::{close_vault, transfer_from_vault};
use crate::state::{Grant, GRANT_SEED, VAULT_SEED};
use anchor_lang::prelude::*;
use anchor_spl::token::{Mint, Token, TokenAccount};

#[derive(Accounts)]
pub struct CloseGrant<'info> {
    #[account(
        mut,
        has_one = authority @ GrantError::Unauthorized,
        has_one = mint @ GrantError::MintMismatch,
        has_one = vault,
        close = authority,
        seeds = [GRANT_SEED, authority.key().as_ref(), mint.key().as_ref(), &grant.grant_id.to_le_bytes()],
        bump = grant.bump
    )]
    pub grant: Account<'info, Grant>,

    pub mint: Account<'info, Mint>,

    #[account(
        mut,
        seeds = [VAULT_SEED, grant.key().as_ref()],
        bump
    )]
    pub vault: Account<'info, TokenAccount>,

    #[account(
        mut,
        constraint = authority_ata.mint == mint.key() @ GrantError::MintMismatch,
        constraint = authority_ata.owner == authority.key() @ GrantError::Unauthorized
    )]
    pub authority_ata: Account<'info, TokenAccount>,

    #[account(mut)]
    pub authority: Signer<'info>,

    pub token_program: Program<'info, Token>,
}

pub fn handler(ctx: Context<CloseGrant>) -> Result<()> {
    let accounts = ctx.accounts;
    let refunded = accounts.vault.amount;

    transfer_from_vault(
        &accounts.grant,
        &accounts.vault,
        &accounts.mint,
        &accounts.authority_ata.to_account_info(),
        &accounts.token_program,
        refunded,
    )?;
    close_vault(
        &accounts.grant,
        &accounts.vault,
        &accounts.authority.to_account_info(),
        &accounts.token_program,
    )?;

    let clock = Clock::get()?;
    emit!(GrantClosed {
        grant: accounts.grant.key(),
        authority: accounts.authority.key(),
        refunded,
        timestamp: clock.unix_timestamp,
    });

    Ok(())
}
