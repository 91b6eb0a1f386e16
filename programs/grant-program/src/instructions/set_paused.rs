//! Pause or resume claims on a grant

use crate::errors::GrantError;
use crate::events::GrantPauseChanged;
use crate::state::{Grant, GRANT_SEED};
use anchor_lang::prelude::*;
use anchor_spl::token::Mint;

#[derive(Accounts)]
pub struct SetPaused<'info> {
    #[account(
        mut,
        has_one = authority @ GrantError::Unauthorized,
        has_one = mint @ GrantError::MintMismatch,
        seeds = [GRANT_SEED, authority.key().as_ref(), mint.key().as_ref(), &grant.grant_id.to_le_bytes()],
        bump = grant.bump
    )]
    pub grant: Account<'info, Grant>,

    pub mint: Account<'info, Mint>,

    pub authority: Signer<'info>,
}

pub fn handler(ctx: Context<SetPaused>, paused: bool) -> Result<()> {
    let grant = &mut ctx.accounts.grant;
    grant.paused = paused;

    emit!(GrantPauseChanged {
        grant: grant.key(),
        paused,
        timestamp: Clock::get()?.unix_timestamp,
    });

    Ok(())
}
