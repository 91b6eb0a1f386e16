//! Set or clear a grant's allowlist Merkle root

use crate::errors::GrantError;
use crate::events::AllowlistRootUpdated;
use crate::state::{Grant, GRANT_SEED};
use anchor_lang::prelude::*;
use anchor_spl::token::Mint;

#[derive(Accounts)]
pub struct SetAllowlistRoot<'info> {
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

/// An all-zero root disables the allowlist.
pub fn handler(ctx: Context<SetAllowlistRoot>, merkle_root: [u8; 32]) -> Result<()> {
    let grant = &mut ctx.accounts.grant;
    grant.merkle_root = merkle_root;

    msg!(
        "allowlist {} for grant {}",
        if grant.allowlist_enabled() { "enabled" } else { "disabled" },
        grant.key()
    );
    emit!(AllowlistRootUpdated {
        grant: grant.key(),
        merkle_root,
        timestamp: Clock::get()?.unix_timestamp,
    });

    Ok(())
}
