//! Set or rotate the trusted PoP signer for every grant of an authority

use crate::events::PopConfigUpdated;
use crate::state::{PopConfig, POP_CONFIG_SEED};
use anchor_lang::prelude::*;

#[derive(Accounts)]
pub struct UpsertPopConfig<'info> {
    #[account(
        init_if_needed,
        payer = authority,
        space = PopConfig::SIZE,
        seeds = [POP_CONFIG_SEED, authority.key().as_ref()],
        bump
    )]
    pub pop_config: Account<'info, PopConfig>,

    #[account(mut)]
    pub authority: Signer<'info>,

    pub system_program: Program<'info, System>,
    pub rent: Sysvar<'info, Rent>,
}

pub fn handler(ctx: Context<UpsertPopConfig>, signer_pubkey: Pubkey) -> Result<()> {
    let pop_config = &mut ctx.accounts.pop_config;
    pop_config.authority = ctx.accounts.authority.key();
    pop_config.signer_pubkey = signer_pubkey;
    pop_config.bump = ctx.bumps.pop_config;

    emit!(PopConfigUpdated {
        authority: pop_config.authority,
        signer_pubkey,
        timestamp: Clock::get()?.unix_timestamp,
    });

    Ok(())
}
