//! SPL token CPIs signed by the grant PDA.
//!
//! The vault's token authority is the grant account itself, so every outflow
//! signs with `["grant", authority, mint, grant_id, bump]`.

use crate::errors::GrantError;
use crate::state::{Grant, GRANT_SEED};
use anchor_lang::prelude::*;
use anchor_spl::token::{self, CloseAccount, Mint, Token, TokenAccount, TransferChecked};

/// Move `amount` from the vault to `destination`.
///
/// Fails with `InsufficientFunds` before any CPI when the vault is short, so
/// a claim never partially pays.
pub fn transfer_from_vault<'info>(
    grant: &Account<'info, Grant>,
    vault: &Account<'info, TokenAccount>,
    mint: &Account<'info, Mint>,
    destination: &AccountInfo<'info>,
    token_program: &Program<'info, Token>,
    amount: u64,
) -> Result<()> {
    require!(vault.amount >= amount, GrantError::InsufficientFunds);
    if amount == 0 {
        return Ok(());
    }

    let grant_id_bytes = grant.grant_id.to_le_bytes();
    let bump = [grant.bump];
    let grant_seeds: &[&[u8]] = &[
        GRANT_SEED,
        grant.authority.as_ref(),
        grant.mint.as_ref(),
        &grant_id_bytes,
        &bump,
    ];
    let signer_seeds: &[&[&[u8]]] = &[grant_seeds];

    token::transfer_checked(
        CpiContext::new_with_signer(
            token_program.to_account_info(),
            TransferChecked {
                from: vault.to_account_info(),
                mint: mint.to_account_info(),
                to: destination.clone(),
                authority: grant.to_account_info(),
            },
            signer_seeds,
        ),
        amount,
        mint.decimals,
    )
    .map_err(|_| GrantError::TokenTransferFailed)?;

    Ok(())
}

/// Close the (empty) vault, returning its rent to `rent_recipient`.
pub fn close_vault<'info>(
    grant: &Account<'info, Grant>,
    vault: &Account<'info, TokenAccount>,
    rent_recipient: &AccountInfo<'info>,
    token_program: &Program<'info, Token>,
) -> Result<()> {
    let grant_id_bytes = grant.grant_id.to_le_bytes();
    let bump = [grant.bump];
    let grant_seeds: &[&[u8]] = &[
        GRANT_SEED,
        grant.authority.as_ref(),
        grant.mint.as_ref(),
        &grant_id_bytes,
        &bump,
    ];
    let signer_seeds: &[&[&[u8]]] = &[grant_seeds];

    token::close_account(CpiContext::new_with_signer(
        token_program.to_account_info(),
        CloseAccount {
            account: vault.to_account_info(),
            destination: rent_recipient.clone(),
            authority: grant.to_account_info(),
        },
        signer_seeds,
    ))
    .map_err(|_| GrantError::TokenTransferFailed)?;

    Ok(())
}
