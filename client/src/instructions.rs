//! Instruction encoders for every grant program entry point
//!
//! Account lists come from the program's own `accounts` structs so their
//! order always matches the on-ledger `#[derive(Accounts)]` definitions.

use anchor_lang::solana_program::sysvar;
use anchor_lang::{system_program, InstructionData, ToAccountMetas};
use grant_program::{accounts, instruction};
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;

use crate::error::ClaimError;
use crate::pda::{associated_token_address, AddressDeriver, ClaimAddresses, GrantCoordinates};

fn program_instruction(
    program_id: Pubkey,
    accounts: impl ToAccountMetas,
    data: impl InstructionData,
) -> Instruction {
    Instruction {
        program_id,
        accounts: accounts.to_account_metas(None),
        data: data.data(),
    }
}

/// `claim_grant`, or `claim_grant_with_proof` when a Merkle proof is given.
pub fn claim(
    program_id: Pubkey,
    mint: Pubkey,
    claimer: Pubkey,
    addresses: &ClaimAddresses,
    period_index: u64,
    allowlist_proof: Option<Vec<[u8; 32]>>,
) -> Instruction {
    let accounts = accounts::ClaimGrant {
        grant: addresses.grant,
        mint,
        vault: addresses.vault,
        claimer,
        claimer_ata: addresses.claimer_token_account,
        receipt: addresses.receipt,
        pop_state: addresses.pop_state,
        pop_config: addresses.pop_config,
        instructions_sysvar: sysvar::instructions::ID,
        token_program: anchor_spl::token::ID,
        system_program: system_program::ID,
        rent: sysvar::rent::ID,
    };
    match allowlist_proof {
        None => program_instruction(program_id, accounts, instruction::ClaimGrant { period_index }),
        Some(proof) => program_instruction(
            program_id,
            accounts,
            instruction::ClaimGrantWithProof {
                period_index,
                proof,
            },
        ),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantTerms {
    pub amount_per_period: u64,
    pub period_seconds: i64,
    pub start_ts: i64,
    /// 0 = never
    pub expires_at: i64,
}

pub fn create_grant(
    deriver: &AddressDeriver,
    coordinates: &GrantCoordinates,
    terms: &GrantTerms,
) -> Result<Instruction, ClaimError> {
    let (grant, _) = deriver.grant_at(coordinates)?;
    let (vault, _) = deriver.vault(&grant)?;
    Ok(program_instruction(
        deriver.program_id(),
        accounts::CreateGrant {
            grant,
            mint: coordinates.mint,
            vault,
            authority: coordinates.authority,
            token_program: anchor_spl::token::ID,
            system_program: system_program::ID,
            rent: sysvar::rent::ID,
        },
        instruction::CreateGrant {
            grant_id: coordinates.grant_id,
            amount_per_period: terms.amount_per_period,
            period_seconds: terms.period_seconds,
            start_ts: terms.start_ts,
            expires_at: terms.expires_at,
        },
    ))
}

/// Top up a vault from the funder's associated token account.
pub fn fund_grant(
    deriver: &AddressDeriver,
    coordinates: &GrantCoordinates,
    funder: &Pubkey,
    amount: u64,
) -> Result<Instruction, ClaimError> {
    let (grant, _) = deriver.grant_at(coordinates)?;
    let (vault, _) = deriver.vault(&grant)?;
    Ok(program_instruction(
        deriver.program_id(),
        accounts::FundGrant {
            grant,
            mint: coordinates.mint,
            vault,
            from_ata: associated_token_address(funder, &coordinates.mint),
            funder: *funder,
            authority: coordinates.authority,
            token_program: anchor_spl::token::ID,
        },
        instruction::FundGrant { amount },
    ))
}

pub fn close_grant(
    deriver: &AddressDeriver,
    coordinates: &GrantCoordinates,
) -> Result<Instruction, ClaimError> {
    let (grant, _) = deriver.grant_at(coordinates)?;
    let (vault, _) = deriver.vault(&grant)?;
    Ok(program_instruction(
        deriver.program_id(),
        accounts::CloseGrant {
            grant,
            mint: coordinates.mint,
            vault,
            authority_ata: associated_token_address(&coordinates.authority, &coordinates.mint),
            authority: coordinates.authority,
            token_program: anchor_spl::token::ID,
        },
        instruction::CloseGrant {},
    ))
}

pub fn set_paused(
    deriver: &AddressDeriver,
    coordinates: &GrantCoordinates,
    paused: bool,
) -> Result<Instruction, ClaimError> {
    let (grant, _) = deriver.grant_at(coordinates)?;
    Ok(program_instruction(
        deriver.program_id(),
        accounts::SetPaused {
            grant,
            mint: coordinates.mint,
            authority: coordinates.authority,
        },
        instruction::SetPaused { paused },
    ))
}

pub fn set_allowlist_root(
    deriver: &AddressDeriver,
    coordinates: &GrantCoordinates,
    merkle_root: [u8; 32],
) -> Result<Instruction, ClaimError> {
    let (grant, _) = deriver.grant_at(coordinates)?;
    Ok(program_instruction(
        deriver.program_id(),
        accounts::SetAllowlistRoot {
            grant,
            mint: coordinates.mint,
            authority: coordinates.authority,
        },
        instruction::SetAllowlistRoot { merkle_root },
    ))
}

pub fn upsert_pop_config(
    deriver: &AddressDeriver,
    authority: &Pubkey,
    signer_pubkey: Pubkey,
) -> Result<Instruction, ClaimError> {
    let (pop_config, _) = deriver.pop_config(authority)?;
    Ok(program_instruction(
        deriver.program_id(),
        accounts::UpsertPopConfig {
            pop_config,
            authority: *authority,
            system_program: system_program::ID,
            rent: sysvar::rent::ID,
        },
        instruction::UpsertPopConfig { signer_pubkey },
    ))
}
