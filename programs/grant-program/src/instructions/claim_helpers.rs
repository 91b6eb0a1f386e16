//! Checks and bookkeeping shared by `claim_grant` and `claim_grant_with_proof`

use crate::errors::GrantError;
use crate::events::{GrantClaimed, PopEntryRecorded};
use crate::instructions::claim_grant::ClaimGrant;
use crate::instructions::token_helpers::transfer_from_vault;
use crate::state::{ClaimReceipt, Grant, PopState, ZERO_HASH};
use crate::utils::ed25519::parse_single_inline;
use crate::utils::period::period_index_at;
use crate::utils::pop::{PopMessage, POP_MAX_SKEW_SECONDS, POP_MESSAGE_VERSION_V2};
use anchor_lang::prelude::*;
use solana_sdk_ids::ed25519_program;
use anchor_lang::solana_program::sysvar::instructions::{
    load_current_index_checked, load_instruction_at_checked,
};

/// Expiry, start and period index checks against the ledger clock.
///
/// The client supplies `period_index` because it is part of the receipt
/// seeds; it must equal the value recomputed here.
pub fn check_claim_timing(
    grant: &Grant,
    now: i64,
    period_index: u64,
) -> std::result::Result<(), GrantError> {
    if grant.has_expired(now) {
        return Err(GrantError::GrantExpired);
    }
    let expected = period_index_at(grant.start_ts, grant.period_seconds, now)?;
    if period_index != expected {
        return Err(GrantError::InvalidPeriodIndex);
    }
    Ok(())
}

/// Field checks on a parsed proof message that need no chain state.
pub fn check_pop_message(
    message: &PopMessage,
    grant: &Pubkey,
    claimer: &Pubkey,
    period_index: u64,
    now: i64,
) -> std::result::Result<(), GrantError> {
    let entry = &message.entry;
    if entry.grant != *grant {
        return Err(GrantError::PopProofGrantMismatch);
    }
    if entry.claimer != *claimer {
        return Err(GrantError::PopProofClaimerMismatch);
    }
    if entry.period_index != period_index {
        return Err(GrantError::PopProofPeriodMismatch);
    }
    if entry.version == POP_MESSAGE_VERSION_V2 && entry.audit_hash == ZERO_HASH {
        return Err(GrantError::PopAuditHashMissing);
    }
    message.verify_entry_hash()?;

    let skew = now
        .checked_sub(entry.issued_at)
        .and_then(i64::checked_abs)
        .ok_or(GrantError::ArithmeticOverflow)?;
    if skew > POP_MAX_SKEW_SECONDS {
        return Err(GrantError::PopProofExpired);
    }
    Ok(())
}

/// Continuity of the proof against the grant's chain head.
pub fn check_pop_chain(
    state: &PopState,
    grant: &Pubkey,
    message: &PopMessage,
) -> std::result::Result<(), GrantError> {
    let entry = &message.entry;
    if !state.initialized {
        if !entry.is_genesis() {
            return Err(GrantError::PopGenesisMismatch);
        }
        return Ok(());
    }
    if state.grant != *grant {
        return Err(GrantError::PopStateGrantMismatch);
    }
    if state.last_global_hash != entry.prev_hash {
        return Err(GrantError::PopHashChainBroken);
    }
    if state.last_stream_hash != entry.stream_prev_hash {
        return Err(GrantError::PopStreamChainBroken);
    }
    Ok(())
}

/// Move the chain head to the accepted entry.
pub fn advance_pop_state(
    state: &mut PopState,
    grant: Pubkey,
    message: &PopMessage,
    bump: u8,
) -> std::result::Result<(), GrantError> {
    if !state.initialized {
        state.grant = grant;
        state.bump = bump;
        state.initialized = true;
    }
    state.last_global_hash = message.entry_hash;
    state.last_stream_hash = message.entry_hash;
    state.last_period_index = message.entry.period_index;
    state.last_issued_at = message.entry.issued_at;
    state.entries = state
        .entries
        .checked_add(1)
        .ok_or(GrantError::ArithmeticOverflow)?;
    Ok(())
}

/// Read the signer and message from the ed25519 instruction immediately
/// preceding this one.
pub fn load_preceding_signature(instructions_sysvar: &AccountInfo) -> Result<(Pubkey, Vec<u8>)> {
    let current_index = load_current_index_checked(instructions_sysvar)
        .map_err(|_| error!(GrantError::MissingPopSignatureInstruction))?;
    require!(current_index > 0, GrantError::MissingPopSignatureInstruction);

    let signature_ix =
        load_instruction_at_checked(usize::from(current_index - 1), instructions_sysvar)
            .map_err(|_| error!(GrantError::MissingPopSignatureInstruction))?;
    require_keys_eq!(
        signature_ix.program_id,
        ed25519_program::ID,
        GrantError::InvalidPopSignatureProgram
    );

    Ok(parse_single_inline(&signature_ix.data)?)
}

/// Verify the attached proof and advance the chain head.
pub fn verify_and_record_pop_proof(
    accounts: &mut ClaimGrant,
    period_index: u64,
    now: i64,
    pop_state_bump: u8,
) -> Result<PopMessage> {
    let (signer, message_bytes) =
        load_preceding_signature(&accounts.instructions_sysvar.to_account_info())?;
    require_keys_eq!(
        signer,
        accounts.pop_config.signer_pubkey,
        GrantError::InvalidPopSigner
    );

    let message = PopMessage::parse(&message_bytes)?;
    let grant_key = accounts.grant.key();
    check_pop_message(
        &message,
        &grant_key,
        &accounts.claimer.key(),
        period_index,
        now,
    )?;
    check_pop_chain(&accounts.pop_state, &grant_key, &message)?;
    advance_pop_state(&mut accounts.pop_state, grant_key, &message, pop_state_bump)?;

    emit!(PopEntryRecorded {
        grant: grant_key,
        claimer: message.entry.claimer,
        version: message.entry.version,
        prev_hash: message.entry.prev_hash,
        stream_prev_hash: message.entry.stream_prev_hash,
        audit_hash: message.entry.audit_hash,
        entry_hash: message.entry_hash,
        period_index: message.entry.period_index,
        issued_at: message.entry.issued_at,
    });

    Ok(message)
}

/// Pay the period's allotment and write the receipt. The receipt account was
/// created with `init` in the same instruction, so a repeat for this period
/// never reaches here.
pub fn settle_claim(
    accounts: &mut ClaimGrant,
    period_index: u64,
    now: i64,
    entry_hash: [u8; 32],
) -> Result<()> {
    check_claim_timing(&accounts.grant, now, period_index)?;

    let amount = accounts.grant.amount_per_period;
    transfer_from_vault(
        &accounts.grant,
        &accounts.vault,
        &accounts.mint,
        &accounts.claimer_ata.to_account_info(),
        &accounts.token_program,
        amount,
    )?;

    let grant_key = accounts.grant.key();
    let claimer_key = accounts.claimer.key();
    record_receipt(
        &mut accounts.receipt,
        grant_key,
        claimer_key,
        period_index,
        amount,
        now,
        entry_hash,
    );

    msg!(
        "grant {} paid period {} to {}",
        grant_key,
        period_index,
        claimer_key
    );
    emit!(GrantClaimed {
        grant: grant_key,
        claimer: claimer_key,
        period_index,
        amount,
        entry_hash,
        timestamp: now,
    });

    Ok(())
}

pub fn record_receipt(
    receipt: &mut ClaimReceipt,
    grant: Pubkey,
    claimer: Pubkey,
    period_index: u64,
    amount: u64,
    claimed_at: i64,
    entry_hash: [u8; 32],
) {
    receipt.grant = grant;
    receipt.claimer = claimer;
    receipt.period_index = period_index;
    receipt.amount = amount;
    receipt.claimed_at = claimed_at;
    receipt.entry_hash = entry_hash;
}
