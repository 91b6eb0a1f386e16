//! Ed25519 precompile instruction layout
//!
//! Only the single-signature form with every field inline (instruction
//! indices set to `u16::MAX`) is accepted. The claim instruction reads the
//! verified signer and message back out of the preceding instruction; the
//! precompile itself already rejected a bad signature before we run.

use crate::errors::GrantError;
use anchor_lang::prelude::*;

pub const SIGNATURE_LEN: usize = 64;
pub const PUBKEY_LEN: usize = 32;

/// num_signatures(1) + padding(1) + seven u16 offsets
pub const HEADER_LEN: usize = 16;
pub const PUBKEY_OFFSET: usize = HEADER_LEN;
pub const SIGNATURE_OFFSET: usize = PUBKEY_OFFSET + PUBKEY_LEN;
pub const MESSAGE_OFFSET: usize = SIGNATURE_OFFSET + SIGNATURE_LEN;

/// Instruction index meaning "this instruction"
pub const INLINE_INDEX: u16 = u16::MAX;

/// Encode precompile data for one inline signature.
pub fn encode_single_inline(
    signer: &Pubkey,
    signature: &[u8; SIGNATURE_LEN],
    message: &[u8],
) -> std::result::Result<Vec<u8>, GrantError> {
    let message_size =
        u16::try_from(message.len()).map_err(|_| GrantError::InvalidPopSignatureData)?;
    if MESSAGE_OFFSET + message.len() > u16::MAX as usize {
        return Err(GrantError::InvalidPopSignatureData);
    }

    let mut data = Vec::with_capacity(MESSAGE_OFFSET + message.len());
    data.push(1u8);
    data.push(0u8);
    for field in [
        SIGNATURE_OFFSET as u16,
        INLINE_INDEX,
        PUBKEY_OFFSET as u16,
        INLINE_INDEX,
        MESSAGE_OFFSET as u16,
        message_size,
        INLINE_INDEX,
    ] {
        data.extend_from_slice(&field.to_le_bytes());
    }
    data.extend_from_slice(signer.as_ref());
    data.extend_from_slice(signature);
    data.extend_from_slice(message);
    Ok(data)
}

/// Extract (signer, message) from single-signature inline precompile data.
pub fn parse_single_inline(data: &[u8]) -> std::result::Result<(Pubkey, Vec<u8>), GrantError> {
    if data.len() < HEADER_LEN || data[0] != 1 {
        return Err(GrantError::InvalidPopSignatureData);
    }

    let signature_offset = read_u16(data, 2)? as usize;
    let signature_ix = read_u16(data, 4)?;
    let pubkey_offset = read_u16(data, 6)? as usize;
    let pubkey_ix = read_u16(data, 8)?;
    let message_offset = read_u16(data, 10)? as usize;
    let message_size = read_u16(data, 12)? as usize;
    let message_ix = read_u16(data, 14)?;

    if signature_ix != INLINE_INDEX || pubkey_ix != INLINE_INDEX || message_ix != INLINE_INDEX {
        return Err(GrantError::InvalidPopSignatureData);
    }

    let _signature = slice(data, signature_offset, SIGNATURE_LEN)?;
    let pubkey: [u8; PUBKEY_LEN] = slice(data, pubkey_offset, PUBKEY_LEN)?
        .try_into()
        .map_err(|_| GrantError::InvalidPopSignatureData)?;
    let message = slice(data, message_offset, message_size)?.to_vec();

    Ok((Pubkey::new_from_array(pubkey), message))
}

fn read_u16(data: &[u8], offset: usize) -> std::result::Result<u16, GrantError> {
    let bytes: [u8; 2] = slice(data, offset, 2)?
        .try_into()
        .map_err(|_| GrantError::InvalidPopSignatureData)?;
    Ok(u16::from_le_bytes(bytes))
}

fn slice(data: &[u8], offset: usize, len: usize) -> std::result::Result<&[u8], GrantError> {
    let end = offset
        .checked_add(len)
        .ok_or(GrantError::ArithmeticOverflow)?;
    data.get(offset..end)
        .ok_or(GrantError::InvalidPopSignatureData)
}
