//! Proof-of-participation entry hashing and the signed wire message
//!
//! Two layouts are live at the same time:
//!
//! | version | entry hash input                                   | message length |
//! |---------|----------------------------------------------------|----------------|
//! | 1       | tag, prev, stream_prev, grant, claimer, period, at | 177 bytes      |
//! | 2       | tag, prev, stream_prev, audit, grant, ...          | 209 bytes      |
//!
//! Integers are little-endian. The message carries the entry hash so a
//! verifier can recompute it from the other fields and compare.

use crate::errors::GrantError;
use crate::state::{HASH_SIZE, ZERO_HASH};
use anchor_lang::prelude::*;
use solana_sha256_hasher::hashv;

pub const POP_MESSAGE_VERSION_V1: u8 = 1;
pub const POP_MESSAGE_VERSION_V2: u8 = 2;

pub const POP_MESSAGE_LEN_V1: usize = 1 + 32 + 32 + 8 + 32 + 32 + 32 + 8;
pub const POP_MESSAGE_LEN_V2: usize = POP_MESSAGE_LEN_V1 + 32;

/// Accepted distance between `issued_at` and the ledger clock
pub const POP_MAX_SKEW_SECONDS: i64 = 600;

const POP_DOMAIN_V1: &[u8] = b"we-ne:pop:v1";
const POP_DOMAIN_V2: &[u8] = b"we-ne:pop:v2";

pub type PopHash = [u8; HASH_SIZE];

/// Fields hashed into one link of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopEntry {
    pub version: u8,
    pub prev_hash: PopHash,
    pub stream_prev_hash: PopHash,
    /// Zero for version 1
    pub audit_hash: PopHash,
    pub grant: Pubkey,
    pub claimer: Pubkey,
    pub period_index: u64,
    pub issued_at: i64,
}

impl PopEntry {
    pub fn hash(&self) -> std::result::Result<PopHash, GrantError> {
        let period_bytes = self.period_index.to_le_bytes();
        let issued_at_bytes = self.issued_at.to_le_bytes();
        let digest = match self.version {
            POP_MESSAGE_VERSION_V1 => hashv(&[
                POP_DOMAIN_V1,
                self.prev_hash.as_ref(),
                self.stream_prev_hash.as_ref(),
                self.grant.as_ref(),
                self.claimer.as_ref(),
                period_bytes.as_ref(),
                issued_at_bytes.as_ref(),
            ]),
            POP_MESSAGE_VERSION_V2 => hashv(&[
                POP_DOMAIN_V2,
                self.prev_hash.as_ref(),
                self.stream_prev_hash.as_ref(),
                self.audit_hash.as_ref(),
                self.grant.as_ref(),
                self.claimer.as_ref(),
                period_bytes.as_ref(),
                issued_at_bytes.as_ref(),
            ]),
            _ => return Err(GrantError::InvalidPopMessageVersion),
        };
        Ok(digest.to_bytes())
    }

    pub fn is_genesis(&self) -> bool {
        self.prev_hash == ZERO_HASH && self.stream_prev_hash == ZERO_HASH
    }
}

/// Byte length of a message of the given version.
pub fn message_len(version: u8) -> std::result::Result<usize, GrantError> {
    match version {
        POP_MESSAGE_VERSION_V1 => Ok(POP_MESSAGE_LEN_V1),
        POP_MESSAGE_VERSION_V2 => Ok(POP_MESSAGE_LEN_V2),
        _ => Err(GrantError::InvalidPopMessageVersion),
    }
}

/// The byte sequence the trusted signer signs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopMessage {
    pub entry: PopEntry,
    pub entry_hash: PopHash,
}

impl PopMessage {
    /// Build a message whose entry hash is computed from `entry`.
    pub fn seal(entry: PopEntry) -> std::result::Result<Self, GrantError> {
        let entry_hash = entry.hash()?;
        Ok(Self { entry, entry_hash })
    }

    /// Parse and length-check a message. The version byte is checked first
    /// so an unknown version never falls through to a v1 layout.
    pub fn parse(message: &[u8]) -> std::result::Result<Self, GrantError> {
        let version = *message.first().ok_or(GrantError::InvalidPopMessageLength)?;
        if message.len() != message_len(version)? {
            return Err(GrantError::InvalidPopMessageLength);
        }

        let mut reader = Reader::new(&message[1..]);
        let grant = Pubkey::new_from_array(reader.array()?);
        let claimer = Pubkey::new_from_array(reader.array()?);
        let period_index = u64::from_le_bytes(reader.array()?);
        let prev_hash = reader.array()?;
        let stream_prev_hash = reader.array()?;
        let audit_hash = if version == POP_MESSAGE_VERSION_V2 {
            reader.array()?
        } else {
            ZERO_HASH
        };
        let entry_hash = reader.array()?;
        let issued_at = i64::from_le_bytes(reader.array()?);

        Ok(Self {
            entry: PopEntry {
                version,
                prev_hash,
                stream_prev_hash,
                audit_hash,
                grant,
                claimer,
                period_index,
                issued_at,
            },
            entry_hash,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let entry = &self.entry;
        let len = message_len(entry.version).unwrap_or(POP_MESSAGE_LEN_V2);
        let mut out = Vec::with_capacity(len);
        out.push(entry.version);
        out.extend_from_slice(entry.grant.as_ref());
        out.extend_from_slice(entry.claimer.as_ref());
        out.extend_from_slice(&entry.period_index.to_le_bytes());
        out.extend_from_slice(&entry.prev_hash);
        out.extend_from_slice(&entry.stream_prev_hash);
        if entry.version == POP_MESSAGE_VERSION_V2 {
            out.extend_from_slice(&entry.audit_hash);
        }
        out.extend_from_slice(&self.entry_hash);
        out.extend_from_slice(&entry.issued_at.to_le_bytes());
        out
    }

    /// Recompute the entry hash from the carried fields.
    pub fn verify_entry_hash(&self) -> std::result::Result<(), GrantError> {
        if self.entry.hash()? != self.entry_hash {
            return Err(GrantError::PopEntryHashMismatch);
        }
        Ok(())
    }
}

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn array<const N: usize>(&mut self) -> std::result::Result<[u8; N], GrantError> {
        let end = self
            .offset
            .checked_add(N)
            .ok_or(GrantError::ArithmeticOverflow)?;
        let out: [u8; N] = self
            .data
            .get(self.offset..end)
            .and_then(|slice| slice.try_into().ok())
            .ok_or(GrantError::InvalidPopMessageLength)?;
        self.offset = end;
        Ok(out)
    }
}
