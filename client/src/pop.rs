//! Proof-of-participation proofs: building chain entries, decoding the
//! authority's response and turning a proof into the ed25519 instruction.

use std::str::FromStr;

use solana_sdk::ed25519_program;
use solana_sdk::hash::hashv;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use grant_program::instructions::claim_helpers::check_pop_message;
use grant_program::state::{PopState, ZERO_HASH};
use grant_program::utils::ed25519::{encode_single_inline, SIGNATURE_LEN};
use grant_program::utils::pop::{
    PopEntry, PopHash, PopMessage, POP_MESSAGE_VERSION_V1, POP_MESSAGE_VERSION_V2,
};
use serde::{Deserialize, Serialize};
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;

use crate::error::ClaimError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PopVersion {
    V1,
    V2,
}

impl TryFrom<u8> for PopVersion {
    type Error = ClaimError;

    fn try_from(version: u8) -> Result<Self, Self::Error> {
        match version {
            POP_MESSAGE_VERSION_V1 => Ok(PopVersion::V1),
            POP_MESSAGE_VERSION_V2 => Ok(PopVersion::V2),
            version => Err(ClaimError::UnsupportedPopVersion { version }),
        }
    }
}

impl From<PopVersion> for u8 {
    fn from(version: PopVersion) -> u8 {
        match version {
            PopVersion::V1 => POP_MESSAGE_VERSION_V1,
            PopVersion::V2 => POP_MESSAGE_VERSION_V2,
        }
    }
}

/// Current head of a grant's chain, as the next entry must reference it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PopChainHead {
    pub prev_hash: PopHash,
    pub stream_prev_hash: PopHash,
}

impl PopChainHead {
    pub fn genesis() -> Self {
        Self::default()
    }

    /// An uninitialized state means the next entry is the genesis entry.
    pub fn from_state(state: &PopState) -> Self {
        if !state.initialized {
            return Self::genesis();
        }
        Self {
            prev_hash: state.last_global_hash,
            stream_prev_hash: state.last_stream_hash,
        }
    }
}

/// Audit digest binding a v2 entry to the event it attests.
pub fn audit_hash(event_id: &str, grant: &Pubkey, claimer: &Pubkey, period_index: u64) -> PopHash {
    hashv(&[
        b"grant-pop:audit",
        event_id.as_bytes(),
        grant.as_ref(),
        claimer.as_ref(),
        &period_index.to_le_bytes(),
    ])
    .to_bytes()
}

/// Builds sealed chain entries for one message version.
#[derive(Debug, Clone, Copy)]
pub struct PopChainBuilder {
    version: PopVersion,
}

impl PopChainBuilder {
    pub fn new(version: PopVersion) -> Self {
        Self { version }
    }

    pub fn version(&self) -> PopVersion {
        self.version
    }

    /// Seal the entry that extends `head`. `audit` is ignored for v1 and
    /// defaults to zero when absent.
    pub fn build(
        &self,
        head: PopChainHead,
        grant: Pubkey,
        claimer: Pubkey,
        period_index: u64,
        issued_at: i64,
        audit: Option<PopHash>,
    ) -> Result<PopMessage, ClaimError> {
        let audit_hash = match self.version {
            PopVersion::V1 => ZERO_HASH,
            PopVersion::V2 => audit.unwrap_or(ZERO_HASH),
        };
        PopMessage::seal(PopEntry {
            version: self.version.into(),
            prev_hash: head.prev_hash,
            stream_prev_hash: head.stream_prev_hash,
            audit_hash,
            grant,
            claimer,
            period_index,
            issued_at,
        })
        .map_err(|err| ClaimError::MalformedPopProof(err.to_string()))
    }
}

/// Body of a proof request sent to the PoP authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopProofRequest {
    pub event_id: String,
    pub grant_address: String,
    pub claimant_address: String,
    pub period_index: u64,
}

impl PopProofRequest {
    pub fn new(event_id: &str, grant: &Pubkey, claimant: &Pubkey, period_index: u64) -> Self {
        Self {
            event_id: event_id.to_string(),
            grant_address: grant.to_string(),
            claimant_address: claimant.to_string(),
            period_index,
        }
    }
}

/// Proof as returned by the PoP authority. Hash fields are hex and, when
/// present, must agree with the signed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopProofResponse {
    pub signer_pubkey: String,
    pub message_base64: String,
    pub signature_base64: String,
    #[serde(default)]
    pub audit_hash: Option<String>,
    #[serde(default)]
    pub entry_hash: Option<String>,
    #[serde(default)]
    pub prev_hash: Option<String>,
    #[serde(default)]
    pub stream_prev_hash: Option<String>,
    #[serde(default)]
    pub issued_at: Option<i64>,
}

/// A decoded, locally validated proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopProof {
    pub version: PopVersion,
    pub signer: Pubkey,
    pub message: PopMessage,
    pub message_bytes: Vec<u8>,
    pub signature: [u8; SIGNATURE_LEN],
}

impl PopProof {
    pub fn from_parts(
        signer: Pubkey,
        message: PopMessage,
        signature: [u8; SIGNATURE_LEN],
    ) -> Result<Self, ClaimError> {
        Ok(Self {
            version: PopVersion::try_from(message.entry.version)?,
            signer,
            message_bytes: message.to_bytes(),
            message,
            signature,
        })
    }

    /// Decode a response. The version byte and signature length are checked
    /// before the message layout is parsed.
    pub fn from_response(response: &PopProofResponse) -> Result<Self, ClaimError> {
        let message_bytes = decode_base64("messageBase64", &response.message_base64)?;
        let version_byte = *message_bytes
            .first()
            .ok_or_else(|| ClaimError::MalformedPopProof("empty message".to_string()))?;
        let version = PopVersion::try_from(version_byte)?;

        let signature_bytes = decode_base64("signatureBase64", &response.signature_base64)?;
        let signature: [u8; SIGNATURE_LEN] =
            signature_bytes
                .as_slice()
                .try_into()
                .map_err(|_| ClaimError::InvalidSignatureLength {
                    len: signature_bytes.len(),
                })?;

        let signer = Pubkey::from_str(&response.signer_pubkey).map_err(|err| {
            ClaimError::MalformedPopProof(format!("signerPubkey: {err}"))
        })?;

        let message = PopMessage::parse(&message_bytes)
            .map_err(|err| ClaimError::MalformedPopProof(err.to_string()))?;
        message
            .verify_entry_hash()
            .map_err(|err| ClaimError::MalformedPopProof(err.to_string()))?;

        let entry = &message.entry;
        check_hex_field("entryHash", response.entry_hash.as_deref(), &message.entry_hash)?;
        check_hex_field("prevHash", response.prev_hash.as_deref(), &entry.prev_hash)?;
        check_hex_field(
            "streamPrevHash",
            response.stream_prev_hash.as_deref(),
            &entry.stream_prev_hash,
        )?;
        if version == PopVersion::V2 {
            check_hex_field("auditHash", response.audit_hash.as_deref(), &entry.audit_hash)?;
        }
        if let Some(issued_at) = response.issued_at {
            if issued_at != entry.issued_at {
                return Err(ClaimError::MalformedPopProof(format!(
                    "issuedAt {issued_at} disagrees with message {}",
                    entry.issued_at
                )));
            }
        }

        Ok(Self {
            version,
            signer,
            message,
            message_bytes,
            signature,
        })
    }

    pub fn to_response(&self) -> PopProofResponse {
        let entry = &self.message.entry;
        PopProofResponse {
            signer_pubkey: self.signer.to_string(),
            message_base64: BASE64.encode(&self.message_bytes),
            signature_base64: BASE64.encode(self.signature),
            audit_hash: (self.version == PopVersion::V2).then(|| hex::encode(entry.audit_hash)),
            entry_hash: Some(hex::encode(self.message.entry_hash)),
            prev_hash: Some(hex::encode(entry.prev_hash)),
            stream_prev_hash: Some(hex::encode(entry.stream_prev_hash)),
            issued_at: Some(entry.issued_at),
        }
    }

    /// Check the ed25519 signature before spending a transaction on it.
    pub fn verify_signature(&self) -> Result<(), ClaimError> {
        let signature = Signature::from(self.signature);
        if !signature.verify(self.signer.as_ref(), &self.message_bytes) {
            return Err(ClaimError::MalformedPopProof(
                "signature does not verify against signerPubkey".to_string(),
            ));
        }
        Ok(())
    }

    /// The proof has to name this grant, claimer and period, come from the
    /// configured signer and sit inside the ledger's skew window.
    pub fn check_binding(
        &self,
        expected_signer: &Pubkey,
        grant: &Pubkey,
        claimer: &Pubkey,
        period_index: u64,
        now: i64,
    ) -> Result<(), ClaimError> {
        if self.signer != *expected_signer {
            return Err(ClaimError::MalformedPopProof(format!(
                "signed by {}, grant expects {}",
                self.signer, expected_signer
            )));
        }
        check_pop_message(&self.message, grant, claimer, period_index, now)
            .map_err(|err| ClaimError::MalformedPopProof(err.to_string()))
    }

    /// Ed25519 precompile instruction that must precede the claim.
    pub fn verify_instruction(&self) -> Result<Instruction, ClaimError> {
        let data = encode_single_inline(&self.signer, &self.signature, &self.message_bytes)
            .map_err(|err| ClaimError::MalformedPopProof(err.to_string()))?;
        Ok(Instruction {
            program_id: ed25519_program::ID,
            accounts: vec![],
            data,
        })
    }
}

fn decode_base64(field: &str, value: &str) -> Result<Vec<u8>, ClaimError> {
    BASE64
        .decode(value)
        .map_err(|err| ClaimError::MalformedPopProof(format!("{field}: {err}")))
}

fn check_hex_field(field: &str, value: Option<&str>, expected: &PopHash) -> Result<(), ClaimError> {
    let Some(value) = value else {
        return Ok(());
    };
    let decoded = hex::decode(value.trim_start_matches("0x"))
        .map_err(|err| ClaimError::MalformedPopProof(format!("{field}: {err}")))?;
    if decoded.as_slice() != expected.as_slice() {
        return Err(ClaimError::MalformedPopProof(format!(
            "{field} disagrees with the signed message"
        )));
    }
    Ok(())
}
