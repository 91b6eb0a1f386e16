//! Error codes for the recurring grant program

use anchor_lang::prelude::*;

#[error_code]
pub enum GrantError {
    // Authority errors (6000-6099)
    #[msg("Only the grant authority can perform this action")]
    Unauthorized,

    #[msg("Token account mint does not match the grant mint")]
    MintMismatch,

    // Grant configuration errors (6100-6199)
    #[msg("Amount must be greater than zero")]
    InvalidAmount,

    #[msg("Period length must be greater than zero")]
    InvalidPeriod,

    #[msg("Start timestamp is too far in the future")]
    InvalidStartTs,

    #[msg("Expiry must be zero or after the start timestamp")]
    InvalidExpiry,

    #[msg("Grant already exists; create it under a new grant id")]
    GrantAlreadyInitialized,

    // Claim errors (6200-6299)
    #[msg("Grant is paused")]
    Paused,

    #[msg("Grant has expired")]
    GrantExpired,

    #[msg("Grant has not started yet")]
    GrantNotStarted,

    #[msg("Period index does not match the current period")]
    InvalidPeriodIndex,

    #[msg("Vault balance is below the per-period amount")]
    InsufficientFunds,

    #[msg("Allowlist is enabled for this grant; use claim_grant_with_proof")]
    AllowlistRequired,

    #[msg("Allowlist is not enabled for this grant")]
    AllowlistNotEnabled,

    #[msg("Claimer is not in the allowlist")]
    NotInAllowlist,

    #[msg("Allowlist proof is too long")]
    AllowlistProofTooLong,

    // Proof-of-participation errors (6300-6399)
    #[msg("PoP config authority does not match the grant authority")]
    InvalidPopConfigAuthority,

    #[msg("Missing ed25519 signature instruction before the claim")]
    MissingPopSignatureInstruction,

    #[msg("Preceding instruction is not the ed25519 program")]
    InvalidPopSignatureProgram,

    #[msg("Malformed ed25519 instruction data")]
    InvalidPopSignatureData,

    #[msg("PoP signature is not from the configured signer")]
    InvalidPopSigner,

    #[msg("Unsupported PoP message version")]
    InvalidPopMessageVersion,

    #[msg("PoP message has the wrong length for its version")]
    InvalidPopMessageLength,

    #[msg("PoP proof was issued for a different grant")]
    PopProofGrantMismatch,

    #[msg("PoP proof was issued for a different claimer")]
    PopProofClaimerMismatch,

    #[msg("PoP proof was issued for a different period")]
    PopProofPeriodMismatch,

    #[msg("PoP proof issue time is outside the accepted window")]
    PopProofExpired,

    #[msg("PoP entry hash does not match its fields")]
    PopEntryHashMismatch,

    #[msg("PoP global hash chain continuity is broken")]
    PopHashChainBroken,

    #[msg("PoP stream hash chain continuity is broken")]
    PopStreamChainBroken,

    #[msg("First PoP entry must start from the zero hash")]
    PopGenesisMismatch,

    #[msg("PoP state belongs to a different grant")]
    PopStateGrantMismatch,

    #[msg("Version 2 PoP proofs require a non-zero audit hash")]
    PopAuditHashMissing,

    // General errors (6400-6499)
    #[msg("Arithmetic overflow")]
    ArithmeticOverflow,

    #[msg("Token transfer failed")]
    TokenTransferFailed,
}
