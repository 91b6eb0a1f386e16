use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use thiserror::Error;

use crate::config::ConfigError;

/// Coarse class of a failure, used to decide what the caller may do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad setup; fix before any claim is attempted
    Configuration,
    /// Expected refusal with a remediation hint
    Eligibility,
    /// The proof for this attempt is unusable
    Proof,
    /// The signer refused, timed out or returned something else
    Signing,
    /// Network trouble talking to the ledger
    Transient,
    /// Simulation reported an on-ledger error
    Simulation,
    /// The ledger rejected or failed the transaction
    Submission,
    /// Sent, but the outcome is unknown; check the receipt
    Uncertain,
}

#[derive(Debug, Error)]
pub enum ClaimError {
    // --- configuration -----------------------------------------------------
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("period length must be positive, got {period_seconds}")]
    InvalidPeriod { period_seconds: i64 },

    #[error("grant {grant} not found on ledger")]
    GrantNotFound { grant: Pubkey },

    #[error("no grant coordinates supplied and no default grant configured")]
    NoGrantConfigured,

    #[error("invalid address seeds: {0}")]
    InvalidSeeds(String),

    #[error("account {address} could not be decoded: {reason}")]
    AccountDecode { address: Pubkey, reason: String },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid grant terms: {0}")]
    InvalidGrantTerms(String),

    #[error("period arithmetic overflows i64 (start {start_ts}, length {period_seconds})")]
    PeriodOverflow { start_ts: i64, period_seconds: i64 },

    #[error("token instruction could not be built: {0}")]
    TokenInstruction(String),

    // --- eligibility -------------------------------------------------------
    #[error("no PoP signer configured for authority {authority}")]
    PopNotConfigured { authority: Pubkey },

    #[error("period {period_index} already claimed; next eligible at {next_eligible_at}")]
    AlreadyClaimedThisPeriod {
        period_index: u64,
        next_eligible_at: i64,
    },

    #[error("grant vault {vault} does not exist")]
    VaultMissing { vault: Pubkey },

    #[error("grant vault holds {balance}, claim needs {required}")]
    InsufficientVaultBalance { balance: u64, required: u64 },

    #[error("claimer {claimer} is not on the grant allowlist")]
    NotInAllowlist { claimer: Pubkey },

    // --- proof -------------------------------------------------------------
    #[error("PoP proof request failed: {0}")]
    PopProofFetchFailed(String),

    #[error("unsupported PoP message version {version}")]
    UnsupportedPopVersion { version: u8 },

    #[error("PoP signature must be 64 bytes, got {len}")]
    InvalidSignatureLength { len: usize },

    #[error("malformed PoP proof: {0}")]
    MalformedPopProof(String),

    // --- signing -----------------------------------------------------------
    #[error("signer rejected the transaction: {0}")]
    SignerRejected(String),

    #[error("signer returned a transaction with a different message")]
    SignerTampered,

    #[error("signer key {actual} does not match claimer {expected}")]
    SignerMismatch { expected: Pubkey, actual: Pubkey },

    // --- network -----------------------------------------------------------
    #[error("rpc error: {message}")]
    Rpc { message: String, transient: bool },

    #[error("{operation} timed out")]
    Timeout { operation: &'static str },

    // --- simulation --------------------------------------------------------
    #[error("simulation failed: {message}")]
    SimulationFailed {
        message: String,
        logs: Vec<String>,
        units_consumed: Option<u64>,
    },

    // --- submission --------------------------------------------------------
    #[error("send failed: {message}")]
    SendFailed { message: String },

    #[error("transaction {signature} failed: {message}")]
    TransactionFailed { signature: Signature, message: String },

    #[error("transaction {signature} expired before landing")]
    Expired { signature: Signature },

    #[error("transaction {signature} sent but not confirmed; check receipt {receipt}")]
    ConfirmationUncertain { signature: Signature, receipt: Pubkey },
}

impl ClaimError {
    pub fn kind(&self) -> ErrorKind {
        use ClaimError::*;
        match self {
            Config(_) | InvalidPeriod { .. } | GrantNotFound { .. } | NoGrantConfigured
            | InvalidSeeds(_) | AccountDecode { .. } | InvalidAmount(_) | InvalidGrantTerms(_)
            | PeriodOverflow { .. } | TokenInstruction(_) => ErrorKind::Configuration,
            PopNotConfigured { .. }
            | AlreadyClaimedThisPeriod { .. }
            | VaultMissing { .. }
            | InsufficientVaultBalance { .. }
            | NotInAllowlist { .. } => ErrorKind::Eligibility,
            PopProofFetchFailed(_)
            | UnsupportedPopVersion { .. }
            | InvalidSignatureLength { .. }
            | MalformedPopProof(_) => ErrorKind::Proof,
            SignerRejected(_) | SignerTampered | SignerMismatch { .. } => ErrorKind::Signing,
            Rpc { transient: true, .. } | Timeout { .. } => ErrorKind::Transient,
            Rpc { transient: false, .. } | SendFailed { .. } | TransactionFailed { .. }
            | Expired { .. } => ErrorKind::Submission,
            SimulationFailed { .. } => ErrorKind::Simulation,
            ConfirmationUncertain { .. } => ErrorKind::Uncertain,
        }
    }

    /// Transient network failures worth another send inside one attempt.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// True when nothing reached the ledger and a fresh attempt cannot
    /// double-apply. An uncertain confirmation is never safe: the receipt
    /// has to be checked first.
    pub fn is_safe_to_retry(&self) -> bool {
        match self.kind() {
            ErrorKind::Uncertain => false,
            ErrorKind::Configuration => false,
            ErrorKind::Eligibility => false,
            ErrorKind::Submission => matches!(self, ClaimError::Expired { .. } | ClaimError::SendFailed { .. }),
            ErrorKind::Proof | ErrorKind::Signing | ErrorKind::Transient | ErrorKind::Simulation => {
                true
            }
        }
    }

    /// Short explanation suitable for an end user.
    pub fn user_message(&self) -> String {
        use ClaimError::*;
        match self {
            AlreadyClaimedThisPeriod { next_eligible_at, .. } => {
                let when = chrono::DateTime::from_timestamp(*next_eligible_at, 0)
                    .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_else(|| next_eligible_at.to_string());
                format!("You already claimed this period. Next claim opens {when}.")
            }
            InsufficientVaultBalance { .. } | VaultMissing { .. } => {
                "This grant is out of funds. Ask the organizer to top it up.".to_string()
            }
            PopNotConfigured { .. } => {
                "This grant is not ready for claims yet (no proof signer).".to_string()
            }
            NotInAllowlist { .. } => "Your wallet is not eligible for this grant.".to_string(),
            PopProofFetchFailed(_) | MalformedPopProof(_) | UnsupportedPopVersion { .. }
            | InvalidSignatureLength { .. } => {
                "Could not obtain a valid participation proof. Try again shortly.".to_string()
            }
            SignerRejected(_) | SignerTampered | SignerMismatch { .. } => {
                "The wallet did not sign the claim.".to_string()
            }
            Rpc { .. } | Timeout { .. } => {
                "Network problem reaching the ledger. Try again.".to_string()
            }
            SimulationFailed { .. } => "The claim would fail on the ledger.".to_string(),
            Expired { .. } => "The claim expired before landing. Try again.".to_string(),
            ConfirmationUncertain { .. } => {
                "Claim sent but not yet confirmed. Check your claim status before retrying."
                    .to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Last `max` log lines, for diagnostics on simulation failures.
pub fn tail_logs(logs: &[String], max: usize) -> Vec<String> {
    logs.iter()
        .skip(logs.len().saturating_sub(max))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncertain_is_never_safe() {
        let err = ClaimError::ConfirmationUncertain {
            signature: Signature::default(),
            receipt: Pubkey::new_unique(),
        };
        assert_eq!(err.kind(), ErrorKind::Uncertain);
        assert!(!err.is_safe_to_retry());
        assert!(err.user_message().contains("status"));
    }

    #[test]
    fn test_transient_classification() {
        let err = ClaimError::Rpc {
            message: "connection reset".into(),
            transient: true,
        };
        assert!(err.is_transient());
        assert!(err.is_safe_to_retry());

        let err = ClaimError::Rpc {
            message: "invalid params".into(),
            transient: false,
        };
        assert!(!err.is_transient());
        assert_eq!(err.kind(), ErrorKind::Submission);
    }

    #[test]
    fn test_already_claimed_mentions_next_window() {
        let err = ClaimError::AlreadyClaimedThisPeriod {
            period_index: 0,
            next_eligible_at: 1_700_000_060,
        };
        assert_eq!(err.kind(), ErrorKind::Eligibility);
        assert!(err.user_message().contains("2023-11-14"));
    }

    #[test]
    fn test_tail_logs() {
        let logs: Vec<String> = (0..60).map(|i| i.to_string()).collect();
        let tail = tail_logs(&logs, 50);
        assert_eq!(tail.len(), 50);
        assert_eq!(tail[0], "10");
        assert_eq!(tail_logs(&logs[..3], 50).len(), 3);
    }
}
