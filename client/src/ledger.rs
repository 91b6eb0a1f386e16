//! Ledger access behind a narrow async seam
//!
//! Everything the claim pipeline needs from the cluster goes through
//! [`LedgerRpc`], so tests can run the pipeline against an in-memory ledger.

use std::sync::Arc;
use std::time::Duration;

use anchor_lang::{AccountDeserialize, Owner};
use anchor_spl::token::TokenAccount;
use async_trait::async_trait;
use grant_program::state::{ClaimReceipt, Grant, PopConfig, PopState};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig};
use solana_sdk::account::Account;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;

use crate::error::ClaimError;

/// Result of a dry run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationOutcome {
    pub err: Option<String>,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub skip_preflight: bool,
    /// Retries performed by the RPC node itself
    pub max_retries: Option<usize>,
}

/// What the ledger knows about a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureState {
    Unknown,
    /// Seen but below confirmed commitment
    Processing,
    Confirmed,
    Failed(String),
}

#[async_trait]
pub trait LedgerRpc: Send + Sync {
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, ClaimError>;

    /// Latest blockhash and the last block height at which it is valid.
    async fn latest_blockhash(&self) -> Result<(Hash, u64), ClaimError>;

    async fn block_height(&self) -> Result<u64, ClaimError>;

    async fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64, ClaimError>;

    async fn simulate(&self, transaction: &Transaction) -> Result<SimulationOutcome, ClaimError>;

    /// Submit a signed transaction. A transaction the ledger has already
    /// processed is reported as sent.
    async fn send(
        &self,
        transaction: &Transaction,
        options: SendOptions,
    ) -> Result<Signature, ClaimError>;

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureState, ClaimError>;
}

/// [`LedgerRpc`] over the nonblocking Solana RPC client.
pub struct SolanaLedger {
    rpc: RpcClient,
    commitment: CommitmentConfig,
}

impl SolanaLedger {
    pub fn new(url: String, timeout: Duration) -> Self {
        let commitment = CommitmentConfig::confirmed();
        Self {
            rpc: RpcClient::new_with_timeout_and_commitment(url, timeout, commitment),
            commitment,
        }
    }

    pub fn url(&self) -> String {
        self.rpc.url()
    }
}

#[async_trait]
impl LedgerRpc for SolanaLedger {
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, ClaimError> {
        self.rpc
            .get_account_with_commitment(address, self.commitment)
            .await
            .map(|response| response.value)
            .map_err(classify_rpc_error)
    }

    async fn latest_blockhash(&self) -> Result<(Hash, u64), ClaimError> {
        self.rpc
            .get_latest_blockhash_with_commitment(self.commitment)
            .await
            .map_err(classify_rpc_error)
    }

    async fn block_height(&self) -> Result<u64, ClaimError> {
        self.rpc
            .get_block_height_with_commitment(self.commitment)
            .await
            .map_err(classify_rpc_error)
    }

    async fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64, ClaimError> {
        self.rpc
            .get_minimum_balance_for_rent_exemption(data_len)
            .await
            .map_err(classify_rpc_error)
    }

    async fn simulate(&self, transaction: &Transaction) -> Result<SimulationOutcome, ClaimError> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            commitment: Some(self.commitment),
            ..Default::default()
        };
        let response = self
            .rpc
            .simulate_transaction_with_config(transaction, config)
            .await
            .map_err(classify_rpc_error)?;
        let result = response.value;
        Ok(SimulationOutcome {
            err: result.err.map(|err| err.to_string()),
            logs: result.logs.unwrap_or_default(),
            units_consumed: result.units_consumed,
        })
    }

    async fn send(
        &self,
        transaction: &Transaction,
        options: SendOptions,
    ) -> Result<Signature, ClaimError> {
        let config = RpcSendTransactionConfig {
            skip_preflight: options.skip_preflight,
            preflight_commitment: Some(self.commitment.commitment),
            max_retries: options.max_retries,
            ..Default::default()
        };
        match self
            .rpc
            .send_transaction_with_config(transaction, config)
            .await
        {
            Ok(signature) => Ok(signature),
            Err(err) => {
                let message = err.to_string();
                match transaction.signatures.first() {
                    Some(signature) if is_already_processed(&message) => Ok(*signature),
                    _ => Err(translate_send_error(&message)),
                }
            }
        }
    }

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureState, ClaimError> {
        let response = self
            .rpc
            .get_signature_statuses(&[*signature])
            .await
            .map_err(classify_rpc_error)?;
        let Some(Some(status)) = response.value.into_iter().next() else {
            return Ok(SignatureState::Unknown);
        };
        if let Some(err) = &status.err {
            return Ok(SignatureState::Failed(err.to_string()));
        }
        if status.satisfies_commitment(self.commitment) {
            Ok(SignatureState::Confirmed)
        } else {
            Ok(SignatureState::Processing)
        }
    }
}

const TRANSIENT_MARKERS: [&str; 10] = [
    "timed out",
    "timeout",
    "connection reset",
    "connection refused",
    "connection closed",
    "broken pipe",
    "429",
    "too many requests",
    "rate limit",
    "503",
];

/// Timeouts, dropped connections, rate limiting and unavailable nodes.
pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    TRANSIENT_MARKERS.iter().any(|marker| lower.contains(marker))
        || lower.contains("service unavailable")
}

/// Failures after which the node may already hold the transaction. Refused
/// connections, rate limiting and unavailable nodes reject before reading it.
const IN_FLIGHT_MARKERS: [&str; 5] = [
    "timed out",
    "timeout",
    "connection reset",
    "connection closed",
    "broken pipe",
];

/// A send that failed this way may still land.
pub fn may_have_reached_node(err: &ClaimError) -> bool {
    match err {
        ClaimError::Timeout { .. } => true,
        ClaimError::Rpc {
            message,
            transient: true,
        } => {
            let lower = message.to_ascii_lowercase();
            IN_FLIGHT_MARKERS.iter().any(|marker| lower.contains(marker))
        }
        _ => false,
    }
}

pub fn is_already_processed(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("already been processed") || lower.contains("alreadyprocessed")
}

pub fn classify_rpc_error(err: impl std::fmt::Display) -> ClaimError {
    let message = err.to_string();
    ClaimError::Rpc {
        transient: is_transient_message(&message),
        message,
    }
}

/// Map a send failure to something a user can act on.
pub fn translate_send_error(message: &str) -> ClaimError {
    if is_transient_message(message) {
        return ClaimError::Rpc {
            message: message.to_string(),
            transient: true,
        };
    }
    let lower = message.to_ascii_lowercase();
    let message = if lower.contains("insufficient funds for fee")
        || lower.contains("insufficientfundsforfee")
    {
        "fee payer cannot cover the transaction fee; fund the wallet with SOL".to_string()
    } else if lower.contains("blockhash not found") || lower.contains("blockhashnotfound") {
        "blockhash expired before the transaction was accepted; rebuild and retry".to_string()
    } else {
        message.to_string()
    };
    ClaimError::SendFailed { message }
}

/// Fetch and decode an Anchor account, checking its owner program.
pub async fn fetch_anchor<T>(rpc: &dyn LedgerRpc, address: &Pubkey) -> Result<Option<T>, ClaimError>
where
    T: AccountDeserialize + Owner,
{
    let Some(account) = rpc.get_account(address).await? else {
        return Ok(None);
    };
    if account.owner != T::owner() {
        return Err(ClaimError::AccountDecode {
            address: *address,
            reason: format!("owned by {}, expected {}", account.owner, T::owner()),
        });
    }
    let mut data = account.data.as_slice();
    T::try_deserialize(&mut data)
        .map(Some)
        .map_err(|err| ClaimError::AccountDecode {
            address: *address,
            reason: err.to_string(),
        })
}

pub async fn fetch_grant(rpc: &dyn LedgerRpc, address: &Pubkey) -> Result<Option<Grant>, ClaimError> {
    fetch_anchor::<Grant>(rpc, address).await
}

pub async fn fetch_pop_config(
    rpc: &dyn LedgerRpc,
    address: &Pubkey,
) -> Result<Option<PopConfig>, ClaimError> {
    fetch_anchor::<PopConfig>(rpc, address).await
}

pub async fn fetch_pop_state(
    rpc: &dyn LedgerRpc,
    address: &Pubkey,
) -> Result<Option<PopState>, ClaimError> {
    fetch_anchor::<PopState>(rpc, address).await
}

pub async fn fetch_receipt(
    rpc: &dyn LedgerRpc,
    address: &Pubkey,
) -> Result<Option<ClaimReceipt>, ClaimError> {
    fetch_anchor::<ClaimReceipt>(rpc, address).await
}

/// Receipts are never closed, so existence alone means "paid".
pub async fn account_exists(rpc: &dyn LedgerRpc, address: &Pubkey) -> Result<bool, ClaimError> {
    Ok(rpc.get_account(address).await?.is_some())
}

pub async fn token_balance(rpc: &dyn LedgerRpc, address: &Pubkey) -> Result<Option<u64>, ClaimError> {
    Ok(fetch_anchor::<TokenAccount>(rpc, address)
        .await?
        .map(|account| account.amount))
}

pub type SharedLedger = Arc<dyn LedgerRpc>;

/// Bound one network suspension point.
pub async fn with_timeout<T, F>(
    operation: &'static str,
    limit: Duration,
    future: F,
) -> Result<T, ClaimError>
where
    F: std::future::Future<Output = Result<T, ClaimError>>,
{
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| ClaimError::Timeout { operation })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_markers() {
        assert!(is_transient_message("error sending request: operation timed out"));
        assert!(is_transient_message("HTTP status client error (429 Too Many Requests)"));
        assert!(is_transient_message("503 Service Unavailable"));
        assert!(is_transient_message("Connection reset by peer"));
        assert!(!is_transient_message("custom program error: 0x1771"));
    }

    #[test]
    fn test_send_error_translation() {
        match translate_send_error("Transaction simulation failed: Blockhash not found") {
            ClaimError::SendFailed { message } => assert!(message.contains("rebuild")),
            other => panic!("unexpected {other:?}"),
        }
        match translate_send_error("Attempt to debit an account but found no record of a prior credit. InsufficientFundsForFee") {
            ClaimError::SendFailed { message } => assert!(message.contains("fee")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(translate_send_error("request timed out").is_transient());
        assert!(matches!(
            translate_send_error("something odd"),
            ClaimError::SendFailed { .. }
        ));
    }

    #[test]
    fn test_in_flight_failures() {
        assert!(may_have_reached_node(&ClaimError::Timeout { operation: "send" }));
        assert!(may_have_reached_node(&classify_rpc_error("connection reset by peer")));
        assert!(!may_have_reached_node(&classify_rpc_error("429 Too Many Requests")));
        assert!(!may_have_reached_node(&classify_rpc_error("connection refused")));
        assert!(!may_have_reached_node(&ClaimError::SendFailed {
            message: "timed out".to_string(),
        }));
    }

    #[test]
    fn test_already_processed() {
        assert!(is_already_processed(
            "Transaction simulation failed: This transaction has already been processed"
        ));
        assert!(is_already_processed("AlreadyProcessed"));
        assert!(!is_already_processed("blockhash not found"));
    }

    #[test]
    fn test_classify() {
        let err = classify_rpc_error("connection refused");
        assert!(err.is_transient());
        let err = classify_rpc_error("Invalid param: could not find account");
        assert!(!err.is_transient());
    }
}
