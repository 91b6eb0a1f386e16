//! Simulate, send and confirm a signed transaction
//!
//! `Built -> Simulated -> Sent -> Confirmed | Failed`. A send that may have
//! reached the node (timeout, dropped connection) is followed by confirmation
//! by signature, never reported as lost. A transaction that never confirms is
//! reported and the caller must look at the ledger (the claim receipt) before
//! trying again.

use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use tracing::{debug, info, warn};

use crate::config::SubmitPolicy;
use crate::error::{tail_logs, ClaimError};
use crate::ledger::{may_have_reached_node, with_timeout, LedgerRpc, SendOptions, SignatureState};

/// Log lines kept from a failed simulation
pub const SIMULATION_LOG_TAIL: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitPhase {
    Built,
    Simulated,
    Sent,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub signature: Signature,
    /// The signature had already landed; nothing was sent
    pub already_landed: bool,
    pub units_consumed: Option<u64>,
    pub send_attempts: u32,
}

/// How the send loop ended.
enum SendReport {
    Accepted { attempts: u32 },
    /// An attempt failed after the node may have received the transaction
    Unknown { attempts: u32, error: ClaimError },
}

enum PrimaryConfirmation {
    Landed,
    BlockhashExpired,
    Inconclusive,
}

pub struct TransactionSubmitter {
    ledger: Arc<dyn LedgerRpc>,
    policy: SubmitPolicy,
}

impl TransactionSubmitter {
    pub fn new(ledger: Arc<dyn LedgerRpc>, policy: SubmitPolicy) -> Self {
        Self { ledger, policy }
    }

    pub fn policy(&self) -> &SubmitPolicy {
        &self.policy
    }

    /// Submit `transaction` and wait for confirmation.
    ///
    /// `watch_account` is the account whose existence proves the transaction
    /// landed (the claim receipt); it is reported when confirmation is
    /// uncertain.
    pub async fn submit(
        &self,
        transaction: &Transaction,
        last_valid_block_height: u64,
        watch_account: Pubkey,
    ) -> Result<SubmitOutcome, ClaimError> {
        let signature = transaction
            .signatures
            .first()
            .copied()
            .filter(|signature| *signature != Signature::default())
            .ok_or_else(|| ClaimError::SignerRejected("transaction is not signed".to_string()))?;
        let mut phase = SubmitPhase::Built;

        match self.status(&signature).await {
            Ok(SignatureState::Confirmed) => {
                info!(%signature, "transaction already confirmed");
                return Ok(SubmitOutcome {
                    signature,
                    already_landed: true,
                    units_consumed: None,
                    send_attempts: 0,
                });
            }
            Ok(SignatureState::Failed(message)) => {
                return Err(ClaimError::TransactionFailed { signature, message });
            }
            Ok(SignatureState::Processing) => {
                debug!(%signature, "transaction already in flight");
                phase = SubmitPhase::Sent;
            }
            Ok(SignatureState::Unknown) => {}
            Err(err) => warn!(%signature, error = %err, "status check failed; continuing"),
        }

        let mut units_consumed = None;
        let mut send_attempts = 0;
        if phase == SubmitPhase::Built {
            if self.policy.simulate {
                units_consumed = self.simulate(transaction).await?;
                phase = SubmitPhase::Simulated;
                debug!(%signature, ?phase, ?units_consumed, "dry run complete");
            }
            send_attempts = match self.send(transaction).await? {
                SendReport::Accepted { attempts } => attempts,
                SendReport::Unknown { attempts, error } => {
                    warn!(%signature, attempts, error = %error, "send outcome unknown; checking the ledger");
                    attempts
                }
            };
            phase = SubmitPhase::Sent;
        }
        debug!(%signature, ?phase, "awaiting confirmation");

        let outcome = SubmitOutcome {
            signature,
            already_landed: false,
            units_consumed,
            send_attempts,
        };
        match self.confirm(&signature, last_valid_block_height, watch_account).await {
            Ok(()) => {
                info!(%signature, ?units_consumed, send_attempts, phase = ?SubmitPhase::Confirmed, "transaction confirmed");
                Ok(outcome)
            }
            Err(err) => {
                warn!(%signature, error = %err, phase = ?SubmitPhase::Failed, "transaction not confirmed");
                Err(err)
            }
        }
    }

    async fn status(&self, signature: &Signature) -> Result<SignatureState, ClaimError> {
        with_timeout(
            "signature status",
            self.policy.rpc_timeout(),
            self.ledger.signature_status(signature),
        )
        .await
    }

    /// Diagnostic dry run. A reported error aborts; a failing simulation
    /// call does not block sending.
    async fn simulate(&self, transaction: &Transaction) -> Result<Option<u64>, ClaimError> {
        match with_timeout(
            "simulation",
            self.policy.rpc_timeout(),
            self.ledger.simulate(transaction),
        )
        .await
        {
            Ok(outcome) => match outcome.err {
                Some(message) => {
                    for line in &outcome.logs {
                        debug!("{}", line);
                    }
                    Err(ClaimError::SimulationFailed {
                        message,
                        logs: tail_logs(&outcome.logs, SIMULATION_LOG_TAIL),
                        units_consumed: outcome.units_consumed,
                    })
                }
                None => {
                    debug!(units = ?outcome.units_consumed, "simulation passed");
                    Ok(outcome.units_consumed)
                }
            },
            Err(err) => {
                warn!(error = %err, "simulation unavailable; sending anyway");
                Ok(None)
            }
        }
    }

    /// Send with linear backoff on transient failures. Re-sending the same
    /// signed transaction cannot double-apply it.
    ///
    /// Once an attempt fails after the node may have read the transaction,
    /// a final failure is reported as `Unknown` so the caller confirms by
    /// signature.
    async fn send(&self, transaction: &Transaction) -> Result<SendReport, ClaimError> {
        let options = SendOptions {
            skip_preflight: self.policy.skip_preflight,
            max_retries: self.policy.rpc_max_retries,
        };
        let max_attempts = self.policy.max_send_attempts.max(1);
        let mut attempt = 1;
        let mut in_flight = false;
        loop {
            let result = with_timeout(
                "send",
                self.policy.rpc_timeout(),
                self.ledger.send(transaction, options),
            )
            .await;
            match result {
                Ok(signature) => {
                    info!(%signature, attempt, "transaction sent");
                    return Ok(SendReport::Accepted { attempts: attempt });
                }
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    in_flight |= may_have_reached_node(&err);
                    let delay = self.policy.backoff(attempt);
                    warn!(attempt, error = %err, delay_ms = delay.as_millis() as u64, "send failed; retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if in_flight || may_have_reached_node(&err) => {
                    return Ok(SendReport::Unknown {
                        attempts: attempt,
                        error: err,
                    })
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn confirm(
        &self,
        signature: &Signature,
        last_valid_block_height: u64,
        watch_account: Pubkey,
    ) -> Result<(), ClaimError> {
        let primary = tokio::time::timeout(
            self.policy.confirm_timeout(),
            self.confirm_by_blockhash(signature, last_valid_block_height),
        )
        .await
        .unwrap_or(Ok(PrimaryConfirmation::Inconclusive))?;

        let expired = match primary {
            PrimaryConfirmation::Landed => return Ok(()),
            PrimaryConfirmation::BlockhashExpired => true,
            PrimaryConfirmation::Inconclusive => false,
        };

        debug!(%signature, expired, "falling back to signature polling");
        for _ in 0..self.policy.fallback_poll_attempts {
            match self.status(signature).await {
                Ok(SignatureState::Confirmed) => return Ok(()),
                Ok(SignatureState::Failed(message)) => {
                    return Err(ClaimError::TransactionFailed {
                        signature: *signature,
                        message,
                    })
                }
                Ok(SignatureState::Processing | SignatureState::Unknown) => {}
                Err(err) => debug!(error = %err, "status poll failed"),
            }
            tokio::time::sleep(self.policy.poll_interval()).await;
        }

        if expired {
            Err(ClaimError::Expired {
                signature: *signature,
            })
        } else {
            Err(ClaimError::ConfirmationUncertain {
                signature: *signature,
                receipt: watch_account,
            })
        }
    }

    /// Poll until the signature confirms or the blockhash can no longer land.
    async fn confirm_by_blockhash(
        &self,
        signature: &Signature,
        last_valid_block_height: u64,
    ) -> Result<PrimaryConfirmation, ClaimError> {
        loop {
            match self.status(signature).await {
                Ok(SignatureState::Confirmed) => return Ok(PrimaryConfirmation::Landed),
                Ok(SignatureState::Failed(message)) => {
                    return Err(ClaimError::TransactionFailed {
                        signature: *signature,
                        message,
                    })
                }
                Ok(SignatureState::Processing) => {}
                Ok(SignatureState::Unknown) => {
                    match with_timeout(
                        "block height",
                        self.policy.rpc_timeout(),
                        self.ledger.block_height(),
                    )
                    .await
                    {
                        Ok(height) if height > last_valid_block_height => {
                            return Ok(PrimaryConfirmation::BlockhashExpired)
                        }
                        Ok(_) => {}
                        Err(err) => {
                            warn!(error = %err, "block height unavailable");
                            return Ok(PrimaryConfirmation::Inconclusive);
                        }
                    }
                }
                Err(err) => {
                    warn!(error = %err, "status unavailable");
                    return Ok(PrimaryConfirmation::Inconclusive);
                }
            }
            tokio::time::sleep(self.policy.poll_interval()).await;
        }
    }
}
