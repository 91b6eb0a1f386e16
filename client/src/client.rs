//! End-to-end claim orchestration

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use tracing::{info, instrument, warn};

use crate::authority::PopAuthority;
use crate::claim::{ClaimRequest, ClaimTransactionBuilder};
use crate::config::{ClientConfig, SubmitPolicy};
use crate::error::ClaimError;
use crate::ledger::{account_exists, token_balance, with_timeout, LedgerRpc};
use crate::pda::{AddressDeriver, GrantCoordinates};
use crate::period::{unix_now, PeriodClock};
use crate::signer::ClaimSigner;
use crate::submit::TransactionSubmitter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimOutcome {
    pub signature: Signature,
    pub grant: Pubkey,
    pub receipt: Pubkey,
    pub period_index: u64,
    pub amount: u64,
    /// Nothing was sent; the signature had already landed
    pub already_landed: bool,
}

/// Where a claimer stands for the current period of a grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimStatus {
    pub grant: Pubkey,
    pub claimer: Pubkey,
    pub period_index: u64,
    pub claimed: bool,
    pub receipt: Pubkey,
    pub next_eligible_at: i64,
    pub amount_per_period: u64,
    pub vault_balance: Option<u64>,
    pub paused: bool,
    pub allowlist_enabled: bool,
}

pub struct ClaimClient {
    ledger: Arc<dyn LedgerRpc>,
    deriver: AddressDeriver,
    builder: ClaimTransactionBuilder,
    submitter: TransactionSubmitter,
    policy: SubmitPolicy,
}

impl ClaimClient {
    pub fn new(
        config: &ClientConfig,
        ledger: Arc<dyn LedgerRpc>,
        authority: Arc<dyn PopAuthority>,
    ) -> Result<Self, ClaimError> {
        let policy = config.effective_submit_policy()?;
        let deriver = AddressDeriver::new(config.program_id()?);
        let builder = ClaimTransactionBuilder::new(
            ledger.clone(),
            authority,
            deriver,
            config.event_id.clone(),
        )
        .with_default_grant(config.default_coordinates()?)
        .with_timeouts(policy.rpc_timeout(), policy.proof_timeout());
        Ok(Self {
            submitter: TransactionSubmitter::new(ledger.clone(), policy.clone()),
            ledger,
            deriver,
            builder,
            policy,
        })
    }

    pub fn deriver(&self) -> &AddressDeriver {
        &self.deriver
    }

    pub fn signer_timeout(&self) -> Duration {
        self.policy.signer_timeout()
    }

    /// Build, sign, submit and confirm one claim.
    ///
    /// When confirmation is uncertain the receipt is checked once; the claim
    /// is never resubmitted automatically.
    #[instrument(skip_all, fields(claimer = %request.claimer))]
    pub async fn claim(
        &self,
        request: &ClaimRequest,
        signer: &ClaimSigner,
    ) -> Result<ClaimOutcome, ClaimError> {
        if signer.pubkey() != request.claimer {
            return Err(ClaimError::SignerMismatch {
                expected: request.claimer,
                actual: signer.pubkey(),
            });
        }

        let built = self.builder.build(request).await?;
        let receipt = built.addresses.receipt;
        let signed = signer
            .sign(built.transaction.clone(), self.signer_timeout())
            .await?;

        let outcome = |signature, already_landed| ClaimOutcome {
            signature,
            grant: built.addresses.grant,
            receipt,
            period_index: built.period_index,
            amount: built.amount,
            already_landed,
        };

        match self
            .submitter
            .submit(&signed, built.last_valid_block_height, receipt)
            .await
        {
            Ok(submitted) => {
                info!(signature = %submitted.signature, period_index = built.period_index, "claim confirmed");
                Ok(outcome(submitted.signature, submitted.already_landed))
            }
            Err(ClaimError::ConfirmationUncertain { signature, receipt }) => {
                let landed = with_timeout(
                    "receipt lookup",
                    self.policy.rpc_timeout(),
                    account_exists(self.ledger.as_ref(), &receipt),
                )
                .await;
                match landed {
                    Ok(true) => {
                        info!(%signature, %receipt, "claim confirmed via receipt");
                        Ok(outcome(signature, false))
                    }
                    Ok(false) | Err(_) => {
                        warn!(%signature, %receipt, "claim outcome unknown");
                        Err(ClaimError::ConfirmationUncertain { signature, receipt })
                    }
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Whether `claimer` has been paid for the current period.
    pub async fn status(
        &self,
        coordinates: Option<GrantCoordinates>,
        claimer: &Pubkey,
    ) -> Result<ClaimStatus, ClaimError> {
        let mut request = ClaimRequest::new(*claimer);
        request.coordinates = coordinates;
        let coordinates = self.builder.resolve_coordinates(&request)?;
        let (grant_address, grant) = self.builder.load_grant(&coordinates).await?;

        let clock = PeriodClock::for_grant(&grant)?;
        let period_index = clock.period_index(unix_now())?;
        let (receipt, _) = self.deriver.receipt(&grant_address, claimer, period_index)?;

        let rpc_timeout = self.policy.rpc_timeout();
        let claimed = with_timeout(
            "receipt lookup",
            rpc_timeout,
            account_exists(self.ledger.as_ref(), &receipt),
        )
        .await?;
        let vault_balance = with_timeout(
            "vault lookup",
            rpc_timeout,
            token_balance(self.ledger.as_ref(), &grant.vault),
        )
        .await?;

        Ok(ClaimStatus {
            grant: grant_address,
            claimer: *claimer,
            period_index,
            claimed,
            receipt,
            next_eligible_at: clock.next_eligible_time(period_index)?,
            amount_per_period: grant.amount_per_period,
            vault_balance,
            paused: grant.paused,
            allowlist_enabled: grant.allowlist_enabled(),
        })
    }
}
