//! Sources of PoP proofs
//!
//! Production claims ask a remote authority over HTTP. The in-process
//! authority holds the trusted key itself and is used for development
//! clusters and tests.

use std::sync::Arc;

use async_trait::async_trait;
use solana_sdk::signature::{Keypair, Signer};
use tracing::debug;

use crate::error::ClaimError;
use crate::ledger::{fetch_pop_state, LedgerRpc};
use crate::pda::AddressDeriver;
use crate::period::unix_now;
use crate::pop::{
    audit_hash, PopChainBuilder, PopChainHead, PopProof, PopProofRequest, PopProofResponse,
    PopVersion,
};

#[async_trait]
pub trait PopAuthority: Send + Sync {
    async fn request_proof(&self, request: &PopProofRequest) -> Result<PopProofResponse, ClaimError>;
}

pub struct HttpPopAuthority {
    http: reqwest::Client,
    url: String,
}

impl HttpPopAuthority {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl PopAuthority for HttpPopAuthority {
    async fn request_proof(&self, request: &PopProofRequest) -> Result<PopProofResponse, ClaimError> {
        debug!(url = %self.url, period_index = request.period_index, "requesting PoP proof");
        let response = self
            .http
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|err| ClaimError::PopProofFetchFailed(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClaimError::PopProofFetchFailed(format!(
                "authority returned {status}: {body}"
            )));
        }
        response
            .json::<PopProofResponse>()
            .await
            .map_err(|err| ClaimError::PopProofFetchFailed(format!("invalid response body: {err}")))
    }
}

/// Signs proofs in-process against the grant's current on-ledger chain head.
pub struct LocalPopAuthority {
    signer: Keypair,
    builder: PopChainBuilder,
    ledger: Arc<dyn LedgerRpc>,
    deriver: AddressDeriver,
}

impl LocalPopAuthority {
    pub fn new(
        signer: Keypair,
        version: PopVersion,
        ledger: Arc<dyn LedgerRpc>,
        deriver: AddressDeriver,
    ) -> Self {
        Self {
            signer,
            builder: PopChainBuilder::new(version),
            ledger,
            deriver,
        }
    }

    pub fn signer_pubkey(&self) -> solana_sdk::pubkey::Pubkey {
        self.signer.pubkey()
    }
}

#[async_trait]
impl PopAuthority for LocalPopAuthority {
    async fn request_proof(&self, request: &PopProofRequest) -> Result<PopProofResponse, ClaimError> {
        let grant = crate::config::parse_pubkey("grantAddress", &request.grant_address)?;
        let claimer = crate::config::parse_pubkey("claimantAddress", &request.claimant_address)?;

        let (pop_state, _) = self.deriver.pop_state(&grant)?;
        let head = fetch_pop_state(self.ledger.as_ref(), &pop_state)
            .await?
            .map(|state| PopChainHead::from_state(&state))
            .unwrap_or_else(PopChainHead::genesis);

        let message = self.builder.build(
            head,
            grant,
            claimer,
            request.period_index,
            unix_now(),
            Some(audit_hash(
                &request.event_id,
                &grant,
                &claimer,
                request.period_index,
            )),
        )?;
        let bytes = message.to_bytes();
        let signature = self.signer.sign_message(&bytes);
        let signature: [u8; 64] = signature
            .as_ref()
            .try_into()
            .map_err(|_| ClaimError::InvalidSignatureLength {
                len: signature.as_ref().len(),
            })?;
        Ok(PopProof::from_parts(self.signer.pubkey(), message, signature)?.to_response())
    }
}
