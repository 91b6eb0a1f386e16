//! Signing back-ends for claim transactions

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::transaction::Transaction;
use tracing::debug;

use crate::error::ClaimError;

/// Context for a wallet reached through a redirect or deeplink round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectSession {
    pub wallet: Pubkey,
    pub session_id: String,
    pub callback_url: String,
}

/// Hands an unsigned transaction to an external wallet and waits for the
/// signed copy to come back.
#[async_trait]
pub trait RedirectBridge: Send + Sync {
    async fn request_signature(
        &self,
        session: &RedirectSession,
        unsigned: &Transaction,
    ) -> Result<Transaction, ClaimError>;
}

#[derive(Clone)]
pub enum ClaimSigner {
    InProcess(Arc<Keypair>),
    Redirect {
        bridge: Arc<dyn RedirectBridge>,
        session: RedirectSession,
    },
}

impl std::fmt::Debug for ClaimSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimSigner::InProcess(keypair) => f
                .debug_tuple("InProcess")
                .field(&keypair.pubkey())
                .finish(),
            ClaimSigner::Redirect { session, .. } => f
                .debug_struct("Redirect")
                .field("session", session)
                .finish_non_exhaustive(),
        }
    }
}

impl ClaimSigner {
    pub fn in_process(keypair: Keypair) -> Self {
        ClaimSigner::InProcess(Arc::new(keypair))
    }

    pub fn pubkey(&self) -> Pubkey {
        match self {
            ClaimSigner::InProcess(keypair) => keypair.pubkey(),
            ClaimSigner::Redirect { session, .. } => session.wallet,
        }
    }

    /// Sign `transaction` as fee payer. The returned transaction must carry
    /// exactly the message that was handed out.
    pub async fn sign(
        &self,
        transaction: Transaction,
        timeout: Duration,
    ) -> Result<Transaction, ClaimError> {
        let fee_payer = transaction
            .message
            .account_keys
            .first()
            .copied()
            .ok_or_else(|| ClaimError::SignerRejected("transaction has no fee payer".to_string()))?;
        if fee_payer != self.pubkey() {
            return Err(ClaimError::SignerMismatch {
                expected: fee_payer,
                actual: self.pubkey(),
            });
        }

        match self {
            ClaimSigner::InProcess(keypair) => {
                let mut transaction = transaction;
                let blockhash = transaction.message.recent_blockhash;
                transaction
                    .try_sign(&[keypair.as_ref()], blockhash)
                    .map_err(|err| ClaimError::SignerRejected(err.to_string()))?;
                Ok(transaction)
            }
            ClaimSigner::Redirect { bridge, session } => {
                debug!(session = %session.session_id, "waiting for wallet signature");
                let signed = tokio::time::timeout(
                    timeout,
                    bridge.request_signature(session, &transaction),
                )
                .await
                .map_err(|_| ClaimError::Timeout {
                    operation: "wallet signature",
                })??;

                if signed.message != transaction.message {
                    return Err(ClaimError::SignerTampered);
                }
                if !signed.verify_with_results().into_iter().all(|ok| ok) {
                    return Err(ClaimError::SignerRejected(
                        "wallet returned an invalid signature".to_string(),
                    ));
                }
                Ok(signed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::hash::Hash;
    use solana_sdk::message::Message;
    use solana_sdk::system_instruction;

    fn unsigned(payer: &Pubkey) -> Transaction {
        let ix = system_instruction::transfer(payer, &Pubkey::new_unique(), 1);
        Transaction::new_unsigned(Message::new_with_blockhash(
            &[ix],
            Some(payer),
            &Hash::new_unique(),
        ))
    }

    struct SigningBridge {
        keypair: Keypair,
        tamper: bool,
        delay: Duration,
    }

    #[async_trait]
    impl RedirectBridge for SigningBridge {
        async fn request_signature(
            &self,
            _session: &RedirectSession,
            unsigned: &Transaction,
        ) -> Result<Transaction, ClaimError> {
            tokio::time::sleep(self.delay).await;
            let mut tx = unsigned.clone();
            if self.tamper {
                tx.message.recent_blockhash = Hash::new_unique();
            }
            let blockhash = tx.message.recent_blockhash;
            tx.try_sign(&[&self.keypair], blockhash)
                .map_err(|err| ClaimError::SignerRejected(err.to_string()))?;
            Ok(tx)
        }
    }

    fn redirect(keypair: Keypair, tamper: bool, delay: Duration) -> ClaimSigner {
        let session = RedirectSession {
            wallet: keypair.pubkey(),
            session_id: "s-1".to_string(),
            callback_url: "https://example.invalid/cb".to_string(),
        };
        ClaimSigner::Redirect {
            bridge: Arc::new(SigningBridge {
                keypair,
                tamper,
                delay,
            }),
            session,
        }
    }

    #[tokio::test]
    async fn test_in_process_signs() {
        let signer = ClaimSigner::in_process(Keypair::new());
        let signed = signer
            .sign(unsigned(&signer.pubkey()), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(signed.is_signed());
        signed.verify().unwrap();
    }

    #[tokio::test]
    async fn test_wrong_fee_payer_rejected() {
        let signer = ClaimSigner::in_process(Keypair::new());
        let err = signer
            .sign(unsigned(&Pubkey::new_unique()), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ClaimError::SignerMismatch { .. }));
    }

    #[tokio::test]
    async fn test_redirect_round_trip() {
        let signer = redirect(Keypair::new(), false, Duration::from_millis(10));
        let signed = signer
            .sign(unsigned(&signer.pubkey()), Duration::from_secs(1))
            .await
            .unwrap();
        signed.verify().unwrap();
    }

    #[tokio::test]
    async fn test_redirect_tamper_detected() {
        let signer = redirect(Keypair::new(), true, Duration::ZERO);
        let err = signer
            .sign(unsigned(&signer.pubkey()), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ClaimError::SignerTampered));
    }

    #[tokio::test(start_paused = true)]
    async fn test_redirect_timeout() {
        let signer = redirect(Keypair::new(), false, Duration::from_secs(600));
        let err = signer
            .sign(unsigned(&signer.pubkey()), Duration::from_secs(120))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClaimError::Timeout {
                operation: "wallet signature"
            }
        ));
    }
}
