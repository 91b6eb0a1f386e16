use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::pda::GrantCoordinates;

pub const DEFAULT_CLUSTER: &str = "localnet";

pub const ENV_RPC_URL: &str = "GRANT_RPC_URL";
pub const ENV_PROGRAM_ID: &str = "GRANT_PROGRAM_ID";
pub const ENV_POP_AUTHORITY_URL: &str = "GRANT_POP_AUTHORITY_URL";
pub const ENV_EVENT_ID: &str = "GRANT_EVENT_ID";
pub const ENV_CLUSTER: &str = "GRANT_CLUSTER";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustedDeployment {
    pub cluster: &'static str,
    pub default_rpc_url: &'static str,
    /// Production clusters skip diagnostic simulation
    pub production: bool,
}

pub const TRUSTED_DEPLOYMENTS: [TrustedDeployment; 3] = [
    TrustedDeployment {
        cluster: DEFAULT_CLUSTER,
        default_rpc_url: "http://127.0.0.1:8899",
        production: false,
    },
    TrustedDeployment {
        cluster: "devnet",
        default_rpc_url: "https://api.devnet.solana.com",
        production: false,
    },
    TrustedDeployment {
        cluster: "mainnet-beta",
        default_rpc_url: "https://api.mainnet-beta.solana.com",
        production: true,
    },
];

pub fn require_allowlisted_deployment(
    cluster: &str,
) -> Result<&'static TrustedDeployment, ConfigError> {
    TRUSTED_DEPLOYMENTS
        .iter()
        .find(|deployment| deployment.cluster == cluster)
        .ok_or_else(|| ConfigError::ClusterNotAllowlisted {
            cluster: cluster.to_string(),
        })
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cluster {cluster:?} is not an allowlisted deployment")]
    ClusterNotAllowlisted { cluster: String },

    #[error("{field} is not a valid public key: {value:?}")]
    InvalidPubkey { field: &'static str, value: String },

    #[error("{field} is required")]
    Missing { field: &'static str },

    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Attempt caps, backoff and timeouts for the submit pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubmitPolicy {
    /// Run a diagnostic simulation before sending
    pub simulate: bool,
    pub skip_preflight: bool,
    /// Retries the RPC node itself performs per send
    pub rpc_max_retries: Option<usize>,
    pub max_send_attempts: u32,
    /// Linear backoff step between send attempts
    pub send_backoff_ms: u64,
    pub confirm_timeout_ms: u64,
    pub confirm_poll_interval_ms: u64,
    pub fallback_poll_attempts: u32,
    pub rpc_timeout_ms: u64,
    pub proof_timeout_ms: u64,
    pub signer_timeout_ms: u64,
}

impl Default for SubmitPolicy {
    fn default() -> Self {
        Self {
            simulate: true,
            skip_preflight: false,
            rpc_max_retries: Some(0),
            max_send_attempts: 3,
            send_backoff_ms: 500,
            confirm_timeout_ms: 60_000,
            confirm_poll_interval_ms: 1_000,
            fallback_poll_attempts: 10,
            rpc_timeout_ms: 30_000,
            proof_timeout_ms: 15_000,
            signer_timeout_ms: 120_000,
        }
    }
}

impl SubmitPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.send_backoff_ms.saturating_mul(u64::from(attempt)))
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirm_poll_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn proof_timeout(&self) -> Duration {
        Duration::from_millis(self.proof_timeout_ms)
    }

    pub fn signer_timeout(&self) -> Duration {
        Duration::from_millis(self.signer_timeout_ms)
    }
}

/// Sizing of the initial supply minted by the issuer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BootstrapPolicy {
    pub safety_multiplier: u64,
    pub expected_claimants: u64,
    pub expected_periods: u64,
}

impl Default for BootstrapPolicy {
    fn default() -> Self {
        Self {
            safety_multiplier: 2,
            expected_claimants: 10,
            expected_periods: 12,
        }
    }
}

impl BootstrapPolicy {
    /// `amount_per_period * multiplier * claimants * periods`, each factor at
    /// least 1. `None` on overflow.
    pub fn bootstrap_amount(&self, amount_per_period: u64) -> Option<u64> {
        [
            self.safety_multiplier,
            self.expected_claimants,
            self.expected_periods,
        ]
        .iter()
        .try_fold(amount_per_period, |acc, factor| acc.checked_mul((*factor).max(1)))
    }
}

/// Grant used when a claim names no coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultGrant {
    pub authority: String,
    pub mint: String,
    pub grant_id: u64,
}

impl DefaultGrant {
    pub fn coordinates(&self) -> Result<GrantCoordinates, ConfigError> {
        Ok(GrantCoordinates {
            authority: parse_pubkey("defaultGrant.authority", &self.authority)?,
            mint: parse_pubkey("defaultGrant.mint", &self.mint)?,
            grant_id: self.grant_id,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    pub cluster: String,
    pub rpc_url: Option<String>,
    pub program_id: Option<String>,
    pub pop_authority_url: Option<String>,
    pub event_id: String,
    pub default_grant: Option<DefaultGrant>,
    pub submit: SubmitPolicy,
    pub bootstrap: BootstrapPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cluster: DEFAULT_CLUSTER.to_string(),
            rpc_url: None,
            program_id: None,
            pop_authority_url: None,
            event_id: "default".to_string(),
            default_grant: None,
            submit: SubmitPolicy::default(),
            bootstrap: BootstrapPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay `GRANT_*` environment variables onto `self`.
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(cluster) = lookup(ENV_CLUSTER) {
            self.cluster = cluster;
        }
        if let Some(url) = lookup(ENV_RPC_URL) {
            self.rpc_url = Some(url);
        }
        if let Some(id) = lookup(ENV_PROGRAM_ID) {
            self.program_id = Some(id);
        }
        if let Some(url) = lookup(ENV_POP_AUTHORITY_URL) {
            self.pop_authority_url = Some(url);
        }
        if let Some(event_id) = lookup(ENV_EVENT_ID) {
            self.event_id = event_id;
        }
        self
    }

    pub fn deployment(&self) -> Result<&'static TrustedDeployment, ConfigError> {
        require_allowlisted_deployment(&self.cluster)
    }

    pub fn rpc_url(&self) -> Result<String, ConfigError> {
        match &self.rpc_url {
            Some(url) => Ok(url.clone()),
            None => Ok(self.deployment()?.default_rpc_url.to_string()),
        }
    }

    pub fn program_id(&self) -> Result<Pubkey, ConfigError> {
        match &self.program_id {
            Some(value) => parse_pubkey("programId", value),
            None => Ok(grant_program::ID),
        }
    }

    pub fn default_coordinates(&self) -> Result<Option<GrantCoordinates>, ConfigError> {
        self.default_grant
            .as_ref()
            .map(DefaultGrant::coordinates)
            .transpose()
    }

    /// Submit policy with simulation forced off on production clusters.
    pub fn effective_submit_policy(&self) -> Result<SubmitPolicy, ConfigError> {
        let mut policy = self.submit.clone();
        if self.deployment()?.production {
            policy.simulate = false;
        }
        Ok(policy)
    }
}

pub fn parse_pubkey(field: &'static str, value: &str) -> Result<Pubkey, ConfigError> {
    Pubkey::from_str(value).map_err(|_| ConfigError::InvalidPubkey {
        field,
        value: value.to_string(),
    })
}
