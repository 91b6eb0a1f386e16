//! grant-client
//!
//! Command line front end for claimers and organizers of recurring grants.
//!
//! Usage:
//!   grant-client derive  --authority <pk> --mint <pk> --grant-id <n> [--claimer <pk> --period <n>]
//!   grant-client period  --start <unix_ts> --length <secs> [--now <unix_ts>]
//!   grant-client status  --claimer <pk> [grant]
//!   grant-client claim   --keypair <path> [grant] [--allowlist <members.json>]
//!   grant-client issue   --keypair <path> --amount <n> --period <secs> --grant-id <n> [...]
//!   grant-client fund | pause | allowlist-root | close   (organizer administration)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{read_keypair_file, Keypair, Signer};
use tracing::info;

use grant_client::config::parse_pubkey;
use grant_client::instructions::GrantTerms;
use grant_client::ledger::LedgerRpc;
use grant_client::{
    AddressDeriver, AllowlistTree, ClaimClient, ClaimRequest, ClaimSigner, ClientConfig,
    GrantCoordinates, GrantIssuer, GrantParams, HttpPopAuthority, LocalPopAuthority, PeriodClock,
    PopAuthority, PopVersion, SolanaLedger, TransactionSubmitter,
};

// ── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "grant-client",
    version,
    about = "Claim and administer recurring token grants"
)]
struct Cli {
    /// JSON client configuration.
    #[arg(long, global = true, env = "GRANT_CONFIG")]
    config: Option<PathBuf>,

    /// Cluster name; must be an allowlisted deployment.
    #[arg(long, global = true)]
    cluster: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone, Default)]
struct GrantArgs {
    /// Grant authority (base-58).
    #[arg(long)]
    authority: Option<String>,
    /// Funding mint (base-58).
    #[arg(long)]
    mint: Option<String>,
    #[arg(long)]
    grant_id: Option<u64>,
}

impl GrantArgs {
    /// `None` when no coordinate was given; all three are needed otherwise.
    fn coordinates(&self) -> anyhow::Result<Option<GrantCoordinates>> {
        match (&self.authority, &self.mint, self.grant_id) {
            (None, None, None) => Ok(None),
            (Some(authority), Some(mint), Some(grant_id)) => Ok(Some(GrantCoordinates {
                authority: parse_pubkey("authority", authority)?,
                mint: parse_pubkey("mint", mint)?,
                grant_id,
            })),
            _ => bail!("--authority, --mint and --grant-id must be given together"),
        }
    }

    fn require(&self) -> anyhow::Result<GrantCoordinates> {
        self.coordinates()?
            .context("grant coordinates (--authority, --mint, --grant-id) are required")
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the program addresses of a grant.
    Derive {
        #[command(flatten)]
        grant: GrantArgs,
        /// Also derive the receipt for this claimer.
        #[arg(long)]
        claimer: Option<String>,
        #[arg(long, default_value_t = 0)]
        period: u64,
    },

    /// Compute the period index for a schedule.
    Period {
        #[arg(long)]
        start: i64,
        #[arg(long)]
        length: i64,
        /// Defaults to the current time.
        #[arg(long)]
        now: Option<i64>,
    },

    /// Show whether a claimer has been paid this period.
    Status {
        #[arg(long)]
        claimer: String,
        #[command(flatten)]
        grant: GrantArgs,
    },

    /// Claim the current period's allotment.
    Claim {
        /// Claimer keypair file.
        #[arg(long)]
        keypair: PathBuf,
        #[command(flatten)]
        grant: GrantArgs,
        /// JSON array of allowlisted members, for allowlisted grants.
        #[arg(long)]
        allowlist: Option<PathBuf>,
        /// Sign proofs in-process with this key instead of calling the PoP authority.
        #[arg(long)]
        local_pop_signer: Option<PathBuf>,
    },

    /// Create a funding token (unless --mint is given) and a funded grant.
    Issue {
        /// Organizer keypair file; becomes the grant authority.
        #[arg(long)]
        keypair: PathBuf,
        /// Existing mint to fund from; a new one is created otherwise.
        #[arg(long)]
        mint: Option<String>,
        #[arg(long)]
        grant_id: u64,
        /// Base units paid per claim.
        #[arg(long)]
        amount: u64,
        /// Period length in seconds.
        #[arg(long, default_value_t = grant_program::state::DEFAULT_PERIOD_SECONDS)]
        period: i64,
        /// Start timestamp; defaults to now.
        #[arg(long)]
        start: Option<i64>,
        /// Expiry timestamp; 0 = never.
        #[arg(long, default_value_t = 0)]
        expires: i64,
        #[arg(long, default_value_t = 6)]
        decimals: u8,
        /// Initial vault funding, at least amount-per-period times the safety
        /// multiplier; defaults to the bootstrap policy.
        #[arg(long)]
        fund: Option<u64>,
        /// Trusted PoP signer to install for this authority.
        #[arg(long)]
        pop_signer: Option<String>,
    },

    /// Top up a grant vault from the funder's token account.
    Fund {
        #[arg(long)]
        keypair: PathBuf,
        #[command(flatten)]
        grant: GrantArgs,
        #[arg(long)]
        amount: u64,
    },

    /// Pause or resume claims.
    Pause {
        #[arg(long)]
        keypair: PathBuf,
        #[command(flatten)]
        grant: GrantArgs,
        #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
        paused: bool,
    },

    /// Build an allowlist from a JSON member list and store its root.
    AllowlistRoot {
        #[arg(long)]
        keypair: PathBuf,
        #[command(flatten)]
        grant: GrantArgs,
        #[arg(long)]
        members: PathBuf,
        /// Print the root without sending it.
        #[arg(long)]
        dry_run: bool,
    },

    /// Refund the vault and close the grant.
    Close {
        #[arg(long)]
        keypair: PathBuf,
        #[command(flatten)]
        grant: GrantArgs,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("grant_client=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    }
    .with_env();
    if let Some(cluster) = &cli.cluster {
        config.cluster = cluster.clone();
    }
    let deployment = config.deployment()?;
    info!(cluster = deployment.cluster, production = deployment.production, "configuration loaded");

    match cli.command {
        Command::Derive {
            grant,
            claimer,
            period,
        } => cmd_derive(&config, &grant, claimer.as_deref(), period),

        Command::Period { start, length, now } => {
            let clock = PeriodClock::new(start, length)?;
            let now = now.unwrap_or_else(grant_client::period::unix_now);
            let index = clock.period_index(now)?;
            println!("Period index:  {index}");
            println!("Next eligible: {}", clock.next_eligible_time(index)?);
            Ok(())
        }

        Command::Status { claimer, grant } => {
            let claimer = parse_pubkey("claimer", &claimer)?;
            let ledger = connect(&config)?;
            // Status never requests a proof.
            let authority: Arc<dyn PopAuthority> = Arc::new(HttpPopAuthority::new(
                config.pop_authority_url.clone().unwrap_or_default(),
            ));
            let client = ClaimClient::new(&config, ledger, authority)?;
            let status = client.status(grant.coordinates()?, &claimer).await?;
            println!("Grant:          {}", status.grant);
            println!("Period index:   {}", status.period_index);
            println!("Claimed:        {}", status.claimed);
            println!("Receipt:        {}", status.receipt);
            println!("Next eligible:  {}", status.next_eligible_at);
            println!("Amount/period:  {}", status.amount_per_period);
            match status.vault_balance {
                Some(balance) => println!("Vault balance:  {balance}"),
                None => println!("Vault balance:  (missing)"),
            }
            println!("Paused:         {}", status.paused);
            println!("Allowlisted:    {}", status.allowlist_enabled);
            Ok(())
        }

        Command::Claim {
            keypair,
            grant,
            allowlist,
            local_pop_signer,
        } => {
            let keypair = load_keypair(&keypair)?;
            let ledger = connect(&config)?;
            let local = local_pop_signer.as_deref().map(load_keypair).transpose()?;
            let authority = pop_authority(&config, &ledger, local)?;
            let client = ClaimClient::new(&config, ledger, authority)?;

            let mut request = ClaimRequest::new(keypair.pubkey());
            request.coordinates = grant.coordinates()?;
            if let Some(path) = allowlist {
                let tree = AllowlistTree::new(&read_members(&path)?)?;
                request = request.with_allowlist_proof(tree.proof(&keypair.pubkey())?);
            }

            let signer = ClaimSigner::in_process(keypair);
            match client.claim(&request, &signer).await {
                Ok(outcome) => {
                    println!("Claimed {} for period {}", outcome.amount, outcome.period_index);
                    println!("Signature: {}", outcome.signature);
                    println!("Receipt:   {}", outcome.receipt);
                    Ok(())
                }
                Err(err) => {
                    eprintln!("{}", err.user_message());
                    Err(err.into())
                }
            }
        }

        Command::Issue {
            keypair,
            mint,
            grant_id,
            amount,
            period,
            start,
            expires,
            decimals,
            fund,
            pop_signer,
        } => {
            let authority = load_keypair(&keypair)?;
            let issuer = issuer(&config)?;
            let mint = match mint {
                Some(mint) => parse_pubkey("mint", &mint)?,
                None => {
                    let mint = Keypair::new();
                    let token = issuer.create_token(&authority, &mint, decimals, amount).await?;
                    println!("Mint:          {}", token.mint);
                    println!("Token account: {}", token.token_account);
                    println!("Supply:        {}", token.supply);
                    token.mint
                }
            };
            let params = GrantParams {
                grant_id,
                terms: GrantTerms {
                    amount_per_period: amount,
                    period_seconds: period,
                    start_ts: start.unwrap_or_else(grant_client::period::unix_now),
                    expires_at: expires,
                },
                fund_amount: fund,
                pop_signer: pop_signer
                    .map(|value| parse_pubkey("pop-signer", &value))
                    .transpose()?,
            };
            let setup = issuer.create_grant(&authority, mint, &params).await?;
            println!("Grant:     {}", setup.grant);
            println!("Vault:     {}", setup.vault);
            println!("Funded:    {}", setup.funded);
            println!("Signature: {}", setup.signature);
            Ok(())
        }

        Command::Fund {
            keypair,
            grant,
            amount,
        } => {
            let funder = load_keypair(&keypair)?;
            let signature = issuer(&config)?
                .fund(&funder, &grant.require()?, amount)
                .await?;
            println!("Funded {amount}: {signature}");
            Ok(())
        }

        Command::Pause {
            keypair,
            grant,
            paused,
        } => {
            let authority = load_keypair(&keypair)?;
            let signature = issuer(&config)?
                .set_paused(&authority, &grant.require()?, paused)
                .await?;
            println!("Paused={paused}: {signature}");
            Ok(())
        }

        Command::AllowlistRoot {
            keypair,
            grant,
            members,
            dry_run,
        } => {
            let tree = AllowlistTree::new(&read_members(&members)?)?;
            println!("Members: {}", tree.len());
            println!("Root:    {}", hex::encode(tree.root()));
            if dry_run {
                return Ok(());
            }
            let authority = load_keypair(&keypair)?;
            let signature = issuer(&config)?
                .set_allowlist_root(&authority, &grant.require()?, tree.root())
                .await?;
            println!("Signature: {signature}");
            Ok(())
        }

        Command::Close { keypair, grant } => {
            let authority = load_keypair(&keypair)?;
            let signature = issuer(&config)?
                .close_grant(&authority, &grant.require()?)
                .await?;
            println!("Closed: {signature}");
            Ok(())
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn cmd_derive(
    config: &ClientConfig,
    grant: &GrantArgs,
    claimer: Option<&str>,
    period: u64,
) -> anyhow::Result<()> {
    let deriver = AddressDeriver::new(config.program_id()?);
    let coordinates = match grant.coordinates()? {
        Some(coordinates) => coordinates,
        None => config
            .default_coordinates()?
            .context("no grant coordinates given and no default grant configured")?,
    };
    let (grant_address, bump) = deriver.grant_at(&coordinates)?;
    println!("Program:    {}", deriver.program_id());
    println!("Grant:      {grant_address} (bump {bump})");
    println!("Vault:      {}", deriver.vault(&grant_address)?.0);
    println!("PoP state:  {}", deriver.pop_state(&grant_address)?.0);
    println!("PoP config: {}", deriver.pop_config(&coordinates.authority)?.0);
    if let Some(claimer) = claimer {
        let claimer = parse_pubkey("claimer", claimer)?;
        println!(
            "Receipt:    {} (period {period})",
            deriver.receipt(&grant_address, &claimer, period)?.0
        );
    }
    Ok(())
}

fn connect(config: &ClientConfig) -> anyhow::Result<Arc<dyn LedgerRpc>> {
    let timeout = config.submit.rpc_timeout();
    Ok(Arc::new(SolanaLedger::new(config.rpc_url()?, timeout)))
}

fn pop_authority(
    config: &ClientConfig,
    ledger: &Arc<dyn LedgerRpc>,
    local_signer: Option<Keypair>,
) -> anyhow::Result<Arc<dyn PopAuthority>> {
    if let Some(signer) = local_signer {
        if config.deployment()?.production {
            bail!("in-process PoP signing is not allowed on {}", config.cluster);
        }
        return Ok(Arc::new(LocalPopAuthority::new(
            signer,
            PopVersion::V2,
            ledger.clone(),
            AddressDeriver::new(config.program_id()?),
        )));
    }
    match &config.pop_authority_url {
        Some(url) => Ok(Arc::new(HttpPopAuthority::new(url.clone()))),
        None => Err(grant_client::ConfigError::Missing {
            field: "popAuthorityUrl",
        }
        .into()),
    }
}

fn issuer(config: &ClientConfig) -> anyhow::Result<GrantIssuer> {
    let ledger = connect(config)?;
    let submitter = TransactionSubmitter::new(ledger.clone(), config.effective_submit_policy()?);
    Ok(GrantIssuer::new(
        ledger,
        AddressDeriver::new(config.program_id()?),
        config.bootstrap.clone(),
        submitter,
    ))
}

fn load_keypair(path: &Path) -> anyhow::Result<Keypair> {
    read_keypair_file(path)
        .map_err(|err| anyhow::anyhow!("reading keypair {}: {err}", path.display()))
}

fn read_members(path: &Path) -> anyhow::Result<Vec<Pubkey>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading allowlist {}", path.display()))?;
    let members: Vec<String> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing allowlist {}", path.display()))?;
    members
        .iter()
        .map(|member| parse_pubkey("allowlist member", member).map_err(Into::into))
        .collect()
}
