//! Harvester - Reward Scanner, Claimer and Swap Bundler
//!
//! Run with: cargo run -- <command>
//!
//! Finds every reward position an address holds across the chain's reward
//! vaults, the fee staker and validator boosts, claims them, and sells the
//! proceeds into one target token in a single atomic bundle.

use alloy_primitives::Address;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod bundle;
mod chain;
mod config;
mod error;
mod journal;
mod metadata;
mod pricing;
mod rewards;
mod scanner;
mod tokens;
mod types;

use bundle::{ApprovalReconciler, BundleExecutor, BundleResult, HttpQuoteSource, SwapBundle, SwapBundleBuilder, SwapRequest};
use chain::{ChainClient, ChainReader, RpcChain, WalletManager};
use config::{Config, ExecutionMode};
use error::HarvestError;
use journal::{ActivityEntry, ActivityLog};
use metadata::MetadataClient;
use pricing::{HttpPriceFeed, PriceOracle};
use rewards::{ClaimResult, RewardAggregator, RewardSummary};
use scanner::{BoostScanner, VaultScanner};
use tokens::{format_amount, normalize_address, short_address};
use types::SourceKind;

#[derive(Parser)]
#[command(name = "harvester", version, about = "Scan, claim and swap staking rewards")]
struct Cli {
    /// TOML config file; the environment (and .env) is used when absent
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override EXECUTION_MODE (simulation | dry_run | production)
    #[arg(long, global = true)]
    mode: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List vault, fee-staker and validator-boost positions
    Scan {
        /// Defaults to the signer address
        #[arg(long)]
        owner: Option<String>,
    },

    /// Claim pending rewards
    Claim {
        #[arg(long)]
        owner: Option<String>,
        /// Only claim these vaults (all claimable vaults when none given)
        #[arg(long = "vault")]
        vaults: Vec<String>,
        /// Include the fee staker when vaults are selected
        #[arg(long)]
        fee_staker: bool,
    },

    /// Sell tokens into one target token in a single bundle
    Swap {
        /// `<address|native>:<amount>`, repeatable
        #[arg(long = "token", required = true)]
        tokens: Vec<String>,
        #[arg(long)]
        target: String,
        #[arg(long)]
        auto_approve: bool,
    },

    /// Check the owner's allowance to the bundler
    Approval {
        #[arg(long)]
        token: String,
        #[arg(long)]
        amount: String,
        #[arg(long)]
        owner: Option<String>,
    },

    /// Approve the bundler (unlimited unless an amount is given)
    Approve {
        #[arg(long)]
        token: String,
        #[arg(long)]
        amount: Option<String>,
    },

    /// Reset the bundler's allowance to zero
    Revoke {
        #[arg(long)]
        token: String,
    },

    /// Print the configuration summary
    Config,
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!("{}", style(" 🌾 HARVESTER - Rewards Scanner & Swap Bundler").cyan().bold());
    println!("{}", style("    Vaults | Fee Staker | Validator Boosts | Bundles").cyan());
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed}]")?);
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    Ok(bar)
}

fn parse_address(input: &str, what: &str) -> Result<Address> {
    normalize_address(input).ok_or_else(|| eyre!("invalid {} address: {}", what, input))
}

/// Connections and collaborators shared by every command
struct App {
    config: Config,
    client: Arc<dyn ChainClient>,
    reader: Arc<ChainReader>,
    metadata: Option<MetadataClient>,
    journal: ActivityLog,
}

impl App {
    async fn connect(config: Config) -> Result<Self> {
        let wallet = WalletManager::from_key(config.private_key.as_deref(), config.chain_id);
        let rpc = RpcChain::connect(&config.rpc_url, &wallet, config.receipt_timeout())?;
        let block = rpc.block_number().await?;
        info!(
            "Connected to chain {} at block {} (signer: {})",
            wallet.chain_id(),
            block,
            if wallet.has_signer() { "yes" } else { "read-only" }
        );
        let client: Arc<dyn ChainClient> = Arc::new(rpc);

        let metadata = match config.metadata_base_url {
            Some(ref url) => Some(MetadataClient::new(url.clone())?),
            None => None,
        };

        let directory = match metadata {
            Some(ref m) => m.fetch_tokens().await.unwrap_or_else(|e| {
                warn!("Token directory unavailable, falling back to on-chain reads: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        };
        info!("Token directory: {} tokens", directory.len());

        let reader = Arc::new(
            ChainReader::new(client.clone())
                .with_token_directory(directory)
                .with_retry_policy(config.retry_policy()),
        );
        let journal = ActivityLog::new(config.activity_log, config.activity_log_path.clone());

        Ok(Self { config, client, reader, metadata, journal })
    }

    fn owner(&self, explicit: Option<&str>) -> Result<Address> {
        match explicit {
            Some(raw) => parse_address(raw, "owner"),
            None => self
                .client
                .sender()
                .ok_or_else(|| HarvestError::Configuration("no --owner given and no PRIVATE_KEY set".into()).into()),
        }
    }

    fn approvals(&self) -> Arc<ApprovalReconciler> {
        Arc::new(ApprovalReconciler::new(self.reader.clone()))
    }

    fn aggregator(&self) -> Result<RewardAggregator> {
        let feed = Arc::new(HttpPriceFeed::new(self.config.price_api_url.clone())?);
        let prices = Arc::new(PriceOracle::new(feed, self.config.wrapped_native(), self.config.price_ttl()));
        let vaults = VaultScanner::new(self.reader.clone(), self.config.retry_policy(), self.config.vault_scanner());

        let mut aggregator = RewardAggregator::new(self.reader.clone(), vaults, prices, self.config.execution_mode)
            .with_fee_staker(self.config.fee_staker());

        if let Some(boost_token) = self.config.boost_contract() {
            aggregator = aggregator.with_boosts(BoostScanner::new(
                self.reader.clone(),
                boost_token,
                self.config.retry_policy(),
                self.config.validator_scanner(),
            ));
        }
        Ok(aggregator)
    }

    async fn scan(&self, owner: Address) -> Result<RewardSummary> {
        let url = self.config.metadata_url()?;
        let metadata = self
            .metadata
            .as_ref()
            .ok_or_else(|| eyre!("metadata client for {} was not created", url))?;

        let bar = spinner("Fetching vault and validator directory...")?;
        let (vaults, validators) = tokio::try_join!(metadata.fetch_vaults(), metadata.fetch_validators())?;

        bar.set_message(format!("Scanning {} vaults and {} validators...", vaults.len(), validators.len()));
        let summary = self.aggregator()?.scan(owner, &vaults, &validators).await;
        bar.finish_and_clear();

        Ok(summary)
    }
}

// =============================================
// OUTPUT
// =============================================

fn print_summary(summary: &RewardSummary) {
    println!();
    println!("{}", style(format!("═══ POSITIONS OF {:?} ═══", summary.owner)).blue().bold());

    if summary.positions.is_empty() {
        println!("   No positions found");
    }
    for p in &summary.positions {
        let price = p.price_usd.map(|_| format!("${:.2}", p.value_usd())).unwrap_or_else(|| "no price".to_string());
        println!(
            "   {} {:<28} staked {} {} | earned {} {} ({}) | share {:.4}%",
            style("•").green(),
            p.name.clone().unwrap_or_else(|| p.id()),
            format_amount(p.raw_stake_amount, p.stake_token.decimals),
            p.stake_token.symbol,
            format_amount(p.raw_earned_amount, p.reward_token.decimals),
            p.reward_token.symbol,
            price,
            p.pool_share() * 100.0
        );
    }

    if !summary.boosts.is_empty() {
        println!();
        println!("{}", style("═══ VALIDATOR BOOSTS ═══").blue().bold());
        for b in &summary.boosts {
            let share = b.share().map(|s| format!("{:.4}%", s * 100.0)).unwrap_or_else(|| "-".to_string());
            println!(
                "   {} {:<28} boosted {} | queued {} | share {}",
                style("•").green(),
                b.validator_name,
                format_amount(b.boosted_amount, 18),
                format_amount(b.queued_amount, 18),
                share
            );
        }
    }

    if !summary.failed.is_empty() {
        println!();
        println!("{} {} candidates could not be read:", style("⚠").yellow(), summary.failed.len());
        for f in &summary.failed {
            println!("     {}", f);
        }
    }

    println!();
    println!(
        "{} Claimable: {} positions worth ${:.2}",
        style("✓").green(),
        summary.claimable().len(),
        summary.total_value_usd()
    );
}

fn print_claim(result: &ClaimResult) {
    println!();
    for op in &result.per_operation_results {
        match (&op.error, op.tx_hash) {
            (None, Some(hash)) => println!("   {} {} {:?}", style("✓").green(), op.label, hash),
            (None, None) => println!("   {} {}", style("✓").green(), op.label),
            (Some(e), _) => println!("   {} {}: {}", style("✗").red(), op.label, e),
        }
    }
    println!();
    println!(
        "{} Claimed {} positions (${:.2}), {} still claimable{}",
        if result.aggregate_success { style("✓").green() } else { style("✗").red() },
        result.claimed_rewards.len(),
        result.total_value_usd,
        result.still_claimable.len(),
        if result.simulated { " [not submitted]" } else { "" }
    );
}

fn print_bundle(bundle: &SwapBundle) {
    println!();
    println!("{}", style(format!("═══ BUNDLE: {} ═══", bundle.describe())).blue().bold());
    for op in &bundle.operations {
        println!(
            "   {} {} {} -> {}",
            style("•").cyan(),
            op.kind,
            short_address(&op.token_address),
            short_address(&op.target)
        );
    }
    for skipped in &bundle.skipped {
        println!("   {} skipped {}: {}", style("⚠").yellow(), short_address(&skipped.token), skipped.reason);
    }
    for approval in &bundle.approvals_needed {
        println!(
            "   {} needs approval: {} (allowance {}, required {})",
            style("⚠").yellow(),
            short_address(&approval.token_address),
            approval.current_allowance,
            approval.required_amount
        );
    }
    println!(
        "   Expected output: ~{:.6} {}",
        bundle.total_expected_output, bundle.target_token.symbol
    );
}

fn print_bundle_result(result: &BundleResult) {
    println!();
    match (&result.error, result.tx_hash()) {
        (None, Some(hash)) => println!("{} Bundle confirmed: {:?}", style("✓").green(), hash),
        (None, None) => println!("{} Bundle would succeed [not submitted]", style("✓").green()),
        (Some(e), hash) => {
            println!("{} Bundle failed: {}", style("✗").red(), e);
            if let Some(hash) = hash {
                println!("   tx: {:?}", hash);
            }
        }
    }
}

// =============================================
// COMMANDS
// =============================================

async fn run_claim(app: &App, owner: Address, vaults: &[String], fee_staker: bool) -> Result<()> {
    let summary = app.scan(owner).await?;
    print_summary(&summary);

    let selected_vaults = vaults
        .iter()
        .map(|v| parse_address(v, "vault"))
        .collect::<Result<Vec<_>>>()?;

    let selected: Vec<_> = summary
        .claimable()
        .into_iter()
        .filter(|p| {
            selected_vaults.is_empty()
                || selected_vaults.contains(&p.contract_address)
                || (fee_staker && p.source_kind == SourceKind::FeeStaker)
        })
        .collect();

    if selected.is_empty() {
        println!("{} Nothing to claim", style("✓").green());
        return Ok(());
    }

    let result = app.aggregator()?.claim(owner, &selected).await;
    print_claim(&result);

    if !result.simulated {
        app.journal.record(&ActivityEntry::from_claim(&result));
    }
    Ok(())
}

async fn run_swap(app: &App, tokens: &[String], target: &str, auto_approve: bool) -> Result<()> {
    let requests = tokens
        .iter()
        .map(|t| SwapRequest::parse(t).ok_or_else(|| eyre!("expected <token>:<amount>, got {}", t)))
        .collect::<Result<Vec<_>>>()?;

    let owner = app.owner(None)?;
    let bundler = app.config.bundler()?;
    let approvals = app.approvals();
    let quotes = Arc::new(HttpQuoteSource::new(
        app.config.swap_api_url.clone(),
        app.config.swap_api_key.clone(),
    )?);

    let builder = SwapBundleBuilder::new(
        app.reader.clone(),
        quotes,
        approvals.clone(),
        bundler,
        app.config.slippage,
        app.config.quote_policy(),
    );

    let bar = spinner(&format!("Quoting {} tokens...", requests.len()))?;
    let bundle = builder
        .build(owner, &requests, target)
        .await
        .with_auto_approve(auto_approve || app.config.auto_approve);
    bar.finish_and_clear();

    if let Some(ref e) = bundle.error {
        error!("Bundle could not be built: {}", e);
        return Err(eyre!("{}", e));
    }
    print_bundle(&bundle);

    if bundle.is_empty() {
        println!("{} Nothing to swap", style("⚠").yellow());
        return Ok(());
    }

    let executor = BundleExecutor::new(
        app.client.clone(),
        approvals,
        bundler,
        app.config.execution_mode,
        app.config.gas_limits(),
    );
    let result = executor.execute(&bundle).await;
    print_bundle_result(&result);

    if !result.simulated {
        app.journal.record(&ActivityEntry::from_bundle(&result));
    }
    Ok(())
}

async fn run_approval(app: &App, token: &str, amount: &str, owner: Option<&str>) -> Result<()> {
    let token = parse_address(token, "token")?;
    let owner = app.owner(owner)?;
    let bundler = app.config.bundler()?;

    let status = app.approvals().check(token, owner, bundler, amount).await?;
    let marker = if status.sufficient() { style("✓").green() } else { style("✗").red() };
    println!(
        "{} {} allowance to bundler: {} (required {})",
        marker,
        short_address(&token),
        status.current_allowance,
        status.required_amount
    );
    Ok(())
}

async fn run_allowance_change(app: &App, token: &str, amount: Option<&str>, revoke: bool) -> Result<()> {
    let token = parse_address(token, "token")?;
    let bundler = app.config.bundler()?;

    if app.config.execution_mode != ExecutionMode::Production {
        let what = if revoke {
            "revoke".to_string()
        } else {
            format!("approve {}", amount.unwrap_or("unlimited"))
        };
        println!(
            "{} Would {} {} for {:?} [{}]",
            style("⚠").yellow(),
            what,
            short_address(&token),
            bundler,
            app.config.execution_mode
        );
        return Ok(());
    }

    let approvals = app.approvals();
    let result = if revoke {
        approvals.revoke(token, bundler).await
    } else {
        approvals.approve(token, bundler, amount).await
    };

    match result.error {
        None => println!("{} {} {:?}", style("✓").green(), result.label, result.tx_hash.unwrap_or_default()),
        Some(ref e) => println!("{} {}: {}", style("✗").red(), result.label, e),
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match cli.config {
        Some(ref path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(ref mode) = cli.mode {
        config.execution_mode = mode.parse()?;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("harvester=info".parse()?))
        .init();

    let cli = Cli::parse();
    print_banner();

    let config = load_config(&cli)?;

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your .env file");
        return Err(e);
    }

    if let Command::Config = cli.command {
        config.print_summary();
        return Ok(());
    }

    if config.execution_mode == ExecutionMode::Production {
        println!("{}", style("⚠️  PRODUCTION MODE: transactions will be submitted").red().bold());
        println!();
    }

    let app = App::connect(config).await?;

    match cli.command {
        Command::Scan { owner } => {
            let owner = app.owner(owner.as_deref())?;
            let summary = app.scan(owner).await?;
            print_summary(&summary);
        }
        Command::Claim { owner, vaults, fee_staker } => {
            let owner = app.owner(owner.as_deref())?;
            run_claim(&app, owner, &vaults, fee_staker).await?;
        }
        Command::Swap { tokens, target, auto_approve } => {
            run_swap(&app, &tokens, &target, auto_approve).await?;
        }
        Command::Approval { token, amount, owner } => {
            run_approval(&app, &token, &amount, owner.as_deref()).await?;
        }
        Command::Approve { token, amount } => {
            run_allowance_change(&app, &token, amount.as_deref(), false).await?;
        }
        Command::Revoke { token } => {
            run_allowance_change(&app, &token, None, true).await?;
        }
        Command::Config => {}
    }
    Ok(())
}
