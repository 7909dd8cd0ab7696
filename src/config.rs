//! Harvester configuration
//!
//! Loaded from the environment (and `.env`) with typed defaults, or from a
//! TOML file. Secrets are never written back out or printed.

use alloy_primitives::Address;
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::bundle::GasLimits;
use crate::chain::RetryPolicy;
use crate::error::HarvestError;
use crate::scanner::PositionScanner;
use crate::tokens::normalize_address;

// ============================================
// EXECUTION MODE
// ============================================

/// Execution mode determines whether anything is written on-chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionMode {
    /// Build plans and print them; never sends or simulates transactions
    #[default]
    Simulation,

    /// Evaluate bundles with `eth_call` from the owner; nothing is submitted
    DryRun,

    /// Approve, submit and claim for real
    /// CAUTION: This uses real funds!
    Production,
}

impl FromStr for ExecutionMode {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "simulation" | "sim" => Ok(ExecutionMode::Simulation),
            "dry_run" | "dryrun" | "dry-run" => Ok(ExecutionMode::DryRun),
            "production" | "prod" => Ok(ExecutionMode::Production),
            other => Err(eyre::eyre!("unknown execution mode: {}", other)),
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Simulation => write!(f, "SIMULATION"),
            ExecutionMode::DryRun => write!(f, "DRY_RUN"),
            ExecutionMode::Production => write!(f, "PRODUCTION"),
        }
    }
}

// ============================================
// DEFAULTS (Berachain mainnet)
// ============================================

const DEFAULT_RPC_URL: &str = "https://rpc.berachain.com";
const DEFAULT_CHAIN_ID: u64 = 80094;
const DEFAULT_API_URL: &str = "https://mainnet.api.oogabooga.io/v1";

/// BGT: boost accounting lives on the governance token
const DEFAULT_BOOST_CONTRACT: &str = "0x656b95E550C07a9ffe548bd4085c72418Ceb1dba";
/// BGT staker (fee staking)
const DEFAULT_FEE_STAKER: &str = "0x44F07Ce5AfeCbCC406e6beFD40cc2998eEb8c7C6";
const DEFAULT_WRAPPED_NATIVE: &str = "0x6969696969696969696969696969696969696969";

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

// ============================================
// MAIN CONFIGURATION
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // ========== Network ==========
    pub rpc_url: String,
    pub chain_id: u64,

    /// Signing key (KEEP SECRET!). Never serialized.
    #[serde(skip_serializing, default)]
    pub private_key: Option<String>,

    // ========== Contracts ==========
    /// Bundler contract that executes `executeBundle`
    pub bundler_address: Option<String>,
    pub fee_staker_address: Option<String>,
    /// Contract holding validator boost accounting
    pub boost_contract_address: Option<String>,
    /// Wrapped native token, used to price the native token
    pub wrapped_native_address: Option<String>,

    // ========== External APIs ==========
    pub swap_api_url: String,
    #[serde(skip_serializing, default)]
    pub swap_api_key: Option<String>,
    pub price_api_url: String,
    /// Directory serving vaults.json / validators.json / tokens.json
    pub metadata_base_url: Option<String>,

    // ========== Swaps ==========
    /// Slippage tolerance (0.005 = 0.5%)
    pub slippage: f64,
    pub auto_approve: bool,

    // ========== Scanning ==========
    pub vault_batch_size: usize,
    pub validator_batch_size: usize,
    pub batch_delay_ms: u64,

    // ========== Retry ==========
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub quote_max_attempts: u32,

    // ========== Caching ==========
    pub price_cache_ttl_secs: u64,

    // ========== Transactions ==========
    pub bundle_gas_limit: u64,
    pub single_swap_gas_limit: u64,
    pub receipt_timeout_secs: u64,

    // ========== Execution ==========
    pub execution_mode: ExecutionMode,
    /// Append executed bundles and claims to the activity journal
    pub activity_log: bool,
    pub activity_log_path: String,
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let execution_mode = match env_optional("EXECUTION_MODE") {
            Some(mode) => mode.parse()?,
            None => ExecutionMode::Simulation,
        };

        Ok(Self {
            rpc_url: env_string("RPC_URL", DEFAULT_RPC_URL),
            chain_id: env_parse("CHAIN_ID", DEFAULT_CHAIN_ID),
            private_key: env_optional("PRIVATE_KEY"),

            bundler_address: env_optional("BUNDLER_ADDRESS"),
            fee_staker_address: env_optional("FEE_STAKER_ADDRESS").or_else(|| Some(DEFAULT_FEE_STAKER.to_string())),
            boost_contract_address: env_optional("BOOST_CONTRACT_ADDRESS")
                .or_else(|| Some(DEFAULT_BOOST_CONTRACT.to_string())),
            wrapped_native_address: env_optional("WRAPPED_NATIVE_ADDRESS")
                .or_else(|| Some(DEFAULT_WRAPPED_NATIVE.to_string())),

            swap_api_url: env_string("SWAP_API_URL", DEFAULT_API_URL),
            swap_api_key: env_optional("SWAP_API_KEY"),
            price_api_url: env_string("PRICE_API_URL", DEFAULT_API_URL),
            metadata_base_url: env_optional("METADATA_BASE_URL"),

            slippage: env_parse("SLIPPAGE", 0.005),
            auto_approve: env_parse("AUTO_APPROVE", false),

            vault_batch_size: env_parse("VAULT_BATCH_SIZE", 10),
            validator_batch_size: env_parse("VALIDATOR_BATCH_SIZE", 5),
            batch_delay_ms: env_parse("BATCH_DELAY_MS", 100),

            retry_max_attempts: env_parse("RETRY_MAX_ATTEMPTS", 3),
            retry_base_delay_ms: env_parse("RETRY_BASE_DELAY_MS", 100),
            quote_max_attempts: env_parse("QUOTE_MAX_ATTEMPTS", 3),

            price_cache_ttl_secs: env_parse("PRICE_CACHE_TTL_SECS", 60),

            bundle_gas_limit: env_parse("BUNDLE_GAS_LIMIT", 3_000_000),
            single_swap_gas_limit: env_parse("SINGLE_SWAP_GAS_LIMIT", 800_000),
            receipt_timeout_secs: env_parse("RECEIPT_TIMEOUT_SECS", 120),

            execution_mode,
            activity_log: env_parse("ACTIVITY_LOG", true),
            activity_log_path: env_string("ACTIVITY_LOG_PATH", "./logs/activity.jsonl"),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file (secrets are left out)
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration for the selected mode
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(HarvestError::Configuration(msg).into()) };

        if self.rpc_url.trim().is_empty() || self.rpc_url.contains("YOUR_API_KEY") {
            return invalid("Invalid RPC_URL - please set a real endpoint".into());
        }
        if self.vault_batch_size == 0 || self.validator_batch_size == 0 {
            return invalid("VAULT_BATCH_SIZE and VALIDATOR_BATCH_SIZE must be at least 1".into());
        }
        if !(self.slippage > 0.0 && self.slippage <= 0.5) {
            return invalid(format!("SLIPPAGE must be in (0, 0.5] (currently {})", self.slippage));
        }

        for (key, value) in [
            ("BUNDLER_ADDRESS", &self.bundler_address),
            ("FEE_STAKER_ADDRESS", &self.fee_staker_address),
            ("BOOST_CONTRACT_ADDRESS", &self.boost_contract_address),
            ("WRAPPED_NATIVE_ADDRESS", &self.wrapped_native_address),
        ] {
            if let Some(raw) = value {
                if normalize_address(raw).is_none() {
                    return invalid(format!("{} is not an address: {}", key, raw));
                }
            }
        }

        if self.execution_mode == ExecutionMode::Production {
            if self.private_key.is_none() {
                return invalid("Production mode requires PRIVATE_KEY".into());
            }
            if self.bundler_address.is_none() {
                return invalid("Production mode requires BUNDLER_ADDRESS".into());
            }
        }

        Ok(())
    }

    // ========== Typed accessors ==========

    fn address(raw: &Option<String>) -> Option<Address> {
        raw.as_deref().and_then(normalize_address)
    }

    /// Bundler address, required by anything that builds or sends bundles
    pub fn bundler(&self) -> Result<Address> {
        Self::address(&self.bundler_address)
            .ok_or_else(|| HarvestError::Configuration("BUNDLER_ADDRESS is not set".into()).into())
    }

    pub fn fee_staker(&self) -> Option<Address> {
        Self::address(&self.fee_staker_address)
    }

    pub fn boost_contract(&self) -> Option<Address> {
        Self::address(&self.boost_contract_address)
    }

    pub fn wrapped_native(&self) -> Option<Address> {
        Self::address(&self.wrapped_native_address)
    }

    pub fn metadata_url(&self) -> Result<&str> {
        self.metadata_base_url
            .as_deref()
            .ok_or_else(|| HarvestError::Configuration("METADATA_BASE_URL is not set".into()).into())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_max_attempts, self.retry_base_delay_ms)
    }

    pub fn quote_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.quote_max_attempts, self.retry_base_delay_ms)
    }

    pub fn vault_scanner(&self) -> PositionScanner {
        PositionScanner::new(self.vault_batch_size, Duration::from_millis(self.batch_delay_ms))
    }

    pub fn validator_scanner(&self) -> PositionScanner {
        PositionScanner::new(self.validator_batch_size, Duration::from_millis(self.batch_delay_ms))
    }

    pub fn gas_limits(&self) -> GasLimits {
        GasLimits {
            bundle: self.bundle_gas_limit,
            single_swap: self.single_swap_gas_limit,
        }
    }

    pub fn price_ttl(&self) -> Duration {
        Duration::from_secs(self.price_cache_ttl_secs)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let set = |present: bool| if present { "✓ Configured" } else { "✗ Not Set" };
        let or_unset = |v: &Option<String>| v.clone().unwrap_or_else(|| "✗ Not Set".to_string());

        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║               HARVESTER - CONFIGURATION                    ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Execution Mode:    {:^40} ║", self.execution_mode);
        println!("║ Chain ID:          {:^40} ║", self.chain_id);
        println!("║ Signer Key:        {:^40} ║", set(self.private_key.is_some()));
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ CONTRACTS                                                  ║");
        println!("║ • Bundler:     {:<44} ║", or_unset(&self.bundler_address));
        println!("║ • Fee Staker:  {:<44} ║", or_unset(&self.fee_staker_address));
        println!("║ • Boosts:      {:<44} ║", or_unset(&self.boost_contract_address));
        println!("║ • Wrapped:     {:<44} ║", or_unset(&self.wrapped_native_address));
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ SWAPS                                                      ║");
        println!("║ • Max Slippage:    {:>38.2}% ║", self.slippage * 100.0);
        println!("║ • Auto Approve:    {:^40} ║", if self.auto_approve { "✓ Enabled" } else { "✗ Disabled" });
        println!("║ • Swap API Key:    {:^40} ║", set(self.swap_api_key.is_some()));
        println!("║ • Bundle Gas:      {:>40} ║", self.bundle_gas_limit);
        println!("║ • Single Swap Gas: {:>40} ║", self.single_swap_gas_limit);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ SCANNING                                                   ║");
        println!("║ • Vault Batch:     {:^40} ║", self.vault_batch_size);
        println!("║ • Validator Batch: {:^40} ║", self.validator_batch_size);
        println!("║ • Batch Delay:     {:>37} ms ║", self.batch_delay_ms);
        println!("║ • Retries:         {:^40} ║", self.retry_max_attempts);
        println!("║ • Price TTL:       {:>38} s ║", self.price_cache_ttl_secs);
        println!("║ • Metadata:        {:^40} ║", set(self.metadata_base_url.is_some()));
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ • Activity Log:    {:^40} ║", if self.activity_log { "✓ Enabled" } else { "✗ Disabled" });
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            chain_id: DEFAULT_CHAIN_ID,
            private_key: None,
            bundler_address: None,
            fee_staker_address: Some(DEFAULT_FEE_STAKER.to_string()),
            boost_contract_address: Some(DEFAULT_BOOST_CONTRACT.to_string()),
            wrapped_native_address: Some(DEFAULT_WRAPPED_NATIVE.to_string()),
            swap_api_url: DEFAULT_API_URL.to_string(),
            swap_api_key: None,
            price_api_url: DEFAULT_API_URL.to_string(),
            metadata_base_url: None,
            slippage: 0.005,
            auto_approve: false,
            vault_batch_size: 10,
            validator_batch_size: 5,
            batch_delay_ms: 100,
            retry_max_attempts: 3,
            retry_base_delay_ms: 100,
            quote_max_attempts: 3,
            price_cache_ttl_secs: 60,
            bundle_gas_limit: 3_000_000,
            single_swap_gas_limit: 800_000,
            receipt_timeout_secs: 120,
            execution_mode: ExecutionMode::Simulation,
            activity_log: true,
            activity_log_path: "./logs/activity.jsonl".to_string(),
        }
    }
}

// ============================================
// TESTS
// ============================================
