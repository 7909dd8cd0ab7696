//! Contract interfaces and typed reads
//!
//! [`ChainReader`] wraps a [`ChainClient`] with the handful of typed calls the
//! scanners, reconciler and claimer need. Token decimals are immutable, so
//! they are cached per reader instance after the first successful read.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};
use eyre::{eyre, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{trace, warn};

use super::client::ChainClient;
use super::retry::{retry, RetryPolicy};
use crate::tokens::{is_native, Token, DEFAULT_DECIMALS};

// ============================================
// SOLIDITY INTERFACES
// ============================================

sol! {
    /// Minimal ERC20
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
    }

    /// Staking-rewards style vault (also implemented by the fee staker)
    interface IRewardVault {
        function balanceOf(address account) external view returns (uint256);
        function stakeToken() external view returns (address);
        function rewardToken() external view returns (address);
        function totalSupply() external view returns (uint256);
        function earned(address account) external view returns (uint256);
        function rewardRate() external view returns (uint256);
        function getRewardForDuration() external view returns (uint256);
        function getReward() external;
    }

    /// Validator boost accounting on the governance token
    interface IBoostToken {
        function boosts(address account) external view returns (uint128);
        function queuedBoost(address account) external view returns (uint128);
        function boosted(address account, bytes calldata pubkey) external view returns (uint128);
        function boostedQueue(address account, bytes calldata pubkey)
            external view returns (uint32 blockNumberLast, uint128 balance);
        function boostees(bytes calldata pubkey) external view returns (uint128);
    }

    /// Bundler entry point
    interface IBundler {
        struct Operation {
            uint8 operationType;
            address target;
            bytes data;
            uint256 value;
            address tokenAddress;
            uint256 tokenAmount;
            address outputToken;
            uint256 minOutputAmount;
        }

        function executeBundle(Operation[] calldata operations) external payable;
    }
}

/// Typed view over a [`ChainClient`]
pub struct ChainReader {
    client: Arc<dyn ChainClient>,
    /// Known tokens (from the metadata directory) consulted before the chain
    directory: HashMap<Address, Token>,
    decimals_cache: RwLock<HashMap<Address, u8>>,
    policy: RetryPolicy,
}

impl ChainReader {
    pub fn new(client: Arc<dyn ChainClient>) -> Self {
        Self {
            client,
            directory: HashMap::new(),
            decimals_cache: RwLock::new(HashMap::new()),
            policy: RetryPolicy::default(),
        }
    }

    /// Seed symbol/decimals from a token list
    pub fn with_token_directory(mut self, tokens: impl IntoIterator<Item = Token>) -> Self {
        self.directory = tokens.into_iter().map(|t| (t.address, t)).collect();
        self
    }

    /// Retry budget for metadata reads (`decimals()`)
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn client(&self) -> &Arc<dyn ChainClient> {
        &self.client
    }

    /// Encode, `eth_call`, decode
    async fn read<C: SolCall>(&self, to: Address, call: C) -> Result<C::Return> {
        let output = self.client.call(to, Bytes::from(call.abi_encode())).await?;
        C::abi_decode_returns(&output)
            .map_err(|e| eyre!("failed to decode {} from {:?}: {}", C::SIGNATURE, to, e))
    }

    // ========== ERC20 ==========

    pub async fn balance_of(&self, token: Address, owner: Address) -> Result<U256> {
        if is_native(&token) {
            return self.client.native_balance(owner).await;
        }
        self.read(token, IERC20::balanceOfCall { account: owner }).await
    }

    pub async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        self.read(token, IERC20::allowanceCall { owner, spender }).await
    }

    /// Token decimals, read once per token.
    ///
    /// A failed read falls back to 18 for this call only; the fallback is not
    /// cached, so the next lookup goes back to the chain.
    pub async fn decimals(&self, token: Address) -> u8 {
        if is_native(&token) {
            return 18;
        }
        if let Some(known) = self.directory.get(&token) {
            return known.decimals;
        }
        if let Some(cached) = self.decimals_cache.read().await.get(&token) {
            trace!("Using cached decimals for {:?}", token);
            return *cached;
        }

        match retry(&self.policy, "decimals", || self.read(token, IERC20::decimalsCall {})).await {
            Ok(decimals) => {
                self.decimals_cache.write().await.insert(token, decimals);
                decimals
            }
            Err(e) => {
                warn!("decimals() failed for {:?}, assuming {}: {}", token, DEFAULT_DECIMALS, e);
                DEFAULT_DECIMALS
            }
        }
    }

    pub async fn symbol(&self, token: Address) -> String {
        if is_native(&token) {
            return Token::native().symbol;
        }
        if let Some(known) = self.directory.get(&token) {
            return known.symbol.clone();
        }
        self.read(token, IERC20::symbolCall {})
            .await
            .unwrap_or_else(|_| "UNKNOWN".to_string())
    }

    /// Resolve symbol and decimals together
    pub async fn token(&self, address: Address) -> Token {
        if is_native(&address) {
            return Token::native();
        }
        if let Some(known) = self.directory.get(&address) {
            return known.clone();
        }
        let (symbol, decimals) = tokio::join!(self.symbol(address), self.decimals(address));
        Token::new(address, symbol, decimals)
    }

    // ========== Reward vaults / fee staker ==========

    pub async fn staked_balance(&self, vault: Address, owner: Address) -> Result<U256> {
        self.read(vault, IRewardVault::balanceOfCall { account: owner }).await
    }

    pub async fn stake_token(&self, vault: Address) -> Result<Address> {
        self.read(vault, IRewardVault::stakeTokenCall {}).await
    }

    pub async fn reward_token(&self, vault: Address) -> Result<Address> {
        self.read(vault, IRewardVault::rewardTokenCall {}).await
    }

    pub async fn total_supply(&self, vault: Address) -> Result<U256> {
        self.read(vault, IRewardVault::totalSupplyCall {}).await
    }

    pub async fn earned(&self, vault: Address, owner: Address) -> Result<U256> {
        self.read(vault, IRewardVault::earnedCall { account: owner }).await
    }

    pub async fn reward_rate(&self, vault: Address) -> Result<U256> {
        self.read(vault, IRewardVault::rewardRateCall {}).await
    }

    pub async fn reward_for_duration(&self, vault: Address) -> Result<U256> {
        self.read(vault, IRewardVault::getRewardForDurationCall {}).await
    }

    // ========== Validator boosts ==========

    /// Aggregate active boost across all validators
    pub async fn total_boosts(&self, boost_token: Address, owner: Address) -> Result<U256> {
        let v = self.read(boost_token, IBoostToken::boostsCall { account: owner }).await?;
        Ok(U256::from(v))
    }

    /// Aggregate queued boost across all validators
    pub async fn total_queued_boost(&self, boost_token: Address, owner: Address) -> Result<U256> {
        let v = self.read(boost_token, IBoostToken::queuedBoostCall { account: owner }).await?;
        Ok(U256::from(v))
    }

    pub async fn boosted(&self, boost_token: Address, owner: Address, pubkey: &Bytes) -> Result<U256> {
        let call = IBoostToken::boostedCall { account: owner, pubkey: pubkey.clone() };
        Ok(U256::from(self.read(boost_token, call).await?))
    }

    pub async fn boosted_queue(&self, boost_token: Address, owner: Address, pubkey: &Bytes) -> Result<U256> {
        let call = IBoostToken::boostedQueueCall { account: owner, pubkey: pubkey.clone() };
        let queued = self.read(boost_token, call).await?;
        Ok(U256::from(queued.balance))
    }

    /// Total boost delegated to one validator
    pub async fn validator_boost_total(&self, boost_token: Address, pubkey: &Bytes) -> Result<U256> {
        let call = IBoostToken::boosteesCall { pubkey: pubkey.clone() };
        Ok(U256::from(self.read(boost_token, call).await?))
    }
}

/// Calldata for `approve(spender, amount)`
pub fn encode_approve(spender: Address, amount: U256) -> Bytes {
    Bytes::from(IERC20::approveCall { spender, amount }.abi_encode())
}

/// Calldata for `getReward()`
pub fn encode_get_reward() -> Bytes {
    Bytes::from(IRewardVault::getRewardCall {}.abi_encode())
}
