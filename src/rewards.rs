//! Reward aggregation and claiming
//!
//! Combines vault, fee-staker and validator-boost scans into one priced
//! summary, and claims selected positions. Claims are independent: one
//! `getReward()` transaction per contract, each isolated from the others.

use alloy_primitives::Address;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bundle::OperationResult;
use crate::chain::{encode_get_reward, ChainReader, TxRequest};
use crate::config::ExecutionMode;
use crate::error::HarvestError;
use crate::metadata::{ValidatorInfo, VaultInfo};
use crate::pricing::PriceOracle;
use crate::scanner::{BoostScanner, VaultScanner};
use crate::types::{Position, SourceKind, ValidatorBoost};

/// Everything one scan found for an owner
#[derive(Debug, Clone, Serialize)]
pub struct RewardSummary {
    pub owner: Address,
    pub positions: Vec<Position>,
    pub boosts: Vec<ValidatorBoost>,
    /// Candidates whose probe failed
    pub failed: Vec<String>,
}

impl RewardSummary {
    pub fn total_value_usd(&self) -> f64 {
        self.positions.iter().map(Position::value_usd).sum()
    }

    pub fn claimable(&self) -> Vec<Position> {
        self.positions.iter().filter(|p| p.is_claimable()).cloned().collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClaimResult {
    pub per_operation_results: Vec<OperationResult>,
    pub claimed_rewards: Vec<Position>,
    /// Selected positions that were not claimed; still pending for the next cycle
    pub still_claimable: Vec<Position>,
    /// At least one claim landed; claims are not atomic
    pub aggregate_success: bool,
    pub total_value_usd: f64,
    /// No transaction was mined (simulation or dry-run mode)
    pub simulated: bool,
}

pub struct RewardAggregator {
    reader: Arc<ChainReader>,
    vaults: VaultScanner,
    boosts: Option<BoostScanner>,
    prices: Arc<PriceOracle>,
    fee_staker: Option<Address>,
    mode: ExecutionMode,
}

impl RewardAggregator {
    pub fn new(reader: Arc<ChainReader>, vaults: VaultScanner, prices: Arc<PriceOracle>, mode: ExecutionMode) -> Self {
        Self {
            reader,
            vaults,
            boosts: None,
            prices,
            fee_staker: None,
            mode,
        }
    }

    pub fn with_fee_staker(mut self, fee_staker: Option<Address>) -> Self {
        self.fee_staker = fee_staker;
        self
    }

    pub fn with_boosts(mut self, boosts: BoostScanner) -> Self {
        self.boosts = Some(boosts);
        self
    }

    /// Scan every source and price the rewards
    pub async fn scan(&self, owner: Address, vaults: &[VaultInfo], validators: &[ValidatorInfo]) -> RewardSummary {
        let vault_scan = self.vaults.scan(owner, vaults);
        let fee_scan = async {
            match self.fee_staker {
                Some(staker) => Some(self.vaults.scan_fee_staker(owner, staker).await),
                None => None,
            }
        };
        let boost_scan = async {
            match self.boosts {
                Some(ref scanner) => Some(scanner.scan(owner, validators).await),
                None => None,
            }
        };

        let (vault_outcome, fee_outcome, boost_outcome) = tokio::join!(vault_scan, fee_scan, boost_scan);

        let mut positions = vault_outcome.found;
        let mut failed = vault_outcome.failed;

        match fee_outcome {
            Some(Ok(Some(position))) => positions.push(position),
            Some(Ok(None)) | None => {}
            Some(Err(e)) => {
                warn!("Fee staker scan failed: {}", e);
                failed.push("fee staker".to_string());
            }
        }

        let boosts = match boost_outcome {
            Some(outcome) => {
                failed.extend(outcome.failed);
                outcome.found
            }
            None => Vec::new(),
        };

        let positions = self.price(positions).await;

        let summary = RewardSummary { owner, positions, boosts, failed };
        info!(
            "💰 {} positions, {} boosts, ${:.2} claimable",
            summary.positions.len(),
            summary.boosts.len(),
            summary.total_value_usd()
        );
        summary
    }

    /// Attach reward-token prices from one oracle snapshot
    async fn price(&self, positions: Vec<Position>) -> Vec<Position> {
        let tokens: Vec<Address> = positions
            .iter()
            .map(|p| p.reward_token.address)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let prices = self.prices.prices(&tokens).await;

        positions
            .into_iter()
            .map(|p| {
                let price = prices.get(&p.reward_token.address).copied().flatten();
                p.with_price(price)
            })
            .collect()
    }

    /// Claim the selected positions, one transaction per contract.
    ///
    /// Vault claims go out sequentially, then the fee staker once.
    pub async fn claim(&self, owner: Address, selected: &[Position]) -> ClaimResult {
        let simulated = self.mode != ExecutionMode::Production;
        let mut result = ClaimResult {
            per_operation_results: Vec::new(),
            claimed_rewards: Vec::new(),
            still_claimable: Vec::new(),
            aggregate_success: false,
            total_value_usd: 0.0,
            simulated,
        };

        let claimable: Vec<&Position> = selected
            .iter()
            .filter(|p| {
                let ok = p.owner_address == owner && p.is_claimable();
                if !ok {
                    debug!("Not claiming {}: nothing earned or different owner", p.id());
                }
                ok
            })
            .collect();

        if self.mode == ExecutionMode::Production {
            let sender = self.reader.client().sender();
            if sender != Some(owner) {
                let err = HarvestError::Configuration(format!(
                    "signer {:?} cannot claim for {:?}",
                    sender, owner
                ));
                warn!("{}", err);
                for position in claimable {
                    result.per_operation_results.push(OperationResult::failed(claim_label(position), None, err.to_string()));
                    result.still_claimable.push(position.clone());
                }
                return result;
            }
        }

        // Group by kind, then by contract: one claim per contract
        let mut groups: Vec<(Address, SourceKind, Vec<&Position>)> = Vec::new();
        for kind in [SourceKind::Vault, SourceKind::FeeStaker] {
            for position in claimable.iter().copied().filter(|p| p.source_kind == kind) {
                match groups.iter_mut().find(|(c, k, _)| *c == position.contract_address && *k == kind) {
                    Some((_, _, members)) => members.push(position),
                    None => groups.push((position.contract_address, kind, vec![position])),
                }
            }
        }

        info!("🌾 Claiming from {} contracts (mode {})", groups.len(), self.mode);

        for (contract, _, members) in groups {
            let label = claim_label(members[0]);
            let outcome = self.claim_one(owner, contract, &label).await;

            if outcome.success {
                info!("   ✓ {}", label);
                result.claimed_rewards.extend(members.into_iter().cloned());
            } else {
                warn!("   ✗ {}: {}", label, outcome.error.as_deref().unwrap_or("unknown error"));
                result.still_claimable.extend(members.into_iter().cloned());
            }
            result.per_operation_results.push(outcome);
        }

        result.aggregate_success = !result.claimed_rewards.is_empty();
        result.total_value_usd = result.claimed_rewards.iter().map(Position::value_usd).sum();
        result
    }

    async fn claim_one(&self, owner: Address, contract: Address, label: &str) -> OperationResult {
        let client = self.reader.client();
        let tx = TxRequest::new(contract, encode_get_reward());

        match self.mode {
            ExecutionMode::Simulation => OperationResult::ok(label, None),

            ExecutionMode::DryRun => match client.simulate(owner, &tx).await {
                Ok(_) => OperationResult::ok(label, None),
                Err(e) => OperationResult::failed(label, None, e.to_string()),
            },

            ExecutionMode::Production => {
                let tx_hash = match client.send_transaction(tx).await {
                    Ok(hash) => hash,
                    Err(e) => return OperationResult::failed(label, None, e.to_string()),
                };

                match client.wait_for_receipt(tx_hash).await {
                    Ok(true) => OperationResult::ok(label, Some(tx_hash)),
                    Ok(false) => OperationResult::failed(
                        label,
                        Some(tx_hash),
                        HarvestError::TransactionReverted { tx_hash }.to_string(),
                    ),
                    Err(e) => OperationResult::failed(label, Some(tx_hash), e.to_string()),
                }
            }
        }
    }
}

fn claim_label(position: &Position) -> String {
    format!("claim {}", position.id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChain;
    use crate::chain::{RetryPolicy, IRewardVault};
    use crate::pricing::PriceFeed;
    use crate::scanner::PositionScanner;
    use crate::tokens::{parse_amount, Token};
    use crate::types::PositionReads;
    use alloy_sol_types::SolCall;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    const OWNER: Address = Address::repeat_byte(0xaa);
    const LP: Address = Address::repeat_byte(0x0a);
    const BGT: Address = Address::repeat_byte(0x0b);
    const HONEY: Address = Address::repeat_byte(0x0c);
    const STAKER: Address = Address::repeat_byte(0x5a);

    struct FixedPrices(HashMap<Address, f64>);

    #[async_trait]
    impl PriceFeed for FixedPrices {
        async fn fetch_prices(&self) -> eyre::Result<HashMap<Address, f64>> {
            Ok(self.0.clone())
        }
    }

    fn aggregator(mock: Arc<MockChain>, mode: ExecutionMode) -> RewardAggregator {
        let reader = Arc::new(ChainReader::new(mock).with_token_directory(vec![
            Token::new(LP, "LP", 18),
            Token::new(BGT, "BGT", 18),
            Token::new(HONEY, "HONEY", 18),
        ]));
        let prices = Arc::new(PriceOracle::new(
            Arc::new(FixedPrices([(BGT, 2.0)].into_iter().collect())),
            None,
            Duration::from_secs(60),
        ));
        let vaults = VaultScanner::new(reader.clone(), RetryPolicy::new(1, 1), PositionScanner::new(10, Duration::ZERO));
        RewardAggregator::new(reader, vaults, prices, mode).with_fee_staker(Some(STAKER))
    }

    fn mock_staking(mock: &MockChain, contract: Address, reward: Address, stake: &str, earned: &str) {
        let w = |s: &str| MockChain::word(parse_amount(s, 18).unwrap());
        mock.on_call(contract, IRewardVault::balanceOfCall::SELECTOR, w(stake));
        mock.on_call(contract, IRewardVault::stakeTokenCall::SELECTOR, MockChain::encode(LP));
        mock.on_call(contract, IRewardVault::rewardTokenCall::SELECTOR, MockChain::encode(reward));
        mock.on_call(contract, IRewardVault::totalSupplyCall::SELECTOR, w("10000"));
        mock.on_call(contract, IRewardVault::earnedCall::SELECTOR, w(earned));
        mock.on_call(contract, IRewardVault::rewardRateCall::SELECTOR, w("0"));
        mock.on_call(contract, IRewardVault::getRewardForDurationCall::SELECTOR, w("0"));
    }

    fn position(contract: Address, kind: SourceKind, earned: &str) -> Position {
        Position::new(
            kind,
            contract,
            OWNER,
            Token::new(LP, "LP", 18),
            Token::new(BGT, "BGT", 18),
            PositionReads {
                stake_amount: parse_amount("1", 18).unwrap(),
                earned_amount: parse_amount(earned, 18).unwrap(),
                ..Default::default()
            },
        )
        .unwrap()
        .with_price(Some(2.0))
    }

    fn vault(address: Address) -> VaultInfo {
        VaultInfo { address, staking_token: None, reward_token: None, name: "v".into(), protocol: None }
    }

    #[tokio::test]
    async fn test_scan_prices_vaults_and_fee_staker() {
        let vault_a = Address::repeat_byte(1);
        let mock = MockChain::new();
        mock_staking(&mock, vault_a, BGT, "1000", "50");
        mock_staking(&mock, STAKER, HONEY, "10", "3");

        let summary = aggregator(Arc::new(mock), ExecutionMode::Simulation)
            .scan(OWNER, &[vault(vault_a), vault(Address::repeat_byte(2))], &[])
            .await;

        assert_eq!(summary.positions.len(), 2);
        assert_eq!(summary.failed.len(), 1);
        // BGT priced at $2, HONEY unpriced
        assert!((summary.total_value_usd() - 100.0).abs() < 1e-9);
        let fee = summary.positions.iter().find(|p| p.source_kind == SourceKind::FeeStaker).unwrap();
        assert_eq!(fee.price_usd, None);
    }

    #[tokio::test]
    async fn test_one_claim_reverts_other_lands() {
        let vault_a = Address::repeat_byte(1);
        let vault_b = Address::repeat_byte(2);
        let mock = MockChain::new().with_sender(OWNER);
        mock.revert_transactions_to(vault_b);
        let mock = Arc::new(mock);

        let selected = vec![position(vault_a, SourceKind::Vault, "5"), position(vault_b, SourceKind::Vault, "7")];
        let result = aggregator(mock.clone(), ExecutionMode::Production).claim(OWNER, &selected).await;

        assert!(result.aggregate_success);
        assert_eq!(result.claimed_rewards.len(), 1);
        assert_eq!(result.per_operation_results.len(), 2);
        assert_eq!(result.still_claimable.len(), 1);
        assert_eq!(result.still_claimable[0].contract_address, vault_b);
        assert!((result.total_value_usd - 10.0).abs() < 1e-9);

        let sent = mock.sent_transactions();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, vault_a);
        assert_eq!(sent[0].data, encode_get_reward());
    }

    #[tokio::test]
    async fn test_vaults_claimed_before_fee_staker() {
        let vault_a = Address::repeat_byte(1);
        let mock = Arc::new(MockChain::new().with_sender(OWNER));

        let selected = vec![
            position(STAKER, SourceKind::FeeStaker, "1"),
            position(vault_a, SourceKind::Vault, "1"),
        ];
        let result = aggregator(mock.clone(), ExecutionMode::Production).claim(OWNER, &selected).await;

        assert_eq!(result.claimed_rewards.len(), 2);
        let targets: Vec<_> = mock.sent_transactions().iter().map(|tx| tx.to).collect();
        assert_eq!(targets, vec![vault_a, STAKER]);
    }

    #[tokio::test]
    async fn test_failed_send_is_isolated() {
        let vault_a = Address::repeat_byte(1);
        let vault_b = Address::repeat_byte(2);
        let mock = MockChain::new().with_sender(OWNER);
        mock.reject_transactions_to(vault_a);

        let selected = vec![position(vault_a, SourceKind::Vault, "1"), position(vault_b, SourceKind::Vault, "1")];
        let result = aggregator(Arc::new(mock), ExecutionMode::Production).claim(OWNER, &selected).await;

        assert!(result.aggregate_success);
        assert!(!result.per_operation_results[0].success);
        assert_eq!(result.per_operation_results[0].tx_hash, None);
        assert!(result.per_operation_results[1].success);
    }

    #[tokio::test]
    async fn test_all_failed_is_not_success() {
        let vault_a = Address::repeat_byte(1);
        let mock = MockChain::new().with_sender(OWNER);
        mock.revert_transactions_to(vault_a);

        let result = aggregator(Arc::new(mock), ExecutionMode::Production)
            .claim(OWNER, &[position(vault_a, SourceKind::Vault, "1")])
            .await;
        assert!(!result.aggregate_success);
        assert_eq!(result.total_value_usd, 0.0);
    }

    #[tokio::test]
    async fn test_signer_must_be_owner() {
        let mock = Arc::new(MockChain::new().with_sender(Address::repeat_byte(0xbb)));
        let result = aggregator(mock.clone(), ExecutionMode::Production)
            .claim(OWNER, &[position(Address::repeat_byte(1), SourceKind::Vault, "1")])
            .await;

        assert!(!result.aggregate_success);
        assert!(mock.sent_transactions().is_empty());
        assert!(result.per_operation_results[0].error.as_deref().unwrap().starts_with("configuration error"));
    }

    #[tokio::test]
    async fn test_simulation_sends_nothing() {
        let mock = Arc::new(MockChain::new());
        let result = aggregator(mock.clone(), ExecutionMode::Simulation)
            .claim(OWNER, &[position(Address::repeat_byte(1), SourceKind::Vault, "1")])
            .await;

        assert!(result.simulated);
        assert!(result.aggregate_success);
        assert!(mock.sent_transactions().is_empty());
    }
}
