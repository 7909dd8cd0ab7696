//! Reward vault and fee-staker positions

use alloy_primitives::Address;
use eyre::Result;
use std::sync::Arc;
use tracing::{debug, info};

use super::batch::{PositionScanner, ScanOutcome};
use crate::chain::{retry, ChainReader, RetryPolicy};
use crate::metadata::VaultInfo;
use crate::types::{Position, PositionReads, SourceKind};

/// Read one staking contract for `owner`.
///
/// The staked balance is read first and without retry: zero is the common
/// case and means "no position". Only then are the remaining fields read,
/// concurrently, each under the retry policy.
pub async fn probe_staking_contract(
    reader: &ChainReader,
    policy: &RetryPolicy,
    kind: SourceKind,
    contract: Address,
    owner: Address,
) -> Result<Option<Position>> {
    let stake_amount = reader.staked_balance(contract, owner).await?;
    if stake_amount.is_zero() {
        return Ok(None);
    }

    let (stake_token, reward_token, total_staked, earned_amount, reward_rate, reward_for_duration) = tokio::try_join!(
        retry(policy, "stakeToken", || reader.stake_token(contract)),
        retry(policy, "rewardToken", || reader.reward_token(contract)),
        retry(policy, "totalSupply", || reader.total_supply(contract)),
        retry(policy, "earned", || reader.earned(contract, owner)),
        retry(policy, "rewardRate", || reader.reward_rate(contract)),
        retry(policy, "getRewardForDuration", || reader.reward_for_duration(contract)),
    )?;

    let (stake_token, reward_token) = tokio::join!(reader.token(stake_token), reader.token(reward_token));

    let reads = PositionReads {
        stake_amount,
        earned_amount,
        total_staked,
        reward_rate,
        reward_for_duration,
    };

    Ok(Position::new(kind, contract, owner, stake_token, reward_token, reads))
}

pub struct VaultScanner {
    reader: Arc<ChainReader>,
    policy: RetryPolicy,
    scanner: PositionScanner,
}

impl VaultScanner {
    pub fn new(reader: Arc<ChainReader>, policy: RetryPolicy, scanner: PositionScanner) -> Self {
        Self { reader, policy, scanner }
    }

    /// Positions the owner holds across the listed vaults
    pub async fn scan(&self, owner: Address, vaults: &[VaultInfo]) -> ScanOutcome<Position> {
        info!("🔍 Scanning {} vaults (batches of {})", vaults.len(), self.scanner.batch_size());

        let outcome = self
            .scanner
            .scan(vaults, |vault| {
                let reader = self.reader.clone();
                let policy = self.policy;
                let address = vault.address;
                let name = vault.name.clone();
                async move {
                    let position =
                        probe_staking_contract(&reader, &policy, SourceKind::Vault, address, owner).await?;
                    Ok(position.map(|p| p.with_name(Some(name))))
                }
            })
            .await;

        info!(
            "   Found {} vault positions ({} probes failed) in {:?}",
            outcome.found.len(),
            outcome.failed.len(),
            outcome.elapsed
        );
        outcome
    }

    /// The single fee-staker contract
    pub async fn scan_fee_staker(&self, owner: Address, fee_staker: Address) -> Result<Option<Position>> {
        let position =
            probe_staking_contract(&self.reader, &self.policy, SourceKind::FeeStaker, fee_staker, owner).await?;
        debug!("Fee staker position: {}", position.is_some());
        Ok(position.map(|p| p.with_name(Some("Fee staker".to_string()))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChain;
    use crate::chain::IRewardVault;
    use crate::tokens::{parse_amount, Token};
    use alloy_primitives::U256;
    use alloy_sol_types::SolCall;
    use std::time::Duration;

    const OWNER: Address = Address::repeat_byte(0xaa);
    const LP: Address = Address::repeat_byte(0x0a);
    const BGT: Address = Address::repeat_byte(0x0b);

    fn mock_vault(mock: &MockChain, vault: Address, stake: &str, earned: &str) {
        let w = |s: &str| MockChain::word(parse_amount(s, 18).unwrap());
        mock.on_call(vault, IRewardVault::balanceOfCall::SELECTOR, w(stake));
        mock.on_call(vault, IRewardVault::stakeTokenCall::SELECTOR, MockChain::encode(LP));
        mock.on_call(vault, IRewardVault::rewardTokenCall::SELECTOR, MockChain::encode(BGT));
        mock.on_call(vault, IRewardVault::totalSupplyCall::SELECTOR, w("4000"));
        mock.on_call(vault, IRewardVault::earnedCall::SELECTOR, w(earned));
        mock.on_call(vault, IRewardVault::rewardRateCall::SELECTOR, w("1"));
        mock.on_call(vault, IRewardVault::getRewardForDurationCall::SELECTOR, w("604800"));
    }

    fn vault_info(address: Address, name: &str) -> VaultInfo {
        VaultInfo {
            address,
            staking_token: Some(LP),
            reward_token: Some(BGT),
            name: name.to_string(),
            protocol: None,
        }
    }

    fn scanner_over(mock: Arc<MockChain>) -> VaultScanner {
        let reader = ChainReader::new(mock).with_token_directory(vec![
            Token::new(LP, "HONEY-WBERA", 18),
            Token::new(BGT, "BGT", 18),
        ]);
        VaultScanner::new(
            Arc::new(reader),
            RetryPolicy::new(2, 1),
            PositionScanner::new(10, Duration::ZERO),
        )
    }

    #[tokio::test]
    async fn test_zero_balance_skips_detail_reads() {
        let vault = Address::repeat_byte(1);
        let mock = MockChain::new();
        mock.on_call(vault, IRewardVault::balanceOfCall::SELECTOR, MockChain::word(U256::ZERO));
        let mock = Arc::new(mock);

        let outcome = scanner_over(mock.clone()).scan(OWNER, &[vault_info(vault, "empty")]).await;

        assert!(outcome.found.is_empty());
        assert_eq!(mock.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_broken_vault_does_not_hide_others() {
        let good = Address::repeat_byte(1);
        let broken = Address::repeat_byte(2);
        let mock = MockChain::new();
        mock_vault(&mock, good, "1000", "50");
        // `broken` has no mocked methods: balanceOf reverts
        let outcome = scanner_over(Arc::new(mock))
            .scan(OWNER, &[vault_info(broken, "broken"), vault_info(good, "HONEY-WBERA")])
            .await;

        assert_eq!(outcome.found.len(), 1);
        assert_eq!(outcome.failed.len(), 1);
        let pos = &outcome.found[0];
        assert_eq!(pos.contract_address, good);
        assert_eq!(pos.name.as_deref(), Some("HONEY-WBERA"));
        assert_eq!(pos.reward_token.symbol, "BGT");
        assert!((pos.earned() - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_value_with_price() {
        let vault = Address::repeat_byte(3);
        let mock = MockChain::new();
        mock_vault(&mock, vault, "1000", "50");

        let outcome = scanner_over(Arc::new(mock)).scan(OWNER, &[vault_info(vault, "A")]).await;
        let pos = outcome.found[0].clone().with_price(Some(2.0));
        assert!((pos.value_usd() - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_detail_read_failure_excludes_vault() {
        let vault = Address::repeat_byte(4);
        let mock = MockChain::new();
        mock_vault(&mock, vault, "10", "1");
        mock.fail_call(vault, IRewardVault::earnedCall::SELECTOR, "timeout");
        let mock = Arc::new(mock);

        let outcome = scanner_over(mock.clone()).scan(OWNER, &[vault_info(vault, "flaky")]).await;

        assert!(outcome.found.is_empty());
        assert_eq!(outcome.failed.len(), 1);
        // two attempts under the retry policy
        assert_eq!(mock.call_count(vault, IRewardVault::earnedCall::SELECTOR), 2);
    }

    #[tokio::test]
    async fn test_fee_staker_kind() {
        let staker = Address::repeat_byte(5);
        let mock = MockChain::new();
        mock_vault(&mock, staker, "20", "0");

        let pos = scanner_over(Arc::new(mock))
            .scan_fee_staker(OWNER, staker)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pos.source_kind, SourceKind::FeeStaker);
        assert!(!pos.is_claimable());
    }
}
