//! Discovered positions
//!
//! Positions are snapshots of one scan cycle. They carry no identity beyond
//! the derived [`Position::id`] and are replaced wholesale by the next scan.

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::tokens::{amount_to_f64, short_address, Token};

/// Where a position lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    Vault,
    FeeStaker,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Vault => write!(f, "vault"),
            SourceKind::FeeStaker => write!(f, "fee-staker"),
        }
    }
}

/// A non-zero stake/reward the owner holds in one contract
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub source_kind: SourceKind,
    pub contract_address: Address,
    pub owner_address: Address,
    /// Display name from the metadata directory, if any
    pub name: Option<String>,
    pub stake_token: Token,
    pub reward_token: Token,
    pub raw_stake_amount: U256,
    pub raw_earned_amount: U256,
    pub total_staked: U256,
    pub reward_rate: U256,
    pub reward_for_duration: U256,
    /// USD price of the reward token
    pub price_usd: Option<f64>,
}

/// Raw reads backing a [`Position`]
#[derive(Debug, Clone, Default)]
pub struct PositionReads {
    pub stake_amount: U256,
    pub earned_amount: U256,
    pub total_staked: U256,
    pub reward_rate: U256,
    pub reward_for_duration: U256,
}

impl Position {
    /// Build a position, or `None` when there is nothing staked and nothing earned.
    pub fn new(
        source_kind: SourceKind,
        contract_address: Address,
        owner_address: Address,
        stake_token: Token,
        reward_token: Token,
        reads: PositionReads,
    ) -> Option<Self> {
        if reads.stake_amount.is_zero() && reads.earned_amount.is_zero() {
            return None;
        }

        Some(Self {
            source_kind,
            contract_address,
            owner_address,
            name: None,
            stake_token,
            reward_token,
            raw_stake_amount: reads.stake_amount,
            raw_earned_amount: reads.earned_amount,
            total_staked: reads.total_staked,
            reward_rate: reads.reward_rate,
            reward_for_duration: reads.reward_for_duration,
            price_usd: None,
        })
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    pub fn with_price(mut self, price_usd: Option<f64>) -> Self {
        self.price_usd = price_usd;
        self
    }

    /// Derived id, stable across scans: `"{kind}-{address[:8]}"`
    pub fn id(&self) -> String {
        format!("{}-{}", self.source_kind, short_address(&self.contract_address))
    }

    /// Earned rewards in whole tokens
    pub fn earned(&self) -> f64 {
        amount_to_f64(self.raw_earned_amount, self.reward_token.decimals)
    }

    pub fn staked(&self) -> f64 {
        amount_to_f64(self.raw_stake_amount, self.stake_token.decimals)
    }

    /// USD value of the earned rewards; zero when the price is unknown
    pub fn value_usd(&self) -> f64 {
        self.price_usd.map(|p| self.earned() * p).unwrap_or(0.0)
    }

    /// Owner's share of the pool, 0.0..=1.0
    pub fn pool_share(&self) -> f64 {
        if self.total_staked.is_zero() {
            return 0.0;
        }
        let total = amount_to_f64(self.total_staked, self.stake_token.decimals);
        if total == 0.0 {
            0.0
        } else {
            self.staked() / total
        }
    }

    pub fn is_claimable(&self) -> bool {
        !self.raw_earned_amount.is_zero()
    }
}

/// A validator boost (active or queued) held by the owner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorBoost {
    pub validator_pubkey: Bytes,
    pub validator_name: String,
    pub owner_address: Address,
    pub boosted_amount: U256,
    pub queued_amount: U256,
    /// Total boost on the validator, read only when `boosted_amount` is non-zero
    pub validator_total: Option<U256>,
}

impl ValidatorBoost {
    /// Owner's fraction of the validator's total boost
    pub fn share(&self) -> Option<f64> {
        let total = self.validator_total?;
        if total.is_zero() {
            return None;
        }
        Some(amount_to_f64(self.boosted_amount, 18) / amount_to_f64(total, 18))
    }

    pub fn is_queued_only(&self) -> bool {
        self.boosted_amount.is_zero() && !self.queued_amount.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::parse_amount;

    fn token(byte: u8, symbol: &str) -> Token {
        Token::new(Address::repeat_byte(byte), symbol, 18)
    }

    fn reads(stake: &str, earned: &str) -> PositionReads {
        PositionReads {
            stake_amount: parse_amount(stake, 18).unwrap(),
            earned_amount: parse_amount(earned, 18).unwrap(),
            total_staked: parse_amount("4000", 18).unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_position_is_never_built() {
        let pos = Position::new(
            SourceKind::Vault,
            Address::repeat_byte(1),
            Address::repeat_byte(2),
            token(3, "LP"),
            token(4, "BGT"),
            reads("0", "0"),
        );
        assert!(pos.is_none());
    }

    #[test]
    fn test_value_usd() {
        // balanceOf = 1000, earned = 50, reward decimals 18, price $2.00
        let pos = Position::new(
            SourceKind::Vault,
            Address::repeat_byte(1),
            Address::repeat_byte(2),
            token(3, "LP"),
            token(4, "BGT"),
            reads("1000", "50"),
        )
        .unwrap()
        .with_price(Some(2.0));

        assert!((pos.value_usd() - 100.0).abs() < 1e-9);
        assert!((pos.pool_share() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_price_values_at_zero() {
        let pos = Position::new(
            SourceKind::FeeStaker,
            Address::repeat_byte(1),
            Address::repeat_byte(2),
            token(3, "BGT"),
            token(4, "HONEY"),
            reads("10", "1"),
        )
        .unwrap();
        assert_eq!(pos.price_usd, None);
        assert_eq!(pos.value_usd(), 0.0);
    }

    #[test]
    fn test_derived_id() {
        let pos = Position::new(
            SourceKind::FeeStaker,
            Address::repeat_byte(0x4a),
            Address::repeat_byte(2),
            token(3, "BGT"),
            token(4, "HONEY"),
            reads("1", "0"),
        )
        .unwrap();
        assert_eq!(pos.id(), "fee-staker-0x4a4a4a");
        assert!(!pos.is_claimable());
    }

    #[test]
    fn test_boost_share() {
        let boost = ValidatorBoost {
            validator_pubkey: Bytes::from(vec![1u8; 48]),
            validator_name: "val".into(),
            owner_address: Address::ZERO,
            boosted_amount: parse_amount("25", 18).unwrap(),
            queued_amount: U256::ZERO,
            validator_total: Some(parse_amount("100", 18).unwrap()),
        };
        assert!((boost.share().unwrap() - 0.25).abs() < 1e-9);
        assert!(!boost.is_queued_only());
    }
}
