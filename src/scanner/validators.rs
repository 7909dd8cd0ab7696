//! Validator boost positions

use alloy_primitives::{Address, U256};
use std::sync::Arc;
use tracing::{info, warn};

use super::batch::{PositionScanner, ScanOutcome};
use crate::chain::{retry, ChainReader, RetryPolicy};
use crate::metadata::ValidatorInfo;
use crate::types::ValidatorBoost;

pub struct BoostScanner {
    reader: Arc<ChainReader>,
    boost_token: Address,
    policy: RetryPolicy,
    scanner: PositionScanner,
}

impl BoostScanner {
    pub fn new(reader: Arc<ChainReader>, boost_token: Address, policy: RetryPolicy, scanner: PositionScanner) -> Self {
        Self { reader, boost_token, policy, scanner }
    }

    /// Active and queued boosts the owner holds, per validator.
    ///
    /// When the owner's aggregate boost and queued boost are both zero no
    /// per-validator reads are made at all.
    pub async fn scan(&self, owner: Address, validators: &[ValidatorInfo]) -> ScanOutcome<ValidatorBoost> {
        // TODO: confirm a validator cannot keep a per-validator record while
        // both aggregates read zero; if it can, this short-circuit hides it.
        match self.has_any_boost(owner).await {
            Some(false) => {
                info!("No active or queued boosts, skipping {} validators", validators.len());
                return ScanOutcome::empty();
            }
            Some(true) => {}
            None => warn!("Aggregate boost check failed, probing every validator"),
        }

        info!("🔍 Scanning {} validators (batches of {})", validators.len(), self.scanner.batch_size());

        let outcome = self
            .scanner
            .scan(validators, |validator| {
                let reader = self.reader.clone();
                let policy = self.policy;
                let boost_token = self.boost_token;
                let validator = validator.clone();
                async move {
                    let pubkey = validator.pubkey()?;

                    let (boosted_amount, queued_amount) = tokio::try_join!(
                        retry(&policy, "boosted", || reader.boosted(boost_token, owner, &pubkey)),
                        retry(&policy, "boostedQueue", || reader.boosted_queue(boost_token, owner, &pubkey)),
                    )?;

                    if boosted_amount.is_zero() && queued_amount.is_zero() {
                        return Ok(None);
                    }

                    let validator_total = if boosted_amount.is_zero() {
                        None
                    } else {
                        let total = retry(&policy, "boostees", || reader.validator_boost_total(boost_token, &pubkey)).await?;
                        Some(total)
                    };

                    Ok(Some(ValidatorBoost {
                        validator_pubkey: pubkey,
                        validator_name: validator.name,
                        owner_address: owner,
                        boosted_amount,
                        queued_amount,
                        validator_total,
                    }))
                }
            })
            .await;

        info!(
            "   Found {} boosted validators ({} probes failed) in {:?}",
            outcome.found.len(),
            outcome.failed.len(),
            outcome.elapsed
        );
        outcome
    }

    /// `None` when the aggregate reads fail
    async fn has_any_boost(&self, owner: Address) -> Option<bool> {
        let reads = tokio::try_join!(
            retry(&self.policy, "boosts", || self.reader.total_boosts(self.boost_token, owner)),
            retry(&self.policy, "queuedBoost", || self.reader.total_queued_boost(self.boost_token, owner)),
        );

        match reads {
            Ok((active, queued)) => Some(active > U256::ZERO || queued > U256::ZERO),
            Err(e) => {
                warn!("Boost totals unavailable: {}", e);
                None
            }
        }
    }
}
