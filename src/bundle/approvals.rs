//! Allowance checks and approve/revoke transactions
//!
//! Allowances are read fresh on every check. Any transaction from the same
//! owner can change them, so a status is only good for the check-act cycle
//! it was taken for.

use alloy_primitives::{Address, U256};
use eyre::Result;
use std::sync::Arc;
use tracing::{info, warn};

use super::types::{ApprovalStatus, OperationResult};
use crate::chain::{encode_approve, ChainReader, TxRequest};
use crate::error::HarvestError;
use crate::tokens::{is_native, parse_amount, short_address};

pub struct ApprovalReconciler {
    reader: Arc<ChainReader>,
}

impl ApprovalReconciler {
    pub fn new(reader: Arc<ChainReader>) -> Self {
        Self { reader }
    }

    /// Compare the allowance against a human-readable amount.
    ///
    /// The amount is converted with the token's decimals and truncated.
    pub async fn check(&self, token: Address, owner: Address, spender: Address, required: &str) -> Result<ApprovalStatus> {
        let decimals = self.reader.decimals(token).await;
        let required_amount = parse_amount(required, decimals)?;
        self.check_raw(token, owner, spender, required_amount).await
    }

    /// Compare the allowance against an amount in the token's smallest unit
    pub async fn check_raw(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        required_amount: U256,
    ) -> Result<ApprovalStatus> {
        // The native token is sent as value and needs no allowance
        let current_allowance = if is_native(&token) {
            U256::MAX
        } else {
            self.reader.allowance(token, owner, spender).await?
        };

        Ok(ApprovalStatus {
            token_address: token,
            owner_address: owner,
            spender_address: spender,
            current_allowance,
            required_amount,
        })
    }

    /// Approve `spender` for `amount` (decimal string) or unlimited.
    ///
    /// Waits for one confirmation before returning.
    pub async fn approve(&self, token: Address, spender: Address, amount: Option<&str>) -> OperationResult {
        let raw = match amount {
            Some(amount) => {
                let decimals = self.reader.decimals(token).await;
                match parse_amount(amount, decimals) {
                    Ok(raw) => raw,
                    Err(e) => return OperationResult::failed(label("approve", token), None, e.to_string()),
                }
            }
            None => U256::MAX,
        };
        self.approve_raw(token, spender, raw).await
    }

    /// Set the allowance to zero
    pub async fn revoke(&self, token: Address, spender: Address) -> OperationResult {
        let mut result = self.approve_raw(token, spender, U256::ZERO).await;
        result.label = label("revoke", token);
        result
    }

    pub async fn approve_raw(&self, token: Address, spender: Address, amount: U256) -> OperationResult {
        let label = label("approve", token);

        if is_native(&token) {
            return OperationResult::failed(label, None, "the native token has no allowance");
        }

        let client = self.reader.client();
        if client.sender().is_none() {
            let err = HarvestError::Configuration("approving requires a signer".into());
            return OperationResult::failed(label, None, err.to_string());
        }

        let tx = TxRequest::new(token, encode_approve(spender, amount));
        let tx_hash = match client.send_transaction(tx).await {
            Ok(hash) => hash,
            Err(e) => {
                warn!("Approve {} failed to send: {}", short_address(&token), e);
                return OperationResult::failed(label, None, e.to_string());
            }
        };

        info!("   Approve {} -> {} sent: {:?}", short_address(&token), short_address(&spender), tx_hash);

        match client.wait_for_receipt(tx_hash).await {
            Ok(true) => OperationResult::ok(label, Some(tx_hash)),
            Ok(false) => {
                let err = HarvestError::TransactionReverted { tx_hash };
                OperationResult::failed(label, Some(tx_hash), err.to_string())
            }
            Err(e) => OperationResult::failed(label, Some(tx_hash), e.to_string()),
        }
    }
}

fn label(action: &str, token: Address) -> String {
    format!("{} {}", action, short_address(&token))
}
