//! Error taxonomy
//!
//! Operations return `eyre::Result`; the variants below are raised as
//! `eyre::Report` so callers that need to branch on the failure class can
//! `downcast_ref::<HarvestError>()`.

use alloy_primitives::{Address, B256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvestError {
    /// RPC timeout, rate limit or connection failure. Retryable.
    #[error("transient RPC failure: {0}")]
    TransientRpc(String),

    /// Quote missing required fields or otherwise unusable. The token is skipped.
    #[error("quote rejected for {token}: {reason}")]
    QuoteRejected { token: Address, reason: String },

    /// Allowance below the amount a bundle needs and auto-approve is off.
    #[error("insufficient approval for {} token(s): {}", tokens.len(), format_addresses(tokens))]
    InsufficientApproval { tokens: Vec<Address> },

    /// Transaction was mined but its receipt status is failure.
    #[error("transaction failed: {tx_hash}")]
    TransactionReverted { tx_hash: B256 },

    /// Missing signer, provider or contract address. Fatal.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("retry exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },
}

fn format_addresses(tokens: &[Address]) -> String {
    tokens
        .iter()
        .map(|t| format!("{:?}", t))
        .collect::<Vec<_>>()
        .join(", ")
}

impl HarvestError {
    /// True for failures worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, HarvestError::TransientRpc(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast_from_report() {
        let report: eyre::Report = HarvestError::Configuration("no signer".into()).into();
        let inner = report.downcast_ref::<HarvestError>();
        assert!(matches!(inner, Some(HarvestError::Configuration(_))));
        assert_eq!(report.to_string(), "configuration error: no signer");
    }

    #[test]
    fn test_insufficient_approval_message_lists_tokens() {
        let err = HarvestError::InsufficientApproval {
            tokens: vec![Address::ZERO, Address::repeat_byte(0x11)],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("insufficient approval for 2 token(s)"));
        assert!(msg.contains("0x1111111111111111111111111111111111111111"));
    }

    #[test]
    fn test_only_rpc_failures_are_transient() {
        assert!(HarvestError::TransientRpc("429".into()).is_transient());
        assert!(!HarvestError::TransactionReverted { tx_hash: B256::ZERO }.is_transient());
    }
}
