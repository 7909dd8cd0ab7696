//! Bundle data model

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::Serialize;

use crate::chain::IBundler;
use crate::tokens::{short_address, Token};

use super::quote::Quote;

/// Operation type tag understood by the bundler contract
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OperationKind {
    Approve = 1,
    Swap = 2,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Approve => write!(f, "approve"),
            OperationKind::Swap => write!(f, "swap"),
        }
    }
}

/// One step inside a bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Operation {
    pub kind: OperationKind,
    /// Contract the step calls (the router for swaps, the spender for approvals)
    pub target: Address,
    pub call_data: Bytes,
    pub native_value: U256,
    pub token_address: Address,
    pub token_amount: U256,
    pub output_token: Address,
    pub min_output_amount: U256,
}

impl Operation {
    /// Unlimited approval of `token` to `spender`; the bundler emits the real `approve`
    pub fn approve(token: Address, spender: Address) -> Self {
        Self {
            kind: OperationKind::Approve,
            target: spender,
            call_data: Bytes::new(),
            native_value: U256::ZERO,
            token_address: token,
            token_amount: U256::MAX,
            output_token: Address::ZERO,
            min_output_amount: U256::ZERO,
        }
    }

    /// Swap of `amount` of `token`, executing the quote's call data unchanged
    pub fn swap(token: Address, amount: U256, quote: &Quote) -> Self {
        Self {
            kind: OperationKind::Swap,
            target: quote.router_address,
            call_data: quote.call_data.clone(),
            native_value: quote.native_value,
            token_address: token,
            token_amount: amount,
            output_token: quote.output_token,
            min_output_amount: quote.min_output,
        }
    }

    pub fn to_abi(&self) -> IBundler::Operation {
        IBundler::Operation {
            operationType: self.kind as u8,
            target: self.target,
            data: self.call_data.clone(),
            value: self.native_value,
            tokenAddress: self.token_address,
            tokenAmount: self.token_amount,
            outputToken: self.output_token,
            minOutputAmount: self.min_output_amount,
        }
    }
}

/// Allowance snapshot for one (token, owner, spender)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalStatus {
    pub token_address: Address,
    pub owner_address: Address,
    pub spender_address: Address,
    pub current_allowance: U256,
    pub required_amount: U256,
}

impl ApprovalStatus {
    pub fn sufficient(&self) -> bool {
        self.current_allowance >= self.required_amount
    }
}

/// A token that was requested but did not make it into the bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedToken {
    pub token: Address,
    pub reason: String,
}

/// Ordered plan produced by the builder and consumed by the executor
#[derive(Debug, Clone, Serialize)]
pub struct SwapBundle {
    pub owner: Address,
    pub target_token: Token,
    /// Approvals first, then swaps; input order within each group
    pub operations: Vec<Operation>,
    pub approvals_needed: Vec<ApprovalStatus>,
    /// Sum of quoted outputs in whole target tokens; display only
    pub total_expected_output: f64,
    pub skipped: Vec<SkippedToken>,
    pub auto_approve: bool,
    pub error: Option<String>,
}

impl SwapBundle {
    pub fn empty(owner: Address, target_token: Token) -> Self {
        Self {
            owner,
            target_token,
            operations: Vec::new(),
            approvals_needed: Vec::new(),
            total_expected_output: 0.0,
            skipped: Vec::new(),
            auto_approve: false,
            error: None,
        }
    }

    pub fn failed(owner: Address, error: impl Into<String>) -> Self {
        let mut bundle = Self::empty(owner, Token::native());
        bundle.error = Some(error.into());
        bundle
    }

    pub fn with_auto_approve(mut self, auto_approve: bool) -> Self {
        self.auto_approve = auto_approve;
        self
    }

    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn swaps(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter().filter(|op| op.kind == OperationKind::Swap)
    }

    pub fn approve_count(&self) -> usize {
        self.operations.iter().filter(|op| op.kind == OperationKind::Approve).count()
    }

    /// Value the bundle transaction must carry
    pub fn total_native_value(&self) -> U256 {
        self.operations
            .iter()
            .fold(U256::ZERO, |acc, op| acc.saturating_add(op.native_value))
    }

    /// Exactly one swap and nothing else
    pub fn is_single_swap(&self) -> bool {
        self.operations.len() == 1 && self.operations[0].kind == OperationKind::Swap
    }

    pub fn describe(&self) -> String {
        format!(
            "{} approve + {} swap -> {} (skipped {})",
            self.approve_count(),
            self.swaps().count(),
            self.target_token.symbol,
            self.skipped.len()
        )
    }
}

/// Outcome of one submitted operation or claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationResult {
    /// What was attempted, e.g. `swap 0x1234ab` or `claim vault-0x1234ab`
    pub label: String,
    pub success: bool,
    pub tx_hash: Option<B256>,
    pub error: Option<String>,
}

impl OperationResult {
    pub fn ok(label: impl Into<String>, tx_hash: Option<B256>) -> Self {
        Self { label: label.into(), success: true, tx_hash, error: None }
    }

    pub fn failed(label: impl Into<String>, tx_hash: Option<B256>, error: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            success: false,
            tx_hash,
            error: Some(error.into()),
        }
    }

    pub fn for_operation(op: &Operation) -> String {
        format!("{} {}", op.kind, short_address(&op.token_address))
    }
}

/// Executor state, logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Pending,
    Submitted,
    Confirmed,
    Reverted,
    Failed,
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionState::Pending => "pending",
            ExecutionState::Submitted => "submitted",
            ExecutionState::Confirmed => "confirmed",
            ExecutionState::Reverted => "reverted",
            ExecutionState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BundleResult {
    pub per_operation_results: Vec<OperationResult>,
    pub aggregate_success: bool,
    pub total_value_usd: Option<f64>,
    /// Terminal error when the bundle never reached the chain
    pub error: Option<String>,
    /// `true` when the result comes from an `eth_call` rather than a mined transaction
    pub simulated: bool,
}

impl BundleResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            per_operation_results: Vec::new(),
            aggregate_success: false,
            total_value_usd: None,
            error: Some(error.into()),
            simulated: false,
        }
    }

    pub fn tx_hash(&self) -> Option<B256> {
        self.per_operation_results.iter().find_map(|r| r.tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(router: Address, value: u64) -> Quote {
        Quote {
            router_address: router,
            call_data: Bytes::from(vec![0x12, 0x34, 0x56]),
            native_value: U256::from(value),
            output_token: Address::repeat_byte(0xee),
            expected_output: U256::from(1000u64),
            min_output: U256::from(990u64),
            path_definition: Bytes::from(vec![1]),
            executor: Address::repeat_byte(0xe0),
            referral_code: 0,
        }
    }

    #[test]
    fn test_swap_copies_call_data_verbatim() {
        let q = quote(Address::repeat_byte(0x50), 0);
        let op = Operation::swap(Address::repeat_byte(1), U256::from(5u64), &q);
        assert_eq!(op.call_data, q.call_data);
        assert_eq!(op.target, q.router_address);
        assert_eq!(op.min_output_amount, U256::from(990u64));
    }

    #[test]
    fn test_approve_shape() {
        let op = Operation::approve(Address::repeat_byte(1), Address::repeat_byte(0x50));
        assert!(op.call_data.is_empty());
        assert_eq!(op.token_amount, U256::MAX);
        assert_eq!(op.to_abi().operationType, 1);
    }

    #[test]
    fn test_native_value_sums_operations() {
        let mut bundle = SwapBundle::empty(Address::ZERO, Token::native());
        bundle.operations.push(Operation::approve(Address::repeat_byte(1), Address::repeat_byte(2)));
        bundle.operations.push(Operation::swap(Address::ZERO, U256::from(7u64), &quote(Address::repeat_byte(2), 7)));
        bundle.operations.push(Operation::swap(Address::repeat_byte(1), U256::from(3u64), &quote(Address::repeat_byte(2), 0)));

        assert_eq!(bundle.total_native_value(), U256::from(7u64));
        assert!(!bundle.is_single_swap());
        assert_eq!(bundle.approve_count(), 1);
        assert_eq!(bundle.describe(), "1 approve + 2 swap -> BERA (skipped 0)");
    }
}
