//! Bundle submission
//!
//! `Pending -> Submitted -> Confirmed | Reverted | Failed`.
//! The whole operation list goes to `executeBundle` in one transaction, so
//! the bundle either lands as a unit or not at all.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::approvals::ApprovalReconciler;
use super::types::{BundleResult, ExecutionState, OperationResult, SwapBundle};
use crate::chain::{ChainClient, IBundler, TxRequest};
use crate::config::ExecutionMode;
use crate::error::HarvestError;
use crate::tokens::is_native;

/// Fixed gas ceilings; bundles are never estimated
#[derive(Debug, Clone, Copy)]
pub struct GasLimits {
    pub bundle: u64,
    pub single_swap: u64,
}

impl Default for GasLimits {
    fn default() -> Self {
        Self { bundle: 3_000_000, single_swap: 800_000 }
    }
}

pub struct BundleExecutor {
    client: Arc<dyn ChainClient>,
    approvals: Arc<ApprovalReconciler>,
    bundler: Address,
    mode: ExecutionMode,
    gas: GasLimits,
}

impl BundleExecutor {
    pub fn new(
        client: Arc<dyn ChainClient>,
        approvals: Arc<ApprovalReconciler>,
        bundler: Address,
        mode: ExecutionMode,
        gas: GasLimits,
    ) -> Self {
        Self { client, approvals, bundler, mode, gas }
    }

    /// The transaction a bundle is submitted as
    pub fn transaction_for(&self, bundle: &SwapBundle) -> TxRequest {
        let operations = bundle.operations.iter().map(|op| op.to_abi()).collect();
        let data = Bytes::from(IBundler::executeBundleCall { operations }.abi_encode());

        // One swap and nothing else goes out with the tighter ceiling
        let gas_limit = if bundle.is_single_swap() {
            self.gas.single_swap
        } else {
            self.gas.bundle
        };

        TxRequest::new(self.bundler, data)
            .with_value(bundle.total_native_value())
            .with_gas_limit(gas_limit)
    }

    /// Submit the bundle and wait for its receipt
    pub async fn execute(&self, bundle: &SwapBundle) -> BundleResult {
        if let Some(ref err) = bundle.error {
            return BundleResult::failed(format!("bundle was not built: {}", err));
        }
        if bundle.is_empty() {
            return BundleResult::failed("bundle has no operations");
        }

        let owner = match self.mode {
            ExecutionMode::Production => match self.client.sender() {
                Some(sender) => sender,
                None => return BundleResult::failed(HarvestError::Configuration("no signer configured".into()).to_string()),
            },
            _ => bundle.owner,
        };

        self.log_state(ExecutionState::Pending, bundle);

        // Allowances may have moved since the bundle was built
        let outstanding = self.outstanding_approvals(owner, bundle).await;
        let outstanding = match outstanding {
            Ok(tokens) => tokens,
            Err(e) => return self.fail(bundle, e),
        };

        if !outstanding.is_empty() {
            if !bundle.auto_approve {
                let err = HarvestError::InsufficientApproval { tokens: outstanding };
                return self.fail(bundle, err.to_string());
            }

            if self.mode == ExecutionMode::Production {
                for token in outstanding {
                    info!("   Auto-approving {:?} for the bundler", token);
                    let result = self.approvals.approve_raw(token, self.bundler, U256::MAX).await;
                    if !result.success {
                        let reason = result.error.unwrap_or_else(|| "approve failed".to_string());
                        return self.fail(bundle, format!("auto-approve of {:?} failed: {}", token, reason));
                    }
                }
            } else {
                // Nothing is sent outside production; report what would be approved
                for token in &outstanding {
                    info!("📋 {} MODE: would approve {:?} for the bundler", self.mode, token);
                }
            }
        }

        let tx = self.transaction_for(bundle);

        match self.mode {
            ExecutionMode::Simulation => {
                info!("📋 SIMULATION MODE: would submit {}", bundle.describe());
                info!("   value {} wei, gas limit {:?}", tx.value, tx.gas_limit);
                let mut result = self.result(bundle, true, None, None);
                result.simulated = true;
                result
            }

            ExecutionMode::DryRun => {
                info!("🔬 DRY RUN MODE: eth_call executeBundle from {:?}", owner);
                let mut result = match self.client.simulate(owner, &tx).await {
                    Ok(_) => {
                        info!("✅ Bundle simulation passed");
                        self.result(bundle, true, None, None)
                    }
                    Err(e) => {
                        warn!("❌ Bundle simulation failed: {}", e);
                        self.result(bundle, false, None, Some(e.to_string()))
                    }
                };
                result.simulated = true;
                result
            }

            ExecutionMode::Production => self.submit(bundle, tx).await,
        }
    }

    async fn submit(&self, bundle: &SwapBundle, tx: TxRequest) -> BundleResult {
        let tx_hash = match self.client.send_transaction(tx).await {
            Ok(hash) => hash,
            Err(e) => return self.fail(bundle, e.to_string()),
        };
        info!("📤 Bundle {}: {:?}", ExecutionState::Submitted, tx_hash);

        match self.client.wait_for_receipt(tx_hash).await {
            Ok(true) => {
                info!("✅ Bundle {}: {:?}", ExecutionState::Confirmed, tx_hash);
                self.result(bundle, true, Some(tx_hash), None)
            }
            Ok(false) => {
                warn!("❌ Bundle {}: {:?}", ExecutionState::Reverted, tx_hash);
                let err = HarvestError::TransactionReverted { tx_hash };
                self.result(bundle, false, Some(tx_hash), Some(err.to_string()))
            }
            Err(e) => {
                error!("Bundle {}: {:?}: {}", ExecutionState::Failed, tx_hash, e);
                self.result(bundle, false, Some(tx_hash), Some(e.to_string()))
            }
        }
    }

    /// Non-native swap inputs whose allowance to the bundler is short
    async fn outstanding_approvals(&self, owner: Address, bundle: &SwapBundle) -> Result<Vec<Address>, String> {
        let mut outstanding: Vec<Address> = Vec::new();

        for op in bundle.swaps() {
            if is_native(&op.token_address) || outstanding.contains(&op.token_address) {
                continue;
            }
            let required: U256 = bundle
                .swaps()
                .filter(|other| other.token_address == op.token_address)
                .fold(U256::ZERO, |acc, other| acc.saturating_add(other.token_amount));

            match self.approvals.check_raw(op.token_address, owner, self.bundler, required).await {
                Ok(status) if status.sufficient() => {}
                Ok(_) => outstanding.push(op.token_address),
                Err(e) => return Err(format!("allowance check for {:?} failed: {}", op.token_address, e)),
            }
        }

        Ok(outstanding)
    }

    fn result(
        &self,
        bundle: &SwapBundle,
        success: bool,
        tx_hash: Option<B256>,
        error: Option<String>,
    ) -> BundleResult {
        // One transaction: every operation shares its outcome
        let per_operation_results = bundle
            .operations
            .iter()
            .map(|op| {
                let label = OperationResult::for_operation(op);
                match (&error, success) {
                    (None, true) => OperationResult::ok(label, tx_hash),
                    (err, _) => OperationResult::failed(
                        label,
                        tx_hash,
                        err.clone().unwrap_or_else(|| "transaction failed".to_string()),
                    ),
                }
            })
            .collect();

        BundleResult {
            per_operation_results,
            aggregate_success: success,
            total_value_usd: None,
            error,
            simulated: false,
        }
    }

    fn fail(&self, bundle: &SwapBundle, reason: String) -> BundleResult {
        warn!("❌ Bundle {}: {}", ExecutionState::Failed, reason);
        self.result(bundle, false, None, Some(reason))
    }

    fn log_state(&self, state: ExecutionState, bundle: &SwapBundle) {
        let path = if bundle.is_single_swap() { "single-swap" } else { "bundle" };
        info!(
            "⏳ Bundle {} ({} path, {} ops, {} swaps, mode {})",
            state,
            path,
            bundle.operations.len(),
            bundle.swaps().count(),
            self.mode
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::quote::Quote;
    use crate::bundle::types::Operation;
    use crate::chain::mock::MockChain;
    use crate::chain::{ChainReader, IERC20};
    use crate::tokens::Token;
    use alloy_sol_types::SolCall;

    const OWNER: Address = Address::repeat_byte(0xaa);
    const BUNDLER: Address = Address::repeat_byte(0xb0);
    const ROUTER: Address = Address::repeat_byte(0x50);
    const IBGT: Address = Address::repeat_byte(0x03);

    fn quote(value: u64) -> Quote {
        Quote {
            router_address: ROUTER,
            call_data: Bytes::from(vec![0xab, 0xcd]),
            native_value: U256::from(value),
            output_token: Address::ZERO,
            expected_output: U256::from(10u64),
            min_output: U256::from(9u64),
            path_definition: Bytes::from(vec![1]),
            executor: Address::repeat_byte(0xe0),
            referral_code: 0,
        }
    }

    fn bundle(ops: Vec<Operation>, auto_approve: bool) -> SwapBundle {
        let mut b = SwapBundle::empty(OWNER, Token::native()).with_auto_approve(auto_approve);
        b.operations = ops;
        b
    }

    fn executor(mock: Arc<MockChain>, mode: ExecutionMode) -> BundleExecutor {
        let reader = Arc::new(ChainReader::new(mock.clone()));
        BundleExecutor::new(
            mock,
            Arc::new(ApprovalReconciler::new(reader)),
            BUNDLER,
            mode,
            GasLimits::default(),
        )
    }

    fn chain(allowance: U256) -> Arc<MockChain> {
        let mock = MockChain::new().with_sender(OWNER);
        mock.on_call(IBGT, IERC20::allowanceCall::SELECTOR, MockChain::word(allowance));
        Arc::new(mock)
    }

    #[tokio::test]
    async fn test_approve_plus_swap_uses_bundle_gas_and_zero_value() {
        let mock = chain(U256::MAX);
        let ops = vec![
            Operation::approve(IBGT, ROUTER),
            Operation::swap(IBGT, U256::from(100u64), &quote(0)),
        ];
        let result = executor(mock.clone(), ExecutionMode::Production).execute(&bundle(ops, false)).await;

        assert!(result.aggregate_success);
        assert_eq!(result.per_operation_results.len(), 2);

        let sent = mock.sent_transactions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, BUNDLER);
        assert_eq!(sent[0].value, U256::ZERO);
        assert_eq!(sent[0].gas_limit, Some(3_000_000));

        let decoded = IBundler::executeBundleCall::abi_decode(&sent[0].data).unwrap();
        assert_eq!(decoded.operations.len(), 2);
        assert_eq!(decoded.operations[0].operationType, 1);
        assert_eq!(decoded.operations[1].operationType, 2);
        assert_eq!(decoded.operations[1].data, Bytes::from(vec![0xab, 0xcd]));
    }

    #[tokio::test]
    async fn test_single_swap_fast_path() {
        let mock = chain(U256::MAX);
        let ops = vec![Operation::swap(Address::ZERO, U256::from(5u64), &quote(5))];
        let result = executor(mock.clone(), ExecutionMode::Production).execute(&bundle(ops, false)).await;

        assert!(result.aggregate_success);
        let sent = mock.sent_transactions();
        assert_eq!(sent[0].gas_limit, Some(800_000));
        assert_eq!(sent[0].value, U256::from(5u64));
    }

    #[tokio::test]
    async fn test_insufficient_approval_fails_fast() {
        let mock = chain(U256::ZERO);
        let ops = vec![Operation::swap(IBGT, U256::from(100u64), &quote(0))];
        let result = executor(mock.clone(), ExecutionMode::Production).execute(&bundle(ops, false)).await;

        assert!(!result.aggregate_success);
        assert!(result.error.unwrap().starts_with("insufficient approval for 1 token(s)"));
        assert!(mock.sent_transactions().is_empty());
    }

    #[tokio::test]
    async fn test_auto_approve_then_submit() {
        let mock = chain(U256::ZERO);
        let ops = vec![Operation::swap(IBGT, U256::from(100u64), &quote(0))];
        let result = executor(mock.clone(), ExecutionMode::Production).execute(&bundle(ops, true)).await;

        assert!(result.aggregate_success);
        let sent = mock.sent_transactions();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, IBGT);
        assert_eq!(sent[1].to, BUNDLER);
    }

    #[tokio::test]
    async fn test_auto_approve_planned_in_simulation() {
        for mode in [ExecutionMode::Simulation, ExecutionMode::DryRun] {
            let mock = chain(U256::ZERO);
            let ops = vec![Operation::swap(IBGT, U256::from(100u64), &quote(0))];
            let result = executor(mock.clone(), mode).execute(&bundle(ops, true)).await;

            assert!(result.aggregate_success, "{} should plan the approval", mode);
            assert!(result.simulated);
            assert!(mock.sent_transactions().is_empty());
        }
    }

    #[tokio::test]
    async fn test_missing_approval_without_auto_approve_fails_in_simulation() {
        let mock = chain(U256::ZERO);
        let ops = vec![Operation::swap(IBGT, U256::from(100u64), &quote(0))];
        let result = executor(mock, ExecutionMode::Simulation).execute(&bundle(ops, false)).await;

        assert!(!result.aggregate_success);
        assert!(result.error.unwrap().starts_with("insufficient approval"));
    }

    #[tokio::test]
    async fn test_reverted_bundle() {
        let mock = chain(U256::MAX);
        mock.revert_transactions_to(BUNDLER);
        let ops = vec![Operation::swap(IBGT, U256::from(1u64), &quote(0))];
        let result = executor(mock, ExecutionMode::Production).execute(&bundle(ops, false)).await;

        assert!(!result.aggregate_success);
        assert!(result.tx_hash().is_some());
        assert!(result.per_operation_results[0]
            .error
            .as_deref()
            .unwrap()
            .starts_with("transaction failed"));
    }

    #[tokio::test]
    async fn test_dry_run_never_sends() {
        let mock = chain(U256::MAX);
        mock.fail_simulation("execution reverted: slippage");
        let ops = vec![Operation::swap(IBGT, U256::from(1u64), &quote(0))];
        let result = executor(mock.clone(), ExecutionMode::DryRun).execute(&bundle(ops, false)).await;

        assert!(result.simulated);
        assert!(!result.aggregate_success);
        assert!(mock.sent_transactions().is_empty());
    }

    #[tokio::test]
    async fn test_no_signer_is_configuration_error() {
        let mock = Arc::new(MockChain::new());
        let ops = vec![Operation::swap(Address::ZERO, U256::from(1u64), &quote(1))];
        let result = executor(mock, ExecutionMode::Production).execute(&bundle(ops, false)).await;
        assert!(result.error.unwrap().starts_with("configuration error"));
    }

    #[tokio::test]
    async fn test_empty_bundle_rejected() {
        let result = executor(chain(U256::MAX), ExecutionMode::Production).execute(&bundle(vec![], false)).await;
        assert!(!result.aggregate_success);
        assert!(result.per_operation_results.is_empty());
    }
}
