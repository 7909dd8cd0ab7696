//! JSON-RPC access
//!
//! [`ChainClient`] is the seam every chain-touching component goes through:
//! raw `eth_call`, native balance, and signed submission plus receipt
//! polling. [`RpcChain`] implements it over an alloy HTTP provider.

use alloy_network::ReceiptResponse;
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use async_trait::async_trait;
use eyre::{eyre, Result};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::wallet::WalletManager;
use crate::error::HarvestError;

/// Receipt polling cadence
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(1500);

/// A transaction (or simulated call) to submit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    /// Fixed gas ceiling; `None` lets the provider estimate
    pub gas_limit: Option<u64>,
}

impl TxRequest {
    pub fn new(to: Address, data: Bytes) -> Self {
        Self { to, data, value: U256::ZERO, gas_limit: None }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    fn to_transaction_request(&self, from: Option<Address>) -> TransactionRequest {
        let mut tx = TransactionRequest::default()
            .to(self.to)
            .input(self.data.clone().into())
            .value(self.value);
        if let Some(from) = from {
            tx = tx.from(from);
        }
        if let Some(gas_limit) = self.gas_limit {
            tx = tx.gas_limit(gas_limit);
        }
        tx
    }
}

/// Read and write access to the chain
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// `eth_call` against latest state
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;

    /// `eth_call` of a full transaction from `from`, used for dry runs
    async fn simulate(&self, from: Address, tx: &TxRequest) -> Result<Bytes>;

    async fn native_balance(&self, owner: Address) -> Result<U256>;

    /// Address transactions are sent from, if a signer is configured
    fn sender(&self) -> Option<Address>;

    /// Sign and broadcast; returns the transaction hash
    async fn send_transaction(&self, tx: TxRequest) -> Result<B256>;

    /// Wait for one confirmation; `true` when the receipt status is success
    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<bool>;
}

/// Classify provider errors: network-level trouble is retryable, the rest is not
pub fn classify_rpc_error(context: &str, message: String) -> eyre::Report {
    let lower = message.to_lowercase();
    let transient = ["429", "rate limit", "timeout", "timed out", "connection", "too many requests", "502", "503"]
        .iter()
        .any(|needle| lower.contains(needle));

    if transient {
        HarvestError::TransientRpc(format!("{}: {}", context, message)).into()
    } else {
        eyre!("{} failed: {}", context, message)
    }
}

/// alloy-backed client
pub struct RpcChain {
    provider: DynProvider,
    sender: Option<Address>,
    receipt_timeout: Duration,
}

impl RpcChain {
    /// Connect over HTTP, attaching the wallet's signer when there is one
    pub fn connect(rpc_url: &str, wallet: &WalletManager, receipt_timeout: Duration) -> Result<Self> {
        let url = rpc_url.parse()?;

        let provider = match wallet.ethereum_wallet() {
            Some(signer) => ProviderBuilder::new().wallet(signer).connect_http(url).erased(),
            None => ProviderBuilder::new().connect_http(url).erased(),
        };

        Ok(Self {
            provider,
            sender: wallet.address(),
            receipt_timeout,
        })
    }

    pub async fn block_number(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| classify_rpc_error("eth_blockNumber", e.to_string()))
    }
}

#[async_trait]
impl ChainClient for RpcChain {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let tx = TransactionRequest::default().to(to).input(data.into());

        trace!("eth_call -> {:?}", to);
        self.provider
            .call(tx)
            .await
            .map_err(|e| classify_rpc_error("eth_call", e.to_string()))
    }

    async fn simulate(&self, from: Address, tx: &TxRequest) -> Result<Bytes> {
        self.provider
            .call(tx.to_transaction_request(Some(from)))
            .await
            .map_err(|e| classify_rpc_error("eth_call (simulation)", e.to_string()))
    }

    async fn native_balance(&self, owner: Address) -> Result<U256> {
        self.provider
            .get_balance(owner)
            .await
            .map_err(|e| classify_rpc_error("eth_getBalance", e.to_string()))
    }

    fn sender(&self) -> Option<Address> {
        self.sender
    }

    async fn send_transaction(&self, tx: TxRequest) -> Result<B256> {
        let from = self
            .sender
            .ok_or_else(|| HarvestError::Configuration("no signer configured".into()))?;

        let pending = self
            .provider
            .send_transaction(tx.to_transaction_request(Some(from)))
            .await
            .map_err(|e| classify_rpc_error("eth_sendTransaction", e.to_string()))?;

        let hash = *pending.tx_hash();
        debug!("Sent transaction {:?} -> {:?}", hash, tx.to);
        Ok(hash)
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<bool> {
        let started = Instant::now();

        loop {
            let receipt = self
                .provider
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(|e| classify_rpc_error("eth_getTransactionReceipt", e.to_string()))?;

            if let Some(receipt) = receipt {
                debug!("Receipt for {:?}: status={}", tx_hash, receipt.status());
                return Ok(receipt.status());
            }

            if started.elapsed() > self.receipt_timeout {
                return Err(eyre!(
                    "no receipt for {:?} after {:?}",
                    tx_hash,
                    self.receipt_timeout
                ));
            }

            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}
