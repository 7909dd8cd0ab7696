//! In-memory [`ChainClient`] for tests
//!
//! Responses are keyed by exact calldata first, then by `(target, selector)`.
//! Unmatched calls fail like a revert would. Failures are classified the same
//! way as real RPC errors, so "timeout" or "429" replies are retryable.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;
use async_trait::async_trait;
use eyre::{eyre, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::client::{classify_rpc_error, ChainClient, TxRequest};

#[derive(Clone)]
enum Reply {
    Data(Bytes),
    Fail(String),
}

#[derive(Default)]
pub struct MockChain {
    by_selector: Mutex<HashMap<(Address, [u8; 4]), Reply>>,
    by_calldata: Mutex<HashMap<(Address, Bytes), Reply>>,
    calls: Mutex<Vec<(Address, Bytes)>>,
    native_balances: Mutex<HashMap<Address, U256>>,
    sender: Option<Address>,
    sent: Mutex<Vec<TxRequest>>,
    receipts: Mutex<HashMap<B256, bool>>,
    reverting_targets: Mutex<HashSet<Address>>,
    rejecting_targets: Mutex<HashSet<Address>>,
    simulation_error: Mutex<Option<String>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sender(mut self, sender: Address) -> Self {
        self.sender = Some(sender);
        self
    }

    /// One 32-byte word, as returned for `uint256`/`uint8`/`address` getters
    pub fn word(value: U256) -> Bytes {
        Bytes::from(value.to_be_bytes::<32>().to_vec())
    }

    /// Return-data encoding for any tuple of solidity values
    pub fn encode<T: SolValue>(value: T) -> Bytes {
        Bytes::from(value.abi_encode())
    }

    pub fn on_call(&self, to: Address, selector: [u8; 4], reply: Bytes) {
        self.by_selector.lock().unwrap().insert((to, selector), Reply::Data(reply));
    }

    pub fn fail_call(&self, to: Address, selector: [u8; 4], reason: &str) {
        self.by_selector
            .lock()
            .unwrap()
            .insert((to, selector), Reply::Fail(reason.to_string()));
    }

    /// Reply for one exact calldata (argument-specific responses)
    pub fn on_calldata(&self, to: Address, calldata: Vec<u8>, reply: Bytes) {
        self.by_calldata
            .lock()
            .unwrap()
            .insert((to, Bytes::from(calldata)), Reply::Data(reply));
    }

    pub fn set_native_balance(&self, owner: Address, balance: U256) {
        self.native_balances.lock().unwrap().insert(owner, balance);
    }

    /// Transactions to `target` are mined with a failed status
    pub fn revert_transactions_to(&self, target: Address) {
        self.reverting_targets.lock().unwrap().insert(target);
    }

    /// Transactions to `target` are rejected before broadcast
    pub fn reject_transactions_to(&self, target: Address) {
        self.rejecting_targets.lock().unwrap().insert(target);
    }

    pub fn fail_simulation(&self, reason: &str) {
        *self.simulation_error.lock().unwrap() = Some(reason.to_string());
    }

    pub fn sent_transactions(&self) -> Vec<TxRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn call_count(&self, to: Address, selector: [u8; 4]) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, data)| *t == to && data.len() >= 4 && data[..4] == selector)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        self.calls.lock().unwrap().push((to, data.clone()));

        let exact = self.by_calldata.lock().unwrap().get(&(to, data.clone())).cloned();
        let reply = match exact {
            Some(reply) => Some(reply),
            None if data.len() >= 4 => {
                let mut selector = [0u8; 4];
                selector.copy_from_slice(&data[..4]);
                self.by_selector.lock().unwrap().get(&(to, selector)).cloned()
            }
            None => None,
        };

        match reply {
            Some(Reply::Data(bytes)) => Ok(bytes),
            Some(Reply::Fail(reason)) => Err(classify_rpc_error("eth_call", reason)),
            None => Err(classify_rpc_error("eth_call", format!("execution reverted (no mock for {:?})", to))),
        }
    }

    async fn simulate(&self, _from: Address, _tx: &TxRequest) -> Result<Bytes> {
        match self.simulation_error.lock().unwrap().clone() {
            Some(reason) => Err(eyre!(reason)),
            None => Ok(Bytes::new()),
        }
    }

    async fn native_balance(&self, owner: Address) -> Result<U256> {
        Ok(self
            .native_balances
            .lock()
            .unwrap()
            .get(&owner)
            .copied()
            .unwrap_or_default())
    }

    fn sender(&self) -> Option<Address> {
        self.sender
    }

    async fn send_transaction(&self, tx: TxRequest) -> Result<B256> {
        if self.rejecting_targets.lock().unwrap().contains(&tx.to) {
            return Err(eyre!("nonce too low"));
        }

        let mut sent = self.sent.lock().unwrap();
        sent.push(tx.clone());
        let hash = B256::with_last_byte(sent.len() as u8);

        let success = !self.reverting_targets.lock().unwrap().contains(&tx.to);
        self.receipts.lock().unwrap().insert(hash, success);
        Ok(hash)
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<bool> {
        self.receipts
            .lock()
            .unwrap()
            .get(&tx_hash)
            .copied()
            .ok_or_else(|| eyre!("unknown transaction {:?}", tx_hash))
    }
}
