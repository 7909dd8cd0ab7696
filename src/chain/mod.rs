//! Chain access
//!
//! - `client`: the [`ChainClient`] seam and its alloy HTTP implementation
//! - `contracts`: solidity interfaces and typed reads
//! - `retry`: exponential backoff with jitter
//! - `wallet`: signing identity

mod client;
mod contracts;
mod retry;
mod wallet;

#[cfg(test)]
pub mod mock;

pub use client::{classify_rpc_error, ChainClient, RpcChain, TxRequest};
pub use contracts::{encode_approve, encode_get_reward, ChainReader, IBundler, IERC20, IRewardVault, IBoostToken};
pub use retry::{retry, RetryPolicy};
pub use wallet::WalletManager;
