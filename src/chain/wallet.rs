//! Wallet Manager - transaction signing identity
//!
//! Loads the owner's key and hands an `EthereumWallet` to the provider
//! stack. Signing itself is done by the provider's wallet filler.
//!
//! ⚠️  SECURITY WARNING:
//! - Never log or expose private keys
//! - Use environment variables, not hardcoded keys

use alloy_network::EthereumWallet;
use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use eyre::{eyre, Result};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Wallet manager for signing operations
#[derive(Clone)]
pub struct WalletManager {
    signer: Option<PrivateKeySigner>,
    chain_id: u64,
}

impl WalletManager {
    /// Build from an optional hex key. An unparsable key is logged and ignored.
    pub fn from_key(private_key: Option<&str>, chain_id: u64) -> Self {
        let signer = match private_key {
            Some(key) => match Self::parse_key(key) {
                Ok(signer) => {
                    info!("✓ Wallet loaded: {:?}", signer.address());
                    Some(signer)
                }
                Err(e) => {
                    warn!("Failed to parse PRIVATE_KEY: {}", e);
                    None
                }
            },
            None => {
                debug!("PRIVATE_KEY not set (read-only mode)");
                None
            }
        };

        Self { signer, chain_id }
    }

    /// Create with an explicit key, failing on a bad key (for testing)
    pub fn new(private_key: &str, chain_id: u64) -> Result<Self> {
        Ok(Self {
            signer: Some(Self::parse_key(private_key)?),
            chain_id,
        })
    }

    fn parse_key(key: &str) -> Result<PrivateKeySigner> {
        let key = key.trim().trim_start_matches("0x");
        PrivateKeySigner::from_str(key).map_err(|e| eyre!("invalid private key: {}", e))
    }

    pub fn has_signer(&self) -> bool {
        self.signer.is_some()
    }

    pub fn address(&self) -> Option<Address> {
        self.signer.as_ref().map(|s| s.address())
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Wallet for the provider's signing filler, bound to the configured chain
    pub fn ethereum_wallet(&self) -> Option<EthereumWallet> {
        self.signer.as_ref().map(|signer| {
            let mut signer = signer.clone();
            alloy_signer::Signer::set_chain_id(&mut signer, Some(self.chain_id));
            EthereumWallet::from(signer)
        })
    }
}

impl std::fmt::Debug for WalletManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletManager")
            .field("address", &self.address())
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known anvil dev key (DO NOT USE IN PRODUCTION)
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_loads_known_key() {
        let wallet = WalletManager::new(TEST_KEY, 80094).unwrap();
        assert!(wallet.has_signer());
        assert_eq!(
            wallet.address().unwrap(),
            Address::from_str("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266").unwrap()
        );
        assert!(wallet.ethereum_wallet().is_some());
    }

    #[test]
    fn test_bad_key_means_read_only() {
        let wallet = WalletManager::from_key(Some("0xnope"), 1);
        assert!(!wallet.has_signer());
        assert!(wallet.ethereum_wallet().is_none());

        let wallet = WalletManager::from_key(None, 1);
        assert_eq!(wallet.address(), None);
    }

    #[test]
    fn test_debug_never_prints_key() {
        let wallet = WalletManager::new(TEST_KEY, 1).unwrap();
        let rendered = format!("{:?}", wallet);
        assert!(!rendered.contains("ac0974bec39a17e3"));
    }
}
