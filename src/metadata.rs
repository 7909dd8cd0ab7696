//! Metadata directory client
//!
//! Fetches the vault, validator and token lists the scanners work from.
//! The lists are curated off-chain, so entries with unusable addresses are
//! dropped with a warning rather than failing the whole list.

use alloy_primitives::{Address, Bytes};
use eyre::{eyre, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::scanner::ScanTarget;
use crate::tokens::{normalize_address, Token, DEFAULT_DECIMALS};

const API_TIMEOUT_SECS: u64 = 15;

// ============================================
// WIRE TYPES
// ============================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVault {
    vault_address: Option<String>,
    staking_token_address: Option<String>,
    reward_token_address: Option<String>,
    name: Option<String>,
    protocol: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawValidator {
    id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawToken {
    address: Option<String>,
    symbol: Option<String>,
    decimals: Option<u8>,
}

// ============================================
// DIRECTORY ENTRIES
// ============================================

/// A reward vault listed in the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultInfo {
    pub address: Address,
    pub staking_token: Option<Address>,
    pub reward_token: Option<Address>,
    pub name: String,
    pub protocol: Option<String>,
}

impl ScanTarget for VaultInfo {
    fn describe(&self) -> String {
        format!("vault {} ({:?})", self.name, self.address)
    }
}

/// A validator listed in the directory; `id` is the hex pubkey
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorInfo {
    pub id: String,
    pub name: String,
}

impl ValidatorInfo {
    pub fn pubkey(&self) -> Result<Bytes> {
        let raw = self.id.trim().trim_start_matches("0x");
        let bytes = hex::decode(raw).map_err(|e| eyre!("invalid validator pubkey {}: {}", self.id, e))?;
        if bytes.is_empty() {
            return Err(eyre!("empty validator pubkey"));
        }
        Ok(Bytes::from(bytes))
    }
}

impl ScanTarget for ValidatorInfo {
    fn describe(&self) -> String {
        format!("validator {}", self.name)
    }
}

// ============================================
// PARSING
// ============================================

pub fn parse_vaults(json: &str) -> Result<Vec<VaultInfo>> {
    let raw: Vec<RawVault> = serde_json::from_str(json)?;
    let total = raw.len();

    let vaults: Vec<VaultInfo> = raw
        .into_iter()
        .filter_map(|v| {
            let address = v.vault_address.as_deref().and_then(normalize_address);
            let Some(address) = address else {
                warn!("Skipping vault {:?}: missing or invalid address", v.name);
                return None;
            };
            Some(VaultInfo {
                address,
                staking_token: v.staking_token_address.as_deref().and_then(normalize_address),
                reward_token: v.reward_token_address.as_deref().and_then(normalize_address),
                name: v.name.unwrap_or_else(|| format!("{:?}", address)),
                protocol: v.protocol,
            })
        })
        .collect();

    debug!("Parsed {}/{} vaults", vaults.len(), total);
    Ok(vaults)
}

pub fn parse_validators(json: &str) -> Result<Vec<ValidatorInfo>> {
    let raw: Vec<RawValidator> = serde_json::from_str(json)?;

    Ok(raw
        .into_iter()
        .filter_map(|v| match v.id {
            Some(id) if !id.trim().is_empty() => Some(ValidatorInfo {
                name: v.name.unwrap_or_else(|| id.clone()),
                id,
            }),
            _ => {
                warn!("Skipping validator {:?}: missing id", v.name);
                None
            }
        })
        .collect())
}

pub fn parse_tokens(json: &str) -> Result<Vec<Token>> {
    let raw: Vec<RawToken> = serde_json::from_str(json)?;

    Ok(raw
        .into_iter()
        .filter_map(|t| {
            let address = t.address.as_deref().and_then(normalize_address)?;
            Some(Token::new(
                address,
                t.symbol.unwrap_or_else(|| "UNKNOWN".to_string()),
                t.decimals.unwrap_or(DEFAULT_DECIMALS),
            ))
        })
        .collect())
}

// ============================================
// HTTP CLIENT
// ============================================

pub struct MetadataClient {
    http_client: Client,
    base_url: String,
}

impl MetadataClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn fetch(&self, file: &str) -> Result<String> {
        let url = format!("{}/{}", self.base_url, file);
        debug!("Fetching {}", url);

        let response = self.http_client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(eyre!("metadata fetch {} failed: HTTP {}", url, response.status()));
        }
        Ok(response.text().await?)
    }

    pub async fn fetch_vaults(&self) -> Result<Vec<VaultInfo>> {
        parse_vaults(&self.fetch("vaults.json").await?)
    }

    pub async fn fetch_validators(&self) -> Result<Vec<ValidatorInfo>> {
        parse_validators(&self.fetch("validators.json").await?)
    }

    pub async fn fetch_tokens(&self) -> Result<Vec<Token>> {
        parse_tokens(&self.fetch("tokens.json").await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vaults_skips_bad_addresses() {
        let json = r#"[
            {"vaultAddress": "0x1111111111111111111111111111111111111111",
             "stakingTokenAddress": "0x2222222222222222222222222222222222222222",
             "rewardTokenAddress": "0x3333333333333333333333333333333333333333",
             "name": "HONEY-WBERA", "protocol": "BEX", "extra": 1},
            {"vaultAddress": "garbage", "name": "broken"},
            {"name": "no address"}
        ]"#;

        let vaults = parse_vaults(json).unwrap();
        assert_eq!(vaults.len(), 1);
        assert_eq!(vaults[0].name, "HONEY-WBERA");
        assert_eq!(vaults[0].protocol.as_deref(), Some("BEX"));
        assert_eq!(vaults[0].staking_token, Some(Address::repeat_byte(0x22)));
    }

    #[test]
    fn test_parse_validators() {
        let json = r#"[{"id": "0xabcd", "name": "Val A"}, {"id": "", "name": "empty"}, {"id": "0x01"}]"#;
        let validators = parse_validators(json).unwrap();
        assert_eq!(validators.len(), 2);
        assert_eq!(validators[0].pubkey().unwrap(), Bytes::from(vec![0xab, 0xcd]));
        assert_eq!(validators[1].name, "0x01");
    }

    #[test]
    fn test_bad_pubkey_is_an_error() {
        let v = ValidatorInfo { id: "0xzz".into(), name: "bad".into() };
        assert!(v.pubkey().is_err());
    }

    #[test]
    fn test_parse_tokens_defaults() {
        let json = r#"[{"address": "0x4444444444444444444444444444444444444444", "symbol": "iBGT"},
                       {"address": "BERA", "symbol": "BERA", "decimals": 18}]"#;
        let tokens = parse_tokens(json).unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].decimals, 18);
        assert!(tokens[1].is_native());
    }
}
