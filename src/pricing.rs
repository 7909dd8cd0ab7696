//! Token price oracle
//!
//! Resolves token addresses to USD prices from an HTTP price feed.
//! The whole price map is fetched at once and cached for a short TTL.
//!
//! API: GET {PRICE_API_URL}/prices?currency=USD -> [{"address": "0x..", "price": 1.23}]

use alloy_primitives::Address;
use async_trait::async_trait;
use eyre::{eyre, Result};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

use crate::tokens::{is_native, normalize_address};

// ============================================
// CONSTANTS
// ============================================

/// Timeout for API calls
const API_TIMEOUT_SECS: u64 = 10;

// ============================================
// API RESPONSE TYPES
// ============================================

#[derive(Debug, Deserialize)]
struct PriceEntry {
    address: Option<String>,
    price: Option<f64>,
}

/// Parse a price-feed response body, skipping unusable rows
pub fn parse_prices(json: &str) -> Result<HashMap<Address, f64>> {
    let entries: Vec<PriceEntry> = serde_json::from_str(json)?;

    Ok(entries
        .into_iter()
        .filter_map(|e| {
            let address = e.address.as_deref().and_then(normalize_address)?;
            let price = e.price.filter(|p| p.is_finite() && *p >= 0.0)?;
            Some((address, price))
        })
        .collect())
}

// ============================================
// PRICE FEED
// ============================================

/// Source of the full address -> USD price map
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn fetch_prices(&self) -> Result<HashMap<Address, f64>>;
}

pub struct HttpPriceFeed {
    http_client: Client,
    base_url: String,
}

impl HttpPriceFeed {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PriceFeed for HttpPriceFeed {
    async fn fetch_prices(&self) -> Result<HashMap<Address, f64>> {
        let url = format!("{}/prices?currency=USD", self.base_url);

        let response = self.http_client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(eyre!("price feed returned HTTP {}", response.status()));
        }

        parse_prices(&response.text().await?)
    }
}

// ============================================
// CACHED SNAPSHOT
// ============================================

#[derive(Debug, Clone)]
pub struct PriceSnapshot {
    pub prices: HashMap<Address, f64>,
    pub fetched_at: Instant,
}

impl PriceSnapshot {
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() > ttl
    }
}

// ============================================
// PRICE ORACLE
// ============================================

pub struct PriceOracle {
    feed: Arc<dyn PriceFeed>,
    /// Native token is priced as its wrapped ERC20
    wrapped_native: Option<Address>,
    ttl: Duration,
    cache: Arc<RwLock<Option<PriceSnapshot>>>,
}

impl PriceOracle {
    pub fn new(feed: Arc<dyn PriceFeed>, wrapped_native: Option<Address>, ttl: Duration) -> Self {
        Self {
            feed,
            wrapped_native,
            ttl,
            cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Current price map (with caching)
    ///
    /// A failed refresh falls back to the previous snapshot, however old.
    pub async fn snapshot(&self) -> Option<PriceSnapshot> {
        {
            let cache = self.cache.read().await;
            if let Some(ref snap) = *cache {
                if !snap.is_stale(self.ttl) {
                    trace!("Using cached prices ({} tokens)", snap.prices.len());
                    return Some(snap.clone());
                }
            }
        }

        match self.feed.fetch_prices().await {
            Ok(prices) => {
                debug!("💲 Fetched {} token prices", prices.len());
                let snap = PriceSnapshot { prices, fetched_at: Instant::now() };
                *self.cache.write().await = Some(snap.clone());
                Some(snap)
            }
            Err(e) => {
                let cache = self.cache.read().await;
                match cache.as_ref() {
                    Some(stale) => {
                        warn!("Price refresh failed, serving snapshot from {:?} ago: {}", stale.fetched_at.elapsed(), e);
                        Some(stale.clone())
                    }
                    None => {
                        warn!("Price feed unavailable: {}", e);
                        None
                    }
                }
            }
        }
    }

    fn lookup(&self, snap: &PriceSnapshot, token: Address) -> Option<f64> {
        let key = match (is_native(&token), self.wrapped_native) {
            (true, Some(wrapped)) => wrapped,
            _ => token,
        };
        snap.prices.get(&key).copied()
    }

    /// USD price for one token, `None` when unknown
    pub async fn price(&self, token: Address) -> Option<f64> {
        let snap = self.snapshot().await?;
        self.lookup(&snap, token)
    }

    /// Prices for several tokens off a single snapshot
    pub async fn prices(&self, tokens: &[Address]) -> HashMap<Address, Option<f64>> {
        let snap = self.snapshot().await;
        tokens
            .iter()
            .map(|t| (*t, snap.as_ref().and_then(|s| self.lookup(s, *t))))
            .collect()
    }
}
