//! Swap quotes
//!
//! The routing API answers `GET /swap?tokenIn&tokenOut&amount&slippage&to`
//! with the router to call and the exact call data to send it. A response
//! is only usable when it names the router, the path definition and the
//! executor; anything else is rejected for that token.

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use eyre::{eyre, Result};
use reqwest::Client;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::error::HarvestError;
use crate::tokens::normalize_address;

const API_TIMEOUT_SECS: u64 = 20;

/// What to quote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub token_in: Address,
    pub token_out: Address,
    /// Input amount in the input token's smallest unit
    pub amount: U256,
    pub recipient: Address,
    /// Slippage tolerance, e.g. 0.005 for 0.5%
    pub slippage: QuoteSlippage,
}

/// Slippage as a fraction; kept as a string so requests stay `Eq`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteSlippage(String);

impl QuoteSlippage {
    pub fn new(fraction: f64) -> Self {
        Self(format!("{}", fraction))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ============================================
// RESPONSE
// ============================================

/// Numbers arrive either as decimal strings or plain JSON integers
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ApiNumber {
    Text(String),
    Int(u64),
}

impl ApiNumber {
    fn to_u256(&self) -> Option<U256> {
        match self {
            ApiNumber::Int(n) => Some(U256::from(*n)),
            ApiNumber::Text(s) => {
                let s = s.trim();
                if let Some(hex) = s.strip_prefix("0x") {
                    U256::from_str_radix(hex, 16).ok()
                } else {
                    U256::from_str(s).ok()
                }
            }
        }
    }
}

fn number(field: &Option<ApiNumber>) -> Option<U256> {
    field.as_ref().and_then(ApiNumber::to_u256)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteTx {
    pub to: Option<String>,
    pub data: Option<String>,
    pub value: Option<ApiNumber>,
    pub gas_limit: Option<ApiNumber>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapTokenInfo {
    pub output_token: Option<String>,
    pub output_quote: Option<ApiNumber>,
    pub output_min: Option<ApiNumber>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterParams {
    pub swap_token_info: Option<SwapTokenInfo>,
    pub path_definition: Option<String>,
    pub executor: Option<String>,
    pub referral_code: Option<ApiNumber>,
}

/// Raw routing-API response, every field optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub tx: Option<QuoteTx>,
    pub router_addr: Option<String>,
    pub router_params: Option<RouterParams>,
    pub assumed_amount_out: Option<ApiNumber>,
    pub min_amount_out: Option<ApiNumber>,
}

/// A quote that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub router_address: Address,
    /// Exact bytes to send to the router; never modified
    pub call_data: Bytes,
    pub native_value: U256,
    pub output_token: Address,
    pub expected_output: U256,
    pub min_output: U256,
    pub path_definition: Bytes,
    pub executor: Address,
    pub referral_code: u32,
}

fn decode_hex(field: &str, raw: &str) -> Result<Bytes> {
    hex::decode(raw.trim().trim_start_matches("0x"))
        .map(Bytes::from)
        .map_err(|e| eyre!("{} is not hex: {}", field, e))
}

impl QuoteResponse {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Turn the raw response into a [`Quote`] or reject it
    pub fn validate(&self, token: Address, token_out: Address) -> Result<Quote> {
        let reject = |reason: &str| -> eyre::Report {
            HarvestError::QuoteRejected { token, reason: reason.to_string() }.into()
        };

        let params = self.router_params.clone().unwrap_or_default();

        let path_definition = params
            .path_definition
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| reject("missing pathDefinition"))?;
        let path_definition = decode_hex("pathDefinition", path_definition).map_err(|e| reject(&e.to_string()))?;

        let executor = params
            .executor
            .as_deref()
            .and_then(normalize_address)
            .filter(|a| !a.is_zero())
            .ok_or_else(|| reject("missing executor"))?;

        let router_address = self
            .router_addr
            .as_deref()
            .and_then(normalize_address)
            .filter(|a| !a.is_zero())
            .ok_or_else(|| reject("missing routerAddr"))?;

        let tx = self.tx.clone().unwrap_or_default();
        let call_data = tx
            .data
            .as_deref()
            .ok_or_else(|| reject("missing tx.data"))
            .and_then(|d| decode_hex("tx.data", d).map_err(|e| reject(&e.to_string())))?;

        let info = params.swap_token_info.unwrap_or_default();
        let output_token = info
            .output_token
            .as_deref()
            .and_then(normalize_address)
            .unwrap_or(token_out);

        let expected_output = number(&self.assumed_amount_out)
            .or_else(|| number(&info.output_quote))
            .unwrap_or(U256::ZERO);
        let min_output = number(&self.min_amount_out)
            .or_else(|| number(&info.output_min))
            .unwrap_or(U256::ZERO);

        let referral_code = number(&params.referral_code)
            .and_then(|c| u32::try_from(c).ok())
            .unwrap_or(0);

        Ok(Quote {
            router_address,
            call_data,
            native_value: number(&tx.value).unwrap_or(U256::ZERO),
            output_token,
            expected_output,
            min_output,
            path_definition,
            executor,
            referral_code,
        })
    }
}

// ============================================
// QUOTE SOURCE
// ============================================

/// 429 and 5xx are worth another attempt; other statuses (no route, bad token) are not
fn http_status_error(status: reqwest::StatusCode, body: &str) -> eyre::Report {
    let message = format!("quote API returned HTTP {}: {}", status, body);
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        HarvestError::TransientRpc(message).into()
    } else {
        eyre!(message)
    }
}

#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch_quote(&self, request: &QuoteRequest) -> Result<QuoteResponse>;
}

pub struct HttpQuoteSource {
    http_client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpQuoteSource {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl QuoteSource for HttpQuoteSource {
    async fn fetch_quote(&self, request: &QuoteRequest) -> Result<QuoteResponse> {
        let url = format!("{}/swap", self.base_url);
        let query = [
            ("tokenIn", format!("{:?}", request.token_in)),
            ("tokenOut", format!("{:?}", request.token_out)),
            ("amount", request.amount.to_string()),
            ("slippage", request.slippage.as_str().to_string()),
            ("to", format!("{:?}", request.recipient)),
        ];

        let mut call = self.http_client.get(&url).query(&query);
        if let Some(ref key) = self.api_key {
            call = call.bearer_auth(key);
        }

        debug!("Quote {:?} -> {:?} amount {}", request.token_in, request.token_out, request.amount);
        let response = call.send().await.map_err(|e| -> eyre::Report {
            if e.is_timeout() || e.is_connect() {
                HarvestError::TransientRpc(format!("quote API: {}", e)).into()
            } else {
                eyre!("quote API request failed: {}", e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(http_status_error(status, &body));
        }

        QuoteResponse::from_json(&response.text().await?)
    }
}
