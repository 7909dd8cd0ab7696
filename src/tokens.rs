//! Token identity and amount handling
//!
//! Every address comparison and map key goes through [`normalize_address`],
//! so the native-token sentinels ("native", "BERA", 0xEeee...) all collapse
//! to `Address::ZERO` in one place.

use alloy_primitives::{Address, U256};
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Conventional "native token" placeholder used by routing APIs
const NATIVE_PLACEHOLDER: &str = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee";

/// Symbols accepted as the native token
const NATIVE_SYMBOLS: [&str; 2] = ["native", "bera"];

/// Canonical address of the native token
pub const NATIVE_TOKEN: Address = Address::ZERO;

/// Decimals assumed when a token's `decimals()` cannot be read
pub const DEFAULT_DECIMALS: u8 = 18;

/// Represents a token we're tracking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

impl Token {
    pub fn new(address: Address, symbol: impl Into<String>, decimals: u8) -> Self {
        Self { address, symbol: symbol.into(), decimals }
    }

    pub fn native() -> Self {
        Self::new(NATIVE_TOKEN, "BERA", 18)
    }

    pub fn is_native(&self) -> bool {
        is_native(&self.address)
    }
}

/// Map user/API input to a canonical address.
///
/// Returns `None` for empty or unparsable input.
pub fn normalize_address(input: &str) -> Option<Address> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let lower = trimmed.to_ascii_lowercase();
    if NATIVE_SYMBOLS.contains(&lower.as_str()) || lower == NATIVE_PLACEHOLDER {
        return Some(NATIVE_TOKEN);
    }

    // Parse lowercased so mis-checksummed input still resolves
    Address::from_str(&lower).ok()
}

pub fn is_native(address: &Address) -> bool {
    *address == NATIVE_TOKEN
}

/// Short id fragment used in derived ids: first 8 chars of the lowercase hex.
pub fn short_address(address: &Address) -> String {
    let full = format!("{:#x}", address);
    full[..8].to_string()
}

/// Convert a human decimal string into the token's smallest unit.
///
/// Digits beyond `decimals` are truncated, never rounded.
pub fn parse_amount(amount: &str, decimals: u8) -> Result<U256> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(eyre!("empty amount"));
    }
    if amount.starts_with('-') {
        return Err(eyre!("negative amount: {}", amount));
    }

    let (whole, fraction) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(eyre!("invalid amount: {}", amount));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(eyre!("invalid amount: {}", amount));
    }

    let decimals = decimals as usize;
    let mut fraction: String = fraction.chars().take(decimals).collect();
    while fraction.len() < decimals {
        fraction.push('0');
    }

    let digits = format!("{}{}", whole, fraction);
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }

    U256::from_str_radix(digits, 10).map_err(|e| eyre!("amount out of range {}: {}", amount, e))
}

/// Render a smallest-unit amount as a decimal string without trailing zeros.
pub fn format_amount(raw: U256, decimals: u8) -> String {
    let digits = raw.to_string();
    let decimals = decimals as usize;

    if decimals == 0 {
        return digits;
    }

    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals - digits.len() + 1), digits)
    } else {
        digits
    };

    let split = padded.len() - decimals;
    let (whole, fraction) = padded.split_at(split);
    let fraction = fraction.trim_end_matches('0');

    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    }
}

/// Lossy conversion for USD arithmetic and display.
pub fn amount_to_f64(raw: U256, decimals: u8) -> f64 {
    format_amount(raw, decimals).parse().unwrap_or(0.0)
}
