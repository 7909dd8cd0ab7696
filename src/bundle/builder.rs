//! Swap bundle construction
//!
//! Turns `(token, amount)` requests into an ordered operation list:
//! every Approve before every Swap, caller order preserved within each group.

use alloy_primitives::{Address, U256};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::approvals::ApprovalReconciler;
use super::quote::{Quote, QuoteRequest, QuoteSlippage, QuoteSource};
use super::types::{ApprovalStatus, Operation, SkippedToken, SwapBundle};
use crate::chain::{retry, ChainReader, RetryPolicy};
use crate::tokens::{amount_to_f64, is_native, normalize_address, parse_amount, short_address};

/// One requested input, as typed by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRequest {
    /// Address or native sentinel ("native", "BERA")
    pub token: String,
    /// Decimal amount in whole tokens
    pub amount: String,
}

impl SwapRequest {
    pub fn new(token: impl Into<String>, amount: impl Into<String>) -> Self {
        Self { token: token.into(), amount: amount.into() }
    }

    /// Parse `token:amount`
    pub fn parse(input: &str) -> Option<Self> {
        let (token, amount) = input.rsplit_once(':')?;
        Some(Self::new(token.trim(), amount.trim()))
    }
}

/// A quoted input ready to become a Swap operation
#[derive(Debug, Clone)]
struct SwapLeg {
    token: Address,
    amount: U256,
    quote: Quote,
}

enum LegOutcome {
    Quoted(SwapLeg),
    /// Zero or unparsable amount; dropped without a diagnostic
    Dropped,
    Skipped(SkippedToken),
}

pub struct SwapBundleBuilder {
    reader: Arc<ChainReader>,
    quotes: Arc<dyn QuoteSource>,
    approvals: Arc<ApprovalReconciler>,
    bundler: Address,
    slippage: f64,
    quote_policy: RetryPolicy,
}

impl SwapBundleBuilder {
    pub fn new(
        reader: Arc<ChainReader>,
        quotes: Arc<dyn QuoteSource>,
        approvals: Arc<ApprovalReconciler>,
        bundler: Address,
        slippage: f64,
        quote_policy: RetryPolicy,
    ) -> Self {
        Self { reader, quotes, approvals, bundler, slippage, quote_policy }
    }

    /// Build the bundle. Failures are reported on the returned bundle, never raised.
    pub async fn build(&self, owner: Address, requests: &[SwapRequest], target: &str) -> SwapBundle {
        let Some(target_address) = normalize_address(target) else {
            return SwapBundle::failed(owner, format!("invalid target token: {}", target));
        };
        let target_token = self.reader.token(target_address).await;
        let mut bundle = SwapBundle::empty(owner, target_token);

        // 1. Normalize, dropping self-swaps
        let inputs: Vec<(Address, &str)> = requests
            .iter()
            .filter_map(|r| match normalize_address(&r.token) {
                Some(token) if token == target_address => {
                    info!("Dropping {} -> {}: input equals target", short_address(&token), bundle.target_token.symbol);
                    None
                }
                Some(token) => Some((token, r.amount.as_str())),
                None => {
                    debug!("Dropping request with unusable token {:?}", r.token);
                    None
                }
            })
            .collect();

        if inputs.is_empty() {
            debug!("Nothing to swap after normalization");
            return bundle;
        }

        // 2. Quote every input concurrently
        let outcomes = join_all(
            inputs
                .iter()
                .map(|(token, amount)| self.quote_leg(*token, amount, target_address)),
        )
        .await;

        let mut legs = Vec::new();
        for outcome in outcomes {
            match outcome {
                LegOutcome::Quoted(leg) => legs.push(leg),
                LegOutcome::Dropped => {}
                LegOutcome::Skipped(skipped) => bundle.skipped.push(skipped),
            }
        }

        // 3. Approval pass, separate from quoting. A token requested more than
        // once needs allowance for the sum of its legs.
        let mut required: Vec<(Address, U256)> = Vec::new();
        for leg in &legs {
            match required.iter_mut().find(|(token, _)| *token == leg.token) {
                Some((_, total)) => *total = total.saturating_add(leg.amount),
                None => required.push((leg.token, leg.amount)),
            }
        }
        let checks = join_all(required.iter().map(|(token, total)| self.approval_for(owner, *token, *total))).await;
        let statuses: HashMap<Address, Result<Option<ApprovalStatus>, String>> =
            required.iter().map(|(token, _)| *token).zip(checks).collect();

        let mut approvals: Vec<Operation> = Vec::new();
        let mut swaps = Vec::new();
        for leg in legs {
            match statuses.get(&leg.token) {
                Some(Ok(Some(status))) => {
                    let router = leg.quote.router_address;
                    if !approvals.iter().any(|op| op.token_address == leg.token && op.target == router) {
                        approvals.push(Operation::approve(leg.token, router));
                    }
                    if !bundle.approvals_needed.iter().any(|s| s.token_address == leg.token) {
                        bundle.approvals_needed.push(status.clone());
                    }
                }
                Some(Err(reason)) => {
                    warn!("Skipping {}: {}", short_address(&leg.token), reason);
                    bundle.skipped.push(SkippedToken { token: leg.token, reason: reason.clone() });
                    continue;
                }
                Some(Ok(None)) | None => {}
            }
            bundle.total_expected_output +=
                amount_to_f64(leg.quote.expected_output, bundle.target_token.decimals);
            swaps.push(Operation::swap(leg.token, leg.amount, &leg.quote));
        }

        // 4. Approvals first, then swaps
        bundle.operations = approvals.into_iter().chain(swaps).collect();

        info!("📦 Built bundle: {}", bundle.describe());
        bundle
    }

    async fn quote_leg(&self, token: Address, amount: &str, target: Address) -> LegOutcome {
        let decimals = self.reader.decimals(token).await;
        let amount = match parse_amount(amount, decimals) {
            Ok(raw) if !raw.is_zero() => raw,
            Ok(_) | Err(_) => {
                debug!("Dropping {}: amount {:?} is not positive", short_address(&token), amount);
                return LegOutcome::Dropped;
            }
        };

        let request = QuoteRequest {
            token_in: token,
            token_out: target,
            amount,
            recipient: self.bundler,
            slippage: QuoteSlippage::new(self.slippage),
        };

        let label = format!("quote {}", short_address(&token));
        let response = match retry(&self.quote_policy, &label, || self.quotes.fetch_quote(&request)).await {
            Ok(response) => response,
            Err(e) => {
                warn!("No quote for {}: {}", short_address(&token), e);
                return LegOutcome::Skipped(SkippedToken { token, reason: e.to_string() });
            }
        };

        match response.validate(token, target) {
            Ok(quote) => LegOutcome::Quoted(SwapLeg { token, amount, quote }),
            Err(e) => {
                warn!("{}", e);
                LegOutcome::Skipped(SkippedToken { token, reason: e.to_string() })
            }
        }
    }

    /// `Ok(Some)` when the owner still has to approve the bundler
    async fn approval_for(&self, owner: Address, token: Address, required: U256) -> Result<Option<ApprovalStatus>, String> {
        if is_native(&token) {
            return Ok(None);
        }

        match self.approvals.check_raw(token, owner, self.bundler, required).await {
            Ok(status) if status.sufficient() => Ok(None),
            Ok(status) => Ok(Some(status)),
            Err(e) => Err(format!("allowance check failed: {}", e)),
        }
    }
}
