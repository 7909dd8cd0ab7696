//! Swap bundles
//!
//! Selected tokens are quoted, gated on allowance and submitted to the
//! bundler contract as one atomic `executeBundle` transaction:
//! - `quote`: routing-API client and quote validation
//! - `approvals`: allowance checks, approve and revoke
//! - `builder`: ordered operation list from `(token, amount)` requests
//! - `executor`: submission, receipt and outcome classification
//!
//! ⚠️  Production mode moves real funds.

mod approvals;
mod builder;
mod executor;
mod quote;
mod types;

pub use approvals::ApprovalReconciler;
pub use builder::{SwapBundleBuilder, SwapRequest};
pub use executor::{BundleExecutor, GasLimits};
pub use quote::{HttpQuoteSource, Quote, QuoteRequest, QuoteResponse, QuoteSource};
pub use types::{
    ApprovalStatus, BundleResult, ExecutionState, Operation, OperationKind, OperationResult, SkippedToken,
    SwapBundle,
};
