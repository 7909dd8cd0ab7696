//! Position discovery
//!
//! - `batch`: generic batched prober with per-candidate failure isolation
//! - `vaults`: reward vault and fee-staker stakes
//! - `validators`: validator boosts

mod batch;
mod validators;
mod vaults;

pub use batch::{PositionScanner, ScanOutcome, ScanTarget};
pub use validators::BoostScanner;
pub use vaults::{probe_staking_contract, VaultScanner};
