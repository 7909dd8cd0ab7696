//! Activity journal
//!
//! One JSON object per line for every executed bundle or claim run.

use alloy_primitives::B256;
use chrono::{DateTime, Utc};
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::bundle::BundleResult;
use crate::rewards::ClaimResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Bundle,
    Claim,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: ActivityKind,
    pub tx_hashes: Vec<B256>,
    pub success: bool,
    pub total_value_usd: Option<f64>,
    pub operation_count: usize,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl ActivityEntry {
    pub fn from_bundle(result: &BundleResult) -> Self {
        Self {
            timestamp: Utc::now(),
            kind: ActivityKind::Bundle,
            tx_hashes: result.tx_hash().into_iter().collect(),
            success: result.aggregate_success,
            total_value_usd: result.total_value_usd,
            operation_count: result.per_operation_results.len(),
            error: result.error.clone(),
        }
    }

    pub fn from_claim(result: &ClaimResult) -> Self {
        let mut tx_hashes: Vec<B256> = result.per_operation_results.iter().filter_map(|r| r.tx_hash).collect();
        tx_hashes.dedup();

        Self {
            timestamp: Utc::now(),
            kind: ActivityKind::Claim,
            tx_hashes,
            success: result.aggregate_success,
            total_value_usd: Some(result.total_value_usd),
            operation_count: result.per_operation_results.len(),
            error: None,
        }
    }

    /// Append this entry to a file
    pub fn append_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        // Create parent directories if needed
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;

        let json = serde_json::to_string(self)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }
}

/// Journal writer; a disabled journal swallows every entry
#[derive(Debug, Clone)]
pub struct ActivityLog {
    path: Option<PathBuf>,
}

impl ActivityLog {
    pub fn new(enabled: bool, path: impl Into<PathBuf>) -> Self {
        Self { path: enabled.then(|| path.into()) }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Write failures are logged, never returned
    pub fn record(&self, entry: &ActivityEntry) {
        let Some(ref path) = self.path else {
            return;
        };

        match entry.append_to_file(path) {
            Ok(()) => info!("📝 Logged {:?} to {}", entry.kind, path.display()),
            Err(e) => warn!("Could not write activity journal {}: {}", path.display(), e),
        }
    }
}
