//! Batched probing
//!
//! Candidates are probed in fixed-size batches. Batches run one after
//! another; probes inside a batch run concurrently. Peak in-flight RPC load
//! is therefore bounded by the batch size.

use eyre::Result;
use futures::future::join_all;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Something a scanner can probe and name in its logs
pub trait ScanTarget {
    fn describe(&self) -> String;
}

/// What one scan found
#[derive(Debug)]
pub struct ScanOutcome<T> {
    pub found: Vec<T>,
    /// Candidates whose probe failed, by description
    pub failed: Vec<String>,
    pub probed: usize,
    pub elapsed: Duration,
}

impl<T> ScanOutcome<T> {
    pub fn empty() -> Self {
        Self {
            found: Vec::new(),
            failed: Vec::new(),
            probed: 0,
            elapsed: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PositionScanner {
    batch_size: usize,
    batch_delay: Duration,
}

impl PositionScanner {
    pub fn new(batch_size: usize, batch_delay: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            batch_delay,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Probe every candidate.
    ///
    /// `Ok(None)` means "nothing here". A probe error is logged and the
    /// candidate dropped; it never aborts the rest of the scan.
    pub async fn scan<C, T, F, Fut>(&self, candidates: &[C], probe: F) -> ScanOutcome<T>
    where
        C: ScanTarget,
        F: Fn(&C) -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let started = Instant::now();
        let mut outcome = ScanOutcome::empty();
        let batches = candidates.len().div_ceil(self.batch_size);

        for (index, batch) in candidates.chunks(self.batch_size).enumerate() {
            if index > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }

            let results = join_all(batch.iter().map(&probe)).await;

            for (candidate, result) in batch.iter().zip(results) {
                outcome.probed += 1;
                match result {
                    Ok(Some(item)) => outcome.found.push(item),
                    Ok(None) => {}
                    Err(e) => {
                        warn!("Probe failed for {}: {}", candidate.describe(), e);
                        outcome.failed.push(candidate.describe());
                    }
                }
            }

            debug!(
                "Batch {}/{}: {} found so far, {} failed",
                index + 1,
                batches,
                outcome.found.len(),
                outcome.failed.len()
            );
        }

        outcome.elapsed = started.elapsed();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::eyre;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Candidate(u32);

    impl ScanTarget for Candidate {
        fn describe(&self) -> String {
            format!("candidate #{}", self.0)
        }
    }

    #[tokio::test]
    async fn test_failing_probe_excluded_rest_of_batch_kept() {
        let candidates: Vec<Candidate> = (0..6).map(Candidate).collect();
        let scanner = PositionScanner::new(3, Duration::ZERO);

        let outcome = scanner
            .scan(&candidates, |c| {
                let n = c.0;
                async move {
                    match n {
                        1 => Err(eyre!("not a vault")),
                        4 => Ok(None),
                        _ => Ok(Some(n)),
                    }
                }
            })
            .await;

        assert_eq!(outcome.found, vec![0, 2, 3, 5]);
        assert_eq!(outcome.failed, vec!["candidate #1".to_string()]);
        assert_eq!(outcome.probed, 6);
    }

    #[tokio::test]
    async fn test_in_flight_bounded_by_batch_size() {
        let candidates: Vec<Candidate> = (0..10).map(Candidate).collect();
        let scanner = PositionScanner::new(4, Duration::from_millis(1));
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        let outcome = scanner
            .scan(&candidates, |c| {
                let n = c.0;
                let in_flight = &in_flight;
                let peak = &peak;
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(Some(n))
                }
            })
            .await;

        assert_eq!(outcome.found.len(), 10);
        assert!(peak.load(Ordering::SeqCst) <= 4);
        assert!(peak.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn test_empty_candidates() {
        let scanner = PositionScanner::new(10, Duration::from_millis(100));
        let outcome: ScanOutcome<u32> = scanner
            .scan(&Vec::<Candidate>::new(), |_| async { Ok(Some(1)) })
            .await;
        assert!(outcome.found.is_empty());
        assert_eq!(outcome.probed, 0);
    }
}
