//! Bounded parallel resolution of candidate metadata.
//!
//! Detail lookups are the slow edge of a run, so they go through a shared
//! `Semaphore` and a `JoinSet`. Transient failures retry with exponential
//! backoff; anything still failing is dropped from the current batch only
//! and surfaces again on the next run.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use catalog::types::Candidate;

use crate::merge::MergedCandidate;
use crate::provider::DiscoveryProvider;

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Concurrent in-flight detail lookups.
    pub max_concurrency: usize,
    /// Retries after the first attempt, transient failures only.
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 6,
            max_retries: 2,
            base_backoff: Duration::from_millis(100),
        }
    }
}

/// Resolves merged ids to full candidates through a bounded pool.
pub struct DetailFetcher {
    provider: Arc<dyn DiscoveryProvider>,
    config: FetcherConfig,
    semaphore: Arc<Semaphore>,
}

impl DetailFetcher {
    pub fn new(provider: Arc<dyn DiscoveryProvider>) -> Self {
        Self::with_config(provider, FetcherConfig::default())
    }

    pub fn with_config(provider: Arc<dyn DiscoveryProvider>, config: FetcherConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency));
        Self {
            provider,
            config,
            semaphore,
        }
    }

    /// Fetch details for every merged id, dropping the ones that fail.
    ///
    /// The result is sorted by id so a batch is deterministic regardless of
    /// task completion order.
    pub async fn fetch(&self, merged: Vec<MergedCandidate>) -> Vec<Candidate> {
        let requested = merged.len();
        let mut tasks = JoinSet::new();
        for item in merged {
            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&self.semaphore);
            let config = self.config.clone();
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };
                fetch_one(provider.as_ref(), &config, item).await
            });
        }

        let mut candidates = Vec::with_capacity(requested);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(candidate)) => candidates.push(candidate),
                Ok(None) => {}
                Err(err) => warn!(error = %err, "detail fetch task failed to join"),
            }
        }
        candidates.sort_by_key(|c| c.id());

        debug!(
            requested,
            resolved = candidates.len(),
            provider = self.provider.name(),
            "detail batch complete"
        );
        candidates
    }
}

async fn fetch_one(
    provider: &dyn DiscoveryProvider,
    config: &FetcherConfig,
    item: MergedCandidate,
) -> Option<Candidate> {
    let mut attempt = 0u32;
    loop {
        match provider.details(item.id).await {
            Ok(details) => {
                return Some(Candidate {
                    details,
                    channels: item.channels,
                    consensus: item.consensus,
                });
            }
            Err(err) if err.is_transient() && attempt < config.max_retries => {
                attempt += 1;
                let delay = config.base_backoff * 2u32.pow(attempt - 1);
                debug!(id = item.id, attempt, delay_ms = delay.as_millis() as u64, "retrying detail fetch");
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                warn!(id = item.id, error = %err, "detail fetch failed, dropping from this batch");
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use catalog::types::{CandidateDetails, CatalogId, ConsensusLevel, DiscoveryChannel, FeatureId};
    use crate::error::{DiscoveryError, Result};

    /// Scripted provider: fails each id a configured number of times before
    /// succeeding, tracking peak concurrency.
    struct FlakyProvider {
        transient_failures: u32,
        fatal_ids: Vec<CatalogId>,
        attempts: Mutex<HashMap<CatalogId, u32>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FlakyProvider {
        fn new(transient_failures: u32, fatal_ids: Vec<CatalogId>) -> Self {
            Self {
                transient_failures,
                fatal_ids,
                attempts: Mutex::new(HashMap::new()),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DiscoveryProvider for FlakyProvider {
        async fn trending(&self, _page: u32) -> Result<Vec<CatalogId>> {
            Ok(Vec::new())
        }

        async fn similar(&self, _seed: CatalogId) -> Result<Vec<CatalogId>> {
            Ok(Vec::new())
        }

        async fn discover(&self, _genres: &[FeatureId]) -> Result<Vec<CatalogId>> {
            Ok(Vec::new())
        }

        async fn details(&self, id: CatalogId) -> Result<CandidateDetails> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fatal_ids.contains(&id) {
                return Err(DiscoveryError::Fatal("scripted failure".into()));
            }
            let mut attempts = self.attempts.lock().unwrap();
            let seen = attempts.entry(id).or_insert(0);
            *seen += 1;
            if *seen <= self.transient_failures {
                return Err(DiscoveryError::Transient("scripted timeout".into()));
            }
            Ok(CandidateDetails::new(id, format!("Film {id}")))
        }

        fn name(&self) -> &'static str {
            "flaky-fixture"
        }
    }

    fn merged(ids: &[CatalogId]) -> Vec<MergedCandidate> {
        ids.iter()
            .map(|&id| MergedCandidate {
                id,
                channels: vec![DiscoveryChannel::Trending],
                consensus: ConsensusLevel::Low,
            })
            .collect()
    }

    fn fast_config(max_concurrency: usize) -> FetcherConfig {
        FetcherConfig {
            max_concurrency,
            max_retries: 2,
            base_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn transient_failures_retry_to_success() {
        let provider = Arc::new(FlakyProvider::new(2, Vec::new()));
        let fetcher = DetailFetcher::with_config(provider, fast_config(6));
        let out = fetcher.fetch(merged(&[1, 2, 3])).await;
        let ids: Vec<CatalogId> = out.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![1, 2, 3], "two transient failures fit the retry budget");
    }

    #[tokio::test]
    async fn exhausted_retries_drop_only_the_failing_id() {
        let provider = Arc::new(FlakyProvider::new(3, Vec::new()));
        let fetcher = DetailFetcher::with_config(provider, fast_config(6));
        let out = fetcher.fetch(merged(&[1])).await;
        assert!(out.is_empty(), "three transient failures exceed two retries");
    }

    #[tokio::test]
    async fn fatal_errors_never_retry_and_spare_the_rest() {
        let provider = Arc::new(FlakyProvider::new(0, vec![2]));
        let fetcher = DetailFetcher::with_config(provider.clone(), fast_config(6));
        let out = fetcher.fetch(merged(&[1, 2, 3])).await;
        let ids: Vec<CatalogId> = out.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(
            provider.attempts.lock().unwrap().get(&2),
            None,
            "fatal ids never enter the retry loop"
        );
    }

    #[tokio::test]
    async fn concurrency_stays_within_the_permit_budget() {
        let provider = Arc::new(FlakyProvider::new(0, Vec::new()));
        let fetcher = DetailFetcher::with_config(provider.clone(), fast_config(3));
        let ids: Vec<CatalogId> = (1..=20).collect();
        let out = fetcher.fetch(merged(&ids)).await;
        assert_eq!(out.len(), 20);
        assert!(
            provider.peak.load(Ordering::SeqCst) <= 3,
            "peak {} exceeded the permit budget",
            provider.peak.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn channel_attribution_survives_the_fetch() {
        let provider = Arc::new(FlakyProvider::new(0, Vec::new()));
        let fetcher = DetailFetcher::with_config(provider, fast_config(6));
        let item = MergedCandidate {
            id: 5,
            channels: vec![DiscoveryChannel::Trending, DiscoveryChannel::Similar],
            consensus: ConsensusLevel::Medium,
        };
        let out = fetcher.fetch(vec![item]).await;
        assert_eq!(out[0].channels.len(), 2);
        assert_eq!(out[0].consensus, ConsensusLevel::Medium);
    }
}
