//! Per-source reliability weighting from historical feedback hit-rates.
//!
//! Each (user, channel, consensus) cell carries hit/miss counters. The
//! weighter reads them through Laplace smoothing, blends across the channels
//! that surfaced a candidate, scales by consensus agreement, and maps the
//! result into a tightly bounded multiplier. The bounds keep reliability a
//! nudge on top of taste fit rather than a ranking signal of its own.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use catalog::types::{
    Candidate, CatalogId, ConsensusLevel, DiscoveryChannel, ReliabilityPrior, UserId,
};

/// Prior cells snapshotted from the store for one user.
pub type PriorSnapshot = HashMap<(DiscoveryChannel, ConsensusLevel), ReliabilityPrior>;

#[derive(Debug, Clone)]
pub struct ReliabilityConfig {
    /// Multiplier deviation per unit of smoothed-rate deviation from 0.5.
    pub spread: f32,
    pub floor: f32,
    pub ceiling: f32,
    /// How long a smoothed rate stays pinned once computed.
    pub cache_ttl: Duration,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            spread: 0.24,
            floor: 0.88,
            ceiling: 1.12,
            cache_ttl: Duration::from_secs(300),
        }
    }
}

fn consensus_factor(consensus: ConsensusLevel) -> f32 {
    match consensus {
        ConsensusLevel::High => 1.0,
        ConsensusLevel::Medium => 0.75,
        ConsensusLevel::Low => 0.5,
    }
}

/// Computes bounded reliability multipliers, caching smoothed rates.
#[derive(Debug, Default)]
pub struct SourceReliabilityWeighter {
    config: ReliabilityConfig,
    cache: Mutex<HashMap<(UserId, DiscoveryChannel, ConsensusLevel), (f32, Instant)>>,
}

impl SourceReliabilityWeighter {
    pub fn new(config: ReliabilityConfig) -> Self {
        Self {
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The multiplier for a candidate surfaced by `channels` at `consensus`.
    pub fn multiplier(
        &self,
        user: UserId,
        priors: &PriorSnapshot,
        channels: &[DiscoveryChannel],
        consensus: ConsensusLevel,
    ) -> f32 {
        self.multiplier_at(Instant::now(), user, priors, channels, consensus)
    }

    /// Clock-injectable variant of [`Self::multiplier`].
    pub fn multiplier_at(
        &self,
        now: Instant,
        user: UserId,
        priors: &PriorSnapshot,
        channels: &[DiscoveryChannel],
        consensus: ConsensusLevel,
    ) -> f32 {
        if channels.is_empty() {
            return 1.0;
        }
        let sum: f32 = channels
            .iter()
            .map(|&channel| self.smoothed_rate_at(now, user, priors, channel, consensus))
            .sum();
        let avg = sum / channels.len() as f32;
        let deviation = (avg - 0.5) * consensus_factor(consensus);
        (1.0 + deviation * self.config.spread).clamp(self.config.floor, self.config.ceiling)
    }

    /// Precompute a multiplier per candidate id, deduplicating by the
    /// (channel set, consensus) combination so the parallel scoring section
    /// never touches the cache lock.
    pub fn multipliers_for(
        &self,
        user: UserId,
        priors: &PriorSnapshot,
        candidates: &[Candidate],
    ) -> HashMap<CatalogId, f32> {
        self.multipliers_for_at(Instant::now(), user, priors, candidates)
    }

    pub fn multipliers_for_at(
        &self,
        now: Instant,
        user: UserId,
        priors: &PriorSnapshot,
        candidates: &[Candidate],
    ) -> HashMap<CatalogId, f32> {
        let mut by_combo: HashMap<(Vec<DiscoveryChannel>, ConsensusLevel), f32> = HashMap::new();
        let mut out = HashMap::with_capacity(candidates.len());
        for candidate in candidates {
            let key = (candidate.channels.clone(), candidate.consensus);
            let multiplier = match by_combo.get(&key) {
                Some(m) => *m,
                None => {
                    let m = self.multiplier_at(
                        now,
                        user,
                        priors,
                        &candidate.channels,
                        candidate.consensus,
                    );
                    by_combo.insert(key, m);
                    m
                }
            };
            out.insert(candidate.id(), multiplier);
        }
        debug!(combos = by_combo.len(), candidates = out.len(), "reliability precomputed");
        out
    }

    /// Smoothed hit rate for one cell, pinned for the cache TTL.
    fn smoothed_rate_at(
        &self,
        now: Instant,
        user: UserId,
        priors: &PriorSnapshot,
        channel: DiscoveryChannel,
        consensus: ConsensusLevel,
    ) -> f32 {
        let key = (user, channel, consensus);
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((rate, computed_at)) = cache.get(&key) {
            if now.duration_since(*computed_at) < self.config.cache_ttl {
                return *rate;
            }
        }
        let rate = priors
            .get(&(channel, consensus))
            .copied()
            .unwrap_or_default()
            .smoothed_rate();
        cache.insert(key, (rate, now));
        rate
    }
}
