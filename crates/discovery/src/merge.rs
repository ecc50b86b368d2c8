//! Merging per-channel discovery results into an attributed candidate pool.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use catalog::types::{CatalogId, ConsensusLevel, DiscoveryChannel};

/// A discovered id with its channel attribution, before details are fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedCandidate {
    pub id: CatalogId,
    /// Distinct channels that surfaced the id, sorted.
    pub channels: Vec<DiscoveryChannel>,
    pub consensus: ConsensusLevel,
}

/// Ids to drop from a merged pool, kept separate so the merge can report
/// how much each filter removed.
#[derive(Debug, Default)]
pub struct PoolExclusions {
    pub watched: HashSet<CatalogId>,
    pub blocked: HashSet<CatalogId>,
    pub recently_shown: HashSet<CatalogId>,
}

impl PoolExclusions {
    fn reason(&self, id: CatalogId) -> Option<&'static str> {
        if self.watched.contains(&id) {
            Some("watched")
        } else if self.blocked.contains(&id) {
            Some("blocked")
        } else if self.recently_shown.contains(&id) {
            Some("recently_shown")
        } else {
            None
        }
    }
}

/// Combine per-channel id lists into one attributed pool.
///
/// Each surviving id carries the set of channels that surfaced it and a
/// consensus level derived from that set's size. Duplicates within one
/// channel count once. The result is sorted by id.
pub fn merge_channels(
    results: &[(DiscoveryChannel, Vec<CatalogId>)],
    exclusions: &PoolExclusions,
) -> Vec<MergedCandidate> {
    let mut attribution: HashMap<CatalogId, BTreeSet<DiscoveryChannel>> = HashMap::new();
    let mut dropped: HashMap<&'static str, usize> = HashMap::new();

    for (channel, ids) in results {
        for &id in ids {
            if let Some(reason) = exclusions.reason(id) {
                *dropped.entry(reason).or_default() += 1;
                continue;
            }
            attribution.entry(id).or_default().insert(*channel);
        }
    }

    let mut merged: Vec<MergedCandidate> = attribution
        .into_iter()
        .map(|(id, channels)| {
            let consensus = ConsensusLevel::from_channel_count(channels.len());
            MergedCandidate {
                id,
                channels: channels.into_iter().collect(),
                consensus,
            }
        })
        .collect();
    merged.sort_by_key(|c| c.id);

    debug!(
        pool = merged.len(),
        watched = dropped.get("watched").copied().unwrap_or(0),
        blocked = dropped.get("blocked").copied().unwrap_or(0),
        recently_shown = dropped.get("recently_shown").copied().unwrap_or(0),
        "channels merged"
    );
    merged
}
