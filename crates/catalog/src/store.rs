//! In-memory record store for the ranking pipeline.
//!
//! `TasteStore` owns every per-user record the pipeline reads or writes:
//! watch history, feedback events, reliability priors, per-feature counters,
//! block and dismissal sets, and the recently-shown ledger. All state is
//! partitioned by user. Reads of absent rows return empty defaults, never
//! errors; writes are idempotent last-write-wins upserts.

use std::collections::{HashMap, HashSet};

use crate::types::{
    CandidateDetails, CatalogId, ConsensusLevel, DiscoveryChannel, FeatureId, FeatureKind,
    FeatureStat, FeedbackEvent, ReliabilityPrior, UserId, WatchEvent,
};

/// A watch event joined with the catalog metadata for its film.
///
/// The profile builder works over these rather than raw events so that
/// feature extraction never has to consult the store mid-build.
#[derive(Debug, Clone)]
pub struct ResolvedWatch {
    pub event: WatchEvent,
    pub details: CandidateDetails,
}

/// Owner of all per-user pipeline state.
///
/// Keys follow the upsert identities of the records they hold: watch events
/// by `uri`, feedback by `(user, candidate)`, priors by
/// `(user, channel, consensus)`, feature counters by `(user, kind, feature)`.
#[derive(Debug, Default)]
pub struct TasteStore {
    watch_events: HashMap<UserId, Vec<WatchEvent>>,
    feedback: HashMap<UserId, HashMap<CatalogId, FeedbackEvent>>,
    priors: HashMap<UserId, HashMap<(DiscoveryChannel, ConsensusLevel), ReliabilityPrior>>,
    feature_stats: HashMap<UserId, HashMap<(FeatureKind, FeatureId), FeatureStat>>,
    details: HashMap<CatalogId, CandidateDetails>,
    hard_blocks: HashMap<UserId, HashSet<CatalogId>>,
    soft_dismissals: HashMap<UserId, HashSet<CatalogId>>,
    recently_shown: HashMap<UserId, Vec<(CatalogId, i64)>>,
}

impl TasteStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ----- watch history -----

    /// Insert or replace a watch event, keyed by `uri`.
    ///
    /// Re-importing the same library is a no-op beyond overwriting rows with
    /// identical content.
    pub fn upsert_watch_event(&mut self, user: UserId, event: WatchEvent) {
        let events = self.watch_events.entry(user).or_default();
        match events.iter_mut().find(|e| e.uri == event.uri) {
            Some(existing) => *existing = event,
            None => events.push(event),
        }
    }

    /// All watch events for a user, in insertion order. Empty when unknown.
    pub fn watch_events(&self, user: UserId) -> &[WatchEvent] {
        self.watch_events.get(&user).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Watch events joined against the metadata table.
    ///
    /// Events without a catalog id, or whose id has no stored metadata, are
    /// skipped; they carry no features for the profile to learn from.
    pub fn resolved_watches(&self, user: UserId) -> Vec<ResolvedWatch> {
        self.watch_events(user)
            .iter()
            .filter_map(|event| {
                let id = event.catalog_id?;
                let details = self.details.get(&id)?;
                Some(ResolvedWatch {
                    event: event.clone(),
                    details: details.clone(),
                })
            })
            .collect()
    }

    /// Catalog ids the user has already watched (watchlist-only rows excluded).
    pub fn watched_ids(&self, user: UserId) -> HashSet<CatalogId> {
        self.watch_events(user)
            .iter()
            .filter(|e| e.watch_count > 0)
            .filter_map(|e| e.catalog_id)
            .collect()
    }

    // ----- catalog metadata -----

    /// Insert or replace candidate metadata, keyed by catalog id.
    pub fn upsert_details(&mut self, details: CandidateDetails) {
        self.details.insert(details.id, details);
    }

    pub fn details(&self, id: CatalogId) -> Option<&CandidateDetails> {
        self.details.get(&id)
    }

    // ----- feedback events -----

    /// Insert or replace the active feedback event for `(user, candidate)`.
    ///
    /// Returns the event it replaced, if any, so the learner can reverse the
    /// replaced event's deltas before applying the new ones.
    pub fn upsert_feedback(&mut self, event: FeedbackEvent) -> Option<FeedbackEvent> {
        self.feedback
            .entry(event.user_id)
            .or_default()
            .insert(event.candidate_id, event)
    }

    /// Remove and return the active feedback event for `(user, candidate)`.
    pub fn remove_feedback(&mut self, user: UserId, candidate: CatalogId) -> Option<FeedbackEvent> {
        self.feedback.get_mut(&user)?.remove(&candidate)
    }

    pub fn feedback(&self, user: UserId, candidate: CatalogId) -> Option<&FeedbackEvent> {
        self.feedback.get(&user)?.get(&candidate)
    }

    /// All active feedback events for a user, in arbitrary order.
    pub fn feedback_events(&self, user: UserId) -> Vec<&FeedbackEvent> {
        self.feedback
            .get(&user)
            .map(|m| m.values().collect())
            .unwrap_or_default()
    }

    // ----- reliability priors -----

    /// The prior for one `(channel, consensus)` cell. Zero counters when the
    /// cell has never been written.
    pub fn prior(
        &self,
        user: UserId,
        channel: DiscoveryChannel,
        consensus: ConsensusLevel,
    ) -> ReliabilityPrior {
        self.priors
            .get(&user)
            .and_then(|m| m.get(&(channel, consensus)))
            .copied()
            .unwrap_or_default()
    }

    /// Snapshot of every prior cell for a user.
    pub fn priors(
        &self,
        user: UserId,
    ) -> HashMap<(DiscoveryChannel, ConsensusLevel), ReliabilityPrior> {
        self.priors.get(&user).cloned().unwrap_or_default()
    }

    pub fn record_hit(
        &mut self,
        user: UserId,
        channel: DiscoveryChannel,
        consensus: ConsensusLevel,
    ) {
        let cell = self.prior_cell(user, channel, consensus);
        cell.hits += 1;
    }

    pub fn record_miss(
        &mut self,
        user: UserId,
        channel: DiscoveryChannel,
        consensus: ConsensusLevel,
    ) {
        let cell = self.prior_cell(user, channel, consensus);
        cell.misses += 1;
    }

    /// Reverse one previously recorded hit. Saturates at zero so a reversal
    /// for a cell that was never incremented cannot underflow.
    pub fn revert_hit(
        &mut self,
        user: UserId,
        channel: DiscoveryChannel,
        consensus: ConsensusLevel,
    ) {
        let cell = self.prior_cell(user, channel, consensus);
        cell.hits = cell.hits.saturating_sub(1);
    }

    /// Reverse one previously recorded miss.
    pub fn revert_miss(
        &mut self,
        user: UserId,
        channel: DiscoveryChannel,
        consensus: ConsensusLevel,
    ) {
        let cell = self.prior_cell(user, channel, consensus);
        cell.misses = cell.misses.saturating_sub(1);
    }

    fn prior_cell(
        &mut self,
        user: UserId,
        channel: DiscoveryChannel,
        consensus: ConsensusLevel,
    ) -> &mut ReliabilityPrior {
        self.priors
            .entry(user)
            .or_default()
            .entry((channel, consensus))
            .or_default()
    }

    // ----- per-feature counters -----

    /// The counter pair for one `(kind, feature)` cell. Zero when unwritten.
    pub fn feature_stat(&self, user: UserId, kind: FeatureKind, feature: FeatureId) -> FeatureStat {
        self.feature_stats
            .get(&user)
            .and_then(|m| m.get(&(kind, feature)))
            .copied()
            .unwrap_or_default()
    }

    /// Snapshot of every feature counter for a user.
    pub fn feature_stats(&self, user: UserId) -> HashMap<(FeatureKind, FeatureId), FeatureStat> {
        self.feature_stats.get(&user).cloned().unwrap_or_default()
    }

    pub fn record_feature_positive(
        &mut self,
        user: UserId,
        kind: FeatureKind,
        feature: FeatureId,
    ) {
        self.feature_cell(user, kind, feature).positive += 1;
    }

    pub fn record_feature_negative(
        &mut self,
        user: UserId,
        kind: FeatureKind,
        feature: FeatureId,
    ) {
        self.feature_cell(user, kind, feature).negative += 1;
    }

    pub fn revert_feature_positive(
        &mut self,
        user: UserId,
        kind: FeatureKind,
        feature: FeatureId,
    ) {
        let cell = self.feature_cell(user, kind, feature);
        cell.positive = cell.positive.saturating_sub(1);
    }

    pub fn revert_feature_negative(
        &mut self,
        user: UserId,
        kind: FeatureKind,
        feature: FeatureId,
    ) {
        let cell = self.feature_cell(user, kind, feature);
        cell.negative = cell.negative.saturating_sub(1);
    }

    fn feature_cell(
        &mut self,
        user: UserId,
        kind: FeatureKind,
        feature: FeatureId,
    ) -> &mut FeatureStat {
        self.feature_stats
            .entry(user)
            .or_default()
            .entry((kind, feature))
            .or_default()
    }

    // ----- hard blocks and soft dismissals -----

    pub fn block(&mut self, user: UserId, candidate: CatalogId) {
        self.hard_blocks.entry(user).or_default().insert(candidate);
    }

    pub fn unblock(&mut self, user: UserId, candidate: CatalogId) {
        if let Some(set) = self.hard_blocks.get_mut(&user) {
            set.remove(&candidate);
        }
    }

    pub fn is_blocked(&self, user: UserId, candidate: CatalogId) -> bool {
        self.hard_blocks
            .get(&user)
            .is_some_and(|set| set.contains(&candidate))
    }

    pub fn blocked_ids(&self, user: UserId) -> HashSet<CatalogId> {
        self.hard_blocks.get(&user).cloned().unwrap_or_default()
    }

    pub fn dismiss(&mut self, user: UserId, candidate: CatalogId) {
        self.soft_dismissals.entry(user).or_default().insert(candidate);
    }

    pub fn undismiss(&mut self, user: UserId, candidate: CatalogId) {
        if let Some(set) = self.soft_dismissals.get_mut(&user) {
            set.remove(&candidate);
        }
    }

    pub fn is_dismissed(&self, user: UserId, candidate: CatalogId) -> bool {
        self.soft_dismissals
            .get(&user)
            .is_some_and(|set| set.contains(&candidate))
    }

    pub fn dismissed_ids(&self, user: UserId) -> HashSet<CatalogId> {
        self.soft_dismissals.get(&user).cloned().unwrap_or_default()
    }

    // ----- recently-shown ledger -----

    /// Record that these candidates were surfaced to the user at `now`.
    ///
    /// Entries older than `window_secs` are pruned on write, so the ledger
    /// stays bounded by the window rather than growing per run.
    pub fn mark_shown(&mut self, user: UserId, ids: &[CatalogId], now: i64, window_secs: i64) {
        let ledger = self.recently_shown.entry(user).or_default();
        ledger.retain(|(_, shown_at)| now - shown_at <= window_secs);
        for &id in ids {
            match ledger.iter_mut().find(|(entry_id, _)| *entry_id == id) {
                Some(entry) => entry.1 = now,
                None => ledger.push((id, now)),
            }
        }
    }

    /// Candidate ids shown within the window ending at `now`.
    pub fn recently_shown(&self, user: UserId, now: i64, window_secs: i64) -> HashSet<CatalogId> {
        self.recently_shown
            .get(&user)
            .map(|ledger| {
                ledger
                    .iter()
                    .filter(|(_, shown_at)| now - shown_at <= window_secs)
                    .map(|(id, _)| *id)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeatureRef;

    const USER: UserId = 7;
    const WINDOW: i64 = 24 * 3600;

    #[test]
    fn upsert_watch_event_replaces_by_uri() {
        let mut store = TasteStore::new();
        store.upsert_watch_event(USER, WatchEvent::watched("film/alien", 1));
        store.upsert_watch_event(
            USER,
            WatchEvent::watched("film/alien", 1).with_rating(4.5),
        );

        let events = store.watch_events(USER);
        assert_eq!(events.len(), 1, "same uri must not duplicate");
        assert_eq!(events[0].rating, Some(4.5));
    }

    #[test]
    fn resolved_watches_skips_unresolvable_rows() {
        let mut store = TasteStore::new();
        store.upsert_details(CandidateDetails::new(1, "Alien"));
        store.upsert_watch_event(USER, WatchEvent::watched("film/alien", 1));
        store.upsert_watch_event(USER, WatchEvent::watched("film/no-metadata", 2));
        let mut orphan = WatchEvent::watched("film/no-id", 0);
        orphan.catalog_id = None;
        store.upsert_watch_event(USER, orphan);

        let resolved = store.resolved_watches(USER);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].details.title, "Alien");
    }

    #[test]
    fn watched_ids_excludes_watchlist_only_rows() {
        let mut store = TasteStore::new();
        store.upsert_watch_event(USER, WatchEvent::watched("film/alien", 1));
        let mut listed = WatchEvent::watched("film/dune", 2).with_watchlist(100);
        listed.watch_count = 0;
        store.upsert_watch_event(USER, listed);

        let watched = store.watched_ids(USER);
        assert!(watched.contains(&1));
        assert!(!watched.contains(&2));
    }

    #[test]
    fn feedback_upsert_returns_replaced_event() {
        let mut store = TasteStore::new();
        let first = FeedbackEvent {
            user_id: USER,
            candidate_id: 42,
            kind: crate::types::FeedbackKind::Positive,
            reasons: vec![],
            created_at: 100,
            channels: vec![DiscoveryChannel::Trending],
            consensus_at_time: ConsensusLevel::Low,
        };
        assert!(store.upsert_feedback(first.clone()).is_none());

        let second = FeedbackEvent {
            kind: crate::types::FeedbackKind::NegativeSoft,
            created_at: 200,
            ..first
        };
        let replaced = store.upsert_feedback(second).expect("first event replaced");
        assert_eq!(replaced.created_at, 100);
        assert_eq!(store.feedback_events(USER).len(), 1);
    }

    #[test]
    fn prior_reads_default_to_zero_counters() {
        let store = TasteStore::new();
        let prior = store.prior(USER, DiscoveryChannel::Trending, ConsensusLevel::Low);
        assert_eq!(prior.observations(), 0);
        assert_eq!(prior.smoothed_rate(), 0.5);
    }

    #[test]
    fn prior_reversal_is_exact_and_saturating() {
        let mut store = TasteStore::new();
        store.record_hit(USER, DiscoveryChannel::Similar, ConsensusLevel::High);
        store.revert_hit(USER, DiscoveryChannel::Similar, ConsensusLevel::High);
        store.revert_hit(USER, DiscoveryChannel::Similar, ConsensusLevel::High);

        let prior = store.prior(USER, DiscoveryChannel::Similar, ConsensusLevel::High);
        assert_eq!(prior.hits, 0);
    }

    #[test]
    fn feature_counters_round_trip() {
        let mut store = TasteStore::new();
        store.record_feature_positive(USER, FeatureKind::Genre, 27);
        store.record_feature_positive(USER, FeatureKind::Genre, 27);
        store.record_feature_negative(USER, FeatureKind::Genre, 27);

        let stat = store.feature_stat(USER, FeatureKind::Genre, 27);
        assert_eq!((stat.positive, stat.negative), (2, 1));

        store.revert_feature_negative(USER, FeatureKind::Genre, 27);
        let stat = store.feature_stat(USER, FeatureKind::Genre, 27);
        assert_eq!(stat.negative, 0);
    }

    #[test]
    fn block_and_dismiss_sets_are_independent() {
        let mut store = TasteStore::new();
        store.block(USER, 5);
        store.dismiss(USER, 6);

        assert!(store.is_blocked(USER, 5));
        assert!(!store.is_dismissed(USER, 5));
        assert!(store.is_dismissed(USER, 6));

        store.unblock(USER, 5);
        store.undismiss(USER, 6);
        assert!(store.blocked_ids(USER).is_empty());
        assert!(store.dismissed_ids(USER).is_empty());
    }

    #[test]
    fn recently_shown_expires_outside_window() {
        let mut store = TasteStore::new();
        store.mark_shown(USER, &[1, 2], 1_000, WINDOW);

        let inside = store.recently_shown(USER, 1_000 + WINDOW, WINDOW);
        assert!(inside.contains(&1) && inside.contains(&2));

        let outside = store.recently_shown(USER, 1_001 + WINDOW, WINDOW);
        assert!(outside.is_empty());
    }

    #[test]
    fn mark_shown_refreshes_existing_entries() {
        let mut store = TasteStore::new();
        store.mark_shown(USER, &[1], 1_000, WINDOW);
        store.mark_shown(USER, &[1], 2_000, WINDOW);

        let shown = store.recently_shown(USER, 2_000 + WINDOW, WINDOW);
        assert!(shown.contains(&1), "re-showing must refresh the timestamp");
    }

    #[test]
    fn details_upsert_replaces_metadata() {
        let mut store = TasteStore::new();
        store.upsert_details(CandidateDetails::new(9, "Working Title"));
        let mut updated = CandidateDetails::new(9, "Final Title");
        updated.genres.push(FeatureRef::new(18, "Drama"));
        store.upsert_details(updated);

        let details = store.details(9).expect("metadata present");
        assert_eq!(details.title, "Final Title");
        assert_eq!(details.genres.len(), 1);
    }
}
