//! Adaptive feedback: turning explicit user actions into counter updates.
//!
//! Every apply first reverses the deltas of whatever event was previously
//! active for the same (user, candidate). Re-issuing identical feedback is
//! therefore idempotent, overwriting with different feedback never
//! double-counts, and undo restores the exact pre-feedback state.

use tracing::{debug, instrument};

use catalog::store::TasteStore;
use catalog::types::{CatalogId, FeatureKind, FeatureId, FeedbackEvent, FeedbackKind, UserId};

/// Applies and reverses feedback events against the store.
#[derive(Debug, Default)]
pub struct FeedbackLearner;

impl FeedbackLearner {
    pub fn new() -> Self {
        Self
    }

    /// Upsert `event` as the active feedback for its (user, candidate) pair
    /// and apply its counter deltas.
    #[instrument(skip_all, fields(user_id = event.user_id, candidate_id = event.candidate_id))]
    pub fn apply(&self, store: &mut TasteStore, event: FeedbackEvent) {
        if let Some(previous) = store.feedback(event.user_id, event.candidate_id).cloned() {
            debug!(kind = ?previous.kind, "reversing previously active event");
            self.reverse_deltas(store, &previous);
        }
        self.apply_deltas(store, &event);
        store.upsert_feedback(event);
    }

    /// Remove the active event for (user, candidate), reversing its deltas.
    ///
    /// Returns the removed event, or `None` when there was nothing to undo.
    #[instrument(skip(store))]
    pub fn undo(
        &self,
        store: &mut TasteStore,
        user: UserId,
        candidate: CatalogId,
    ) -> Option<FeedbackEvent> {
        let event = store.remove_feedback(user, candidate)?;
        self.reverse_deltas(store, &event);
        debug!(kind = ?event.kind, "feedback undone");
        Some(event)
    }

    fn apply_deltas(&self, store: &mut TasteStore, event: &FeedbackEvent) {
        let hit = event.kind.is_hit();
        for &channel in &event.channels {
            if hit {
                store.record_hit(event.user_id, channel, event.consensus_at_time);
            } else {
                store.record_miss(event.user_id, channel, event.consensus_at_time);
            }
        }
        for (kind, feature) in self.candidate_features(store, event.candidate_id) {
            if hit {
                store.record_feature_positive(event.user_id, kind, feature);
            } else {
                store.record_feature_negative(event.user_id, kind, feature);
            }
        }
        match event.kind {
            FeedbackKind::NegativeSoft => store.dismiss(event.user_id, event.candidate_id),
            FeedbackKind::NegativeHard => store.block(event.user_id, event.candidate_id),
            _ => {}
        }
    }

    fn reverse_deltas(&self, store: &mut TasteStore, event: &FeedbackEvent) {
        let hit = event.kind.is_hit();
        for &channel in &event.channels {
            if hit {
                store.revert_hit(event.user_id, channel, event.consensus_at_time);
            } else {
                store.revert_miss(event.user_id, channel, event.consensus_at_time);
            }
        }
        for (kind, feature) in self.candidate_features(store, event.candidate_id) {
            if hit {
                store.revert_feature_positive(event.user_id, kind, feature);
            } else {
                store.revert_feature_negative(event.user_id, kind, feature);
            }
        }
        match event.kind {
            FeedbackKind::NegativeSoft => store.undismiss(event.user_id, event.candidate_id),
            FeedbackKind::NegativeHard => store.unblock(event.user_id, event.candidate_id),
            _ => {}
        }
    }

    fn candidate_features(
        &self,
        store: &TasteStore,
        candidate: CatalogId,
    ) -> Vec<(FeatureKind, FeatureId)> {
        store
            .details(candidate)
            .map(|d| {
                d.feature_entries()
                    .into_iter()
                    .map(|(kind, feature)| (kind, feature.id))
                    .collect()
            })
            .unwrap_or_default()
    }
}
