//! Candidate scoring against a taste profile.
//!
//! `OverlapScorer` turns profile weights, feedback state, and candidate
//! metadata into a single ranked list. Candidates are scored in parallel
//! with rayon; everything the parallel section reads is computed up front,
//! including the reliability multipliers, so scoring stays a pure function
//! of its inputs.

use std::collections::{BTreeMap, HashMap, HashSet};

use rayon::prelude::*;
use tracing::{debug, instrument};

use catalog::types::{
    Candidate, CandidateDetails, CatalogId, ConsensusLevel, DiscoveryChannel, FeatureKind,
};
use profile::TasteProfile;

use crate::session::{SessionContext, SessionTone};

/// Global per-kind weights plus the scorer's other tunables.
#[derive(Debug, Clone)]
pub struct RankingWeights {
    pub genre: f32,
    pub keyword: f32,
    pub director: f32,
    pub actor: f32,
    pub studio: f32,
    pub decade: f32,
    /// Scale on avoid-list penalties.
    pub avoid_scale: f32,
    /// Scale on watchlist intent bonuses.
    pub intent_scale: f32,
    /// Upper bound on the vote-quality nudge.
    pub quality_cap: f32,
    /// Flat penalty while a soft dismissal is active.
    pub dismissal_penalty: f32,
    /// Multiplier applied below the completeness floor.
    pub completeness_factor: f32,
    /// Candidates with fewer present metadata categories hit the floor.
    pub min_categories: usize,
    pub short_runtime_cutoff: u32,
    pub long_runtime_cutoff: u32,
    pub runtime_bias: f32,
    pub family_bonus: f32,
    pub family_horror_penalty: f32,
    pub max_reasons: usize,
    /// Contributing film titles kept per matched feature.
    pub evidence_cap: usize,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            genre: 1.0,
            keyword: 0.9,
            director: 1.1,
            actor: 0.7,
            studio: 0.4,
            decade: 0.5,
            avoid_scale: 0.8,
            intent_scale: 0.5,
            quality_cap: 0.5,
            dismissal_penalty: 1.5,
            completeness_factor: 0.8,
            min_categories: 2,
            short_runtime_cutoff: 105,
            long_runtime_cutoff: 140,
            runtime_bias: 0.3,
            family_bonus: 0.5,
            family_horror_penalty: 0.75,
            max_reasons: 5,
            evidence_cap: 3,
        }
    }
}

impl RankingWeights {
    pub fn kind_weight(&self, kind: FeatureKind) -> f32 {
        match kind {
            FeatureKind::Genre => self.genre,
            FeatureKind::Keyword => self.keyword,
            FeatureKind::Director => self.director,
            FeatureKind::Actor => self.actor,
            FeatureKind::Studio => self.studio,
            FeatureKind::Decade => self.decade,
        }
    }

    pub fn with_dismissal_penalty(mut self, penalty: f32) -> Self {
        self.dismissal_penalty = penalty;
        self
    }

    pub fn with_max_reasons(mut self, n: usize) -> Self {
        self.max_reasons = n;
        self
    }
}

/// A fully scored candidate, ready for reranking and presentation.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: f32,
    /// Human-readable explanations, strongest contribution first.
    pub reasons: Vec<String>,
    /// `"kind:name"` to the historical titles that earned that feature.
    pub contributing_films: BTreeMap<String, Vec<String>>,
    /// The reliability multiplier that was applied.
    pub reliability: f32,
}

impl ScoredCandidate {
    pub fn id(&self) -> CatalogId {
        self.candidate.id()
    }

    pub fn sources(&self) -> &[DiscoveryChannel] {
        &self.candidate.channels
    }

    pub fn consensus(&self) -> ConsensusLevel {
        self.candidate.consensus
    }
}

/// Scores candidates by weighted feature overlap with the profile.
#[derive(Debug, Default)]
pub struct OverlapScorer {
    weights: RankingWeights,
}

impl OverlapScorer {
    pub fn new(weights: RankingWeights) -> Self {
        Self { weights }
    }

    /// Score and deterministically order a candidate pool.
    ///
    /// `reliability` maps candidate id to its precomputed multiplier;
    /// missing entries mean neutral. `dismissed` is the set of currently
    /// soft-dismissed ids.
    #[instrument(skip_all, fields(candidates = candidates.len()))]
    pub fn score(
        &self,
        profile: &TasteProfile,
        candidates: &[Candidate],
        reliability: &HashMap<CatalogId, f32>,
        dismissed: &HashSet<CatalogId>,
        session: SessionContext,
    ) -> Vec<ScoredCandidate> {
        let mut scored: Vec<ScoredCandidate> = candidates
            .par_iter()
            .map(|candidate| {
                let multiplier = reliability.get(&candidate.id()).copied().unwrap_or(1.0);
                self.score_single(profile, candidate, multiplier, dismissed, session)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| {
                    b.candidate
                        .details
                        .vote_average
                        .total_cmp(&a.candidate.details.vote_average)
                })
                .then_with(|| {
                    a.candidate
                        .details
                        .popularity
                        .total_cmp(&b.candidate.details.popularity)
                })
                .then_with(|| a.id().cmp(&b.id()))
        });
        debug!(scored = scored.len(), "overlap scoring complete");
        scored
    }

    fn score_single(
        &self,
        profile: &TasteProfile,
        candidate: &Candidate,
        reliability: f32,
        dismissed: &HashSet<CatalogId>,
        session: SessionContext,
    ) -> ScoredCandidate {
        let w = &self.weights;
        let details = &candidate.details;
        let mut score = 0.0f32;
        // (contribution, text) pairs; ordered and truncated at the end.
        let mut reason_pool: Vec<(f32, String)> = Vec::new();
        let mut contributing: BTreeMap<String, Vec<String>> = BTreeMap::new();

        if profile.is_empty() {
            score = (details.popularity.max(0.0) + 1.0).ln();
            reason_pool.push((score, "popular with other viewers".to_string()));
        } else {
            let mut intent_total = 0.0f32;
            for (kind, feature) in details.feature_entries() {
                let kind_weight = w.kind_weight(kind);

                let preferred = profile.preferred_weight(kind, feature.id);
                if preferred > 0.0 {
                    let contribution = preferred * kind_weight;
                    score += contribution;
                    reason_pool.push((
                        contribution,
                        format!("{} {} you favor", kind.label(), feature.name),
                    ));
                    let evidence = profile.evidence_for(kind, feature.id);
                    if !evidence.is_empty() {
                        contributing.insert(
                            format!("{}:{}", kind.label(), feature.name),
                            evidence.iter().take(w.evidence_cap).cloned().collect(),
                        );
                    }
                }

                let avoided = profile.avoided_weight(kind, feature.id);
                if avoided > 0.0 {
                    score -= avoided * kind_weight * w.avoid_scale;
                }

                intent_total += profile.intent_weight(kind, feature.id) * kind_weight;
            }
            if intent_total > 0.0 {
                let bonus = intent_total * w.intent_scale;
                score += bonus;
                reason_pool.push((bonus, "close to your watchlist picks".to_string()));
            }
        }

        let nudge = self.quality_nudge(details);
        if nudge > 0.0 {
            score += nudge;
            reason_pool.push((nudge, "well reviewed".to_string()));
        }

        let (session_adjust, session_reason) = self.session_bias(details, session.tone);
        score += session_adjust;
        if let Some(reason) = session_reason {
            reason_pool.push((session_adjust.abs(), reason));
        }

        if dismissed.contains(&details.id) {
            score -= w.dismissal_penalty;
            reason_pool.push((0.0, "you passed on this recently".to_string()));
        }

        // Thin metadata is downranked, never dropped; strong consensus is
        // treated as evidence the candidate is worth surfacing anyway.
        if details.present_categories() < w.min_categories
            && candidate.consensus != ConsensusLevel::High
            && score > 0.0
        {
            score *= w.completeness_factor;
        }

        if score > 0.0 {
            score *= reliability;
        }

        reason_pool.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        let reasons = reason_pool
            .into_iter()
            .take(w.max_reasons)
            .map(|(_, text)| text)
            .collect();

        ScoredCandidate {
            candidate: candidate.clone(),
            score,
            reasons,
            contributing_films: contributing,
            reliability,
        }
    }

    /// Small boost for broadly well-reviewed titles, capped so community
    /// votes can nudge but never dominate personal fit.
    fn quality_nudge(&self, details: &CandidateDetails) -> f32 {
        if details.vote_count == 0 {
            return 0.0;
        }
        let quality = ((details.vote_average - 5.0) / 5.0).clamp(0.0, 1.0);
        let confidence =
            ((details.vote_count as f32 + 1.0).ln() / (1000.0f32 + 1.0).ln()).min(1.0);
        quality * confidence * self.weights.quality_cap
    }

    fn session_bias(&self, details: &CandidateDetails, tone: SessionTone) -> (f32, Option<String>) {
        let w = &self.weights;
        match tone {
            SessionTone::Any => (0.0, None),
            SessionTone::Short | SessionTone::Weeknight => {
                let Some(runtime) = details.runtime_minutes else {
                    return (0.0, None);
                };
                let strength = if tone == SessionTone::Short {
                    w.runtime_bias
                } else {
                    w.runtime_bias / 2.0
                };
                if runtime <= w.short_runtime_cutoff {
                    (strength, Some("fits the time you have".to_string()))
                } else if runtime > w.long_runtime_cutoff {
                    (-strength, None)
                } else {
                    (0.0, None)
                }
            }
            SessionTone::Family => {
                let mut adjust = 0.0f32;
                let mut reason = None;
                let family_friendly = details.genres.iter().any(|g| {
                    g.name.eq_ignore_ascii_case("family")
                        || g.name.eq_ignore_ascii_case("animation")
                });
                if family_friendly {
                    adjust += w.family_bonus;
                    reason = Some("good for watching together".to_string());
                }
                if details.genres.iter().any(|g| g.name.eq_ignore_ascii_case("horror")) {
                    adjust -= w.family_horror_penalty;
                }
                (adjust, reason)
            }
        }
    }
}
