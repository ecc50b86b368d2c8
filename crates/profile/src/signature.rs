//! Signature film scoring: which films in a user's history best represent
//! their taste.
//!
//! The highest-scoring films become seeds for similar-title discovery. Raw
//! star rating alone is a poor seed signal: everyone's five-star blockbuster
//! says little about the person. The scorer therefore rewards niche
//! popularity and depth of match with the profile on top of the personal
//! rating.

use tracing::debug;

use catalog::store::ResolvedWatch;
use catalog::types::CatalogId;

use crate::taste::TasteProfile;

/// Tunables for signature scoring.
#[derive(Debug, Clone)]
pub struct SignatureConfig {
    /// Points per star above the baseline rating.
    pub rating_scale: f32,
    pub rating_baseline: f32,
    pub liked_bonus: f32,
    /// Popularity at which the niche bonus reaches zero.
    pub niche_pivot: f32,
    pub niche_scale: f32,
    pub top_genre_bonus: f32,
    /// How many of the profile's strongest genres count as "top".
    pub top_genre_count: usize,
    pub decade_bonus: f32,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            rating_scale: 1.5,
            rating_baseline: 3.0,
            liked_bonus: 0.75,
            niche_pivot: 500.0,
            niche_scale: 0.5,
            top_genre_bonus: 0.6,
            top_genre_count: 4,
            decade_bonus: 0.5,
        }
    }
}

/// One scored history film, with the contributions that fired.
#[derive(Debug, Clone)]
pub struct SignatureScore {
    pub catalog_id: CatalogId,
    pub title: String,
    pub score: f32,
    pub reasons: Vec<String>,
}

/// Scores a user's own watched films for seed selection.
#[derive(Debug, Default)]
pub struct SignatureScorer {
    config: SignatureConfig,
}

impl SignatureScorer {
    pub fn new(config: SignatureConfig) -> Self {
        Self { config }
    }

    /// Score every watched film in the history, highest first.
    ///
    /// Watchlist-only rows are skipped; a film the user has not seen cannot
    /// be a signature.
    pub fn score_history(
        &self,
        watches: &[ResolvedWatch],
        profile: &TasteProfile,
    ) -> Vec<SignatureScore> {
        let top_genres: Vec<_> = profile.top_genres(self.config.top_genre_count);
        let top_decade = profile.top_decade();

        let mut scored: Vec<SignatureScore> = watches
            .iter()
            .filter(|w| w.event.watch_count > 0)
            .map(|watch| {
                let cfg = &self.config;
                let mut score = 0.0f32;
                let mut reasons = Vec::new();

                if let Some(rating) = watch.event.rating {
                    let above = (rating - cfg.rating_baseline).max(0.0);
                    if above > 0.0 {
                        score += above * cfg.rating_scale;
                        reasons.push(format!("rated {rating:.1}"));
                    }
                }
                if watch.event.liked {
                    score += cfg.liked_bonus;
                    reasons.push("liked".to_string());
                }

                let niche = (cfg.niche_pivot + 1.0).ln()
                    - (watch.details.popularity.max(0.0) + 1.0).ln();
                if niche > 0.0 {
                    score += niche * cfg.niche_scale;
                    reasons.push("flies under the radar".to_string());
                }

                for genre in &watch.details.genres {
                    if top_genres.iter().any(|fw| fw.feature.id == genre.id) {
                        score += cfg.top_genre_bonus;
                        reasons.push(format!("favorite genre {}", genre.name));
                    }
                }

                if let (Some(decade), Some(top)) = (watch.details.decade(), top_decade) {
                    if decade as u32 == top {
                        score += cfg.decade_bonus;
                        reasons.push(format!("from the {decade}s"));
                    }
                }

                SignatureScore {
                    catalog_id: watch.details.id,
                    title: watch.details.title.clone(),
                    score,
                    reasons,
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.catalog_id.cmp(&b.catalog_id))
        });
        debug!(scored = scored.len(), "signature scoring complete");
        scored
    }

    /// Ids of the top `n` signature films.
    pub fn select_seeds(
        &self,
        watches: &[ResolvedWatch],
        profile: &TasteProfile,
        n: usize,
    ) -> Vec<CatalogId> {
        self.score_history(watches, profile)
            .into_iter()
            .take(n)
            .map(|s| s.catalog_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taste::FeatureWeight;
    use catalog::types::{CandidateDetails, FeatureKind, FeatureRef, WatchEvent};
    use std::collections::HashMap;

    fn fixture_profile() -> TasteProfile {
        let genres = vec![
            feature_weight(27, "Horror", 4.0),
            feature_weight(53, "Thriller", 3.5),
            feature_weight(878, "Science Fiction", 3.0),
            feature_weight(18, "Drama", 2.5),
        ];
        let decades = vec![feature_weight(1980, "1980s", 2.0)];
        let mut preferred = HashMap::new();
        preferred.insert(FeatureKind::Genre, genres);
        preferred.insert(FeatureKind::Decade, decades);
        TasteProfile {
            user_id: 1,
            preferred,
            history_size: 5,
            ..TasteProfile::default()
        }
    }

    fn feature_weight(id: u32, name: &str, weight: f32) -> FeatureWeight {
        FeatureWeight {
            feature: FeatureRef::new(id, name),
            weight,
            samples: 3,
            evidence: vec![],
        }
    }

    fn film(
        id: u32,
        title: &str,
        rating: f32,
        liked: bool,
        popularity: f32,
        genres: &[(u32, &str)],
        year: u16,
    ) -> ResolvedWatch {
        let mut details = CandidateDetails::new(id, title);
        details.genres = genres
            .iter()
            .map(|(id, name)| FeatureRef::new(*id, *name))
            .collect();
        details.popularity = popularity;
        details.release_year = Some(year);
        ResolvedWatch {
            event: WatchEvent::watched(format!("film/{id}"), id)
                .with_rating(rating)
                .with_liked(liked),
            details,
        }
    }

    #[test]
    fn niche_bonus_is_monotone_in_popularity() {
        let profile = TasteProfile::default();
        let scorer = SignatureScorer::default();
        // Identical rating and genres, only popularity differs.
        let obscure = film(1, "Obscure", 4.0, false, 3.0, &[(27, "Horror")], 1999);
        let mainstream = film(2, "Mainstream", 4.0, false, 400.0, &[(27, "Horror")], 1999);

        let scores = scorer.score_history(&[obscure, mainstream], &profile);
        let by_id: HashMap<u32, f32> = scores.iter().map(|s| (s.catalog_id, s.score)).collect();
        assert!(by_id[&1] >= by_id[&2]);
    }

    #[test]
    fn hidden_gems_outrank_the_blockbuster() {
        let profile = fixture_profile();
        let scorer = SignatureScorer::default();
        let history = [
            film(1, "Hidden Horror Gem", 5.0, true, 8.5, &[(27, "Horror"), (53, "Thriller")], 1995),
            film(2, "Mainstream Blockbuster", 5.0, true, 500.0, &[(28, "Action")], 2010),
            film(
                3,
                "Cult Classic Sci-Fi",
                4.0,
                true,
                35.0,
                &[(878, "Science Fiction"), (53, "Thriller")],
                1984,
            ),
            film(4, "Obscure Drama", 5.0, false, 2.5, &[(18, "Drama")], 1987),
            film(5, "Recent Horror", 4.0, false, 15.0, &[(27, "Horror")], 2021),
        ];

        let scores = scorer.score_history(&history, &profile);
        let by_id: HashMap<u32, f32> = scores.iter().map(|s| (s.catalog_id, s.score)).collect();

        assert!(
            by_id[&1] > by_id[&2],
            "Hidden Horror Gem must beat the Blockbuster ({} vs {})",
            by_id[&1],
            by_id[&2]
        );
        assert!(
            by_id[&4] > by_id[&2],
            "Obscure Drama must beat the Blockbuster ({} vs {})",
            by_id[&4],
            by_id[&2]
        );
    }

    #[test]
    fn reasons_name_the_contributions_that_fired() {
        let profile = fixture_profile();
        let scorer = SignatureScorer::default();
        let history = [film(
            1,
            "Hidden Horror Gem",
            5.0,
            true,
            8.5,
            &[(27, "Horror")],
            1985,
        )];

        let scores = scorer.score_history(&history, &profile);
        let reasons = &scores[0].reasons;
        assert!(reasons.iter().any(|r| r.contains("rated 5.0")));
        assert!(reasons.iter().any(|r| r == "liked"));
        assert!(reasons.iter().any(|r| r.contains("under the radar")));
        assert!(reasons.iter().any(|r| r.contains("Horror")));
        assert!(reasons.iter().any(|r| r.contains("1980s")));
    }

    #[test]
    fn empty_profile_still_scores_without_match_bonuses() {
        let scorer = SignatureScorer::default();
        let history = [film(1, "Anything", 4.5, false, 10.0, &[(27, "Horror")], 1999)];

        let scores = scorer.score_history(&history, &TasteProfile::default());
        assert_eq!(scores.len(), 1);
        assert!(scores[0].score > 0.0);
        assert!(!scores[0].reasons.iter().any(|r| r.contains("genre")));
    }

    #[test]
    fn select_seeds_returns_top_ids_in_order() {
        let profile = fixture_profile();
        let scorer = SignatureScorer::default();
        let history = [
            film(1, "Gem", 5.0, true, 8.5, &[(27, "Horror")], 1985),
            film(2, "Mid", 3.5, false, 100.0, &[(35, "Comedy")], 2005),
            film(3, "Meh", 3.0, false, 300.0, &[], 2015),
        ];

        let seeds = scorer.select_seeds(&history, &profile, 2);
        assert_eq!(seeds, vec![1, 2]);
    }
}
