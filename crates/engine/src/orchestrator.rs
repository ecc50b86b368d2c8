//! # Recommendation Engine
//!
//! This module coordinates the entire ranking pipeline:
//! 1. Snapshot store state for the user
//! 2. Build the taste profile
//! 3. Pick seed films by signature score
//! 4. Fan out to the discovery channels in parallel
//! 5. Merge, attribute, and filter the pool
//! 6. Fetch details through the bounded pool
//! 7. Score and rerank
//! 8. Mark the picks shown and return them
//!
//! Every run carries a generation token from a per-user counter. Requesting
//! new picks bumps the counter, so an older in-flight run observes the bump
//! at its checkpoints and bails out with `EngineError::Superseded` instead
//! of marking stale results shown.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use thiserror::Error;
use tracing::{info, warn};

use catalog::types::{CatalogId, DiscoveryChannel, FeatureId, UserId};
use catalog::{FeatureKind, FeatureStat, ResolvedWatch, TasteStore};
use discovery::{DetailFetcher, DiscoveryProvider, PoolExclusions, merge_channels};
use profile::{SignatureScorer, TasteProfile, TasteProfileBuilder};
use ranking::{
    DiversityReranker, OverlapScorer, PriorSnapshot, ScoredCandidate, SessionContext,
    SourceReliabilityWeighter,
};

#[derive(Error, Debug)]
pub enum EngineError {
    /// A newer run for the same user started while this one was in flight.
    /// Benign: the newer run's results are the ones that count.
    #[error("run for user {0} superseded by a newer request")]
    Superseded(UserId),
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Final list size after reranking.
    pub limit: usize,
    /// Seed films for the similar channel.
    pub max_seeds: usize,
    /// Preferred genres forwarded to the discover channel.
    pub discover_genres: usize,
    /// How long a returned pick suppresses itself from later pools.
    pub shown_window_secs: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            max_seeds: 3,
            discover_genres: 4,
            shown_window_secs: 3 * 24 * 3600,
        }
    }
}

/// Per-user snapshot taken under the store lock, so the async stages work
/// on a consistent view.
struct StoreSnapshot {
    watches: Vec<ResolvedWatch>,
    stats: HashMap<(FeatureKind, FeatureId), FeatureStat>,
    priors: PriorSnapshot,
    watched: HashSet<CatalogId>,
    blocked: HashSet<CatalogId>,
    recently_shown: HashSet<CatalogId>,
    dismissed: HashSet<CatalogId>,
}

/// Main engine that coordinates the ranking pipeline
pub struct RecommendationEngine {
    store: Arc<RwLock<TasteStore>>,
    provider: Arc<dyn DiscoveryProvider>,
    fetcher: DetailFetcher,
    profile_builder: TasteProfileBuilder,
    signature: SignatureScorer,
    scorer: OverlapScorer,
    weighter: SourceReliabilityWeighter,
    reranker: DiversityReranker,
    config: EngineConfig,
    generations: Mutex<HashMap<UserId, u64>>,
}

impl RecommendationEngine {
    pub fn new(store: Arc<RwLock<TasteStore>>, provider: Arc<dyn DiscoveryProvider>) -> Self {
        Self::with_config(store, provider, EngineConfig::default())
    }

    pub fn with_config(
        store: Arc<RwLock<TasteStore>>,
        provider: Arc<dyn DiscoveryProvider>,
        config: EngineConfig,
    ) -> Self {
        let fetcher = DetailFetcher::new(Arc::clone(&provider));
        Self {
            store,
            provider,
            fetcher,
            profile_builder: TasteProfileBuilder::default(),
            signature: SignatureScorer::default(),
            scorer: OverlapScorer::default(),
            weighter: SourceReliabilityWeighter::default(),
            reranker: DiversityReranker::default(),
            config,
            generations: Mutex::new(HashMap::new()),
        }
    }

    /// Main entry point: one ranked run for a user.
    ///
    /// `now` is unix seconds; passing it in keeps a run a pure function of
    /// store state, provider state, and the clock value.
    pub async fn run(
        &self,
        user: UserId,
        session: SessionContext,
        now: i64,
    ) -> Result<Vec<ScoredCandidate>> {
        let generation = self.begin_run(user);
        self.run_generation(user, generation, session, now).await
    }

    async fn run_generation(
        &self,
        user: UserId,
        generation: u64,
        session: SessionContext,
        now: i64,
    ) -> Result<Vec<ScoredCandidate>> {
        let start_time = Instant::now();

        let snapshot = self.snapshot(user, now);
        let profile = self
            .profile_builder
            .build(user, &snapshot.watches, &snapshot.stats, now);
        let seeds = self
            .signature
            .select_seeds(&snapshot.watches, &profile, self.config.max_seeds);
        info!(user, seeds = seeds.len(), empty_profile = profile.is_empty(), "profile built");

        let channels = self.discover_channels(&profile, &seeds).await;
        self.check_current(user, generation)?;

        let exclusions = PoolExclusions {
            watched: snapshot.watched,
            blocked: snapshot.blocked,
            recently_shown: snapshot.recently_shown,
        };
        let merged = merge_channels(&channels, &exclusions);
        info!(user, pool = merged.len(), "pool merged");

        let candidates = self.fetcher.fetch(merged).await;
        let multipliers = self
            .weighter
            .multipliers_for(user, &snapshot.priors, &candidates);
        let scored = self.scorer.score(
            &profile,
            &candidates,
            &multipliers,
            &snapshot.dismissed,
            session,
        );
        let picks = self.reranker.rerank(scored, self.config.limit);
        self.check_current(user, generation)?;

        let ids: Vec<CatalogId> = picks.iter().map(|p| p.id()).collect();
        self.store_mut()
            .mark_shown(user, &ids, now, self.config.shown_window_secs);

        info!(
            user,
            picks = picks.len(),
            elapsed = ?start_time.elapsed(),
            "run complete"
        );
        Ok(picks)
    }

    /// Bump the user's generation counter and claim the new value.
    fn begin_run(&self, user: UserId) -> u64 {
        let mut generations = self.generations.lock().unwrap_or_else(|e| e.into_inner());
        let counter = generations.entry(user).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Bail out if a newer run claimed the counter since `generation`.
    fn check_current(&self, user: UserId, generation: u64) -> Result<()> {
        let generations = self.generations.lock().unwrap_or_else(|e| e.into_inner());
        let latest = generations.get(&user).copied().unwrap_or(0);
        if latest != generation {
            warn!(user, generation, latest, "run superseded, abandoning");
            return Err(EngineError::Superseded(user));
        }
        Ok(())
    }

    fn snapshot(&self, user: UserId, now: i64) -> StoreSnapshot {
        let store = self.store.read().unwrap_or_else(|e| e.into_inner());
        StoreSnapshot {
            watches: store.resolved_watches(user),
            stats: store.feature_stats(user),
            priors: store.priors(user),
            watched: store.watched_ids(user),
            blocked: store.blocked_ids(user),
            recently_shown: store.recently_shown(user, now, self.config.shown_window_secs),
            dismissed: store.dismissed_ids(user),
        }
    }

    fn store_mut(&self) -> std::sync::RwLockWriteGuard<'_, TasteStore> {
        self.store.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Query all three channels concurrently; a failed channel logs and
    /// contributes an empty list instead of failing the run.
    async fn discover_channels(
        &self,
        profile: &TasteProfile,
        seeds: &[CatalogId],
    ) -> Vec<(DiscoveryChannel, Vec<CatalogId>)> {
        let genre_ids: Vec<FeatureId> = profile
            .top_genres(self.config.discover_genres)
            .iter()
            .map(|fw| fw.feature.id)
            .collect();

        let (trending, discovered, similar) = tokio::join!(
            self.provider.trending(0),
            self.provider.discover(&genre_ids),
            async {
                let mut ids = Vec::new();
                for &seed in seeds {
                    match self.provider.similar(seed).await {
                        Ok(mut found) => ids.append(&mut found),
                        Err(err) => warn!(seed, error = %err, "similar channel failed"),
                    }
                }
                ids
            }
        );

        vec![
            (
                DiscoveryChannel::Trending,
                channel_or_empty("trending", trending),
            ),
            (DiscoveryChannel::Similar, similar),
            (
                DiscoveryChannel::Discover,
                channel_or_empty("discover", discovered),
            ),
        ]
    }
}

fn channel_or_empty(
    channel: &'static str,
    result: discovery::Result<Vec<CatalogId>>,
) -> Vec<CatalogId> {
    match result {
        Ok(ids) => ids,
        Err(err) => {
            warn!(channel, error = %err, "channel failed, continuing without it");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::types::{CandidateDetails, FeatureRef, WatchEvent};
    use discovery::FixtureProvider;
    use ranking::SessionTone;

    const USER: UserId = 1;
    const NOW: i64 = 1_700_000_000;

    fn film(
        id: CatalogId,
        title: &str,
        genres: &[(u32, &str)],
        director: u32,
        year: u16,
        popularity: f32,
    ) -> CandidateDetails {
        let mut d = CandidateDetails::new(id, title);
        d.genres = genres
            .iter()
            .map(|(id, name)| FeatureRef::new(*id, *name))
            .collect();
        d.directors = vec![FeatureRef::new(director, format!("Director {director}"))];
        d.release_year = Some(year);
        d.popularity = popularity;
        d.vote_average = 7.0;
        d.vote_count = 400;
        d
    }

    fn fixture_films() -> Vec<CandidateDetails> {
        let horror = &[(27u32, "Horror"), (53, "Thriller")][..];
        vec![
            film(1, "Static Frequencies", horror, 1, 1986, 12.0),
            film(2, "Wedding Season", &[(10749, "Romance")], 3, 2018, 80.0),
            film(3, "The Long Meadow", &[(18, "Drama")], 4, 2005, 30.0),
            film(4, "Cellar Door II", horror, 2, 1989, 8.0),
            film(5, "Monsoon Run", &[(28, "Action")], 5, 2012, 55.0),
            // The user's own history, present so `similar` can resolve seeds.
            film(101, "The Shining Echo", horror, 1, 1981, 40.0),
            film(102, "Night Fixture", horror, 1, 1984, 25.0),
        ]
    }

    fn seeded_store() -> Arc<RwLock<TasteStore>> {
        let mut store = TasteStore::new();
        for details in fixture_films() {
            store.upsert_details(details.clone());
        }
        let day = 86_400;
        for (uri, id) in [("lib://101", 101u32), ("lib://102", 102)] {
            store.upsert_watch_event(
                USER,
                WatchEvent::watched(uri, id)
                    .with_rating(4.5)
                    .with_liked(true)
                    .with_last_watched_at(NOW - 30 * day),
            );
        }
        Arc::new(RwLock::new(store))
    }

    fn engine(store: Arc<RwLock<TasteStore>>) -> RecommendationEngine {
        let provider = Arc::new(FixtureProvider::new(fixture_films()));
        RecommendationEngine::new(store, provider)
    }

    #[tokio::test]
    async fn run_returns_ranked_picks_and_excludes_watched_films() {
        let store = seeded_store();
        let engine = engine(Arc::clone(&store));
        let picks = engine
            .run(USER, SessionContext::default(), NOW)
            .await
            .expect("run should succeed");

        assert!(!picks.is_empty());
        let ids: HashSet<CatalogId> = picks.iter().map(|p| p.id()).collect();
        assert!(!ids.contains(&101), "watched films never come back");
        assert!(!ids.contains(&102));
        assert_eq!(
            picks[0].id(),
            1,
            "the unwatched horror film should lead: {:?}",
            picks.iter().map(|p| (p.id(), p.score)).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn shown_picks_are_suppressed_on_the_next_run() {
        let store = seeded_store();
        let engine = engine(Arc::clone(&store));
        let first = engine
            .run(USER, SessionContext::default(), NOW)
            .await
            .expect("first run");
        let first_ids: HashSet<CatalogId> = first.iter().map(|p| p.id()).collect();

        let second = engine
            .run(USER, SessionContext::default(), NOW + 60)
            .await
            .expect("second run");
        for pick in &second {
            assert!(
                !first_ids.contains(&pick.id()),
                "{} was already shown a minute ago",
                pick.id()
            );
        }
    }

    #[tokio::test]
    async fn empty_history_ranks_by_popularity_without_error() {
        let store = Arc::new(RwLock::new(TasteStore::new()));
        let engine = engine(Arc::clone(&store));
        let picks = engine
            .run(42, SessionContext::default(), NOW)
            .await
            .expect("cold start must not error");

        assert!(!picks.is_empty());
        assert_eq!(
            picks[0].id(),
            2,
            "with no profile the most popular film leads"
        );
    }

    #[tokio::test]
    async fn a_newer_generation_supersedes_a_stale_run() {
        let store = seeded_store();
        let engine = engine(Arc::clone(&store));

        let stale = engine.begin_run(USER);
        let _newer = engine.begin_run(USER);
        let result = engine
            .run_generation(USER, stale, SessionContext::default(), NOW)
            .await;
        assert!(matches!(result, Err(EngineError::Superseded(USER))));
    }

    #[tokio::test]
    async fn generation_checks_pass_for_the_latest_run() {
        let store = seeded_store();
        let engine = engine(store);
        let g1 = engine.begin_run(USER);
        assert!(engine.check_current(USER, g1).is_ok());
        let g2 = engine.begin_run(USER);
        assert!(engine.check_current(USER, g1).is_err());
        assert!(engine.check_current(USER, g2).is_ok());
    }

    #[tokio::test]
    async fn superseded_runs_leave_no_shown_marks() {
        let store = seeded_store();
        let engine = engine(Arc::clone(&store));

        let stale = engine.begin_run(USER);
        engine.begin_run(USER);
        let _ = engine
            .run_generation(USER, stale, SessionContext::default(), NOW)
            .await;

        let shown = store
            .read()
            .unwrap()
            .recently_shown(USER, NOW, 3 * 24 * 3600);
        assert!(shown.is_empty(), "a stale run must not mark anything shown");
    }

    #[tokio::test]
    async fn session_tone_flows_through_to_scoring() {
        let mut films = fixture_films();
        films.push(film(6, "Paper Lanterns", &[(10751, "Family")], 6, 2015, 20.0));
        let store = Arc::new(RwLock::new(TasteStore::new()));
        let provider = Arc::new(FixtureProvider::new(films));
        let engine = RecommendationEngine::new(Arc::clone(&store), provider);

        let family = engine
            .run(7, SessionContext::with_tone(SessionTone::Family), NOW)
            .await
            .expect("family run");
        let family_pick = family.iter().find(|p| p.id() == 6).expect("family film present");
        assert!(
            family_pick
                .reasons
                .iter()
                .any(|r| r.contains("watching together")),
            "family tone should explain itself: {:?}",
            family_pick.reasons
        );
    }
}
