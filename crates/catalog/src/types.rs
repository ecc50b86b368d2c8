//! Core domain types shared across the ranking pipeline.
//!
//! Everything here is a plain record: watch history rows, candidate metadata
//! as supplied by the discovery collaborator, feedback events, and the
//! reliability counters derived from them. Scoring logic lives in the
//! `profile` and `ranking` crates; this crate only defines the shapes.

use serde::{Deserialize, Serialize};

/// Unique identifier for a user.
pub type UserId = u32;

/// Identifier of a film in the external catalog.
pub type CatalogId = u32;

/// Identifier of a feature (genre id, keyword id, person id, studio id).
/// Decades use the decade's starting year (e.g. 1990).
pub type FeatureId = u32;

/// The feature categories a taste profile is built over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FeatureKind {
    Genre,
    Keyword,
    Director,
    Actor,
    Studio,
    Decade,
}

impl FeatureKind {
    /// Short lowercase label used in reasons and evidence map keys.
    pub fn label(&self) -> &'static str {
        match self {
            FeatureKind::Genre => "genre",
            FeatureKind::Keyword => "keyword",
            FeatureKind::Director => "director",
            FeatureKind::Actor => "actor",
            FeatureKind::Studio => "studio",
            FeatureKind::Decade => "decade",
        }
    }
}

/// A feature id together with its display name.
///
/// Candidate metadata carries both so that reasons shown to the user can
/// name features without a separate lookup table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureRef {
    pub id: FeatureId,
    pub name: String,
}

impl FeatureRef {
    pub fn new(id: FeatureId, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

/// Which discovery channel surfaced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiscoveryChannel {
    Trending,
    Similar,
    Discover,
}

impl DiscoveryChannel {
    pub fn label(&self) -> &'static str {
        match self {
            DiscoveryChannel::Trending => "trending",
            DiscoveryChannel::Similar => "similar",
            DiscoveryChannel::Discover => "discover",
        }
    }
}

/// Agreement strength among the discovery channels that surfaced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConsensusLevel {
    Low,
    Medium,
    High,
}

impl ConsensusLevel {
    /// Derive the consensus level from the number of distinct channels that
    /// independently surfaced a candidate.
    pub fn from_channel_count(count: usize) -> Self {
        match count {
            0 | 1 => ConsensusLevel::Low,
            2 => ConsensusLevel::Medium,
            _ => ConsensusLevel::High,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConsensusLevel::Low => "low",
            ConsensusLevel::Medium => "medium",
            ConsensusLevel::High => "high",
        }
    }
}

/// One row of a user's watch history, created on import/sync.
///
/// Upserted by `uri`; otherwise immutable. Ratings are in half-star steps
/// from 0.5 to 5.0 when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent {
    pub uri: String,
    pub catalog_id: Option<CatalogId>,
    pub rating: Option<f32>,
    pub liked: bool,
    pub rewatch: bool,
    pub watch_count: u32,
    /// Unix seconds of the most recent watch.
    pub last_watched_at: Option<i64>,
    pub on_watchlist: bool,
    /// Unix seconds the title was added to the watchlist.
    pub watchlist_added_at: Option<i64>,
}

impl WatchEvent {
    /// A minimal watched entry; the builder methods fill in the rest.
    pub fn watched(uri: impl Into<String>, catalog_id: CatalogId) -> Self {
        Self {
            uri: uri.into(),
            catalog_id: Some(catalog_id),
            rating: None,
            liked: false,
            rewatch: false,
            watch_count: 1,
            last_watched_at: None,
            on_watchlist: false,
            watchlist_added_at: None,
        }
    }

    pub fn with_rating(mut self, rating: f32) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn with_liked(mut self, liked: bool) -> Self {
        self.liked = liked;
        self
    }

    pub fn with_last_watched_at(mut self, ts: i64) -> Self {
        self.last_watched_at = Some(ts);
        self
    }

    pub fn with_watch_count(mut self, count: u32) -> Self {
        self.watch_count = count;
        self.rewatch = count > 1;
        self
    }

    pub fn with_watchlist(mut self, added_at: i64) -> Self {
        self.on_watchlist = true;
        self.watchlist_added_at = Some(added_at);
        self
    }
}

/// Candidate metadata as supplied by the discovery collaborator.
///
/// Every field besides `id` may be missing; scorers contribute zero for
/// absent categories rather than failing. Construct through
/// [`crate::ingest::candidate_from_value`] at the system boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateDetails {
    pub id: CatalogId,
    pub title: String,
    pub genres: Vec<FeatureRef>,
    pub keywords: Vec<FeatureRef>,
    pub directors: Vec<FeatureRef>,
    pub actors: Vec<FeatureRef>,
    pub studios: Vec<FeatureRef>,
    pub release_year: Option<u16>,
    pub runtime_minutes: Option<u32>,
    pub popularity: f32,
    pub vote_average: f32,
    pub vote_count: u32,
}

impl CandidateDetails {
    pub fn new(id: CatalogId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            ..Default::default()
        }
    }

    /// Release decade as a starting year (e.g. 1994 -> 1990).
    pub fn decade(&self) -> Option<u16> {
        self.release_year.map(|y| y - y % 10)
    }

    /// Every feature the candidate carries, flattened to (kind, ref) pairs.
    ///
    /// The release decade is synthesized as a feature whose id is the
    /// decade's starting year, so profile and feedback machinery can treat
    /// it like any other feature.
    pub fn feature_entries(&self) -> Vec<(FeatureKind, FeatureRef)> {
        let mut entries = Vec::new();
        for (kind, list) in [
            (FeatureKind::Genre, &self.genres),
            (FeatureKind::Keyword, &self.keywords),
            (FeatureKind::Director, &self.directors),
            (FeatureKind::Actor, &self.actors),
            (FeatureKind::Studio, &self.studios),
        ] {
            for feature in list {
                entries.push((kind, feature.clone()));
            }
        }
        if let Some(decade) = self.decade() {
            entries.push((
                FeatureKind::Decade,
                FeatureRef::new(decade as FeatureId, format!("{decade}s")),
            ));
        }
        entries
    }

    /// Number of metadata categories that carry any signal.
    ///
    /// Used by the completeness floor: candidates with almost no metadata are
    /// downranked, never dropped.
    pub fn present_categories(&self) -> usize {
        [
            !self.genres.is_empty(),
            !self.keywords.is_empty(),
            !self.directors.is_empty(),
            !self.actors.is_empty(),
            !self.studios.is_empty(),
            self.release_year.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}

/// A candidate after channel merge: metadata plus attribution.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub details: CandidateDetails,
    /// Distinct channels that surfaced this id, sorted.
    pub channels: Vec<DiscoveryChannel>,
    pub consensus: ConsensusLevel,
}

impl Candidate {
    pub fn id(&self) -> CatalogId {
        self.details.id
    }
}

/// The kinds of explicit feedback a user can give on a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedbackKind {
    Positive,
    /// "Not interested": dampens future ranking, never excludes.
    NegativeSoft,
    /// Explicit block: excluded from future pools until undone.
    NegativeHard,
    PairwiseWin,
    PairwiseLoss,
}

impl FeedbackKind {
    /// Whether this kind counts as a hit for the channels that surfaced the
    /// candidate.
    pub fn is_hit(&self) -> bool {
        matches!(self, FeedbackKind::Positive | FeedbackKind::PairwiseWin)
    }
}

/// One explicit user action on a suggestion.
///
/// At most one event is active per (user, candidate); new feedback for the
/// same pair overwrites the previous event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub user_id: UserId,
    pub candidate_id: CatalogId,
    pub kind: FeedbackKind,
    pub reasons: Vec<String>,
    pub created_at: i64,
    /// Channels that had surfaced the candidate when the feedback was given.
    /// Reliability deltas are keyed by this snapshot so undo reverses the
    /// exact cells the event touched.
    pub channels: Vec<DiscoveryChannel>,
    /// Consensus level the candidate had when the feedback was given.
    pub consensus_at_time: ConsensusLevel,
}

/// Hit/miss counters for one (user, channel, consensus) cell.
///
/// Read only through Laplace smoothing; never divided by raw zero counts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReliabilityPrior {
    pub hits: u32,
    pub misses: u32,
}

impl ReliabilityPrior {
    /// Laplace-smoothed hit rate: `(hits + 1) / (hits + misses + 2)`.
    ///
    /// Zero observations regress to exactly 0.5.
    pub fn smoothed_rate(&self) -> f32 {
        (self.hits as f32 + 1.0) / ((self.hits + self.misses) as f32 + 2.0)
    }

    pub fn observations(&self) -> u32 {
        self.hits + self.misses
    }
}

/// Positive/negative feedback counters for one (user, feature) pair.
///
/// Tracked explicitly rather than netted so a single strong negative cannot
/// arithmetically erase many weak positives.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FeatureStat {
    pub positive: u32,
    pub negative: u32,
}

impl FeatureStat {
    /// Laplace-smoothed win rate in (0, 1); 0.5 with no observations.
    pub fn win_rate(&self) -> f32 {
        (self.positive as f32 + 1.0) / ((self.positive + self.negative) as f32 + 2.0)
    }
}
