//! Taste profile construction from watch history and feedback counters.
//!
//! The builder aggregates a user's resolved watch history into per-feature
//! weights, one pass per run. Profiles are rebuilt from decayed sources every
//! time rather than updated incrementally, so recency decay and borrowed
//! weight fade on their own when signals go unreinforced.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use catalog::store::ResolvedWatch;
use catalog::types::{FeatureId, FeatureKind, FeatureRef, FeatureStat, UserId};

/// Tunables for profile construction. Defaults match the documented
/// behavior; the CLI overrides a few of these from flags.
#[derive(Debug, Clone)]
pub struct ProfileConfig {
    /// Half-life of a watch signal, in days.
    pub half_life_days: f32,
    /// Decay never drops below this, so old favorites keep a trace.
    pub decay_floor: f32,
    /// Base weight of a watched film with no rating.
    pub unrated_base: f32,
    /// Additive bonus when the film is marked liked.
    pub liked_bonus: f32,
    pub rewatch_multiplier: f32,
    /// Ratings at or below this feed the avoid lists instead.
    pub low_rating_threshold: f32,
    /// Watchlist intent scale, relative to a watched signal.
    pub watchlist_scale: f32,
    pub watchlist_half_life_days: f32,
    /// Share of the donor's weight a single-sample feature inherits.
    pub borrow_ratio: f32,
    /// Minimum samples before a feature can act as a borrowing donor.
    pub borrow_min_donor_samples: u32,
    /// Win rates below this also feed the avoid side.
    pub avoid_win_threshold: f32,
    pub top_n_per_kind: usize,
    /// Contributing film titles kept per feature.
    pub evidence_cap: usize,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            half_life_days: 180.0,
            decay_floor: 0.05,
            unrated_base: 0.4,
            liked_bonus: 0.35,
            rewatch_multiplier: 1.25,
            low_rating_threshold: 2.5,
            watchlist_scale: 0.4,
            watchlist_half_life_days: 90.0,
            borrow_ratio: 0.15,
            borrow_min_donor_samples: 3,
            avoid_win_threshold: 0.35,
            top_n_per_kind: 10,
            evidence_cap: 3,
        }
    }
}

impl ProfileConfig {
    pub fn with_top_n_per_kind(mut self, n: usize) -> Self {
        self.top_n_per_kind = n;
        self
    }

    pub fn with_half_life_days(mut self, days: f32) -> Self {
        self.half_life_days = days;
        self
    }

    pub fn with_watchlist_scale(mut self, scale: f32) -> Self {
        self.watchlist_scale = scale;
        self
    }
}

/// One weighted feature in a profile, with the films that earned it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureWeight {
    pub feature: FeatureRef,
    pub weight: f32,
    pub samples: u32,
    /// Titles of up to three films that contributed this feature.
    pub evidence: Vec<String>,
}

/// A user's aggregated taste: preferred, avoided, and intent feature lists,
/// each capped per kind and sorted by descending weight.
///
/// An empty profile is valid and means "no history"; downstream scoring
/// falls back to popularity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TasteProfile {
    pub user_id: UserId,
    pub preferred: HashMap<FeatureKind, Vec<FeatureWeight>>,
    pub avoided: HashMap<FeatureKind, Vec<FeatureWeight>>,
    /// Watchlist-derived interest, deliberately weaker than watched signals.
    pub intent: HashMap<FeatureKind, Vec<FeatureWeight>>,
    pub history_size: usize,
}

impl TasteProfile {
    pub fn is_empty(&self) -> bool {
        self.preferred.values().all(Vec::is_empty)
            && self.avoided.values().all(Vec::is_empty)
            && self.intent.values().all(Vec::is_empty)
    }

    pub fn preferred(&self, kind: FeatureKind) -> &[FeatureWeight] {
        self.preferred.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn avoided(&self, kind: FeatureKind) -> &[FeatureWeight] {
        self.avoided.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn intent(&self, kind: FeatureKind) -> &[FeatureWeight] {
        self.intent.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn preferred_weight(&self, kind: FeatureKind, id: FeatureId) -> f32 {
        weight_of(self.preferred(kind), id)
    }

    pub fn avoided_weight(&self, kind: FeatureKind, id: FeatureId) -> f32 {
        weight_of(self.avoided(kind), id)
    }

    pub fn intent_weight(&self, kind: FeatureKind, id: FeatureId) -> f32 {
        weight_of(self.intent(kind), id)
    }

    /// The strongest preferred genres, in weight order.
    pub fn top_genres(&self, n: usize) -> Vec<&FeatureWeight> {
        self.preferred(FeatureKind::Genre).iter().take(n).collect()
    }

    /// The single strongest preferred decade, as its starting year.
    pub fn top_decade(&self) -> Option<FeatureId> {
        self.preferred(FeatureKind::Decade)
            .first()
            .map(|fw| fw.feature.id)
    }

    /// Evidence titles for one preferred feature, for reason rendering.
    pub fn evidence_for(&self, kind: FeatureKind, id: FeatureId) -> &[String] {
        self.preferred(kind)
            .iter()
            .find(|fw| fw.feature.id == id)
            .map(|fw| fw.evidence.as_slice())
            .unwrap_or(&[])
    }
}

fn weight_of(list: &[FeatureWeight], id: FeatureId) -> f32 {
    list.iter()
        .find(|fw| fw.feature.id == id)
        .map(|fw| fw.weight)
        .unwrap_or(0.0)
}

/// Per-feature accumulator while walking the history.
#[derive(Debug, Default)]
struct Accum {
    name: String,
    sum: f32,
    count: u32,
    evidence: Vec<String>,
    /// Index of the last contributing watch; read only when `count == 1`.
    last_watch: usize,
}

impl Accum {
    fn add(&mut self, name: &str, weight: f32, title: &str, watch_idx: usize, evidence_cap: usize) {
        if self.name.is_empty() && !name.is_empty() {
            self.name = name.to_string();
        }
        self.sum += weight;
        self.count += 1;
        self.last_watch = watch_idx;
        if self.evidence.len() < evidence_cap && !title.is_empty() {
            self.evidence.push(title.to_string());
        }
    }

    /// Confidence-dampened weight: the mean scaled by `ln(1 + count)` so a
    /// single enthusiastic sample cannot outrank a broadly repeated one.
    fn dampened(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        (self.sum / self.count as f32) * (1.0 + self.count as f32).ln()
    }
}

type FeatureKey = (FeatureKind, FeatureId);

/// Builds [`TasteProfile`]s from resolved history and feedback counters.
#[derive(Debug, Default)]
pub struct TasteProfileBuilder {
    config: ProfileConfig,
}

impl TasteProfileBuilder {
    pub fn new(config: ProfileConfig) -> Self {
        Self { config }
    }

    /// Aggregate a user's history into a profile.
    ///
    /// `now` is passed in explicitly; the builder never reads the clock, so
    /// a profile is a pure function of its inputs.
    #[instrument(skip_all, fields(user_id, watches = watches.len()))]
    pub fn build(
        &self,
        user_id: UserId,
        watches: &[ResolvedWatch],
        stats: &HashMap<FeatureKey, FeatureStat>,
        now: i64,
    ) -> TasteProfile {
        if watches.is_empty() {
            debug!(user_id, "no history, returning empty profile");
            return TasteProfile {
                user_id,
                ..TasteProfile::default()
            };
        }

        let cfg = &self.config;
        let mut preferred: HashMap<FeatureKey, Accum> = HashMap::new();
        let mut avoided: HashMap<FeatureKey, Accum> = HashMap::new();
        let mut intent: HashMap<FeatureKey, Accum> = HashMap::new();
        // Per-watch feature sets on the preferred side, for borrowing.
        let mut watch_features: Vec<Vec<FeatureKey>> = vec![Vec::new(); watches.len()];
        let mut history_size = 0usize;

        for (idx, watch) in watches.iter().enumerate() {
            let event = &watch.event;
            let title = &watch.details.title;
            let entries = watch.details.feature_entries();

            if event.watch_count == 0 {
                // Watchlist-only row: intent, not history.
                if event.on_watchlist {
                    let decay = recency_decay(
                        now,
                        event.watchlist_added_at,
                        cfg.watchlist_half_life_days,
                        cfg.decay_floor,
                    );
                    let weight = cfg.watchlist_scale * decay;
                    for (kind, feature) in &entries {
                        intent.entry((*kind, feature.id)).or_default().add(
                            &feature.name,
                            weight,
                            title,
                            idx,
                            cfg.evidence_cap,
                        );
                    }
                }
                continue;
            }

            history_size += 1;
            let decay =
                recency_decay(now, event.last_watched_at, cfg.half_life_days, cfg.decay_floor);

            match event.rating {
                Some(rating) if rating <= cfg.low_rating_threshold => {
                    // Disliked film: feed the mirrored avoid lists.
                    let base = (cfg.low_rating_threshold + 0.5 - rating)
                        / cfg.low_rating_threshold;
                    let weight = base * decay;
                    for (kind, feature) in &entries {
                        if matches!(
                            kind,
                            FeatureKind::Genre | FeatureKind::Keyword | FeatureKind::Director
                        ) {
                            avoided.entry((*kind, feature.id)).or_default().add(
                                &feature.name,
                                weight,
                                title,
                                idx,
                                cfg.evidence_cap,
                            );
                        }
                    }
                }
                rating => {
                    let mut base = match rating {
                        Some(r) => (r - cfg.low_rating_threshold) / cfg.low_rating_threshold,
                        None => cfg.unrated_base,
                    };
                    if event.liked {
                        base += cfg.liked_bonus;
                    }
                    if event.rewatch {
                        base *= cfg.rewatch_multiplier;
                    }
                    let weight = base * decay;
                    for (kind, feature) in &entries {
                        let key = (*kind, feature.id);
                        preferred.entry(key).or_default().add(
                            &feature.name,
                            weight,
                            title,
                            idx,
                            cfg.evidence_cap,
                        );
                        watch_features[idx].push(key);
                    }
                }
            }
        }

        // Dampen, then apply feedback win rates. Weak win rates spill into
        // the avoid side proportional to how badly the feature performs.
        let mut finals: HashMap<FeatureKey, f32> = HashMap::new();
        let mut avoid_spill: HashMap<FeatureKey, f32> = HashMap::new();
        for (key, accum) in &preferred {
            let dampened = accum.dampened();
            let win = stats.get(key).copied().unwrap_or_default().win_rate();
            finals.insert(*key, dampened * (0.5 + win));
            if win < cfg.avoid_win_threshold {
                avoid_spill.insert(*key, dampened * (1.0 - win));
            }
        }

        // Adjacent borrowing: a feature seen exactly once inherits a share
        // of the strongest co-occurring same-kind feature with enough
        // samples. Donor weights are read pre-borrow so order cannot matter.
        let mut borrowed: HashMap<FeatureKey, f32> = HashMap::new();
        for (key, accum) in &preferred {
            if accum.count != 1 {
                continue;
            }
            let donor = watch_features[accum.last_watch]
                .iter()
                .filter(|other| other.0 == key.0 && **other != *key)
                .filter(|other| {
                    preferred
                        .get(*other)
                        .is_some_and(|a| a.count >= cfg.borrow_min_donor_samples)
                })
                .filter_map(|other| finals.get(other))
                .fold(0.0f32, |best, w| best.max(*w));
            if donor > 0.0 {
                borrowed.insert(*key, donor * cfg.borrow_ratio);
            }
        }
        for (key, extra) in borrowed {
            *finals.entry(key).or_insert(0.0) += extra;
        }

        let preferred_lists = collect_lists(&preferred, |key, accum| {
            finals.get(key).copied().unwrap_or_else(|| accum.dampened())
        });
        let avoided_lists = collect_lists_with_spill(&avoided, &avoid_spill, &preferred);
        let intent_lists = collect_lists(&intent, |_, accum| accum.dampened());

        let mut profile = TasteProfile {
            user_id,
            preferred: truncate_lists(preferred_lists, cfg.top_n_per_kind),
            avoided: truncate_lists(avoided_lists, cfg.top_n_per_kind),
            intent: truncate_lists(intent_lists, cfg.top_n_per_kind),
            history_size,
        };
        prune_empty(&mut profile);

        debug!(
            user_id,
            history = profile.history_size,
            preferred = profile.preferred.values().map(Vec::len).sum::<usize>(),
            avoided = profile.avoided.values().map(Vec::len).sum::<usize>(),
            "profile built"
        );
        profile
    }
}

/// Half-life decay of a signal `age` old, floored so nothing reaches zero.
/// Missing timestamps count as one elapsed half-life.
fn recency_decay(now: i64, then: Option<i64>, half_life_days: f32, floor: f32) -> f32 {
    let Some(then) = then else { return 0.5 };
    let age_days = (now - then).max(0) as f32 / 86_400.0;
    0.5f32.powf(age_days / half_life_days).max(floor)
}

fn collect_lists(
    accums: &HashMap<FeatureKey, Accum>,
    weight_fn: impl Fn(&FeatureKey, &Accum) -> f32,
) -> HashMap<FeatureKind, Vec<FeatureWeight>> {
    let mut lists: HashMap<FeatureKind, Vec<FeatureWeight>> = HashMap::new();
    for (key, accum) in accums {
        let weight = weight_fn(key, accum).max(0.0);
        if weight <= 0.0 {
            continue;
        }
        lists.entry(key.0).or_default().push(FeatureWeight {
            feature: FeatureRef::new(key.1, accum.name.clone()),
            weight,
            samples: accum.count,
            evidence: accum.evidence.clone(),
        });
    }
    lists
}

/// Avoid lists: the dampened dislike signal plus any feedback spill from the
/// preferred side for the same feature.
fn collect_lists_with_spill(
    avoided: &HashMap<FeatureKey, Accum>,
    spill: &HashMap<FeatureKey, f32>,
    preferred: &HashMap<FeatureKey, Accum>,
) -> HashMap<FeatureKind, Vec<FeatureWeight>> {
    let mut lists = collect_lists(avoided, |key, accum| {
        accum.dampened() + spill.get(key).copied().unwrap_or(0.0)
    });
    for (key, extra) in spill {
        let already = avoided.contains_key(key);
        if already || *extra <= 0.0 {
            continue;
        }
        let (name, evidence, samples) = preferred
            .get(key)
            .map(|a| (a.name.clone(), a.evidence.clone(), a.count))
            .unwrap_or_default();
        lists.entry(key.0).or_default().push(FeatureWeight {
            feature: FeatureRef::new(key.1, name),
            weight: *extra,
            samples,
            evidence,
        });
    }
    lists
}

fn truncate_lists(
    mut lists: HashMap<FeatureKind, Vec<FeatureWeight>>,
    top_n: usize,
) -> HashMap<FeatureKind, Vec<FeatureWeight>> {
    for list in lists.values_mut() {
        list.sort_by(|a, b| {
            b.weight
                .total_cmp(&a.weight)
                .then_with(|| a.feature.id.cmp(&b.feature.id))
        });
        list.truncate(top_n);
    }
    lists
}

fn prune_empty(profile: &mut TasteProfile) {
    profile.preferred.retain(|_, v| !v.is_empty());
    profile.avoided.retain(|_, v| !v.is_empty());
    profile.intent.retain(|_, v| !v.is_empty());
}
