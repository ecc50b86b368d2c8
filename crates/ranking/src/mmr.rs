//! Diversity reranking with Maximal Marginal Relevance.
//!
//! Greedy selection over the scored pool: each pick maximizes
//! `lambda * relevance - (1 - lambda) * max_similarity_to_selected`.
//! Relevance is min-max normalized; similarity is Jaccard over the union of
//! genre ids, director ids, and release decade. Lambda is capped at 0.5 so
//! the reranker can only trade relevance away for diversity, never sharpen
//! an already relevance-sorted list.

use std::collections::HashSet;

use tracing::debug;

use crate::overlap::ScoredCandidate;

/// Tag half of a similarity token; keeps genre 12 distinct from director 12.
type FeatureToken = (u8, u32);

#[derive(Debug, Clone)]
pub struct DiversityReranker {
    lambda: f32,
}

impl Default for DiversityReranker {
    fn default() -> Self {
        Self::new(0.3)
    }
}

impl DiversityReranker {
    /// `lambda` is clamped into `[0.0, 0.5]`.
    pub fn new(lambda: f32) -> Self {
        Self {
            lambda: lambda.clamp(0.0, 0.5),
        }
    }

    pub fn lambda(&self) -> f32 {
        self.lambda
    }

    /// Select up to `k` candidates from a scored pool.
    ///
    /// Never errors and never returns duplicates; with fewer than `k`
    /// candidates the whole pool comes back reordered.
    pub fn rerank(&self, pool: Vec<ScoredCandidate>, k: usize) -> Vec<ScoredCandidate> {
        if pool.is_empty() || k == 0 {
            return Vec::new();
        }

        let tokens: Vec<HashSet<FeatureToken>> =
            pool.iter().map(|c| similarity_tokens(c)).collect();
        let relevance = normalized_relevance(&pool);

        let mut remaining: Vec<usize> = (0..pool.len()).collect();
        let mut selected: Vec<usize> = Vec::with_capacity(k.min(pool.len()));

        while selected.len() < k && !remaining.is_empty() {
            let mut best: Option<(usize, f32, f32)> = None; // (remaining idx, value, rel)
            for (pos, &idx) in remaining.iter().enumerate() {
                let max_sim = selected
                    .iter()
                    .map(|&s| jaccard(&tokens[idx], &tokens[s]))
                    .fold(0.0f32, f32::max);
                let value = self.lambda * relevance[idx] - (1.0 - self.lambda) * max_sim;

                let candidate = (pos, value, relevance[idx]);
                best = Some(match best {
                    None => candidate,
                    Some(current) => pick_better(current, candidate, &pool, &remaining),
                });
            }
            let (pos, _, _) = best.expect("remaining is non-empty");
            selected.push(remaining.swap_remove(pos));
        }

        debug!(selected = selected.len(), pool = pool.len(), "mmr rerank complete");
        let mut by_index: Vec<Option<ScoredCandidate>> = pool.into_iter().map(Some).collect();
        selected
            .into_iter()
            .filter_map(|idx| by_index[idx].take())
            .collect()
    }
}

/// Tie rules: higher MMR value, then higher relevance, then lower
/// popularity, then lower id.
fn pick_better(
    current: (usize, f32, f32),
    challenger: (usize, f32, f32),
    pool: &[ScoredCandidate],
    remaining: &[usize],
) -> (usize, f32, f32) {
    let (c_pos, c_value, c_rel) = current;
    let (n_pos, n_value, n_rel) = challenger;
    let c_details = &pool[remaining[c_pos]].candidate.details;
    let n_details = &pool[remaining[n_pos]].candidate.details;

    let ordering = n_value
        .total_cmp(&c_value)
        .then_with(|| n_rel.total_cmp(&c_rel))
        .then_with(|| c_details.popularity.total_cmp(&n_details.popularity))
        .then_with(|| c_details.id.cmp(&n_details.id));
    if ordering.is_gt() { challenger } else { current }
}

fn similarity_tokens(candidate: &ScoredCandidate) -> HashSet<FeatureToken> {
    let details = &candidate.candidate.details;
    let mut tokens: HashSet<FeatureToken> = HashSet::new();
    tokens.extend(details.genres.iter().map(|g| (0u8, g.id)));
    tokens.extend(details.directors.iter().map(|d| (1u8, d.id)));
    if let Some(decade) = details.decade() {
        tokens.insert((2u8, decade as u32));
    }
    tokens
}

fn jaccard(a: &HashSet<FeatureToken>, b: &HashSet<FeatureToken>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f32 / union as f32
}

fn normalized_relevance(pool: &[ScoredCandidate]) -> Vec<f32> {
    let min = pool.iter().map(|c| c.score).fold(f32::INFINITY, f32::min);
    let max = pool.iter().map(|c| c.score).fold(f32::NEG_INFINITY, f32::max);
    if (max - min).abs() < f32::EPSILON {
        return vec![1.0; pool.len()];
    }
    pool.iter().map(|c| (c.score - min) / (max - min)).collect()
}
