//! Deterministic in-memory provider for tests, demos, and offline runs.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use catalog::types::{CandidateDetails, CatalogId, FeatureId};

use crate::error::{DiscoveryError, Result};
use crate::provider::DiscoveryProvider;

const PAGE_SIZE: usize = 20;

/// A provider backed by a fixed film table.
///
/// Every query is a pure function of the table: trending orders by
/// popularity, similar by feature overlap with the seed, discover by genre
/// membership. Ties break toward the lower id so runs are reproducible.
#[derive(Debug, Default)]
pub struct FixtureProvider {
    films: HashMap<CatalogId, CandidateDetails>,
}

impl FixtureProvider {
    pub fn new(films: Vec<CandidateDetails>) -> Self {
        Self {
            films: films.into_iter().map(|f| (f.id, f)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.films.len()
    }

    pub fn is_empty(&self) -> bool {
        self.films.is_empty()
    }

    fn by_popularity(&self) -> Vec<CatalogId> {
        let mut ids: Vec<&CandidateDetails> = self.films.values().collect();
        ids.sort_by(|a, b| {
            b.popularity
                .total_cmp(&a.popularity)
                .then_with(|| a.id.cmp(&b.id))
        });
        ids.into_iter().map(|f| f.id).collect()
    }
}

fn overlap_tokens(details: &CandidateDetails) -> HashSet<(u8, u32)> {
    let mut tokens: HashSet<(u8, u32)> = HashSet::new();
    tokens.extend(details.genres.iter().map(|g| (0u8, g.id)));
    tokens.extend(details.directors.iter().map(|d| (1u8, d.id)));
    if let Some(decade) = details.decade() {
        tokens.insert((2u8, decade as u32));
    }
    tokens
}

#[async_trait]
impl DiscoveryProvider for FixtureProvider {
    /// Popularity order, in zero-based pages of twenty.
    async fn trending(&self, page: u32) -> Result<Vec<CatalogId>> {
        let ranked = self.by_popularity();
        let start = page as usize * PAGE_SIZE;
        if start >= ranked.len() {
            return Ok(Vec::new());
        }
        let end = (start + PAGE_SIZE).min(ranked.len());
        Ok(ranked[start..end].to_vec())
    }

    /// Films sharing genre, director, or decade with the seed, strongest
    /// overlap first. The seed itself is excluded.
    async fn similar(&self, seed: CatalogId) -> Result<Vec<CatalogId>> {
        let seed_details = self
            .films
            .get(&seed)
            .ok_or(DiscoveryError::NotFound(seed))?;
        let seed_tokens = overlap_tokens(seed_details);

        let mut overlapping: Vec<(usize, CatalogId)> = self
            .films
            .values()
            .filter(|f| f.id != seed)
            .filter_map(|f| {
                let shared = overlap_tokens(f).intersection(&seed_tokens).count();
                (shared > 0).then_some((shared, f.id))
            })
            .collect();
        overlapping.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        Ok(overlapping.into_iter().map(|(_, id)| id).collect())
    }

    /// Films carrying any of the requested genres, popularity order.
    async fn discover(&self, genres: &[FeatureId]) -> Result<Vec<CatalogId>> {
        let wanted: HashSet<FeatureId> = genres.iter().copied().collect();
        Ok(self
            .by_popularity()
            .into_iter()
            .filter(|id| {
                self.films[id]
                    .genres
                    .iter()
                    .any(|g| wanted.contains(&g.id))
            })
            .collect())
    }

    async fn details(&self, id: CatalogId) -> Result<CandidateDetails> {
        self.films
            .get(&id)
            .cloned()
            .ok_or(DiscoveryError::NotFound(id))
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
