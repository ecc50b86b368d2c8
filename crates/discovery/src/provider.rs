//! Discovery provider abstraction.
//!
//! This module defines the pluggable contract for candidate discovery
//! sources. Each provider answers the three channel queries with bare id
//! lists and resolves full metadata separately, so channel fan-out stays
//! cheap and detail fetching can be pooled and bounded by the caller.

use async_trait::async_trait;

use catalog::types::{CandidateDetails, CatalogId, FeatureId};

use crate::error::Result;

/// Trait for discovery collaborators.
///
/// Channel methods return raw id lists; `details` resolves one id to full
/// metadata. Any randomness (page choice, sampling) lives inside the
/// implementation so callers stay deterministic given a provider.
#[async_trait]
pub trait DiscoveryProvider: Send + Sync {
    /// Currently popular catalog ids, paged.
    async fn trending(&self, page: u32) -> Result<Vec<CatalogId>>;

    /// Ids similar to a seed film the user scored highly.
    async fn similar(&self, seed: CatalogId) -> Result<Vec<CatalogId>>;

    /// Ids matching a set of preferred genre ids.
    async fn discover(&self, genres: &[FeatureId]) -> Result<Vec<CatalogId>>;

    /// Full metadata for one id.
    async fn details(&self, id: CatalogId) -> Result<CandidateDetails>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}
